use crate::irc::codec::InboundEvent;

#[derive(Debug)]
pub enum AppEvent {
    /// Parsed line from the server (pings are answered by the reader itself)
    Inbound(InboundEvent),

    /// Line typed on the console
    Console(String),

    /// Auto-broadcast timer fired
    Broadcast,

    /// The inbound stream failed or ended
    Disconnected { reason: String },
}
