pub mod event;
pub mod handler;
pub mod moderation;
pub mod session;
