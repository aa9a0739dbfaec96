pub mod client;
pub mod messages;

pub use client::{status_subject, StatusPublisher};
pub use messages::StatusMessage;
