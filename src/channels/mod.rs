//! Channel clients for reading and publishing messages.

pub mod client;
pub mod telegram;

pub use client::{ChannelClient, ChannelHandle, SharedChannelClient};
pub use telegram::{TelegramChannel, TelegramConfig};
