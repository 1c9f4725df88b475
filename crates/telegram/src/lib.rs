//! Telegram Bot API transport for the relay engine.

pub mod config;
pub mod transport;

mod cache;

pub use {config::TelegramConfig, transport::TelegramTransport};
