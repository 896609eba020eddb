//! Terminal front end for the chat controller.
//!
//! - [`config`]: CLI argument parsing and configuration
//! - [`commands`]: Slash command parsing
//!
//! The binary in `src/bin/smartasset-chat.rs` wires these to a
//! [`crate::ChatController`] and a [`Renderer`].

mod commands;
mod config;

pub use crate::render::{PlainTextRenderer, Renderer};
pub use commands::{ChatCommand, help_text, parse_command};
pub use config::{ChatArgs, ChatConfig};
