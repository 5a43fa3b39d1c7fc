#![allow(clippy::manual_unwrap_or_default)]
#![allow(clippy::manual_unwrap_or)]

pub mod capability;
pub mod client;
pub mod config;
pub mod constants;
pub mod conversation;
pub mod event;
pub mod fallback;
pub mod frame;
pub mod health;
pub mod history;
pub mod language;
pub mod logging;
pub mod main_helper;
pub mod prompt;
pub mod relay;
pub mod types;

pub use types::*;

pub use main_helper::{AppState, Args};
