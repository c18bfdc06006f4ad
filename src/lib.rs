//! Intake bot — conversational data-intake agent.
//!
//! Walks a Telegram user through name → phone → address, lets them review
//! and edit the draft, and on confirmation appends the record to a Google
//! Sheet and notifies a channel.

pub mod channels;
pub mod config;
pub mod engine;
pub mod error;
pub mod store;
pub mod validators;
