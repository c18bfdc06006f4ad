//! Conversation engine — the intake finite-state machine.

pub mod event;
pub mod prompts;
pub mod session;

mod engine;

pub use engine::IntakeEngine;
pub use event::{IncomingEvent, Inbound, Menu, MenuAction, MenuButton, MessageRef, UserRef};
pub use session::{Draft, EditField, IntakeState, Session, SessionTable};
