//! Conversation engine: the per-chat report interview.
//!
//! A chat talks to the bot one answer at a time. The session records which
//! question is pending (`Step`), stores each answer in `ReportData`, and
//! hands back the next prompt. Sessions never touch the network or the disk;
//! anything that does is returned as an `Effect`.

pub mod commands;
pub mod machine;
pub mod model;
pub mod prompts;
pub mod state;

pub use commands::Command;
pub use machine::{Effect, Session, Transition};
pub use model::{ChatConfig, ChatId, ReportData, RowError};
pub use state::Step;
