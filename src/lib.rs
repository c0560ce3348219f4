//! Report Bot: guided lab-report interviews over chat.

pub mod bot;
pub mod channels;
pub mod config;
pub mod conversation;
pub mod error;
pub mod pipeline;
pub mod store;
