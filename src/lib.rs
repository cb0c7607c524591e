//! Issue Bot: files unread mail as issues in a tracker repository.

pub mod config;
pub mod error;
pub mod extract;
pub mod mailbox;
pub mod message;
pub mod pipeline;
pub mod tracker;
