//! Core types for the calmir calendar mirror.
//!
//! This crate provides the types shared by the sync engine and calendar
//! providers:
//! - `Event` and `Calendar` mirror rows
//! - `remote` module for the provider-neutral remote calendar protocol
//! - `approval` types for the human-gated mutation workflow
//! - `conflict` for pure scheduling-conflict detection
//! - `webhook` for the push-notification wire contract

pub mod approval;
pub mod calendar;
pub mod config;
pub mod conflict;
pub mod constants;
pub mod error;
pub mod event;
pub mod remote;
pub mod sync_state;
pub mod time_window;
pub mod webhook;

// Re-export the most widely used types at the crate root for convenience
pub use error::{CalmirError, CalmirResult};
pub use event::{Event, EventStatus, EventVisibility};
pub use time_window::TimeWindow;
