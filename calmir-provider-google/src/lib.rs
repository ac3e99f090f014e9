//! Google Calendar implementation of the calmir remote protocol.
//!
//! Talks to the Calendar v3 REST API directly so the sync engine gets
//! raw control over page tokens, sync tokens and watch channels, and
//! converts Google's payloads into the provider-neutral types from
//! `calmir-core`.

pub mod client;
pub mod convert;

pub use client::GoogleCalendarApi;
