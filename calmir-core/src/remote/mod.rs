//! Provider-neutral remote calendar protocol.
//!
//! The engine never talks to a remote calendar system directly: it goes
//! through the [`protocol::CalendarApi`] contract, and every provider
//! (e.g. `calmir-provider-google`) converts its API payloads into the
//! neutral types defined here.

pub mod protocol;

use std::fmt;

pub use protocol::*;

/// A bearer credential resolved for a user by the external credential
/// provider. The secret never appears in Debug output.
#[derive(Clone)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(secret: impl Into<String>) -> Self {
        AccessToken(secret.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}
