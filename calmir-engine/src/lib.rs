//! The calmir sync and approval engine.
//!
//! Everything that talks to the remote calendar system funnels through
//! one path: [`executor::RemoteExecutor`] secures quota units via
//! [`limiter::RateLimiter`], then runs the call with classified
//! retries. On top of that sit the two halves of the engine:
//!
//! - the mirror half: [`sync::SyncEngine`] (full + incremental sync)
//!   and [`webhook::WebhookManager`] keep the local mirror current;
//! - the mutation half: [`approval::ApprovalService`] gates every
//!   user-visible mutation behind a human decision before executing it
//!   against the remote system and mirroring the result back.
//!
//! Persistence, the job queue, credentials and auditing are external
//! collaborators reached through the contracts in [`store`],
//! [`scheduler`], [`credentials`] and [`audit`].

pub mod approval;
pub mod audit;
pub mod credentials;
pub mod executor;
pub mod limiter;
pub mod scheduler;
pub mod store;
pub mod sync;
pub mod webhook;

#[cfg(test)]
mod testutil;
