//! The remote task server, seen from this crate
//!
//! The wire-level client (connection handling, VTODO parsing, HTTP plumbing) lives outside this
//! crate; what the sync machinery needs is only the small operation set below. Every operation
//! can fail transiently (network, auth, server hiccups), and callers are expected to catch those
//! failures and degrade to local-only behaviour rather than give up.

pub mod mock;

use std::error::Error;

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::task::TaskStatus;

/// A task as the server reports it.
///
/// Note that `description` is the *raw* note: when the server has no native recurrence support it
/// may contain an embedded metadata block (see [`crate::metadata`]) that has to be stripped
/// before display.
#[derive(Clone, Debug, PartialEq)]
pub struct RemoteTask {
    pub uid: String,
    pub summary: String,
    pub description: Option<String>,
    pub priority: u8,
    pub due: Option<NaiveDateTime>,
    pub status: TaskStatus,
    pub percent_complete: u8,
    /// The native repeat rule, on servers that support one
    pub rrule: Option<String>,
}

/// The partial field set of an update. `None` means "leave this field as it is on the server".
#[derive(Clone, Debug, Default)]
pub struct TaskPatch {
    pub summary: Option<String>,
    pub note: Option<String>,
    pub due: Option<NaiveDateTime>,
    pub priority: Option<u8>,
    pub percent_complete: Option<u8>,
    pub rrule: Option<String>,
}

/// What this crate requires from a remote task store.
///
/// `create` only accepts the fields the underlying protocol accepts at creation time; the caller
/// follows up with an [`update`](Self::update) to fill in the rest. It returns the uid the server
/// assigned, so that the new task can be addressed immediately (matching a freshly created task
/// by its summary instead is a trap: summaries are not unique).
#[async_trait]
pub trait RemoteTaskGateway {
    /// Fetch the full list of tasks the server currently has.
    /// This may refresh internal state, hence `&mut self`
    async fn list(&mut self) -> Result<Vec<RemoteTask>, Box<dyn Error>>;

    /// Create a task and return its server-assigned uid
    async fn create(&mut self, summary: &str, priority: u8, percent_complete: u8) -> Result<String, Box<dyn Error>>;

    /// Apply a partial update to the task with this uid
    async fn update(&mut self, uid: &str, patch: TaskPatch) -> Result<(), Box<dyn Error>>;

    /// Delete the task with this uid
    async fn delete(&mut self, uid: &str) -> Result<(), Box<dyn Error>>;

    /// Whether the server persists a native repeat-rule field. When it does not, recurrence
    /// settings travel inside the note instead
    fn supports_rrule(&self) -> bool {
        false
    }
}
