//! This crate keeps a local task list and a remote CalDAV-based task server in sync, and layers
//! a recurring-task model on top of a protocol that barely supports one.
//!
//! Because the connection to the server may be slow, unavailable or switched off entirely, every
//! operation can fall back to a local snapshot, managed by the [`storage`] module. The server is
//! only ever seen through the [`RemoteTaskGateway`](remote::RemoteTaskGateway) trait, so the
//! wire-level client stays outside this crate (an in-memory implementation ships in
//! [`remote::mock`] for tests and experiments).
//!
//! The two sources are kept consistent by the [`SyncEngine`] (push local changes, then pull the
//! server's canonical state back) and the [`Reconciler`](reconciler::Reconciler) (detect
//! divergence and let the caller pick a side). Recurrence settings, which most servers cannot
//! store, survive round-trips either as a native repeat rule or embedded in the task note by the
//! [`metadata`] codec, and the [`RecurrenceScheduler`] rolls expired occurrences over to the
//! next one. A UI only ever needs the [`TaskHandler`] facade.

pub mod settings;
pub use settings::{ConnectionMode, Settings};
pub mod task;
pub use task::{Task, TaskDraft, TaskStatus};
pub mod recurrence;
pub use recurrence::Recurrence;
pub mod metadata;
pub mod storage;
pub use storage::TaskStore;
pub mod remote;
pub mod mock_behaviour;
pub mod reconciler;
pub mod sync;
pub use sync::SyncEngine;
pub mod scheduler;
pub use scheduler::RecurrenceScheduler;
pub mod handler;
pub use handler::TaskHandler;
