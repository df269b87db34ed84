//! An in-memory stand-in for a real task server
//!
//! Tests (and offline experiments) run the whole sync machinery against this gateway instead of a
//! network client. It mimics the behaviours that matter for synchronization: uids are assigned by
//! the server at creation time, `create` only accepts a restricted field set, partial updates
//! re-derive the task status from its completion percentage, and (unless native rule support is
//! switched on) unknown fields like a repeat rule are silently discarded, exactly like a server
//! that does not know about them.

use std::error::Error;

use async_trait::async_trait;
use uuid::Uuid;

use super::{RemoteTask, RemoteTaskGateway, TaskPatch};
use crate::mock_behaviour::MockBehaviour;
use crate::task::TaskStatus;

/// A remote task store backed by a plain `Vec`
#[derive(Debug, Default)]
pub struct InMemoryRemote {
    tasks: Vec<RemoteTask>,
    native_rrule: bool,
    behaviour: MockBehaviour,

    n_creates: u32,
    n_updates: u32,
    n_deletes: u32,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// A server that *does* persist a native repeat-rule field
    pub fn with_native_rrule() -> Self {
        Self {
            native_rrule: true,
            ..Self::default()
        }
    }

    pub fn set_behaviour(&mut self, behaviour: MockBehaviour) {
        self.behaviour = behaviour;
    }

    /// Put a task on the "server" directly, bypassing the gateway operations (and their
    /// failure injection). This is how tests model data that was created from another device.
    pub fn seed_task(&mut self, task: RemoteTask) {
        self.tasks.push(task);
    }

    /// The current server-side state, for assertions
    pub fn tasks(&self) -> &[RemoteTask] {
        &self.tasks
    }

    pub fn n_creates(&self) -> u32 { self.n_creates }
    pub fn n_updates(&self) -> u32 { self.n_updates }
    pub fn n_deletes(&self) -> u32 { self.n_deletes }
}

#[async_trait]
impl RemoteTaskGateway for InMemoryRemote {
    async fn list(&mut self) -> Result<Vec<RemoteTask>, Box<dyn Error>> {
        self.behaviour.can_list()?;
        Ok(self.tasks.clone())
    }

    async fn create(&mut self, summary: &str, priority: u8, percent_complete: u8) -> Result<String, Box<dyn Error>> {
        self.behaviour.can_create()?;
        let uid = Uuid::new_v4().to_hyphenated().to_string();
        self.tasks.push(RemoteTask {
            uid: uid.clone(),
            summary: summary.to_string(),
            description: None,
            priority,
            due: None,
            status: TaskStatus::from_percent(percent_complete),
            percent_complete,
            rrule: None,
        });
        self.n_creates += 1;
        Ok(uid)
    }

    async fn update(&mut self, uid: &str, patch: TaskPatch) -> Result<(), Box<dyn Error>> {
        self.behaviour.can_update()?;
        let task = match self.tasks.iter_mut().find(|t| t.uid == uid) {
            Some(t) => t,
            None => return Err(format!("Task \"{}\" not found.", uid).into()),
        };

        if let Some(summary) = patch.summary {
            task.summary = summary;
        }
        if let Some(note) = patch.note {
            task.description = Some(note);
        }
        if let Some(due) = patch.due {
            task.due = Some(due);
        }
        if let Some(priority) = patch.priority {
            task.priority = priority;
        }
        if let Some(percent_complete) = patch.percent_complete {
            task.percent_complete = percent_complete;
            task.status = TaskStatus::from_percent(percent_complete);
        }
        if let Some(rrule) = patch.rrule {
            // A server without native support drops the field on the floor
            if self.native_rrule {
                task.rrule = Some(rrule);
            }
        }

        self.n_updates += 1;
        Ok(())
    }

    async fn delete(&mut self, uid: &str) -> Result<(), Box<dyn Error>> {
        self.behaviour.can_delete()?;
        let before = self.tasks.len();
        self.tasks.retain(|t| t.uid != uid);
        if self.tasks.len() == before {
            return Err(format!("Task \"{}\" not found.", uid).into());
        }
        self.n_deletes += 1;
        Ok(())
    }

    fn supports_rrule(&self) -> bool {
        self.native_rrule
    }
}
