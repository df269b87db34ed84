//! The single entry point UIs talk to
//!
//! A [`TaskHandler`] owns the local [`TaskStore`] and the remote gateway, and routes every
//! operation according to the configured [`ConnectionMode`]. The guiding rule is that user data
//! is sacred and the network is not: any remote failure degrades the operation to local-only
//! persistence with a logged warning, so nothing the user typed is ever lost to a flaky
//! connection.

use std::error::Error;

use crate::reconciler::{self, DivergentSnapshots, Reconciler, Reconciliation, ResolutionChoice};
use crate::remote::{RemoteTaskGateway, TaskPatch};
use crate::settings::{ConnectionMode, Settings};
use crate::storage::TaskStore;
use crate::sync::{self, FeedbackSender, SyncEngine, SyncEvent, SyncProgress};
use crate::task::{Task, TaskDraft};

/// Facade over the local store and the remote gateway
pub struct TaskHandler<G: RemoteTaskGateway> {
    mode: ConnectionMode,
    store: TaskStore,
    gateway: G,
}

impl<G: RemoteTaskGateway> TaskHandler<G> {
    pub fn new(mode: ConnectionMode, store: TaskStore, gateway: G) -> Self {
        Self { mode, store, gateway }
    }

    /// Build a handler from the runtime configuration: the snapshot location and the
    /// online/offline switch both come from it. The gateway is still the caller's to provide,
    /// since constructing one (credentials, connection) is outside this crate.
    pub fn from_settings(settings: &Settings, gateway: G) -> Self {
        Self::new(settings.connection_mode(), TaskStore::new(&settings.tasks_file), gateway)
    }

    pub fn mode(&self) -> ConnectionMode {
        self.mode
    }

    /// The local store. Mostly useful to read the snapshot path
    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    /// The remote gateway.
    ///
    /// Apart from tests, there are very few (if any) reasons to access it directly: the
    /// operations below already keep it and the local snapshot consistent.
    pub fn remote(&self) -> &G {
        &self.gateway
    }
    /// See [`Self::remote`]
    pub fn remote_mut(&mut self) -> &mut G {
        &mut self.gateway
    }

    /// The current local snapshot, without touching the network
    pub fn local_snapshot(&self) -> Vec<Task> {
        self.store.load()
    }

    /// Fetch the current task list.
    ///
    /// Online, this returns the server's state (persisted locally, with locally known recurrence
    /// settings re-attached). Offline, by configuration or because the server is unreachable,
    /// it returns the local snapshot. This never fails: there is always *something* to show.
    pub async fn fetch(&mut self) -> Vec<Task> {
        if self.mode == ConnectionMode::Offline {
            return self.store.load();
        }

        match self.gateway.list().await {
            Ok(remote_tasks) => {
                let native_rrule = self.gateway.supports_rrule();
                let decoded: Vec<Task> = remote_tasks.iter()
                    .map(|rt| Task::from_remote(rt, native_rrule))
                    .collect();
                let local = self.store.load();
                let mut merged = reconciler::attach_local_recurrence(decoded, &local);
                reconciler::attach_last_modified(&mut merged, &local);
                // Tasks that never made it to the server exist locally only; a fetch must not
                // lose them
                for task in local {
                    if task.uid().is_none() {
                        merged.push(task);
                    }
                }
                if let Err(err) = self.store.save(&merged) {
                    log::warn!("Unable to persist the fetched snapshot: {}", err);
                }
                merged
            },
            Err(err) => {
                log::warn!("Unable to reach the task server ({}), falling back to the local snapshot", err);
                self.store.load()
            },
        }
    }

    /// Add a new task.
    ///
    /// Online, the task is created on the server right away and its server-assigned uid is bound;
    /// if that fails it is kept as a local-only task and the next sync will push it.
    pub async fn add(&mut self, draft: TaskDraft) -> Result<(), Box<dyn Error>> {
        let mut task = Task::from_draft(draft);

        if self.mode == ConnectionMode::Online {
            if let Err(err) = self.create_remotely(&mut task).await {
                log::warn!("Unable to create task \"{}\" on the server ({}), keeping it local-only", task.summary(), err);
            }
        }

        let mut tasks = self.store.load();
        upsert(&mut tasks, task);
        self.store.save(&tasks)
    }

    async fn create_remotely(&mut self, task: &mut Task) -> Result<(), Box<dyn Error>> {
        let uid = self.gateway.create(task.summary(), task.priority(), task.percent_complete()).await?;
        // `create` accepts a restricted field set; a follow-up update fills in the rest
        let patch = sync::patch_for(task, self.gateway.supports_rrule(), false);
        self.gateway.update(&uid, patch).await?;
        task.bind_uid(uid);
        task.touch_last_modified();
        Ok(())
    }

    /// Update an existing task with fresh form data
    pub async fn update(&mut self, uid: &str, draft: &TaskDraft) -> Result<(), Box<dyn Error>> {
        let mut pushed = false;
        if self.mode == ConnectionMode::Online {
            let mut updated = Task::from_draft(draft.clone());
            updated.bind_uid(uid.to_string());
            let mut patch = sync::patch_for(&updated, self.gateway.supports_rrule(), true);
            // Completion is not part of an edit form; leave the server-side value alone
            patch.percent_complete = None;
            match self.gateway.update(uid, patch).await {
                Ok(()) => pushed = true,
                Err(err) => {
                    log::warn!("Unable to update task \"{}\" on the server ({}), updating the local copy only", draft.summary, err);
                },
            }
        }

        let mut tasks = self.store.load();
        for task in tasks.iter_mut() {
            if task.uid() == Some(uid) {
                task.apply_draft(draft);
                if pushed {
                    task.clear_sync_error();
                    task.touch_last_modified();
                }
                break;
            }
        }
        self.store.save(&tasks)
    }

    /// Delete a task, on the server when possible and from the local snapshot always.
    ///
    /// Tasks that never made it to the server have no uid; those are matched by summary instead.
    pub async fn delete(&mut self, uid: Option<&str>, summary: &str) -> Result<(), Box<dyn Error>> {
        if self.mode == ConnectionMode::Online {
            if let Some(uid) = uid {
                if let Err(err) = self.gateway.delete(uid).await {
                    log::warn!("Unable to delete task \"{}\" on the server ({}), removing the local copy only", summary, err);
                }
            }
        }

        let mut tasks = self.store.load();
        match uid {
            Some(uid) => tasks.retain(|t| t.uid() != Some(uid)),
            None => tasks.retain(|t| t.summary() != summary),
        }
        self.store.save(&tasks)
    }

    /// Set the completion percentage of a task (the status follows from it).
    ///
    /// The local snapshot is updated first (completion toggles must feel instant), and the
    /// server update is best-effort after that.
    pub async fn set_completion(&mut self, uid: Option<&str>, summary: &str, percent_complete: u8) -> Result<(), Box<dyn Error>> {
        let mut tasks = self.store.load();
        for task in tasks.iter_mut() {
            let matches = match uid {
                Some(uid) => task.uid() == Some(uid),
                None => task.summary() == summary,
            };
            if matches {
                task.set_percent_complete(percent_complete);
                break;
            }
        }
        self.store.save(&tasks)?;

        if self.mode == ConnectionMode::Online {
            if let Some(uid) = uid {
                let patch = TaskPatch {
                    percent_complete: Some(percent_complete),
                    ..TaskPatch::default()
                };
                if let Err(err) = self.gateway.update(uid, patch).await {
                    log::warn!("Unable to update the completion of \"{}\" on the server: {}", summary, err);
                }
            }
        }
        Ok(())
    }

    /// Run a full sync (push then pull), without giving any feedback.
    ///
    /// Returns whether the sync was totally successful (details about errors are logged using the
    /// `log::*` macros). A failed or partial sync leaves the local snapshot as the fallback;
    /// simply run this function again.
    pub async fn sync(&mut self) -> bool {
        let mut progress = SyncProgress::new();
        self.run_sync(&mut progress).await
    }

    /// Run a full sync, and provide feedback to the user about the progress.
    ///
    /// See [`Self::sync`]
    pub async fn sync_with_feedback(&mut self, feedback_sender: FeedbackSender) -> bool {
        let mut progress = SyncProgress::new_with_feedback_channel(feedback_sender);
        self.run_sync(&mut progress).await
    }

    async fn run_sync(&mut self, progress: &mut SyncProgress) -> bool {
        if self.mode == ConnectionMode::Offline {
            progress.info("Offline mode: nothing to sync, local data stays as it is");
            progress.feedback(SyncEvent::Finished { success: false });
            return false;
        }

        let mut engine = SyncEngine::new(&mut self.gateway, &self.store);
        if let Err(err) = engine.run(progress).await {
            progress.error(&format!("Sync terminated because of an error: {}", err));
        }
        progress.feedback(SyncEvent::Finished { success: progress.is_success() });
        progress.is_success()
    }

    /// Compare the local snapshot against the server.
    ///
    /// When both sides agree this persists and returns the merged snapshot; when they do not,
    /// the returned [`Reconciliation::Diverged`] carries both sides so the caller can ask the
    /// user which one to keep, then settle it with [`Self::resolve_divergence`].
    pub async fn check_remote_divergence(&mut self) -> Result<Reconciliation, Box<dyn Error>> {
        if self.mode == ConnectionMode::Offline {
            return Err("Reconciliation needs the server, and offline mode is enabled".into());
        }
        Reconciler::new(&mut self.gateway, &self.store).examine().await
    }

    /// Settle a divergence reported by [`Self::check_remote_divergence`]
    pub async fn resolve_divergence(&mut self, snapshots: DivergentSnapshots, choice: ResolutionChoice)
        -> Result<Vec<Task>, Box<dyn Error>>
    {
        Reconciler::new(&mut self.gateway, &self.store).resolve(snapshots, choice).await
    }
}

/// Replace the task with the same uid, or append
fn upsert(tasks: &mut Vec<Task>, task: Task) {
    let uid = task.uid().map(|uid| uid.to_string());
    match uid {
        Some(uid) => {
            match tasks.iter_mut().find(|t| t.uid() == Some(uid.as_str())) {
                Some(existing) => *existing = task,
                None => tasks.push(task),
            }
        },
        None => tasks.push(task),
    }
}
