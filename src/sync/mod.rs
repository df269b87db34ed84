//! The push/pull machinery that keeps the local snapshot and the server aligned
//!
//! A sync is two passes. The *push* pass sends every local task up: tasks without a uid are
//! created (and get their server-assigned uid bound locally), tasks with one get a field update.
//! Each task is pushed independently: a failure is recorded on that task and the pass carries
//! on. The *pull* pass then re-fetches the server's canonical state, re-attaches the recurrence
//! settings the server cannot store, and persists the result as the new local snapshot.

pub mod progress;
pub use progress::{FeedbackReceiver, FeedbackSender, SyncEvent, SyncProgress, feedback_channel};

use std::error::Error;

use crate::metadata;
use crate::reconciler;
use crate::remote::{RemoteTaskGateway, TaskPatch};
use crate::storage::TaskStore;
use crate::task::Task;

/// Synchronizes a [`TaskStore`] with a remote gateway.
///
/// This borrows both for the duration of one sync; construct it anew for every run.
pub struct SyncEngine<'a, G: RemoteTaskGateway> {
    gateway: &'a mut G,
    store: &'a TaskStore,
}

impl<'a, G: RemoteTaskGateway> SyncEngine<'a, G> {
    pub fn new(gateway: &'a mut G, store: &'a TaskStore) -> Self {
        Self { gateway, store }
    }

    /// Run a full push + pull pass.
    ///
    /// An unreachable server at the very start aborts the sync before anything is touched; once
    /// the push pass has begun, later failures are logged (and counted in `progress`) but nothing
    /// is rolled back. Re-running the sync picks up where things went wrong.
    pub async fn run(&mut self, progress: &mut SyncProgress) -> Result<(), Box<dyn Error>> {
        progress.info("Starting a sync.");
        progress.reset_counter();
        progress.feedback(SyncEvent::Started);

        // Probe the server first: if it is unreachable there is no point recording sync errors
        // on every single task
        if let Err(err) = self.gateway.list().await {
            return Err(format!("The task server is not reachable, sync aborted: {}", err).into());
        }

        let mut tasks = self.store.load();
        self.push_pass(&mut tasks, progress).await;

        // The uids bound during the push must survive even if the pull below fails
        if let Err(err) = self.store.save(&tasks) {
            progress.error(&format!("Unable to persist the pushed snapshot: {}", err));
        }

        if let Err(err) = self.pull_pass(&tasks, progress).await {
            progress.warn(&format!("Unable to refresh from the server after pushing: {}", err));
        }

        progress.info("Sync ended");
        Ok(())
    }

    /// Push every local task to the server. One task failing does not stop the others.
    async fn push_pass(&mut self, tasks: &mut Vec<Task>, progress: &mut SyncProgress) {
        for task in tasks.iter_mut() {
            progress.increment_counter(1);
            progress.feedback(SyncEvent::InProgress {
                tasks_done_already: progress.counter(),
                details: task.summary().to_string(),
            });

            let outcome = match task.uid() {
                None => self.push_new_task(task).await,
                Some(_) => self.push_update(task).await,
            };
            match outcome {
                Ok(()) => {
                    task.clear_sync_error();
                    task.touch_last_modified();
                },
                Err(err) => {
                    progress.warn(&format!("Unable to push task \"{}\": {}", task.summary(), err));
                    task.set_sync_error(err.to_string());
                },
            }
        }
    }

    /// Create a task on the server, then fill in the fields `create` does not accept
    async fn push_new_task(&mut self, task: &mut Task) -> Result<(), Box<dyn Error>> {
        log::debug!("> Pushing new task \"{}\" to the server", task.summary());
        let uid = self.gateway.create(task.summary(), task.priority(), task.percent_complete()).await?;
        let patch = patch_for(task, self.gateway.supports_rrule(), false);
        self.gateway.update(&uid, patch).await?;
        task.bind_uid(uid);
        Ok(())
    }

    async fn push_update(&mut self, task: &Task) -> Result<(), Box<dyn Error>> {
        let uid = task.uid().unwrap_or_default().to_string();
        let patch = patch_for(task, self.gateway.supports_rrule(), true);
        self.gateway.update(&uid, patch).await
    }

    /// Fetch the server's canonical state and persist it as the new local snapshot.
    ///
    /// Recurrence settings follow the local-wins rule: for tasks the local side knows, its
    /// settings are re-attached, and if the copy embedded in the server-side note disagrees, a
    /// corrective update is sent (best effort; a failure here only costs a log line, the next
    /// sync will try again).
    async fn pull_pass(&mut self, pushed: &[Task], progress: &mut SyncProgress) -> Result<(), Box<dyn Error>> {
        let remote_tasks = self.gateway.list().await?;
        let native_rrule = self.gateway.supports_rrule();

        let decoded: Vec<Task> = remote_tasks.iter()
            .map(|rt| Task::from_remote(rt, native_rrule))
            .collect();
        let mut merged = reconciler::attach_local_recurrence(decoded.clone(), pushed);
        // Keep the push timestamps recorded a moment ago
        reconciler::attach_last_modified(&mut merged, pushed);

        // Where the merge changed a task, the server note holds outdated metadata
        for (corrected, as_decoded) in merged.iter().zip(decoded.iter()) {
            if corrected.recurrence() == as_decoded.recurrence() {
                continue;
            }
            let uid = match corrected.uid() {
                Some(uid) => uid.to_string(),
                None => continue,
            };
            progress.debug(&format!("Correcting the recurrence metadata of \"{}\" on the server", corrected.summary()));
            let patch = patch_for(corrected, native_rrule, false);
            if let Err(err) = self.gateway.update(&uid, patch).await {
                progress.debug(&format!("Unable to correct the server-side metadata of \"{}\": {}", corrected.summary(), err));
            }
        }

        // Tasks whose creation failed would otherwise vanish here: they exist locally only, and
        // deleting a task is never something a sync does on its own
        for task in pushed {
            if task.uid().is_none() {
                merged.push(task.clone());
            }
        }

        self.store.save(&merged)?;
        Ok(())
    }
}

/// The partial update that brings the server-side copy of `task` up to date.
///
/// When the server has no native repeat-rule field, recurrence (and, for recovery, the deadline)
/// is embedded in the outgoing note; otherwise the note stays clean and the rule is sent as its
/// own field.
pub(crate) fn patch_for(task: &Task, native_rrule: bool, include_summary: bool) -> TaskPatch {
    let summary = if include_summary {
        Some(task.summary().to_string())
    } else {
        None
    };

    let mut note = task.description().to_string();
    let mut rrule = None;
    match task.recurrence() {
        None => {},
        Some(rec) => {
            if native_rrule {
                rrule = Some(rec.to_rule_string());
            } else {
                note = metadata::encode(task.description(), task.due(), rec.interval_minutes());
            }
        },
    }

    TaskPatch {
        summary,
        note: Some(note),
        due: task.due().cloned(),
        priority: Some(task.priority()),
        percent_complete: Some(task.percent_complete()),
        rrule,
    }
}
