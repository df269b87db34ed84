//! Detecting and resolving divergence between the local and remote snapshots
//!
//! The reconciler answers one question, "do both sides still describe the same task set?", and
//! deliberately stops there. When they do not, it hands both snapshots back to the caller, who
//! must pick a side (typically through a "use local data / use server data" dialog). Mechanism
//! lives here; policy stays with the caller.

use std::collections::HashMap;
use std::error::Error;

use chrono::NaiveDateTime;

use crate::remote::RemoteTaskGateway;
use crate::storage::TaskStore;
use crate::task::{Task, TaskStatus};

/// The two ways a divergence can be settled
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolutionChoice {
    /// The local snapshot becomes authoritative and is pushed to the server
    UseLocal,
    /// The server snapshot becomes authoritative (locally known recurrence settings are kept)
    UseServer,
}

/// Both sides of a detected divergence, to be settled by a [`ResolutionChoice`]
#[derive(Clone, Debug)]
pub struct DivergentSnapshots {
    pub local: Vec<Task>,
    pub remote: Vec<Task>,
}

/// The outcome of comparing the local snapshot against the server
#[derive(Clone, Debug)]
pub enum Reconciliation {
    /// Both sides matched. The merged snapshot (server data, local recurrence settings) has been
    /// persisted and is returned here
    InSync(Vec<Task>),
    /// The sides disagree; the caller has to choose one
    Diverged(DivergentSnapshots),
}

/// Compares the local snapshot against a freshly fetched remote one
pub struct Reconciler<'a, G: RemoteTaskGateway> {
    gateway: &'a mut G,
    store: &'a TaskStore,
}

impl<'a, G: RemoteTaskGateway> Reconciler<'a, G> {
    pub fn new(gateway: &'a mut G, store: &'a TaskStore) -> Self {
        Self { gateway, store }
    }

    /// Fetch the server snapshot and compare it with the local one.
    ///
    /// If the server cannot be reached this returns the error as-is and the local snapshot is
    /// left untouched; a half-performed reconciliation would be worse than a stale one.
    pub async fn examine(&mut self) -> Result<Reconciliation, Box<dyn Error>> {
        let remote_tasks = self.gateway.list().await?;
        let native_rrule = self.gateway.supports_rrule();
        let remote: Vec<Task> = remote_tasks.iter()
            .map(|rt| Task::from_remote(rt, native_rrule))
            .collect();
        let local = self.store.load();

        if snapshots_match(&local, &remote) {
            // The server is authoritative for everything except recurrence, which only the local
            // side reliably knows
            let mut merged = attach_local_recurrence(remote, &local);
            attach_last_modified(&mut merged, &local);
            self.store.save(&merged)?;
            Ok(Reconciliation::InSync(merged))
        } else {
            log::info!("Local and server snapshots diverge ({} local tasks, {} server tasks)", local.len(), remote.len());
            Ok(Reconciliation::Diverged(DivergentSnapshots { local, remote }))
        }
    }

    /// Settle a divergence with the caller's choice, persist the authoritative snapshot, and
    /// return it
    pub async fn resolve(&mut self, snapshots: DivergentSnapshots, choice: ResolutionChoice)
        -> Result<Vec<Task>, Box<dyn Error>>
    {
        match choice {
            ResolutionChoice::UseLocal => {
                log::info!("Divergence settled in favour of the local snapshot; pushing it to the server");
                self.store.save(&snapshots.local)?;
                let mut progress = crate::sync::SyncProgress::new();
                crate::sync::SyncEngine::new(self.gateway, self.store)
                    .run(&mut progress)
                    .await?;
                Ok(self.store.load())
            },
            ResolutionChoice::UseServer => {
                log::info!("Divergence settled in favour of the server snapshot");
                let mut merged = attach_local_recurrence(snapshots.remote, &snapshots.local);
                attach_last_modified(&mut merged, &snapshots.local);
                self.store.save(&merged)?;
                Ok(merged)
            },
        }
    }
}

/// Whether two snapshots describe the same task set.
///
/// Both sides are sorted by uid (tasks without one sort first, under an empty key) and compared
/// pairwise on their normalized fields. Recurrence settings and per-task sync errors are local
/// bookkeeping and are ignored on both sides.
pub fn snapshots_match(left: &[Task], right: &[Task]) -> bool {
    if left.len() != right.len() {
        return false;
    }

    let mut left: Vec<&Task> = left.iter().collect();
    let mut right: Vec<&Task> = right.iter().collect();
    left.sort_by_key(|t| t.uid().unwrap_or_default().to_string());
    right.sort_by_key(|t| t.uid().unwrap_or_default().to_string());

    left.iter().zip(right.iter())
        .all(|(l, r)| normalize(l) == normalize(r))
}

/// The fields that take part in the snapshot comparison
#[derive(PartialEq)]
struct ComparableTask<'a> {
    uid: Option<&'a str>,
    summary: &'a str,
    description: &'a str,
    priority: u8,
    due: Option<&'a NaiveDateTime>,
    status: TaskStatus,
    percent_complete: u8,
}

fn normalize(task: &Task) -> ComparableTask<'_> {
    ComparableTask {
        uid: task.uid(),
        summary: task.summary(),
        description: task.description(),
        priority: task.priority(),
        due: task.due(),
        status: task.status(),
        percent_complete: task.percent_complete(),
    }
}

/// Re-attach the locally known recurrence settings onto an authoritative snapshot, matching tasks
/// by uid.
///
/// For every uid the local side knows, its recurrence settings win outright, including "not
/// recurring at all", so that switching recurrence off locally is not undone by a stale block
/// still embedded in the server-side note. Whatever the server returned (decoded from an embedded
/// note block, or a native rule) is only kept for tasks the local side knows nothing about.
pub fn attach_local_recurrence(mut authoritative: Vec<Task>, local: &[Task]) -> Vec<Task> {
    let known: HashMap<&str, &Task> = local.iter()
        .filter_map(|t| t.uid().map(|uid| (uid, t)))
        .collect();

    for task in authoritative.iter_mut() {
        let uid = match task.uid() {
            Some(uid) => uid.to_string(),
            None => continue,
        };
        if let Some(local_task) = known.get(uid.as_str()) {
            task.set_recurrence(local_task.recurrence());
        }
    }
    authoritative
}

/// Re-attach the locally recorded push timestamps onto an authoritative snapshot, matching tasks
/// by uid. The wire protocol has no last-modified field, so adopting the server's data without
/// this would erase every "when did this last push succeed" the local side knows.
pub(crate) fn attach_last_modified(authoritative: &mut [Task], known: &[Task]) {
    for task in authoritative.iter_mut() {
        let uid = match task.uid() {
            Some(uid) => uid.to_string(),
            None => continue,
        };
        if let Some(counterpart) = known.iter().find(|t| t.uid() == Some(uid.as_str())) {
            task.set_last_modified(counterpart.last_modified().cloned());
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::recurrence::Recurrence;
    use crate::task::TaskDraft;

    fn task(uid: Option<&str>, summary: &str, priority: u8) -> Task {
        let mut task = Task::from_draft(TaskDraft {
            summary: summary.to_string(),
            description: String::new(),
            priority,
            due: None,
            recurrence: None,
        });
        if let Some(uid) = uid {
            task.bind_uid(uid.to_string());
        }
        task
    }

    #[test]
    fn identical_snapshots_match() {
        let a = vec![task(Some("1"), "One", 1), task(Some("2"), "Two", 2)];
        let b = vec![task(Some("2"), "Two", 2), task(Some("1"), "One", 1)];
        // Order does not matter, only content
        assert!(snapshots_match(&a, &b));
    }

    #[test]
    fn detection_is_symmetric() {
        let a = vec![task(Some("1"), "One", 1)];
        let b = vec![task(Some("1"), "One, renamed", 1)];
        assert_eq!(snapshots_match(&a, &b), snapshots_match(&b, &a));
        assert!(snapshots_match(&a, &b) == false);
    }

    #[test]
    fn differing_lengths_diverge() {
        let a = vec![task(Some("1"), "One", 1)];
        assert!(snapshots_match(&a, &[]) == false);
    }

    #[test]
    fn sync_errors_and_recurrence_are_ignored() {
        let mut a = vec![task(Some("1"), "One", 1)];
        let mut b = vec![task(Some("1"), "One", 1)];
        a[0].set_sync_error("the server was out for lunch".to_string());
        b[0].set_recurrence(Some(Recurrence::Simple(60)));
        assert!(snapshots_match(&a, &b));
    }

    #[test]
    fn recurrence_is_reattached_by_uid() {
        let mut local = vec![task(Some("1"), "One", 1), task(Some("2"), "Two", 2)];
        local[0].set_recurrence(Some(Recurrence::Simple(120)));

        let merged = attach_local_recurrence(
            vec![task(Some("1"), "One", 1), task(Some("2"), "Two", 2), task(Some("3"), "Three", 3)],
            &local,
        );
        assert_eq!(merged[0].recurrence(), Some(Recurrence::Simple(120)));
        assert_eq!(merged[1].recurrence(), None);
        assert_eq!(merged[2].recurrence(), None);
    }

    #[test]
    fn server_decoded_recurrence_survives_when_local_knows_nothing() {
        let mut remote = vec![task(Some("1"), "One", 1)];
        remote[0].set_recurrence(Some(Recurrence::Simple(30)));

        // uid 1 is not in the local snapshot: the server-decoded value is all there is
        let merged = attach_local_recurrence(remote, &[task(Some("2"), "Two", 2)]);
        assert_eq!(merged[0].recurrence(), Some(Recurrence::Simple(30)));
    }

    #[test]
    fn switching_recurrence_off_locally_beats_a_stale_server_block() {
        let mut remote = vec![task(Some("1"), "One", 1)];
        remote[0].set_recurrence(Some(Recurrence::Simple(30)));

        let merged = attach_local_recurrence(remote, &[task(Some("1"), "One", 1)]);
        assert_eq!(merged[0].recurrence(), None);
    }
}
