//! This module persists the local snapshot of tasks
//!
//! The snapshot is the full list of tasks known locally, stored as a JSON array in a single file.
//! It is what the application works from when the server is slow or unreachable, and it is the
//! only place recurrence settings survive when the server cannot store them.

use std::error::Error;
use std::path::{Path, PathBuf};

use crate::task::Task;

/// A local store for the authoritative task snapshot.
///
/// All operations are full-snapshot: `load` returns every task, `save` overwrites the whole file.
/// Callers are expected to read, modify and write back.
#[derive(Debug)]
pub struct TaskStore {
    backing_file: PathBuf,
}

impl TaskStore {
    pub fn new(path: &Path) -> Self {
        Self {
            backing_file: PathBuf::from(path),
        }
    }

    pub fn path(&self) -> &Path {
        &self.backing_file
    }

    /// Load the current snapshot.
    ///
    /// A missing or unreadable file is not an error: the application may simply never have run
    /// before, or the file may have been hand-edited into garbage. Both cases start over from an
    /// empty list, so this never fails.
    pub fn load(&self) -> Vec<Task> {
        let file = match std::fs::File::open(&self.backing_file) {
            Err(err) => {
                log::debug!("No task snapshot at {:?} ({}), starting from an empty list", self.backing_file, err);
                return Vec::new();
            },
            Ok(f) => f,
        };

        match serde_json::from_reader::<_, Vec<Task>>(file) {
            Err(err) => {
                log::warn!("Unable to parse the task snapshot {:?}: {}. Starting from an empty list", self.backing_file, err);
                Vec::new()
            },
            Ok(mut tasks) => {
                for task in tasks.iter_mut() {
                    task.upgrade_legacy_fields();
                }
                tasks
            },
        }
    }

    /// Overwrite the snapshot file with this task list
    pub fn save(&self, tasks: &[Task]) -> Result<(), Box<dyn Error>> {
        let file = std::fs::File::create(&self.backing_file)
            .map_err(|err| format!("Unable to create file {:?}: {}", self.backing_file, err))?;
        // Pretty-printed, so that the file stays diffable and hand-editable
        serde_json::to_writer_pretty(file, tasks)?;
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    use crate::recurrence::Recurrence;
    use crate::task::{TaskDraft, TaskStatus};

    fn temp_file(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("chore-wheel-storage-{}-{}.json", name, std::process::id()))
    }

    fn sample_task() -> Task {
        let mut task = Task::from_draft(TaskDraft {
            summary: "Feed the cat".to_string(),
            description: "wet food in the evening".to_string(),
            priority: 1,
            due: crate::task::due_format::parse("2025-01-01T18:00:00"),
            recurrence: Some(Recurrence::Simple(1440)),
        });
        task.bind_uid("cat-food-uid".to_string());
        task
    }

    #[test]
    fn serde_snapshot() {
        let path = temp_file("roundtrip");
        let store = TaskStore::new(&path);

        let tasks = vec![sample_task()];
        store.save(&tasks).unwrap();

        let retrieved = store.load();
        assert_eq!(tasks, retrieved);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn a_missing_file_loads_as_empty() {
        let store = TaskStore::new(&temp_file("does-not-exist"));
        assert!(store.load().is_empty());
    }

    #[test]
    fn a_corrupt_file_loads_as_empty() {
        let path = temp_file("corrupt");
        std::fs::write(&path, "{ this is not json").unwrap();

        let store = TaskStore::new(&path);
        assert!(store.load().is_empty());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn legacy_day_based_snapshots_still_load() {
        let path = temp_file("legacy");
        std::fs::write(&path, r#"[{
            "summary": "Backup the NAS",
            "uid": "backup-uid",
            "priority": 4,
            "due": "2025-01-05 03:00:00",
            "status": "NEEDS-ACTION",
            "percent_complete": 0,
            "is_recurring": true,
            "recurrence_interval_days": 7
        }]"#).unwrap();

        let store = TaskStore::new(&path);
        let tasks = store.load();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].status(), TaskStatus::NeedsAction);
        assert_eq!(tasks[0].recurrence(), Some(Recurrence::Simple(7 * 1440)));
        assert_eq!(tasks[0].due(), crate::task::due_format::parse("2025-01-05T03:00:00").as_ref());
        let _ = std::fs::remove_file(&path);
    }
}
