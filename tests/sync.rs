//! Tests that simulate regular syncs and reconciliations between a local snapshot and a server.
//! Note that the server is mocked by an in-memory gateway.


use chore_wheel::mock_behaviour::MockBehaviour;
use chore_wheel::reconciler::{Reconciliation, ResolutionChoice};
use chore_wheel::recurrence::RecurrenceFrequency;
use chore_wheel::remote::mock::InMemoryRemote;
use chore_wheel::remote::RemoteTask;
use chore_wheel::sync::{feedback_channel, SyncEvent};
use chore_wheel::task::TaskStatus;
use chore_wheel::{ConnectionMode, Recurrence, Settings, Task, TaskHandler};

use scenarii::*;


#[tokio::test]
async fn test_first_sync_binds_server_uids() {
    init_logging();

    let store = throwaway_store("first_sync");
    store.save(&[Task::from_draft(draft("Buy milk", 5, Some("2025-01-01T09:00:00")))]).unwrap();
    let mut handler = TaskHandler::new(ConnectionMode::Online, store, InMemoryRemote::new());

    assert!(handler.sync().await);

    let on_server = handler.remote().tasks();
    assert_eq!(on_server.len(), 1);
    assert_eq!(on_server[0].summary, "Buy milk");
    assert_eq!(on_server[0].priority, 5);
    assert_eq!(on_server[0].due, Some(date("2025-01-01T09:00:00")));

    let local = handler.local_snapshot();
    assert_eq!(local.len(), 1);
    assert_eq!(local[0].uid(), Some(on_server[0].uid.as_str()));
    assert!(local[0].last_modified().is_some());
    assert_eq!(local[0].sync_error(), None);
}

#[tokio::test]
async fn test_pushing_an_unchanged_snapshot_again_changes_nothing() {
    init_logging();

    let store = throwaway_store("idempotent");
    store.save(&[Task::from_draft(draft("Buy milk", 5, Some("2025-01-01T09:00:00")))]).unwrap();
    let mut handler = TaskHandler::new(ConnectionMode::Online, store, InMemoryRemote::new());

    assert!(handler.sync().await);
    let after_first: Vec<RemoteTask> = handler.remote().tasks().to_vec();
    assert_eq!(handler.remote().n_creates(), 1);

    assert!(handler.sync().await);
    // The second pass may re-send the same field values, but the server state is identical and
    // nothing was created twice
    assert_eq!(handler.remote().n_creates(), 1);
    assert_eq!(handler.remote().tasks(), after_first.as_slice());
}

#[tokio::test]
async fn test_one_failing_task_does_not_abort_the_pass() {
    init_logging();

    let store = throwaway_store("partial_failure");
    store.save(&[
        Task::from_draft(draft("Task A", 1, None)),
        Task::from_draft(draft("Task B", 2, None)),
    ]).unwrap();

    let mut remote = InMemoryRemote::new();
    // The first create goes through, the second fails
    remote.set_behaviour(MockBehaviour { create_behaviour: (1, 1), ..MockBehaviour::default() });
    let mut handler = TaskHandler::new(ConnectionMode::Online, store, remote);

    // The sync is reported as not fully successful...
    assert!(handler.sync().await == false);

    // ...Task A made it...
    let on_server = handler.remote().tasks();
    assert_eq!(on_server.len(), 1);
    assert_eq!(on_server[0].summary, "Task A");

    // ...and Task B is still here, local-only, with the failure recorded on it
    let local = handler.local_snapshot();
    assert_eq!(local.len(), 2);
    let task_b = local.iter().find(|t| t.summary() == "Task B").unwrap();
    assert_eq!(task_b.uid(), None);
    assert!(task_b.sync_error().is_some());
}

#[tokio::test]
async fn test_sync_aborts_before_touching_anything_when_the_server_is_down() {
    init_logging();

    let store = throwaway_store("server_down");
    store.save(&[local_task("uid-1", "Call mom", 3, None)]).unwrap();
    let before = snapshot_bytes(&store);

    let mut remote = InMemoryRemote::new();
    remote.set_behaviour(MockBehaviour::fail_now(1));
    let mut handler = TaskHandler::new(ConnectionMode::Online, store, remote);

    assert!(handler.sync().await == false);
    assert_eq!(snapshot_bytes(handler.store()), before);
}

#[tokio::test]
async fn test_reconciliation_aborts_without_writing_when_the_server_is_down() {
    init_logging();

    let store = throwaway_store("reconcile_down");
    store.save(&[local_task("uid-1", "Call mom", 3, None)]).unwrap();
    let before = snapshot_bytes(&store);

    let mut remote = InMemoryRemote::new();
    remote.set_behaviour(MockBehaviour::fail_now(1));
    let mut handler = TaskHandler::new(ConnectionMode::Online, store, remote);

    assert!(handler.check_remote_divergence().await.is_err());
    assert_eq!(snapshot_bytes(handler.store()), before);
}

#[tokio::test]
async fn test_matching_snapshots_are_in_sync_and_keep_local_recurrence() {
    init_logging();

    let mut remote = InMemoryRemote::new();
    remote.seed_task(remote_task("uid-1", "Stretch", 5, Some("2025-01-01T09:00:00")));

    let store = throwaway_store("in_sync");
    let mut known = local_task("uid-1", "Stretch", 5, Some("2025-01-01T09:00:00"));
    known.set_recurrence(Some(Recurrence::Simple(60)));
    store.save(&[known]).unwrap();

    let mut handler = TaskHandler::new(ConnectionMode::Online, store, remote);
    match handler.check_remote_divergence().await.unwrap() {
        Reconciliation::InSync(merged) => {
            assert_eq!(merged.len(), 1);
            // The server copy knew nothing about the recurrence, the merged one does
            assert_eq!(merged[0].recurrence(), Some(Recurrence::Simple(60)));
        },
        Reconciliation::Diverged(_) => panic!("these snapshots describe the same task set"),
    }
}

#[tokio::test]
async fn test_divergence_is_surfaced_and_the_server_side_can_win() {
    init_logging();

    let mut remote = InMemoryRemote::new();
    remote.seed_task(remote_task("uid-server", "From the server", 2, None));

    let store = throwaway_store("diverged_server_wins");
    store.save(&[local_task("uid-local", "Only local", 7, None)]).unwrap();

    let mut handler = TaskHandler::new(ConnectionMode::Online, store, remote);
    let snapshots = match handler.check_remote_divergence().await.unwrap() {
        Reconciliation::Diverged(snapshots) => snapshots,
        Reconciliation::InSync(_) => panic!("these snapshots differ"),
    };
    assert_eq!(snapshots.local.len(), 1);
    assert_eq!(snapshots.remote.len(), 1);

    let resolved = handler.resolve_divergence(snapshots, ResolutionChoice::UseServer).await.unwrap();
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].summary(), "From the server");
    // And the choice was persisted
    let local = handler.local_snapshot();
    assert_eq!(local.len(), 1);
    assert_eq!(local[0].uid(), Some("uid-server"));
}

#[tokio::test]
async fn test_choosing_the_local_side_pushes_it_to_the_server() {
    init_logging();

    let mut remote = InMemoryRemote::new();
    remote.seed_task(remote_task("uid-server", "From the server", 2, None));

    let store = throwaway_store("diverged_local_wins");
    store.save(&[Task::from_draft(draft("Only local", 7, None))]).unwrap();

    let mut handler = TaskHandler::new(ConnectionMode::Online, store, remote);
    let snapshots = match handler.check_remote_divergence().await.unwrap() {
        Reconciliation::Diverged(snapshots) => snapshots,
        Reconciliation::InSync(_) => panic!("these snapshots differ"),
    };

    let resolved = handler.resolve_divergence(snapshots, ResolutionChoice::UseLocal).await.unwrap();

    // The local task is now on the server, with a uid bound locally
    assert!(handler.remote().tasks().iter().any(|t| t.summary == "Only local"));
    assert!(resolved.iter().find(|t| t.summary() == "Only local").unwrap().uid().is_some());
}

#[tokio::test]
async fn test_recurrence_survives_a_server_that_drops_custom_fields() {
    init_logging();

    let mut handler = online_handler("metadata_roundtrip");
    let mut recurring = draft("Water the plants", 4, Some("2025-01-01T09:00:00"));
    recurring.description = "the ficus too".to_string();
    recurring.recurrence = Some(Recurrence::Simple(60));
    handler.add(recurring).await.unwrap();

    // On the wire, the recurrence travels inside the note
    let on_server = handler.remote().tasks();
    assert_eq!(on_server.len(), 1);
    let note = on_server[0].description.as_deref().unwrap();
    assert!(note.contains("Recurrence Info"));
    assert!(note.contains("Deadline: 2025-01-01 09:00"));
    assert!(note.contains("Recurrence: 60 Mins"));

    // Wipe the local snapshot, as if this were a brand new device...
    let _ = std::fs::remove_file(handler.store().path());

    // ...and everything comes back from the note block
    let fetched = handler.fetch().await;
    assert_eq!(fetched.len(), 1);
    assert_eq!(fetched[0].summary(), "Water the plants");
    assert_eq!(fetched[0].description(), "the ficus too");
    assert_eq!(fetched[0].recurrence(), Some(Recurrence::Simple(60)));
    assert_eq!(fetched[0].due(), Some(&date("2025-01-01T09:00:00")));
}

#[tokio::test]
async fn test_a_native_rrule_server_keeps_notes_clean() {
    init_logging();

    let store = throwaway_store("native_rrule");
    let mut handler = TaskHandler::new(ConnectionMode::Online, store, InMemoryRemote::with_native_rrule());

    let mut recurring = draft("Take out the bins", 5, Some("2025-01-06T08:00:00"));
    recurring.description = "grey bin this week".to_string();
    recurring.recurrence = Some(Recurrence::Rule { freq: RecurrenceFrequency::Weekly, interval: 1 });
    handler.add(recurring).await.unwrap();

    let on_server = handler.remote().tasks();
    assert_eq!(on_server[0].description.as_deref(), Some("grey bin this week"));
    assert_eq!(on_server[0].rrule.as_deref(), Some("FREQ=WEEKLY;INTERVAL=1"));

    let _ = std::fs::remove_file(handler.store().path());
    let fetched = handler.fetch().await;
    assert_eq!(fetched[0].recurrence().map(|r| r.interval_minutes()), Some(10080));
    assert_eq!(fetched[0].description(), "grey bin this week");
}

#[tokio::test]
async fn test_local_recurrence_wins_over_the_server_embedded_copy() {
    init_logging();

    let mut remote = InMemoryRemote::new();
    let mut stale = remote_task("uid-1", "Stretch", 5, None);
    stale.description = Some("Recurrence Info\nRecurrence: 60 Mins".to_string());
    remote.seed_task(stale);

    let store = throwaway_store("local_recurrence_wins");
    let mut known = local_task("uid-1", "Stretch", 5, None);
    known.set_recurrence(Some(Recurrence::Simple(120)));
    store.save(&[known]).unwrap();

    let mut handler = TaskHandler::new(ConnectionMode::Online, store, remote);
    let fetched = handler.fetch().await;
    assert_eq!(fetched[0].recurrence(), Some(Recurrence::Simple(120)));

    // A full sync also rewrites the server-side copy
    assert!(handler.sync().await);
    let note = handler.remote().tasks()[0].description.clone().unwrap();
    assert!(note.contains("Recurrence: 120 Mins"));
}

#[tokio::test]
async fn test_adding_while_the_server_is_down_keeps_the_task_for_the_next_sync() {
    init_logging();

    let mut remote = InMemoryRemote::new();
    remote.set_behaviour(MockBehaviour::fail_now(2));
    let mut handler = TaskHandler::new(ConnectionMode::Online, throwaway_store("add_degraded"), remote);

    handler.add(draft("Written during an outage", 5, None)).await.unwrap();

    // Nothing reached the server, but nothing was lost either
    assert!(handler.remote().tasks().is_empty());
    let local = handler.local_snapshot();
    assert_eq!(local.len(), 1);
    assert_eq!(local[0].uid(), None);

    // Once the server is back, a sync finishes the job
    handler.remote_mut().set_behaviour(MockBehaviour::new());
    assert!(handler.sync().await);
    assert_eq!(handler.remote().tasks().len(), 1);
    assert!(handler.local_snapshot()[0].uid().is_some());
}

#[tokio::test]
async fn test_fetch_does_not_lose_tasks_that_never_reached_the_server() {
    init_logging();

    let mut remote = InMemoryRemote::new();
    remote.seed_task(remote_task("uid-1", "On the server", 5, None));
    // The next create fails; everything else works
    remote.set_behaviour(MockBehaviour { create_behaviour: (0, 1), ..MockBehaviour::default() });

    let mut handler = TaskHandler::new(
        ConnectionMode::Online, throwaway_store("fetch_keeps_unpushed"), remote);
    handler.add(draft("Written during an outage", 5, None)).await.unwrap();

    let fetched = handler.fetch().await;
    assert_eq!(fetched.len(), 2);
    let unpushed = fetched.iter().find(|t| t.uid().is_none()).unwrap();
    assert_eq!(unpushed.summary(), "Written during an outage");
    // It survived in the persisted snapshot too, ready for the next sync
    assert!(handler.local_snapshot().iter().any(|t| t.summary() == "Written during an outage"));
}

#[tokio::test]
async fn test_fetch_keeps_push_timestamps() {
    init_logging();

    let store = throwaway_store("fetch_last_modified");
    store.save(&[Task::from_draft(draft("Buy milk", 5, None))]).unwrap();
    let mut handler = TaskHandler::new(ConnectionMode::Online, store, InMemoryRemote::new());

    assert!(handler.sync().await);
    let pushed_at = handler.local_snapshot()[0].last_modified().cloned();
    assert!(pushed_at.is_some());

    // The server knows nothing about push timestamps, yet a fetch does not erase them
    let fetched = handler.fetch().await;
    assert_eq!(fetched[0].last_modified().cloned(), pushed_at);
}

#[tokio::test]
async fn test_sync_feedback_ends_with_a_finished_event() {
    init_logging();

    let store = throwaway_store("feedback");
    store.save(&[Task::from_draft(draft("Buy milk", 5, None))]).unwrap();
    let mut handler = TaskHandler::new(ConnectionMode::Online, store, InMemoryRemote::new());

    let (sender, receiver) = feedback_channel();
    assert!(handler.sync_with_feedback(sender).await);

    match &*receiver.borrow() {
        SyncEvent::Finished { success } => assert!(*success),
        other => panic!("a finished sync should report Finished, not \"{}\"", other),
    }
}

#[tokio::test]
async fn test_a_handler_built_from_the_configuration_respects_offline_mode() {
    init_logging();

    let snapshot = std::env::temp_dir()
        .join(format!("chore-wheel-it-from-settings-{}.json", std::process::id()));
    let _ = std::fs::remove_file(&snapshot);

    let settings: Settings = serde_json::from_str(&format!(r#"{{
        "server_url": "https://cloud.example.org/remote.php/dav",
        "username": "jane",
        "password": "hunter2",
        "tasks_file": {:?},
        "offline_mode": true
    }}"#, snapshot)).unwrap();

    let mut handler = TaskHandler::from_settings(&settings, InMemoryRemote::new());
    assert_eq!(handler.mode(), ConnectionMode::Offline);
    assert_eq!(handler.store().path(), snapshot.as_path());

    handler.add(draft("Configured task", 5, None)).await.unwrap();
    assert!(handler.remote().tasks().is_empty());
    assert_eq!(handler.fetch().await.len(), 1);
}

#[tokio::test]
async fn test_offline_mode_never_touches_the_gateway() {
    init_logging();

    let mut handler = offline_handler("offline");
    handler.add(draft("Pure local life", 5, None)).await.unwrap();
    handler.set_completion(None, "Pure local life", 100).await.unwrap();

    assert!(handler.remote().tasks().is_empty());
    assert_eq!(handler.remote().n_creates(), 0);
    assert_eq!(handler.remote().n_updates(), 0);

    let tasks = handler.fetch().await;
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].status(), TaskStatus::Completed);
    assert_eq!(tasks[0].percent_complete(), 100);

    // A sync request is a no-op, not an error
    assert!(handler.sync().await == false);
}

#[tokio::test]
async fn test_editing_a_task_updates_both_copies_but_not_its_completion() {
    init_logging();

    let mut handler = online_handler("edit");
    handler.add(draft("Tidy the desk", 6, None)).await.unwrap();
    let uid = handler.local_snapshot()[0].uid().unwrap().to_string();
    handler.set_completion(Some(&uid), "Tidy the desk", 100).await.unwrap();

    let mut edited = draft("Tidy the whole office", 1, Some("2025-02-01T18:00:00"));
    edited.description = "the window sill too".to_string();
    handler.update(&uid, &edited).await.unwrap();

    let on_server = &handler.remote().tasks()[0];
    assert_eq!(on_server.summary, "Tidy the whole office");
    assert_eq!(on_server.priority, 1);
    assert_eq!(on_server.due, Some(date("2025-02-01T18:00:00")));
    assert_eq!(on_server.description.as_deref(), Some("the window sill too"));
    // Editing the fields of a completed task does not un-complete it
    assert_eq!(on_server.percent_complete, 100);

    let local = handler.local_snapshot();
    assert_eq!(local[0].summary(), "Tidy the whole office");
    assert_eq!(local[0].percent_complete(), 100);
}

#[tokio::test]
async fn test_editing_while_the_server_is_down_updates_the_local_copy() {
    init_logging();

    let mut handler = online_handler("edit_degraded");
    handler.add(draft("Tidy the desk", 6, None)).await.unwrap();
    let uid = handler.local_snapshot()[0].uid().unwrap().to_string();

    handler.remote_mut().set_behaviour(
        MockBehaviour { update_behaviour: (0, 1), ..MockBehaviour::default() });
    handler.update(&uid, &draft("Tidy the desk properly", 6, None)).await.unwrap();

    // The server still has the old summary, the local copy has the new one
    assert_eq!(handler.remote().tasks()[0].summary, "Tidy the desk");
    assert_eq!(handler.local_snapshot()[0].summary(), "Tidy the desk properly");
}

#[tokio::test]
async fn test_delete_removes_both_copies() {
    init_logging();

    let mut handler = online_handler("delete");
    handler.add(draft("Doomed task", 5, None)).await.unwrap();
    let uid = handler.local_snapshot()[0].uid().unwrap().to_string();

    handler.delete(Some(&uid), "Doomed task").await.unwrap();
    assert!(handler.remote().tasks().is_empty());
    assert!(handler.local_snapshot().is_empty());
}

#[tokio::test]
async fn test_completion_toggles_reach_the_server() {
    init_logging();

    let mut handler = online_handler("completion");
    handler.add(draft("Laundry", 5, None)).await.unwrap();
    let uid = handler.local_snapshot()[0].uid().unwrap().to_string();

    handler.set_completion(Some(&uid), "Laundry", 100).await.unwrap();
    assert_eq!(handler.remote().tasks()[0].status, TaskStatus::Completed);
    assert_eq!(handler.remote().tasks()[0].percent_complete, 100);

    handler.set_completion(Some(&uid), "Laundry", 0).await.unwrap();
    assert_eq!(handler.remote().tasks()[0].status, TaskStatus::NeedsAction);
    assert_eq!(handler.local_snapshot()[0].status(), TaskStatus::NeedsAction);
}
