//! This is an example of how chore-wheel can be used.
//!
//! It runs the whole machinery (facade, scheduler roll-over, sync with feedback) against the
//! bundled in-memory server, so it works anywhere, network or not. A real application would
//! implement `RemoteTaskGateway` over an actual CalDAV client instead.

use std::path::Path;

use chrono::{Duration, Local};

use chore_wheel::remote::mock::InMemoryRemote;
use chore_wheel::scheduler;
use chore_wheel::sync::feedback_channel;
use chore_wheel::task::TaskDraft;
use chore_wheel::{ConnectionMode, Recurrence, RecurrenceScheduler, Task, TaskHandler, TaskStore};

const SNAPSHOT_FILE: &str = "demo_tasks.json";

#[tokio::main]
async fn main() {
    env_logger::init();

    println!("This demo syncs a local snapshot with an in-memory task server.");
    println!("You can set the RUST_LOG environment variable to display more info about the sync.");
    println!();

    let store = TaskStore::new(Path::new(SNAPSHOT_FILE));
    let mut handler = TaskHandler::new(ConnectionMode::Online, store, InMemoryRemote::new());

    // An hourly task that last fired an hour and a half ago
    handler.add(TaskDraft {
        summary: "Water the plants".to_string(),
        description: "the ficus too".to_string(),
        priority: 5,
        due: Some(Local::now().naive_local() - Duration::minutes(90)),
        recurrence: Some(Recurrence::Simple(60)),
    }).await.unwrap();

    println!("---- After adding a task that expired 90 minutes ago ----");
    print_tasks(&handler.local_snapshot());

    let now = Local::now().naive_local();
    RecurrenceScheduler::new(&mut handler).tick(now).await.unwrap();

    println!("---- After a scheduler tick ----");
    print_tasks(&handler.local_snapshot());

    let (sender, receiver) = feedback_channel();
    if handler.sync_with_feedback(sender).await == false {
        log::warn!("Sync did not complete, see the previous log lines for more info.");
    }
    println!("Last sync event: {}", *receiver.borrow());
    println!();

    println!("---- On the server (recurrence travels inside the note) ----");
    for task in handler.remote().tasks() {
        println!("  [{:>3}%] {} (note: {:?})", task.percent_complete, task.summary,
            task.description.as_deref().unwrap_or(""));
    }

    let _ = std::fs::remove_file(SNAPSHOT_FILE);
}

fn print_tasks(tasks: &[Task]) {
    let now = Local::now().naive_local();
    for task in tasks {
        match scheduler::display_due(task, now) {
            Some(due) => println!("  [{:>3}%] {} (due {})", task.percent_complete(), task.summary(), due),
            None => println!("  [{:>3}%] {} (no deadline)", task.percent_complete(), task.summary()),
        }
    }
}
