//! Rolling recurring tasks over to their next occurrence
//!
//! A recurring task is a chain of occurrences, not a single task whose date keeps moving: when an
//! occurrence expires, it is marked completed and stays around (so the history of past
//! occurrences is preserved), and a brand new task is created for the next occurrence. The new
//! due date is always in the future, even if the application was closed across several intervals.

use std::error::Error;

use chrono::{Duration, NaiveDateTime};

use crate::handler::TaskHandler;
use crate::remote::RemoteTaskGateway;
use crate::task::{Task, TaskDraft};

/// How close to its deadline a task must be to warrant a reminder
const REMINDER_WINDOW_MINUTES: i64 = 10;

/// Advances expired recurring tasks on a periodic tick.
///
/// This borrows the handler for the duration of one tick; the caller owns the timer (a UI event
/// loop, a `tokio::time::interval`, ...) and decides how often ticks happen.
pub struct RecurrenceScheduler<'a, G: RemoteTaskGateway> {
    handler: &'a mut TaskHandler<G>,
}

impl<'a, G: RemoteTaskGateway> RecurrenceScheduler<'a, G> {
    pub fn new(handler: &'a mut TaskHandler<G>) -> Self {
        Self { handler }
    }

    /// Roll every expired recurring task over to its next occurrence.
    ///
    /// Returns whether anything was advanced. When something was, a full fetch has already been
    /// triggered so the local snapshot reflects the roll-over.
    pub async fn tick(&mut self, now: NaiveDateTime) -> Result<bool, Box<dyn Error>> {
        let tasks = self.handler.local_snapshot();
        let mut advanced = false;

        for task in &tasks {
            let recurrence = match task.recurrence() {
                Some(rec) => rec,
                None => continue,
            };
            let due = match task.due() {
                Some(due) => *due,
                None => continue,
            };
            if task.status().is_completed() || due > now {
                continue;
            }

            log::info!("Recurring task \"{}\" expired at {}, rolling over", task.summary(), due);

            // Close the expired occurrence...
            self.handler.set_completion(task.uid(), task.summary(), 100).await?;

            // ...and open the next one
            let next_due = recurrence.next_due(due, now);
            self.handler.add(TaskDraft {
                summary: task.summary().to_string(),
                description: task.description().to_string(),
                priority: task.priority(),
                due: Some(next_due),
                recurrence: Some(recurrence),
            }).await?;

            advanced = true;
        }

        if advanced {
            self.handler.fetch().await;
        }
        Ok(advanced)
    }
}

/// The due date to *display* for a task, without touching anything.
///
/// An expired recurring task that the scheduler has not processed yet is shown at its projected
/// next occurrence, so that lists do not present a date in the past for something that will
/// fire again.
pub fn display_due(task: &Task, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let due = *task.due()?;
    match task.recurrence() {
        Some(rec) if due <= now && task.status().is_completed() == false => Some(rec.next_due(due, now)),
        _ => Some(due),
    }
}

/// Whether a task is close enough to its deadline to remind the user about it
/// (within the last few minutes before it, but not past it)
pub fn needs_reminder(task: &Task, now: NaiveDateTime) -> bool {
    match task.due() {
        None => false,
        Some(due) => now > *due - Duration::minutes(REMINDER_WINDOW_MINUTES) && now < *due,
    }
}
