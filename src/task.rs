//! Task records, the central entity this crate synchronizes

use std::fmt::{Display, Formatter};

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::metadata;
use crate::recurrence::Recurrence;
use crate::remote::RemoteTask;

/// The completion status of a task, using the `STATUS` values of RFC5545 that task servers
/// understand.
///
/// A status is never set independently: it is derived from `percent_complete` (0 is
/// `NEEDS-ACTION`, 100 is `COMPLETED`, anything else is `IN-PROCESS`), which keeps the two fields
/// from contradicting each other.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    #[serde(rename = "NEEDS-ACTION")]
    NeedsAction,
    #[serde(rename = "IN-PROCESS")]
    InProcess,
    #[serde(rename = "COMPLETED")]
    Completed,
}

impl TaskStatus {
    pub fn from_percent(percent_complete: u8) -> Self {
        match percent_complete {
            0 => TaskStatus::NeedsAction,
            100 => TaskStatus::Completed,
            _ => TaskStatus::InProcess,
        }
    }

    pub fn is_completed(&self) -> bool {
        match self {
            TaskStatus::Completed => true,
            _ => false,
        }
    }
}

impl Default for TaskStatus {
    fn default() -> Self {
        TaskStatus::NeedsAction
    }
}

/// The coarse bands used to display a numeric priority (0 is the most urgent, 9 the least)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PriorityBand {
    ExtremelyHigh,
    High,
    Medium,
    Low,
}

impl PriorityBand {
    pub fn from_value(priority: u8) -> Option<Self> {
        match priority {
            0 => Some(PriorityBand::ExtremelyHigh),
            1..=3 => Some(PriorityBand::High),
            4..=6 => Some(PriorityBand::Medium),
            7..=9 => Some(PriorityBand::Low),
            _ => None,
        }
    }
}

impl Display for PriorityBand {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PriorityBand::ExtremelyHigh => write!(f, "extremely high"),
            PriorityBand::High => write!(f, "high"),
            PriorityBand::Medium => write!(f, "medium"),
            PriorityBand::Low => write!(f, "low"),
        }
    }
}

/// The field set captured by an add/edit form, before it becomes (or is applied to) a [`Task`]
#[derive(Clone, Debug)]
pub struct TaskDraft {
    pub summary: String,
    pub description: String,
    pub priority: u8,
    pub due: Option<NaiveDateTime>,
    pub recurrence: Option<Recurrence>,
}

/// A to-do task.
///
/// The `description` field always holds the *clean*, user-visible text: the recurrence metadata
/// block some servers carry inside the note (see [`crate::metadata`]) is stripped on the way in
/// and re-attached on the way out.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// The unique identifier the server assigned on creation. A task without a uid exists only
    /// locally and has never been pushed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    uid: Option<String>,

    summary: String,

    #[serde(default)]
    description: String,

    #[serde(default)]
    priority: u8,

    #[serde(default, with = "due_format", skip_serializing_if = "Option::is_none")]
    due: Option<NaiveDateTime>,

    #[serde(default)]
    status: TaskStatus,

    #[serde(default)]
    percent_complete: u8,

    // The three recurrence fields below are a storage format, not an API: in memory they are only
    // read and written through the single `Recurrence` union (see `recurrence()`).
    #[serde(default)]
    is_recurring: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    recurrence_interval_minutes: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    rrule: Option<String>,

    /// Written by snapshots of an older vintage; upgraded to minutes on load, never written back
    #[serde(default, skip_serializing)]
    recurrence_interval_days: Option<u32>,

    /// Set whenever a push of this task succeeds
    #[serde(default, with = "due_format", skip_serializing_if = "Option::is_none")]
    last_modified: Option<NaiveDateTime>,

    /// Why the last push of this task failed, if it did
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sync_error: Option<String>,
}

impl Task {
    /// Create a brand new task from form data. It has no uid yet: it will get one when it is
    /// first pushed to the server.
    pub fn from_draft(draft: TaskDraft) -> Self {
        let mut task = Self {
            uid: None,
            summary: draft.summary,
            description: draft.description,
            priority: draft.priority,
            due: draft.due,
            status: TaskStatus::NeedsAction,
            percent_complete: 0,
            is_recurring: false,
            recurrence_interval_minutes: None,
            rrule: None,
            recurrence_interval_days: None,
            last_modified: None,
            sync_error: None,
        };
        task.set_recurrence(draft.recurrence);
        task
    }

    /// Build a task from its wire representation.
    ///
    /// The note is split into the clean description and the embedded metadata block. When the
    /// server has a native repeat-rule field that one wins over the embedded block; the embedded
    /// deadline is only used when the server returned no due date of its own.
    pub fn from_remote(remote: &RemoteTask, native_rrule: bool) -> Self {
        let raw_note = remote.description.clone().unwrap_or_default();
        let (description, embedded) = metadata::decode(&raw_note);
        let embedded = embedded.unwrap_or_default();

        let mut recurrence = None;
        if native_rrule {
            recurrence = remote.rrule.as_deref().and_then(Recurrence::parse_rule);
        }
        if recurrence.is_none() {
            recurrence = match embedded.interval_minutes {
                Some(minutes) if minutes > 0 => Some(Recurrence::Simple(minutes)),
                _ => None,
            };
        }

        let mut task = Self {
            uid: Some(remote.uid.clone()),
            summary: remote.summary.clone(),
            description,
            priority: remote.priority,
            due: remote.due.or(embedded.due),
            status: remote.status,
            percent_complete: remote.percent_complete,
            is_recurring: false,
            recurrence_interval_minutes: None,
            rrule: None,
            recurrence_interval_days: None,
            last_modified: None,
            sync_error: None,
        };
        task.set_recurrence(recurrence);
        task
    }

    pub fn uid(&self) -> Option<&str>           { self.uid.as_deref()       }
    pub fn summary(&self) -> &str               { &self.summary             }
    pub fn description(&self) -> &str           { &self.description         }
    pub fn priority(&self) -> u8                { self.priority             }
    pub fn due(&self) -> Option<&NaiveDateTime> { self.due.as_ref()         }
    pub fn status(&self) -> TaskStatus          { self.status               }
    pub fn percent_complete(&self) -> u8        { self.percent_complete     }
    pub fn sync_error(&self) -> Option<&str>    { self.sync_error.as_deref() }
    pub fn last_modified(&self) -> Option<&NaiveDateTime> { self.last_modified.as_ref() }

    /// Whether this task effectively repeats. A task flagged as recurring but with no positive
    /// interval does not.
    pub fn is_recurring(&self) -> bool {
        self.recurrence().is_some()
    }

    /// The effective recurrence of this task. The rule string is the higher-fidelity source when
    /// both spellings are present; the raw minute count is the fallback.
    pub fn recurrence(&self) -> Option<Recurrence> {
        if self.is_recurring == false {
            return None;
        }
        if let Some(rule) = self.rrule.as_deref().and_then(Recurrence::parse_rule) {
            return Some(rule);
        }
        match self.recurrence_interval_minutes {
            Some(minutes) if minutes > 0 => Some(Recurrence::Simple(minutes)),
            _ => None,
        }
    }

    pub fn set_recurrence(&mut self, recurrence: Option<Recurrence>) {
        match recurrence {
            None => {
                self.is_recurring = false;
                self.recurrence_interval_minutes = None;
                self.rrule = None;
            },
            Some(rec) => {
                self.is_recurring = true;
                // Both spellings are written out, so that snapshots stay readable by versions
                // that only know the raw minute count
                self.recurrence_interval_minutes = Some(rec.interval_minutes());
                self.rrule = match rec {
                    Recurrence::Simple(_) => None,
                    rule => Some(rule.to_rule_string()),
                };
            },
        }
    }

    /// Record the server-assigned identifier after the first successful push
    pub fn bind_uid(&mut self, uid: String) {
        self.uid = Some(uid);
    }

    /// Set the completion percentage; the status follows from it
    pub fn set_percent_complete(&mut self, percent_complete: u8) {
        self.percent_complete = percent_complete.min(100);
        self.status = TaskStatus::from_percent(self.percent_complete);
    }

    /// Overwrite the editable fields with fresh form data. Completion state is not part of a
    /// draft and stays as it was.
    pub fn apply_draft(&mut self, draft: &TaskDraft) {
        self.summary = draft.summary.clone();
        self.description = draft.description.clone();
        self.priority = draft.priority;
        self.due = draft.due;
        self.set_recurrence(draft.recurrence);
    }

    pub(crate) fn touch_last_modified(&mut self) {
        self.last_modified = Some(Local::now().naive_local());
    }

    pub(crate) fn set_last_modified(&mut self, last_modified: Option<NaiveDateTime>) {
        self.last_modified = last_modified;
    }

    pub(crate) fn set_sync_error(&mut self, error: String) {
        self.sync_error = Some(error);
    }

    pub(crate) fn clear_sync_error(&mut self) {
        self.sync_error = None;
    }

    /// Upgrade fields written by older versions of the snapshot format
    pub(crate) fn upgrade_legacy_fields(&mut self) {
        match self.recurrence_interval_days.take() {
            Some(days) if self.recurrence_interval_minutes.is_none() => {
                self.recurrence_interval_minutes = Some(days * 24 * 60);
            },
            _ => {},
        }
    }
}

/// Serde support for the `YYYY-MM-DDTHH:MM:SS` timestamps of the snapshot format.
///
/// Parsing is deliberately lenient: a space instead of the `T` separator is accepted (older
/// snapshots used it), and anything unparseable becomes an absent date rather than an error.
pub(crate) mod due_format {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
    const LEGACY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn parse(s: &str) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(s, FORMAT)
            .or_else(|_| NaiveDateTime::parse_from_str(s, LEGACY_FORMAT))
            .ok()
    }

    pub fn serialize<S>(date: &Option<NaiveDateTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(date) => serializer.serialize_str(&date.format(FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        Ok(raw.as_deref().and_then(parse))
    }
}
