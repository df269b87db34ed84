//! Embedding recurrence metadata in task notes
//!
//! Most CalDAV task servers silently drop properties they do not know about, so recurrence
//! settings would be lost on the next fetch if they were sent as custom fields. Instead, they are
//! written as a small human-readable block at the end of the task description:
//!
//! ```text
//! water the plants every morning
//! Recurrence Info
//! Deadline: 2025-01-01 09:00
//! Recurrence: 60 Mins
//! ```
//!
//! This module converts between that block and structured values. Everything before the sentinel
//! line is the user-visible description; the lines after it are parsed field by field, and a
//! missing or mangled line simply yields an absent field.

use chrono::NaiveDateTime;

/// The line that introduces the metadata block
const SENTINEL: &str = "Recurrence Info";
const DEADLINE_PREFIX: &str = "Deadline:";
const RECURRENCE_PREFIX: &str = "Recurrence:";
const RECURRENCE_SUFFIX: &str = "Mins";

/// The deadline inside the block is only stored to minute precision
const DEADLINE_FORMAT: &str = "%Y-%m-%d %H:%M";

/// The recurrence fields recovered from a note
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NoteMetadata {
    pub due: Option<NaiveDateTime>,
    pub interval_minutes: Option<u32>,
}

/// Append the metadata block to a clean description, producing the note to send to the server
pub fn encode(description: &str, due: Option<&NaiveDateTime>, interval_minutes: u32) -> String {
    let mut note = String::new();
    if description.is_empty() == false {
        note.push_str(description);
        note.push('\n');
    }
    note.push_str(SENTINEL);
    if let Some(due) = due {
        note.push('\n');
        note.push_str(&format!("{} {}", DEADLINE_PREFIX, due.format(DEADLINE_FORMAT)));
    }
    note.push('\n');
    note.push_str(&format!("{} {} {}", RECURRENCE_PREFIX, interval_minutes, RECURRENCE_SUFFIX));
    note
}

/// Split a note into its clean user-visible description and the metadata block, if any.
///
/// Returns `(note, None)` unchanged when the note contains no sentinel line.
pub fn decode(note: &str) -> (String, Option<NoteMetadata>) {
    let mut lines = note.lines();
    let mut description_lines = Vec::new();

    let mut found_sentinel = false;
    while let Some(line) = lines.next() {
        if line.trim() == SENTINEL {
            found_sentinel = true;
            break;
        }
        description_lines.push(line);
    }

    if found_sentinel == false {
        return (note.to_string(), None);
    }

    let mut metadata = NoteMetadata::default();
    for line in lines {
        let line = line.trim();
        if let Some(rest) = strip_prefix(line, DEADLINE_PREFIX) {
            metadata.due = NaiveDateTime::parse_from_str(rest.trim(), DEADLINE_FORMAT).ok();
        } else if let Some(rest) = strip_prefix(line, RECURRENCE_PREFIX) {
            let value = match strip_suffix(rest.trim(), RECURRENCE_SUFFIX) {
                Some(v) => v,
                None => rest,
            };
            metadata.interval_minutes = value.trim().parse().ok();
        }
    }

    let description = description_lines.join("\n").trim().to_string();
    (description, Some(metadata))
}

// str::strip_prefix/strip_suffix are too recent for the toolchains this crate still supports
fn strip_prefix<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    if s.starts_with(prefix) {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}

fn strip_suffix<'a>(s: &'a str, suffix: &str) -> Option<&'a str> {
    if s.ends_with(suffix) {
        Some(&s[..s.len() - suffix.len()])
    } else {
        None
    }
}
