//! The recurrence model
//!
//! CalDAV task servers have, at best, patchy support for repeat rules, so this crate keeps its own
//! reduced model: a task repeats every _n_ minutes, where _n_ can also be spelled as a
//! `FREQ=<unit>;INTERVAL=<count>` rule string for readability.

use std::fmt::{Display, Formatter};

use chrono::{Duration, NaiveDateTime};

/// The repeat units supported by the compact rule string
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecurrenceFrequency {
    Minutely,
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl RecurrenceFrequency {
    /// How many minutes a single unit of this frequency lasts.
    /// Months and years are approximated (30 and 365 days).
    pub fn minutes(&self) -> u32 {
        match self {
            RecurrenceFrequency::Minutely => 1,
            RecurrenceFrequency::Hourly => 60,
            RecurrenceFrequency::Daily => 1440,
            RecurrenceFrequency::Weekly => 10080,
            RecurrenceFrequency::Monthly => 43200,
            RecurrenceFrequency::Yearly => 525600,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecurrenceFrequency::Minutely => "MINUTELY",
            RecurrenceFrequency::Hourly => "HOURLY",
            RecurrenceFrequency::Daily => "DAILY",
            RecurrenceFrequency::Weekly => "WEEKLY",
            RecurrenceFrequency::Monthly => "MONTHLY",
            RecurrenceFrequency::Yearly => "YEARLY",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "MINUTELY" => Some(RecurrenceFrequency::Minutely),
            "HOURLY" => Some(RecurrenceFrequency::Hourly),
            "DAILY" => Some(RecurrenceFrequency::Daily),
            "WEEKLY" => Some(RecurrenceFrequency::Weekly),
            "MONTHLY" => Some(RecurrenceFrequency::Monthly),
            "YEARLY" => Some(RecurrenceFrequency::Yearly),
            _ => None,
        }
    }
}

/// How a task repeats.
///
/// Older snapshots only store a raw number of minutes, newer ones a rule string. Both spellings
/// are variants of this single type, so the rest of the crate never has to pick between two
/// parallel field sets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Recurrence {
    /// Repeat every so many minutes
    Simple(u32),
    /// Repeat every `interval` units of `freq` (the `FREQ=..;INTERVAL=..` spelling)
    Rule { freq: RecurrenceFrequency, interval: u32 },
}

impl Recurrence {
    /// The effective repeat interval, in minutes
    pub fn interval_minutes(&self) -> u32 {
        match self {
            Recurrence::Simple(minutes) => *minutes,
            Recurrence::Rule { freq, interval } => freq.minutes().saturating_mul(*interval),
        }
    }

    /// Convert a total number of minutes to a rule, preferring the largest unit that divides it
    /// exactly so that the rule string stays human-readable
    pub fn from_total_minutes(minutes: u32) -> Self {
        if minutes >= 1440 && minutes % 1440 == 0 {
            Recurrence::Rule { freq: RecurrenceFrequency::Daily, interval: minutes / 1440 }
        } else if minutes >= 60 && minutes % 60 == 0 {
            Recurrence::Rule { freq: RecurrenceFrequency::Hourly, interval: minutes / 60 }
        } else {
            Recurrence::Rule { freq: RecurrenceFrequency::Minutely, interval: minutes }
        }
    }

    /// Format as a compact `FREQ=<unit>;INTERVAL=<n>` rule string
    pub fn to_rule_string(&self) -> String {
        match self {
            Recurrence::Simple(minutes) => Self::from_total_minutes(*minutes).to_rule_string(),
            Recurrence::Rule { freq, interval } => format!("FREQ={};INTERVAL={}", freq.as_str(), interval),
        }
    }

    /// Parse a compact rule string.
    ///
    /// A missing `INTERVAL` defaults to 1 (as in RFC5545). Unknown keys are ignored, so rules
    /// coming from servers that append extra parts still parse. Returns `None` for strings that
    /// have no usable `FREQ`, or whose effective interval would be zero.
    pub fn parse_rule(s: &str) -> Option<Self> {
        let mut freq = None;
        let mut interval = 1;

        for part in s.split(';') {
            let mut kv = part.splitn(2, '=');
            let key = kv.next()?.trim();
            let value = match kv.next() {
                Some(v) => v.trim(),
                None => continue,
            };
            match key {
                "FREQ" => freq = RecurrenceFrequency::parse(value),
                "INTERVAL" => interval = value.parse().ok()?,
                _ => continue,
            }
        }

        match freq {
            Some(freq) if interval > 0 => Some(Recurrence::Rule { freq, interval }),
            _ => None,
        }
    }

    /// Project the next occurrence after `now`, starting from `from` and repeatedly adding the
    /// interval. This is what keeps a task that expired several intervals ago (e.g. while the
    /// application was not running) from being re-created in the past and immediately expiring
    /// again.
    pub fn next_due(&self, from: NaiveDateTime, now: NaiveDateTime) -> NaiveDateTime {
        // A zero interval would never advance past `now`
        let step = Duration::minutes(self.interval_minutes().max(1) as i64);
        let mut next = from + step;
        while next <= now {
            next = next + step;
        }
        next
    }
}

impl Display for Recurrence {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_rule_string())
    }
}
