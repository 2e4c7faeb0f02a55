//! Provider-neutral calendar types shared by the Google and Microsoft
//! components and consumed by the automation loop.

pub mod token;

use crate::error::SyncResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Calendar backend an item came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Google,
    Microsoft,
}

impl Provider {
    /// Stable key used in storage and on the command line
    pub fn key(&self) -> &'static str {
        match self {
            Provider::Google => "google",
            Provider::Microsoft => "microsoft",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "google" => Ok(Provider::Google),
            "microsoft" | "outlook" | "graph" => Ok(Provider::Microsoft),
            other => Err(format!("unknown provider '{}'", other)),
        }
    }
}

/// A single event occurrence, normalized to UTC
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub calendar_id: String,
    pub provider: Provider,
    pub summary: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub all_day: bool,
    /// False for events marked free, transparent or declined
    pub busy: bool,
}

impl CalendarEvent {
    /// Whether `now` falls in the half-open window `[start, end)`
    pub fn contains(&self, now: &DateTime<Utc>) -> bool {
        self.start <= *now && *now < self.end
    }

    /// Summary or a placeholder
    pub fn title(&self) -> &str {
        self.summary.as_deref().unwrap_or("(no title)")
    }
}

/// An entry of the user's calendar list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarListEntry {
    pub id: String,
    pub name: String,
    pub provider: Provider,
    pub primary: bool,
    pub color: Option<String>,
}

/// Events from one fetch. `skipped` names the calendars that failed to
/// answer, so an empty result can be told apart from a partial one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventBatch {
    pub events: Vec<CalendarEvent>,
    pub skipped: Vec<String>,
}

impl EventBatch {
    pub fn new(events: Vec<CalendarEvent>) -> Self {
        Self {
            events,
            skipped: Vec::new(),
        }
    }

    /// Every calendar answered
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }

    /// Fold another batch into this one, keeping events ordered by start
    pub fn merge(&mut self, other: EventBatch) {
        self.events.extend(other.events);
        self.skipped.extend(other.skipped);
        self.events.sort_by_key(|e| e.start);
    }
}

/// Something that can list calendars and produce events from the
/// calendars the user selected
#[async_trait]
pub trait CalendarSource: Send + Sync {
    fn provider(&self) -> Provider;

    async fn list_calendars(&self) -> SyncResult<Vec<CalendarListEntry>>;

    async fn events_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> SyncResult<EventBatch>;
}

/// The busy event happening at `now`. Overlapping matches resolve to the
/// one ending last.
pub fn current_event<'a>(
    events: &'a [CalendarEvent],
    now: &DateTime<Utc>,
    include_all_day: bool,
) -> Option<&'a CalendarEvent> {
    events
        .iter()
        .filter(|e| e.busy && (include_all_day || !e.all_day))
        .filter(|e| e.contains(now))
        .max_by_key(|e| e.end)
}

/// The next busy event starting after `now`
pub fn next_event<'a>(
    events: &'a [CalendarEvent],
    now: &DateTime<Utc>,
    include_all_day: bool,
) -> Option<&'a CalendarEvent> {
    events
        .iter()
        .filter(|e| e.busy && (include_all_day || !e.all_day))
        .filter(|e| e.start > *now)
        .min_by_key(|e| e.start)
}
