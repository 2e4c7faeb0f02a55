use crate::components::calendar::CalendarEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What the automation last applied
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutomationState {
    pub in_meeting: bool,
    pub event_id: Option<String>,
    pub event_title: Option<String>,
    pub event_end: Option<DateTime<Utc>>,
    pub changed_at: Option<DateTime<Utc>>,
}

impl AutomationState {
    /// State after entering or continuing into `event`
    pub fn meeting(event: &CalendarEvent, now: DateTime<Utc>) -> Self {
        Self {
            in_meeting: true,
            event_id: Some(event.id.clone()),
            event_title: event.summary.clone(),
            event_end: Some(event.end),
            changed_at: Some(now),
        }
    }

    /// State after leaving the last meeting
    pub fn free(now: DateTime<Utc>) -> Self {
        Self {
            changed_at: Some(now),
            ..Self::default()
        }
    }
}

/// Outcome of comparing the stored state with what the calendar says now
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Free to busy: focus on
    Enter(CalendarEvent),
    /// Busy to free: focus off
    Leave,
    /// Busy to busy with a different event; focus stays on, only the
    /// tracked event (and status expiry) moves
    Extend(CalendarEvent),
}

impl Transition {
    /// Whether applying this touches the Focus Mode
    pub fn toggles_focus(&self) -> bool {
        !matches!(self, Transition::Extend(_))
    }
}

/// Edge-triggered comparison: an unchanged busy state never yields a
/// transition.
pub fn decide(previous: &AutomationState, current: Option<&CalendarEvent>) -> Option<Transition> {
    match (previous.in_meeting, current) {
        (false, Some(event)) => Some(Transition::Enter(event.clone())),
        (true, None) => Some(Transition::Leave),
        (true, Some(event)) if previous.event_id.as_deref() != Some(event.id.as_str()) => {
            Some(Transition::Extend(event.clone()))
        }
        _ => None,
    }
}
