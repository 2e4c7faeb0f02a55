use crate::components::calendar::{CalendarEvent, CalendarListEntry, Provider};
use crate::utils::time::{parse_date_in, parse_rfc3339};
use chrono_tz::Tz;
use serde::Deserialize;

/// One page of `events.list`
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct EventsPage {
    #[serde(default)]
    pub items: Vec<GoogleEvent>,
    pub next_page_token: Option<String>,
}

/// Event resource, reduced to the fields we read
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GoogleEvent {
    pub id: String,
    pub status: Option<String>,
    pub summary: Option<String>,
    pub transparency: Option<String>,
    pub start: Option<EventTime>,
    pub end: Option<EventTime>,
    #[serde(default)]
    pub attendees: Vec<Attendee>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct EventTime {
    pub date_time: Option<String>,
    pub date: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Attendee {
    #[serde(rename = "self", default)]
    pub is_self: bool,
    pub response_status: Option<String>,
}

/// One page of `calendarList.list`
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CalendarListPage {
    #[serde(default)]
    pub items: Vec<GoogleCalendarListItem>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GoogleCalendarListItem {
    pub id: String,
    pub summary: Option<String>,
    pub summary_override: Option<String>,
    #[serde(default)]
    pub primary: bool,
    pub background_color: Option<String>,
}

impl GoogleCalendarListItem {
    pub fn into_entry(self) -> CalendarListEntry {
        let name = self
            .summary_override
            .or(self.summary)
            .unwrap_or_else(|| self.id.clone());
        CalendarListEntry {
            id: self.id,
            name,
            provider: Provider::Google,
            primary: self.primary,
            color: self.background_color,
        }
    }
}

impl GoogleEvent {
    /// Normalize into a [`CalendarEvent`]. Cancelled events and events with
    /// unreadable times yield `None`.
    pub fn into_event(self, calendar_id: &str, tz: &Tz) -> Option<CalendarEvent> {
        if self.status.as_deref() == Some("cancelled") {
            return None;
        }

        let start = self.start.as_ref()?;
        let end = self.end.as_ref()?;

        let (start, end, all_day) = match (&start.date_time, &end.date_time) {
            (Some(s), Some(e)) => (parse_rfc3339(s)?, parse_rfc3339(e)?, false),
            _ => (
                parse_date_in(start.date.as_deref()?, tz)?,
                parse_date_in(end.date.as_deref()?, tz)?,
                true,
            ),
        };

        let declined = self
            .attendees
            .iter()
            .any(|a| a.is_self && a.response_status.as_deref() == Some("declined"));
        let transparent = self.transparency.as_deref() == Some("transparent");

        Some(CalendarEvent {
            id: self.id,
            calendar_id: calendar_id.to_string(),
            provider: Provider::Google,
            summary: self.summary,
            start,
            end,
            all_day,
            busy: !declined && !transparent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn parse(value: serde_json::Value) -> GoogleEvent {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn timed_event_is_normalized() {
        let event = parse(json!({
            "id": "abc",
            "summary": "Planning",
            "start": { "dateTime": "2024-05-01T10:00:00+03:00" },
            "end": { "dateTime": "2024-05-01T11:00:00+03:00" }
        }))
        .into_event("primary", &chrono_tz::UTC)
        .unwrap();

        assert_eq!(event.start, Utc.with_ymd_and_hms(2024, 5, 1, 7, 0, 0).unwrap());
        assert!(!event.all_day);
        assert!(event.busy);
        assert_eq!(event.calendar_id, "primary");
    }

    #[test]
    fn all_day_event_uses_dates() {
        let event = parse(json!({
            "id": "holiday",
            "start": { "date": "2024-05-01" },
            "end": { "date": "2024-05-02" }
        }))
        .into_event("primary", &chrono_tz::UTC)
        .unwrap();

        assert!(event.all_day);
        assert_eq!(event.end - event.start, chrono::Duration::days(1));
    }

    #[test]
    fn cancelled_declined_and_transparent() {
        let times = json!({ "dateTime": "2024-05-01T10:00:00Z" });
        let cancelled = parse(json!({
            "id": "c", "status": "cancelled", "start": times, "end": times
        }));
        assert!(cancelled.into_event("primary", &chrono_tz::UTC).is_none());

        let declined = parse(json!({
            "id": "d", "start": times, "end": times,
            "attendees": [
                { "email": "boss@example.com", "responseStatus": "accepted" },
                { "email": "me@example.com", "self": true, "responseStatus": "declined" }
            ]
        }))
        .into_event("primary", &chrono_tz::UTC)
        .unwrap();
        assert!(!declined.busy);

        let transparent = parse(json!({
            "id": "t", "transparency": "transparent", "start": times, "end": times
        }))
        .into_event("primary", &chrono_tz::UTC)
        .unwrap();
        assert!(!transparent.busy);
    }

    #[test]
    fn calendar_list_prefers_override_name() {
        let item: GoogleCalendarListItem = serde_json::from_value(json!({
            "id": "team@group.calendar.google.com",
            "summary": "Team",
            "summaryOverride": "My team",
            "backgroundColor": "#9fe1e7"
        }))
        .unwrap();
        let entry = item.into_entry();
        assert_eq!(entry.name, "My team");
        assert!(!entry.primary);
        assert_eq!(entry.provider, Provider::Google);
    }
}
