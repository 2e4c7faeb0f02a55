use crate::components::calendar::{CalendarEvent, CalendarListEntry, Provider};
use crate::utils::time::{parse_date_in, parse_naive_in};
use chrono_tz::Tz;
use serde::Deserialize;

/// A Graph collection response
#[derive(Debug, Clone, Deserialize)]
pub struct GraphPage<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
    #[serde(rename = "@odata.nextLink")]
    pub next_link: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GraphCalendar {
    pub id: String,
    pub name: Option<String>,
    #[serde(default)]
    pub is_default_calendar: bool,
    pub hex_color: Option<String>,
}

impl GraphCalendar {
    pub fn into_entry(self) -> CalendarListEntry {
        let name = self.name.unwrap_or_else(|| self.id.clone());
        CalendarListEntry {
            id: self.id,
            name,
            provider: Provider::Microsoft,
            primary: self.is_default_calendar,
            color: self.hex_color.filter(|c| !c.is_empty()),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GraphEvent {
    pub id: String,
    pub subject: Option<String>,
    #[serde(default)]
    pub is_all_day: bool,
    #[serde(default)]
    pub is_cancelled: bool,
    pub show_as: Option<String>,
    pub start: Option<DateTimeTimeZone>,
    pub end: Option<DateTimeTimeZone>,
    pub response_status: Option<ResponseStatus>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DateTimeTimeZone {
    pub date_time: String,
    pub time_zone: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ResponseStatus {
    pub response: Option<String>,
}

impl DateTimeTimeZone {
    /// Graph sends wall-clock times plus a zone name. Unknown (Windows style)
    /// zone names fall back to `fallback`.
    fn resolve(&self, fallback: &Tz, all_day: bool) -> Option<chrono::DateTime<chrono::Utc>> {
        let tz = match self.time_zone.as_deref() {
            Some("UTC") | Some("Etc/UTC") | None => chrono_tz::UTC,
            Some(name) => name.parse().unwrap_or(*fallback),
        };

        if all_day {
            // All-day events start at midnight wherever the user is
            let date = self.date_time.get(..10)?;
            return parse_date_in(date, fallback);
        }

        parse_naive_in(&self.date_time, &tz)
    }
}

impl GraphEvent {
    /// Normalize into a [`CalendarEvent`]; cancelled events are dropped
    pub fn into_event(self, calendar_id: &str, tz: &Tz) -> Option<CalendarEvent> {
        if self.is_cancelled {
            return None;
        }

        let start = self.start.as_ref()?.resolve(tz, self.is_all_day)?;
        let end = self.end.as_ref()?.resolve(tz, self.is_all_day)?;

        let free = matches!(
            self.show_as.as_deref(),
            Some("free") | Some("workingElsewhere")
        );
        let declined = self
            .response_status
            .as_ref()
            .and_then(|r| r.response.as_deref())
            == Some("declined");

        Some(CalendarEvent {
            id: self.id,
            calendar_id: calendar_id.to_string(),
            provider: Provider::Microsoft,
            summary: self.subject,
            start,
            end,
            all_day: self.is_all_day,
            busy: !free && !declined,
        })
    }
}
