use anyhow::{Error, format_err};
use serde::{Serialize, Serializer, ser};
use stack_string::StackString;
use std::fmt;
use time::{Date, Duration, OffsetDateTime, Time};
use url::Url;

use gcal_lib::{
    datetimetype::{
        convert_date_to_str, convert_datetime_to_str, convert_str_to_date,
        convert_str_to_datetime_in_zone,
    },
    gcal_instance::{Event as GCalEvent, EventDateTime},
};

pub const DEFAULT_EVENT_TITLE: &str = "No Title";

/// Either a whole calendar day or an instant with its offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTime {
    Date(Date),
    DateTime(OffsetDateTime),
}

impl EventTime {
    /// Instant used for ordering; a date counts as UTC midnight.
    pub fn instant(&self) -> OffsetDateTime {
        match self {
            Self::Date(d) => d.with_time(Time::MIDNIGHT).assume_utc(),
            Self::DateTime(dt) => *dt,
        }
    }

    /// # Errors
    /// Returns error if formatting fails
    pub fn to_stack_string(&self) -> Result<StackString, Error> {
        match self {
            Self::Date(d) => convert_date_to_str(*d),
            Self::DateTime(dt) => convert_datetime_to_str(*dt),
        }
    }
}

impl fmt::Display for EventTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.to_stack_string().map_err(|_| fmt::Error)?;
        f.write_str(&s)
    }
}

impl Serialize for EventTime {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_stack_string().map_err(ser::Error::custom)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalendarEvent {
    pub id: StackString,
    pub title: StackString,
    pub start: EventTime,
    pub end: EventTime,
    pub all_day: bool,
    pub location: Option<StackString>,
    pub description: Option<StackString>,
    #[serde(skip)]
    pub url: Option<Url>,
}

impl fmt::Display for CalendarEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.all_day {
            write!(f, "{} (all day) {}", self.start, self.title)?;
        } else {
            write!(f, "{} - {} {}", self.start, self.end, self.title)?;
        }
        if let Some(location) = &self.location {
            write!(f, " @ {location}")?;
        }
        if let Some(url) = &self.url {
            write!(f, " {url}")?;
        }
        Ok(())
    }
}

fn non_empty(s: Option<&StackString>) -> Option<StackString> {
    s.filter(|s| !s.trim().is_empty()).cloned()
}

fn timed(dt: &EventDateTime) -> Result<Option<OffsetDateTime>, Error> {
    let zone = dt.time_zone.as_ref().map(StackString::as_str);
    dt.date_time
        .as_ref()
        .map(|s| convert_str_to_datetime_in_zone(s, zone))
        .transpose()
}

fn dated(dt: &EventDateTime) -> Result<Option<Date>, Error> {
    dt.date.as_ref().map(|s| convert_str_to_date(s)).transpose()
}

impl CalendarEvent {
    /// Normalize a provider event. A date-only start makes an all-day event.
    ///
    /// # Errors
    /// Return error if the event has no usable start or end
    pub fn from_gcal_event(item: &GCalEvent) -> Result<Self, Error> {
        let start = item
            .start
            .as_ref()
            .ok_or_else(|| format_err!("No start time"))?;
        let end = item.end.as_ref().ok_or_else(|| format_err!("No end time"))?;

        let (start, end, all_day) = if let Some(start_date) = dated(start)? {
            let end_date = match dated(end)? {
                Some(d) => d,
                None => start_date + Duration::days(1),
            };
            (EventTime::Date(start_date), EventTime::Date(end_date), true)
        } else {
            let start_time = timed(start)?.ok_or_else(|| format_err!("No start time"))?;
            let end_time = timed(end)?.ok_or_else(|| format_err!("No end time"))?;
            (
                EventTime::DateTime(start_time),
                EventTime::DateTime(end_time),
                false,
            )
        };

        Ok(Self {
            id: item.id.clone().unwrap_or_default(),
            title: item
                .summary
                .clone()
                .unwrap_or_else(|| DEFAULT_EVENT_TITLE.into()),
            start,
            end,
            all_day,
            location: non_empty(item.location.as_ref()),
            description: non_empty(item.description.as_ref()),
            url: item.html_link.as_ref().and_then(|u| u.parse().ok()),
        })
    }
}
