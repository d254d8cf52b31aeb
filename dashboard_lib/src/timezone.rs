use anyhow::{Error, format_err};
use derive_more::Into;
use serde::{Deserialize, Serialize};
use std::{convert::TryFrom, fmt, ops::Deref, str::FromStr};
use time::{Date, OffsetDateTime, Time};
use time_tz::{
    OffsetDateTimeExt, TimeZone as TzTimeZone, Tz,
    timezones::{db::UTC, get_by_name},
};

use stack_string::StackString;

/// IANA time zone, (de)serialized by name
#[derive(Into, Debug, PartialEq, Eq, Serialize, Deserialize, Clone, Copy)]
#[serde(into = "StackString", try_from = "StackString")]
pub struct TimeZone(&'static Tz);

impl TimeZone {
    #[must_use]
    pub fn utc() -> Self {
        Self(UTC)
    }

    #[must_use]
    pub fn local() -> Self {
        Self(time_tz::system::get_timezone().unwrap_or(UTC))
    }

    #[must_use]
    pub fn default_or_local(tz: Option<Self>) -> Self {
        tz.unwrap_or_else(Self::local)
    }

    /// Start of `date` in this zone.
    #[must_use]
    pub fn midnight(self, date: Date) -> OffsetDateTime {
        let naive = date.with_time(Time::MIDNIGHT);
        let guess = naive.assume_utc().to_timezone(self.0).offset();
        let offset = naive.assume_offset(guess).to_timezone(self.0).offset();
        naive.assume_offset(offset)
    }

    /// `[midnight, next midnight)` of the local day containing `now`.
    #[must_use]
    pub fn day_window(self, now: OffsetDateTime) -> (OffsetDateTime, OffsetDateTime) {
        let today = now.to_timezone(self.0).date();
        let tomorrow = today.next_day().unwrap_or(today);
        (self.midnight(today), self.midnight(tomorrow))
    }
}

impl Deref for TimeZone {
    type Target = Tz;
    fn deref(&self) -> &Self::Target {
        self.0
    }
}

impl fmt::Display for TimeZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.name())
    }
}

impl From<TimeZone> for StackString {
    fn from(item: TimeZone) -> Self {
        item.0.name().into()
    }
}

impl FromStr for TimeZone {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        get_by_name(s)
            .map(Self)
            .ok_or_else(|| format_err!("{s} is not a valid timezone"))
    }
}

impl TryFrom<StackString> for TimeZone {
    type Error = Error;
    fn try_from(item: StackString) -> Result<Self, Self::Error> {
        item.as_str().parse()
    }
}
