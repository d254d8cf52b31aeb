use anyhow::Error;
use core::marker::PhantomData;
use derive_more::{Deref, From, Into};
use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{Error as DeError, Unexpected, Visitor},
    ser,
};
use stack_string::StackString;
use std::fmt;
use time::{
    Date, OffsetDateTime, PrimitiveDateTime, UtcOffset, format_description::well_known::Rfc3339,
    macros::format_description,
};
use time_tz::{OffsetDateTimeExt, timezones::get_by_name};

/// Instant that keeps whatever offset it was created with and serializes as
/// RFC 3339.
#[derive(Debug, Clone, Copy, Deref, Into, From, PartialEq, Eq, PartialOrd, Ord)]
pub struct DateTimeType(OffsetDateTime);

impl fmt::Display for DateTimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        if let Ok(s) = convert_datetime_to_str(self.0) {
            write!(f, "{s}")?;
        }
        Ok(())
    }
}

impl Serialize for DateTimeType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&convert_datetime_to_str(self.0).map_err(ser::Error::custom)?)
    }
}

impl<'de> Deserialize<'de> for DateTimeType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_string(DateTimeTypeVisitor(PhantomData))
    }
}

struct DateTimeTypeVisitor(PhantomData<*const DateTimeType>);

impl Visitor<'_> for DateTimeTypeVisitor {
    type Value = DateTimeType;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("datetime")
    }

    fn visit_string<E>(self, v: String) -> Result<Self::Value, E>
    where
        E: DeError,
    {
        self.visit_str(&v)
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: DeError,
    {
        convert_str_to_datetime(v)
            .map_err(DeError::custom)
            .map(DateTimeType)
    }

    fn visit_bytes<E>(self, v: &[u8]) -> Result<Self::Value, E>
    where
        E: DeError,
    {
        match std::str::from_utf8(v) {
            Ok(s) => self.visit_str(s),
            Err(_) => Err(DeError::invalid_value(Unexpected::Bytes(v), &self)),
        }
    }
}

/// Calendar date serialized as `YYYY-MM-DD`.
#[derive(Debug, Clone, Copy, Deref, Into, From, PartialEq, Eq, PartialOrd, Ord)]
pub struct DateType(Date);

impl fmt::Display for DateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        if let Ok(s) = convert_date_to_str(self.0) {
            write!(f, "{s}")?;
        }
        Ok(())
    }
}

impl Serialize for DateType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&convert_date_to_str(self.0).map_err(ser::Error::custom)?)
    }
}

impl<'de> Deserialize<'de> for DateType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = StackString::deserialize(deserializer)?;
        convert_str_to_date(&s)
            .map_err(DeError::custom)
            .map(DateType)
    }
}

/// # Errors
/// Returns error if formatting fails (which can only happen if formatting
/// string is non-utf8)
pub fn convert_datetime_to_str(datetime: OffsetDateTime) -> Result<StackString, Error> {
    datetime
        .format(&Rfc3339)
        .map_err(Into::into)
        .map(|s| s.replace('Z', "+00:00"))
        .map(Into::into)
}

/// Parses an RFC 3339 timestamp, keeping its offset. A bare `Z` is UTC.
///
/// # Errors
/// Return error if the string is not RFC 3339
pub fn convert_str_to_datetime(s: &str) -> Result<OffsetDateTime, Error> {
    OffsetDateTime::parse(&s.replace('Z', "+00:00"), &Rfc3339).map_err(Into::into)
}

/// Parses a provider timestamp. Timestamps lacking an offset are placed in
/// `time_zone` when it names a known zone, otherwise in UTC.
///
/// # Errors
/// Return error if the string is neither RFC 3339 nor a naive
/// `YYYY-MM-DDTHH:MM:SS[.fff]` timestamp
pub fn convert_str_to_datetime_in_zone(
    s: &str,
    time_zone: Option<&str>,
) -> Result<OffsetDateTime, Error> {
    if let Ok(datetime) = convert_str_to_datetime(s) {
        return Ok(datetime);
    }
    let naive = PrimitiveDateTime::parse(
        s,
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"),
    )
    .or_else(|_| {
        PrimitiveDateTime::parse(
            s,
            format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
        )
    })?;
    let offset = time_zone
        .and_then(get_by_name)
        .map_or(UtcOffset::UTC, |tz| {
            naive.assume_utc().to_timezone(tz).offset()
        });
    Ok(naive.assume_offset(offset))
}

/// # Errors
/// Returns error if formatting fails
pub fn convert_date_to_str(date: Date) -> Result<StackString, Error> {
    date.format(format_description!("[year]-[month]-[day]"))
        .map(Into::into)
        .map_err(Into::into)
}

/// # Errors
/// Return error if the string is not `YYYY-MM-DD`
pub fn convert_str_to_date(s: &str) -> Result<Date, Error> {
    Date::parse(s, format_description!("[year]-[month]-[day]")).map_err(Into::into)
}
