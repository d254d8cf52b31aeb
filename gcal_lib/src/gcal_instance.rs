use log::debug;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use stack_string::{StackString, format_sstr};
use std::sync::Arc;
use time::OffsetDateTime;
use url::Url;

use crate::{
    CalendarError,
    credential::CredentialManager,
    datetimetype::convert_datetime_to_str,
};

pub const GOOGLE_CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";
pub const MAX_RESULTS: usize = 50;

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EventDateTime {
    pub date: Option<StackString>,
    pub date_time: Option<StackString>,
    pub time_zone: Option<StackString>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: Option<StackString>,
    pub status: Option<StackString>,
    pub summary: Option<StackString>,
    pub description: Option<StackString>,
    pub location: Option<StackString>,
    pub html_link: Option<StackString>,
    pub start: Option<EventDateTime>,
    pub end: Option<EventDateTime>,
    pub recurring_event_id: Option<StackString>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct Events {
    #[serde(default)]
    pub items: Vec<Event>,
    pub next_page_token: Option<StackString>,
    pub time_zone: Option<StackString>,
}

/// Read-only client for one Google calendar account.
#[derive(Clone)]
pub struct GCalendarInstance {
    credentials: Arc<CredentialManager>,
    client: Client,
    api_base: StackString,
}

impl GCalendarInstance {
    pub fn new(credentials: Arc<CredentialManager>, client: Client, api_base: &str) -> Self {
        Self {
            credentials,
            client,
            api_base: api_base.into(),
        }
    }

    pub fn credentials(&self) -> &CredentialManager {
        &self.credentials
    }

    fn events_url(&self, gcal_id: &str) -> Result<Url, CalendarError> {
        let mut url = Url::parse(&self.api_base)
            .map_err(|e| CalendarError::Configuration(format_sstr!("invalid api base: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| CalendarError::Configuration("api base cannot be a base".into()))?
            .pop_if_empty()
            .extend(["calendars", gcal_id, "events"]);
        Ok(url)
    }

    /// Lists single (recurrence-expanded) events of `gcal_id` overlapping
    /// `[min_time, max_time)`, ordered by start, at most [`MAX_RESULTS`].
    ///
    /// Returns `Ok(None)` when no usable credential exists; the token may be
    /// refreshed (and the token file rewritten) on the way.
    ///
    /// # Errors
    /// Return `CalendarError::Fetch` if the request fails or the provider
    /// answers with an error
    pub async fn get_gcal_events(
        &self,
        gcal_id: &str,
        min_time: OffsetDateTime,
        max_time: OffsetDateTime,
    ) -> Result<Option<Vec<Event>>, CalendarError> {
        let Some(access_token) = self.credentials.access_token().await else {
            return Ok(None);
        };
        let url = self.events_url(gcal_id)?;
        let time_min = convert_datetime_to_str(min_time)
            .map_err(|e| CalendarError::Fetch(format_sstr!("{e}")))?;
        let time_max = convert_datetime_to_str(max_time)
            .map_err(|e| CalendarError::Fetch(format_sstr!("{e}")))?;
        let max_results = format_sstr!("{MAX_RESULTS}");
        debug!("fetching {gcal_id} events {time_min} - {time_max}");

        let response = self
            .client
            .get(url)
            .bearer_auth(access_token.as_str())
            .query(&[
                ("timeMin", time_min.as_str()),
                ("timeMax", time_max.as_str()),
                ("maxResults", max_results.as_str()),
                ("singleEvents", "true"),
                ("orderBy", "startTime"),
            ])
            .send()
            .await
            .map_err(|e| CalendarError::Fetch(format_sstr!("Google API request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(CalendarError::Fetch(format_sstr!(
                "Google API error ({status}): {text}"
            )));
        }
        let events: Events = response.json().await.map_err(|e| {
            CalendarError::Fetch(format_sstr!("Failed to parse Google response: {e}"))
        })?;
        let mut items = events.items;
        items.truncate(MAX_RESULTS);
        Ok(Some(items))
    }
}
