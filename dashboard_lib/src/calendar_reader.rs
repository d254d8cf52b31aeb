use anyhow::Error;
use log::{debug, warn};
use reqwest::Client;
use stack_string::StackString;
use std::{sync::Arc, time::Duration};
use time::{Duration as TimeDuration, OffsetDateTime};
use url::Url;

use gcal_lib::{
    CalendarError,
    credential::{CredentialManager, OAuthSettings},
    gcal_instance::GCalendarInstance,
};

use crate::{calendar::CalendarEvent, config::Config, timezone::TimeZone};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CalendarEvents {
    pub events: Vec<CalendarEvent>,
    pub calendar_connected: bool,
}

impl CalendarEvents {
    fn disconnected() -> Self {
        Self::default()
    }
}

/// Ten years, well inside the provider's accepted range.
pub const MAX_WINDOW_DAYS: i64 = 3650;

fn window_end(now: OffsetDateTime, window_days: i64) -> OffsetDateTime {
    now.saturating_add(TimeDuration::days(window_days.clamp(0, MAX_WINDOW_DAYS)))
}

/// Read side of the calendar integration: owns the credential and the
/// events client for the configured calendar.
#[derive(Clone)]
pub struct CalendarReader {
    gcal: GCalendarInstance,
    calendar_id: StackString,
    time_zone: Option<TimeZone>,
}

impl CalendarReader {
    /// # Errors
    /// Return error if the http client cannot be built
    pub fn new(config: &Config) -> Result<Self, Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.gcal_timeout_secs))
            .build()?;
        let mut settings = OAuthSettings::google(
            &config.google_client_id,
            &config.google_client_secret,
            &config.redirect_uri(),
        );
        settings.auth_uri.clone_from(&config.gcal_auth_uri);
        settings.token_uri.clone_from(&config.gcal_token_uri);
        let credentials = CredentialManager::new(settings, &config.gcal_token_file, client.clone());
        Ok(Self {
            gcal: GCalendarInstance::new(Arc::new(credentials), client, &config.gcal_api_base),
            calendar_id: config.google_calendar_id.clone(),
            time_zone: config.default_time_zone,
        })
    }

    /// Read the persisted token, refreshing it when expired.
    pub async fn load(&self) -> bool {
        self.gcal.credentials().load().await
    }

    pub fn calendar_id(&self) -> &str {
        &self.calendar_id
    }

    pub fn credentials(&self) -> &CredentialManager {
        self.gcal.credentials()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.credentials().is_authenticated().await
    }

    /// # Errors
    /// Return `CalendarError::Configuration` without client id and secret
    pub fn authorization_url(&self) -> Result<Url, CalendarError> {
        self.credentials().build_authorization_url()
    }

    /// # Errors
    /// Return `CalendarError::AuthExchange` if the code is rejected
    pub async fn complete_authorization(&self, code: &str) -> Result<(), CalendarError> {
        self.credentials().complete_authorization(code).await
    }

    /// Events in `[now, now + window_days]`, the window clamped to
    /// `[0, MAX_WINDOW_DAYS]`.
    ///
    /// # Errors
    /// Return `CalendarError::Fetch` if the provider call fails
    pub async fn list_upcoming(&self, window_days: i64) -> Result<CalendarEvents, CalendarError> {
        let now = OffsetDateTime::now_utc();
        self.list_between(now, window_end(now, window_days)).await
    }

    /// Events of the current local day.
    ///
    /// # Errors
    /// Return `CalendarError::Fetch` if the provider call fails
    pub async fn list_today(&self) -> Result<CalendarEvents, CalendarError> {
        let tz = TimeZone::default_or_local(self.time_zone);
        let (start, end) = tz.day_window(OffsetDateTime::now_utc());
        self.list_between(start, end).await
    }

    async fn list_between(
        &self,
        min_time: OffsetDateTime,
        max_time: OffsetDateTime,
    ) -> Result<CalendarEvents, CalendarError> {
        let Some(items) = self
            .gcal
            .get_gcal_events(&self.calendar_id, min_time, max_time)
            .await?
        else {
            debug!("calendar not connected");
            return Ok(CalendarEvents::disconnected());
        };
        let mut events: Vec<_> = items
            .iter()
            .filter_map(|item| match CalendarEvent::from_gcal_event(item) {
                Ok(event) => Some(event),
                Err(e) => {
                    warn!("skipping event {:?}: {e}", item.id);
                    None
                }
            })
            .collect();
        events.sort_by_key(|event| event.start.instant());
        Ok(CalendarEvents {
            events,
            calendar_connected: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Error;
    use serde_json::json;
    use stack_string::{StackString, format_sstr};
    use std::path::Path;
    use tempfile::TempDir;
    use time::{Duration, OffsetDateTime};
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path, query_param},
    };

    use gcal_lib::{CalendarError, credential::GCalCredential};

    use crate::{
        calendar::EventTime,
        calendar_reader::{CalendarReader, MAX_WINDOW_DAYS, window_end},
        config::{Config, ConfigInner},
    };

    fn test_config(server: &MockServer, token_file: &Path) -> Config {
        ConfigInner {
            google_client_id: "client-id".into(),
            google_client_secret: "client-secret".into(),
            google_calendar_id: "family".into(),
            gcal_token_file: token_file.to_path_buf(),
            gcal_token_uri: format_sstr!("{}/token", server.uri()),
            gcal_api_base: server.uri().into(),
            default_time_zone: Some("America/New_York".parse().expect("valid zone")),
            ..ConfigInner::default()
        }
        .into()
    }

    fn write_token(token_file: &Path, expiry: OffsetDateTime, refresh: bool) -> Result<(), Error> {
        let credential = GCalCredential {
            access_token: "access".into(),
            refresh_token: refresh.then(|| "refresh".into()),
            expiry: Some(expiry.into()),
            scope: None,
        };
        std::fs::write(token_file, serde_json::to_vec(&credential)?)?;
        Ok(())
    }

    #[tokio::test]
    async fn test_unauthenticated_is_empty() -> Result<(), Error> {
        let server = MockServer::start().await;
        let dir = TempDir::new()?;
        let reader = CalendarReader::new(&test_config(&server, &dir.path().join("none.json")))?;
        assert!(!reader.load().await);

        let upcoming = reader.list_upcoming(7).await?;
        assert!(!upcoming.calendar_connected);
        assert!(upcoming.events.is_empty());

        let today = reader.list_today().await?;
        assert!(!today.calendar_connected);
        assert!(today.events.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_huge_window_unauthenticated() -> Result<(), Error> {
        let server = MockServer::start().await;
        let dir = TempDir::new()?;
        let reader = CalendarReader::new(&test_config(&server, &dir.path().join("none.json")))?;
        assert!(!reader.load().await);

        for days in [10_000_000, i64::MAX, i64::MIN] {
            let upcoming = reader.list_upcoming(days).await?;
            assert!(!upcoming.calendar_connected);
            assert!(upcoming.events.is_empty());
        }
        Ok(())
    }

    #[test]
    fn test_window_end_is_clamped() {
        let now = OffsetDateTime::now_utc();
        assert_eq!(
            window_end(now, 10_000_000),
            now + Duration::days(MAX_WINDOW_DAYS)
        );
        assert_eq!(window_end(now, -5), now);
        assert_eq!(window_end(now, 7), now + Duration::days(7));
    }

    #[tokio::test]
    async fn test_list_upcoming_sorted_and_normalized() -> Result<(), Error> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calendars/family/events"))
            .and(query_param("singleEvents", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [
                    {"id": "late", "summary": "Dinner",
                     "start": {"dateTime": "2030-01-02T18:00:00Z"},
                     "end": {"dateTime": "2030-01-02T19:00:00Z"}},
                    {"id": "broken", "summary": "No times"},
                    {"id": "early",
                     "start": {"date": "2030-01-02"}, "end": {"date": "2030-01-03"}},
                ]
            })))
            .mount(&server)
            .await;

        let dir = TempDir::new()?;
        let token_file = dir.path().join("token.json");
        write_token(&token_file, OffsetDateTime::now_utc() + Duration::hours(1), false)?;
        let reader = CalendarReader::new(&test_config(&server, &token_file))?;
        assert!(reader.load().await);

        let result = reader.list_upcoming(7).await?;
        assert!(result.calendar_connected);
        assert_eq!(result.events.len(), 2);
        assert_eq!(result.events[0].id.as_str(), "early");
        assert!(result.events[0].all_day);
        assert_eq!(result.events[0].title.as_str(), "No Title");
        assert!(matches!(result.events[1].start, EventTime::DateTime(_)));
        Ok(())
    }

    #[tokio::test]
    async fn test_provider_error_is_fetch_error() -> Result<(), Error> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let dir = TempDir::new()?;
        let token_file = dir.path().join("token.json");
        write_token(&token_file, OffsetDateTime::now_utc() + Duration::hours(1), false)?;
        let reader = CalendarReader::new(&test_config(&server, &token_file))?;
        assert!(reader.load().await);
        assert!(matches!(
            reader.list_today().await,
            Err(CalendarError::Fetch(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_expired_credential_refreshes_on_read() -> Result<(), Error> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "fresh",
                "expires_in": 3600,
                "token_type": "Bearer",
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/calendars/family/events"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
            .mount(&server)
            .await;

        let dir = TempDir::new()?;
        let token_file = dir.path().join("token.json");
        write_token(&token_file, OffsetDateTime::now_utc() - Duration::hours(1), true)?;
        let reader = CalendarReader::new(&test_config(&server, &token_file))?;
        assert!(reader.load().await);
        assert!(reader.is_authenticated().await);

        let result = reader.list_upcoming(1).await?;
        assert!(result.calendar_connected);
        let stored: GCalCredential = serde_json::from_slice(&std::fs::read(&token_file)?)?;
        assert_eq!(stored.access_token.as_str(), "fresh");
        assert_eq!(stored.refresh_token.as_ref().map(StackString::as_str), Some("refresh"));
        Ok(())
    }
}
