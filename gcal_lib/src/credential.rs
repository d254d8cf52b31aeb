use log::{debug, error, info, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use stack_string::{StackString, format_sstr};
use std::path::{Path, PathBuf};
use time::{Duration, OffsetDateTime};
use tokio::{fs, sync::Mutex};
use url::Url;

use crate::{CalendarError, datetimetype::DateTimeType};

pub const GOOGLE_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
pub const CALENDAR_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/calendar.readonly";

const EXPIRY_SKEW: Duration = Duration::seconds(10);

/// Callback url the provider redirects the browser to after consent.  A
/// wildcard bind address is not reachable from a browser, so it becomes
/// `localhost`.
pub fn redirect_uri(host: &str, port: u32) -> StackString {
    let host = match host {
        "0.0.0.0" | "::" | "[::]" => "localhost",
        h => h,
    };
    format_sstr!("http://{host}:{port}/api/calendar/callback")
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct GCalCredential {
    #[serde(alias = "token")]
    pub access_token: StackString,
    #[serde(default)]
    pub refresh_token: Option<StackString>,
    #[serde(default)]
    pub expiry: Option<DateTimeType>,
    #[serde(default)]
    pub scope: Option<StackString>,
}

impl GCalCredential {
    /// A credential without an expiry never expires.
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expiry
            .is_some_and(|expiry| *expiry - EXPIRY_SKEW <= now)
    }

    pub fn is_valid(&self, now: OffsetDateTime) -> bool {
        !self.access_token.is_empty() && !self.is_expired(now)
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_ref().is_some_and(|t| !t.is_empty())
    }
}

#[derive(Deserialize, Debug)]
struct TokenResponse {
    access_token: StackString,
    expires_in: Option<i64>,
    refresh_token: Option<StackString>,
    scope: Option<StackString>,
}

#[derive(Debug, Clone)]
pub struct OAuthSettings {
    pub client_id: StackString,
    pub client_secret: StackString,
    pub auth_uri: StackString,
    pub token_uri: StackString,
    pub redirect_uri: StackString,
    pub scopes: Vec<StackString>,
}

impl OAuthSettings {
    pub fn google(client_id: &str, client_secret: &str, redirect_uri: &str) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            auth_uri: GOOGLE_AUTH_URI.into(),
            token_uri: GOOGLE_TOKEN_URI.into(),
            redirect_uri: redirect_uri.into(),
            scopes: vec![CALENDAR_READONLY_SCOPE.into()],
        }
    }

    fn check_configured(&self) -> Result<(), CalendarError> {
        if self.client_id.is_empty() || self.client_secret.is_empty() {
            return Err(CalendarError::Configuration(
                "Google Calendar credentials not configured. Set GOOGLE_CLIENT_ID and \
                 GOOGLE_CLIENT_SECRET in config.env"
                    .into(),
            ));
        }
        Ok(())
    }

    fn scope(&self) -> StackString {
        self.scopes
            .iter()
            .map(StackString::as_str)
            .collect::<Vec<_>>()
            .join(" ")
            .into()
    }
}

/// Owns the single OAuth credential of the calendar account.
///
/// Every mutation (load, refresh, code exchange) happens while holding the
/// credential mutex, so two callers racing on an expired token produce one
/// refresh and one write of the token file.
pub struct CredentialManager {
    settings: OAuthSettings,
    token_file: PathBuf,
    client: Client,
    credential: Mutex<Option<GCalCredential>>,
}

impl CredentialManager {
    pub fn new(settings: OAuthSettings, token_file: &Path, client: Client) -> Self {
        Self {
            settings,
            token_file: token_file.to_path_buf(),
            client,
            credential: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &OAuthSettings {
        &self.settings
    }

    pub fn token_file(&self) -> &Path {
        &self.token_file
    }

    /// Reads the persisted credential.  An expired credential carrying a
    /// refresh token is refreshed on the spot and the token file rewritten.
    /// Nothing here is an error: a missing, unreadable or unrefreshable
    /// credential leaves the manager unauthenticated.
    ///
    /// Returns whether the manager is authenticated afterwards.
    pub async fn load(&self) -> bool {
        let mut guard = self.credential.lock().await;
        *guard = None;
        let credential = match self.read_token_file().await {
            Ok(Some(credential)) => credential,
            Ok(None) => {
                debug!("no calendar token at {}", self.token_file.display());
                return false;
            }
            Err(e) => {
                warn!(
                    "ignoring unreadable calendar token {}: {e}",
                    self.token_file.display()
                );
                return false;
            }
        };
        *guard = self.refresh_if_needed(credential).await;
        guard
            .as_ref()
            .is_some_and(|c| c.is_valid(OffsetDateTime::now_utc()))
    }

    /// True only when a credential is present and not expired.  Never
    /// refreshes.
    pub async fn is_authenticated(&self) -> bool {
        self.credential
            .lock()
            .await
            .as_ref()
            .is_some_and(|c| c.is_valid(OffsetDateTime::now_utc()))
    }

    /// Current access token for calls against the calendar API.
    ///
    /// Side effect: an expired credential with a refresh token is refreshed
    /// and persisted before returning.  If that fails the credential is
    /// dropped and `None` is returned.
    pub async fn access_token(&self) -> Option<StackString> {
        let mut guard = self.credential.lock().await;
        let credential = guard.take()?;
        *guard = self.refresh_if_needed(credential).await;
        guard.as_ref().map(|c| c.access_token.clone())
    }

    pub async fn credential(&self) -> Option<GCalCredential> {
        self.credential.lock().await.clone()
    }

    /// # Errors
    /// Return `CalendarError::Configuration` if client id or secret are empty
    pub fn build_authorization_url(&self) -> Result<Url, CalendarError> {
        self.settings.check_configured()?;
        let mut url = Url::parse(&self.settings.auth_uri)
            .map_err(|e| CalendarError::Configuration(format_sstr!("invalid auth uri: {e}")))?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.settings.client_id)
            .append_pair("redirect_uri", &self.settings.redirect_uri)
            .append_pair("scope", &self.settings.scope())
            .append_pair("access_type", "offline")
            .append_pair("include_granted_scopes", "true")
            .append_pair("prompt", "consent");
        Ok(url)
    }

    /// Exchanges a one-time authorization code for a credential and persists
    /// it.  On failure the stored credential is left untouched.
    ///
    /// # Errors
    /// Return `CalendarError::AuthExchange` carrying the upstream error text
    pub async fn complete_authorization(&self, code: &str) -> Result<(), CalendarError> {
        if code.is_empty() {
            return Err(CalendarError::AuthExchange("missing authorization code".into()));
        }
        let mut guard = self.credential.lock().await;
        let response = self
            .request_token(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", self.settings.client_id.as_str()),
                ("client_secret", self.settings.client_secret.as_str()),
                ("redirect_uri", self.settings.redirect_uri.as_str()),
            ])
            .await
            .map_err(|e| CalendarError::AuthExchange(e.detail()))?;
        let credential = Self::credential_from_response(response, None);
        if let Err(e) = self.persist(&credential).await {
            error!("failed to persist calendar token: {e}");
        }
        info!("calendar authorization completed");
        guard.replace(credential);
        Ok(())
    }

    async fn refresh_if_needed(&self, credential: GCalCredential) -> Option<GCalCredential> {
        if credential.is_valid(OffsetDateTime::now_utc()) {
            return Some(credential);
        }
        if !credential.can_refresh() {
            info!("calendar token expired and has no refresh token");
            return None;
        }
        match self.refresh(&credential).await {
            Ok(refreshed) => {
                if let Err(e) = self.persist(&refreshed).await {
                    error!("failed to persist refreshed calendar token: {e}");
                }
                Some(refreshed)
            }
            Err(e) => {
                error!("calendar token refresh failed: {e}");
                None
            }
        }
    }

    async fn refresh(&self, credential: &GCalCredential) -> Result<GCalCredential, CalendarError> {
        let refresh_token = credential.refresh_token.clone().unwrap_or_default();
        debug!("refreshing calendar token");
        let response = self
            .request_token(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
                ("client_id", self.settings.client_id.as_str()),
                ("client_secret", self.settings.client_secret.as_str()),
            ])
            .await?;
        Ok(Self::credential_from_response(response, Some(credential)))
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> Result<TokenResponse, CalendarError> {
        let response = self
            .client
            .post(self.settings.token_uri.as_str())
            .form(form)
            .send()
            .await
            .map_err(|e| CalendarError::Fetch(format_sstr!("token request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(CalendarError::Fetch(format_sstr!(
                "token endpoint returned {status}: {text}"
            )));
        }
        response
            .json()
            .await
            .map_err(|e| CalendarError::Fetch(format_sstr!("invalid token response: {e}")))
    }

    /// Providers usually omit the refresh token and scope on refresh, so the
    /// previous values carry over.
    fn credential_from_response(
        response: TokenResponse,
        previous: Option<&GCalCredential>,
    ) -> GCalCredential {
        let expiry = response
            .expires_in
            .map(|secs| (OffsetDateTime::now_utc() + Duration::seconds(secs)).into());
        GCalCredential {
            access_token: response.access_token,
            refresh_token: response
                .refresh_token
                .or_else(|| previous.and_then(|c| c.refresh_token.clone())),
            expiry,
            scope: response
                .scope
                .or_else(|| previous.and_then(|c| c.scope.clone())),
        }
    }

    async fn read_token_file(&self) -> Result<Option<GCalCredential>, CalendarError> {
        if !fs::try_exists(&self.token_file).await? {
            return Ok(None);
        }
        let data = fs::read(&self.token_file).await?;
        let credential = serde_json::from_slice(&data)?;
        Ok(Some(credential))
    }

    async fn persist(&self, credential: &GCalCredential) -> Result<(), CalendarError> {
        if let Some(parent) = self.token_file.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let data = serde_json::to_vec_pretty(credential)?;
        fs::write(&self.token_file, data).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Error;
    use reqwest::Client;
    use serde_json::json;
    use stack_string::StackString;
    use std::path::Path;
    use tempfile::TempDir;
    use time::{Duration, OffsetDateTime};
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_string_contains, method, path},
    };

    use crate::{
        CalendarError,
        credential::{CredentialManager, GCalCredential, OAuthSettings, redirect_uri},
    };

    fn test_settings(server: &MockServer) -> OAuthSettings {
        let mut settings = OAuthSettings::google(
            "client-id",
            "client-secret",
            &redirect_uri("0.0.0.0", 8000),
        );
        settings.auth_uri = format!("{}/auth", server.uri()).into();
        settings.token_uri = format!("{}/token", server.uri()).into();
        settings
    }

    fn write_token(path: &Path, credential: &GCalCredential) -> Result<(), Error> {
        std::fs::write(path, serde_json::to_vec(credential)?)?;
        Ok(())
    }

    fn expired_credential(refresh_token: Option<&str>) -> GCalCredential {
        GCalCredential {
            access_token: "old-token".into(),
            refresh_token: refresh_token.map(Into::into),
            expiry: Some((OffsetDateTime::now_utc() - Duration::hours(1)).into()),
            scope: None,
        }
    }

    #[test]
    fn test_redirect_uri_rewrites_wildcard() {
        assert_eq!(
            redirect_uri("0.0.0.0", 8000).as_str(),
            "http://localhost:8000/api/calendar/callback"
        );
        assert_eq!(
            redirect_uri("192.168.1.5", 8080).as_str(),
            "http://192.168.1.5:8080/api/calendar/callback"
        );
    }

    #[test]
    fn test_expiry() {
        let now = OffsetDateTime::now_utc();
        let mut credential = expired_credential(None);
        assert!(credential.is_expired(now));
        credential.expiry = Some((now + Duration::seconds(5)).into());
        assert!(credential.is_expired(now));
        credential.expiry = Some((now + Duration::hours(1)).into());
        assert!(credential.is_valid(now));
        credential.expiry = None;
        assert!(credential.is_valid(now));
    }

    #[test]
    fn test_token_alias() -> Result<(), Error> {
        let credential: GCalCredential = serde_json::from_value(json!({
            "token": "abc",
            "refresh_token": "def",
            "expiry": "2030-01-01T00:00:00Z",
        }))?;
        assert_eq!(credential.access_token.as_str(), "abc");
        assert!(credential.can_refresh());
        Ok(())
    }

    #[tokio::test]
    async fn test_load_missing_and_garbage() -> Result<(), Error> {
        let server = MockServer::start().await;
        let dir = TempDir::new()?;
        let token_file = dir.path().join("google_token.json");
        let manager = CredentialManager::new(test_settings(&server), &token_file, Client::new());
        assert!(!manager.load().await);

        std::fs::write(&token_file, b"not json")?;
        assert!(!manager.load().await);
        assert!(!manager.is_authenticated().await);
        Ok(())
    }

    #[tokio::test]
    async fn test_load_expired_refreshes_once() -> Result<(), Error> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "new-token",
                "expires_in": 3599,
                "token_type": "Bearer",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new()?;
        let token_file = dir.path().join("google_token.json");
        write_token(&token_file, &expired_credential(Some("refresh-me")))?;

        let manager = CredentialManager::new(test_settings(&server), &token_file, Client::new());
        assert!(manager.load().await);
        assert!(manager.is_authenticated().await);

        let stored: GCalCredential = serde_json::from_slice(&std::fs::read(&token_file)?)?;
        assert_eq!(stored.access_token.as_str(), "new-token");
        assert_eq!(stored.refresh_token.as_ref().map(StackString::as_str), Some("refresh-me"));
        assert_eq!(
            manager.access_token().await.as_ref().map(StackString::as_str),
            Some("new-token")
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_access_token_refreshes_once() -> Result<(), Error> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({
                        "access_token": "fresh-token",
                        "expires_in": 3599,
                    }))
                    .set_delay(std::time::Duration::from_millis(200)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new()?;
        let token_file = dir.path().join("google_token.json");
        let manager = CredentialManager::new(test_settings(&server), &token_file, Client::new());
        *manager.credential.lock().await = Some(expired_credential(Some("refresh-me")));

        let (first, second) = tokio::join!(manager.access_token(), manager.access_token());
        assert_eq!(first.as_ref().map(StackString::as_str), Some("fresh-token"));
        assert_eq!(second.as_ref().map(StackString::as_str), Some("fresh-token"));
        assert!(manager.is_authenticated().await);

        let stored: GCalCredential = serde_json::from_slice(&std::fs::read(&token_file)?)?;
        assert_eq!(stored.access_token.as_str(), "fresh-token");
        Ok(())
    }

    #[tokio::test]
    async fn test_load_expired_without_refresh_token() -> Result<(), Error> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let dir = TempDir::new()?;
        let token_file = dir.path().join("google_token.json");
        write_token(&token_file, &expired_credential(None))?;

        let manager = CredentialManager::new(test_settings(&server), &token_file, Client::new());
        assert!(!manager.load().await);
        assert!(!manager.is_authenticated().await);
        assert!(manager.access_token().await.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_load_refresh_failure_degrades() -> Result<(), Error> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new()?;
        let token_file = dir.path().join("google_token.json");
        write_token(&token_file, &expired_credential(Some("revoked")))?;

        let manager = CredentialManager::new(test_settings(&server), &token_file, Client::new());
        assert!(!manager.load().await);
        assert!(manager.credential().await.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_authorization_url() -> Result<(), Error> {
        let server = MockServer::start().await;
        let dir = TempDir::new()?;
        let manager = CredentialManager::new(
            test_settings(&server),
            &dir.path().join("token.json"),
            Client::new(),
        );
        let url = manager.build_authorization_url()?;
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let get = |k: &str| {
            pairs
                .iter()
                .find(|(key, _)| key == k)
                .map(|(_, v)| v.clone())
        };
        assert_eq!(get("access_type").as_deref(), Some("offline"));
        assert_eq!(get("prompt").as_deref(), Some("consent"));
        assert_eq!(get("client_id").as_deref(), Some("client-id"));
        assert_eq!(
            get("redirect_uri").as_deref(),
            Some("http://localhost:8000/api/calendar/callback")
        );

        let mut settings = test_settings(&server);
        settings.client_secret = "".into();
        let manager =
            CredentialManager::new(settings, &dir.path().join("token.json"), Client::new());
        assert!(matches!(
            manager.build_authorization_url(),
            Err(CalendarError::Configuration(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_complete_authorization() -> Result<(), Error> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("code=good-code"))
            .and(body_string_contains("redirect_uri=http%3A%2F%2Flocalhost%3A8000"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "fresh",
                "refresh_token": "long-lived",
                "expires_in": 3600,
                "scope": "https://www.googleapis.com/auth/calendar.readonly",
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("code=bad-code"))
            .respond_with(
                ResponseTemplate::new(400).set_body_string(r#"{"error": "invalid_grant"}"#),
            )
            .mount(&server)
            .await;

        let dir = TempDir::new()?;
        let token_file = dir.path().join("nested").join("google_token.json");
        let manager = CredentialManager::new(test_settings(&server), &token_file, Client::new());

        let result = manager.complete_authorization("bad-code").await;
        match result {
            Err(CalendarError::AuthExchange(msg)) => assert!(msg.contains("invalid_grant")),
            r => panic!("unexpected {r:?}"),
        }
        assert!(!manager.is_authenticated().await);
        assert!(!token_file.exists());

        manager.complete_authorization("good-code").await?;
        assert!(manager.is_authenticated().await);
        let stored: GCalCredential = serde_json::from_slice(&std::fs::read(&token_file)?)?;
        assert_eq!(stored.access_token.as_str(), "fresh");
        assert_eq!(stored.refresh_token.as_ref().map(StackString::as_str), Some("long-lived"));
        Ok(())
    }
}
