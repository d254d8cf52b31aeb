use axum::{
    Router,
    http::{
        HeaderValue, Method, StatusCode,
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    },
};
use log::{debug, info};
use stack_string::format_sstr;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;

use dashboard_lib::{config::Config, context::AppContext};

use crate::{
    errors::ServiceError as Error,
    routes::{ApiDoc, get_dashboard_path},
};

#[derive(Clone)]
pub struct AppState {
    pub ctx: AppContext,
}

/// # Errors
/// Returns error if `init_config` or context setup fail
pub async fn start_app() -> Result<(), Error> {
    let config = Config::init_config()?;
    let ctx = AppContext::new(config).await?;
    run_app(ctx).await
}

fn cors_layer(config: &Config) -> Result<CorsLayer, Error> {
    let origins = config
        .allowed_origins()
        .iter()
        .map(|o| o.parse::<HeaderValue>())
        .collect::<Result<Vec<_>, _>>()?;
    Ok(CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION, ACCEPT])
        .allow_credentials(true))
}

/// Router with every endpoint plus the generated openapi documents.
///
/// # Errors
/// Returns error if the openapi document cannot be serialized or an origin
/// is not a valid header
pub fn build_router(app: AppState) -> Result<Router, Error> {
    let cors = cors_layer(&app.ctx.config)?;

    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .merge(get_dashboard_path(&app))
        .split_for_parts();

    let api_json = serde_json::to_string_pretty(&api)?;
    let api_yaml = serde_yml::to_string(&api)?;

    let router = router
        .route(
            "/api/openapi/json",
            axum::routing::get(|| async move {
                (
                    StatusCode::OK,
                    [("content-type", "application/json")],
                    api_json,
                )
            }),
        )
        .route(
            "/api/openapi/yaml",
            axum::routing::get(|| async move {
                (StatusCode::OK, [("content-type", "text/yaml")], api_yaml)
            }),
        )
        .layer(cors);
    Ok(router)
}

/// Serve on `listener` until the server fails.
///
/// # Errors
/// Returns error if the router cannot be built or serving fails
pub async fn serve(ctx: AppContext, listener: TcpListener) -> Result<(), Error> {
    let router = build_router(AppState { ctx })?;
    axum::serve(listener, router.into_make_service())
        .await
        .map_err(Into::into)
}

/// Socket address for `host:port`, IPv6 hosts may be given with or without
/// brackets.
///
/// # Errors
/// Returns error if host or port do not form a valid address
pub fn bind_address(host: &str, port: u32) -> Result<SocketAddr, Error> {
    let addr = if host.contains(':') && !host.starts_with('[') {
        format_sstr!("[{host}]:{port}")
    } else {
        format_sstr!("{host}:{port}")
    };
    addr.parse().map_err(Into::into)
}

/// # Errors
/// Returns error if the address cannot be bound or serving fails
pub async fn run_app(ctx: AppContext) -> Result<(), Error> {
    let addr = bind_address(&ctx.config.host, ctx.config.port)?;
    debug!("{addr:?}");
    let listener = TcpListener::bind(&addr).await?;
    info!("{}", ctx.config.summary());
    serve(ctx, listener).await
}

#[cfg(test)]
mod tests {
    use anyhow::Error;
    use reqwest::{Client, StatusCode, redirect::Policy};
    use serde_json::{Value, json};
    use stack_string::{StackString, format_sstr};
    use tempfile::TempDir;
    use tokio::net::TcpListener;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_string_contains, method, path},
    };

    use dashboard_lib::{
        config::{Config, ConfigInner},
        context::AppContext,
    };

    use crate::app::{bind_address, serve};

    async fn spawn_app(config: Config) -> Result<StackString, Error> {
        let ctx = AppContext::new(config).await?;
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        tokio::spawn(async move { serve(ctx, listener).await });
        Ok(format_sstr!("http://127.0.0.1:{port}"))
    }

    #[test]
    fn test_bind_address() -> Result<(), Error> {
        assert_eq!(bind_address("0.0.0.0", 8000)?.to_string(), "0.0.0.0:8000");
        assert_eq!(bind_address("::", 8000)?.to_string(), "[::]:8000");
        assert_eq!(bind_address("[::1]", 8080)?.to_string(), "[::1]:8080");
        assert!(bind_address("0.0.0.0", 70000).is_err());
        Ok(())
    }

    fn test_config(dir: &TempDir) -> ConfigInner {
        ConfigInner {
            database_url: format_sstr!("sqlite:///{}", dir.path().join("http.db").display()),
            gcal_token_file: dir.path().join("token.json"),
            frontend_url: "http://dashboard.local:5173".into(),
            ..ConfigInner::default()
        }
    }

    #[tokio::test]
    async fn test_todo_crud() -> Result<(), Error> {
        let dir = TempDir::new()?;
        let base = spawn_app(test_config(&dir).into()).await?;
        let client = Client::new();

        let response = client
            .post(format_sstr!("{base}/api/todos").as_str())
            .json(&json!({"title": "  "}))
            .send()
            .await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: Value = response.json().await?;
        assert!(body["message"].is_string());

        let response = client
            .post(format_sstr!("{base}/api/todos").as_str())
            .json(&json!({"title": "Buy milk"}))
            .send()
            .await?;
        assert_eq!(response.status(), StatusCode::CREATED);
        let created: Value = response.json().await?;
        assert_eq!(created["created_by"], "web");
        assert_eq!(created["completed"], false);
        let id = created["id"].as_i64().expect("id");

        let fetched: Value = client
            .get(format_sstr!("{base}/api/todos/{id}").as_str())
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        assert_eq!(fetched["title"], "Buy milk");

        let updated: Value = client
            .put(format_sstr!("{base}/api/todos/{id}").as_str())
            .json(&json!({"completed": true}))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        assert_eq!(updated["title"], "Buy milk");
        assert_eq!(updated["completed"], true);

        let response = client
            .put(format_sstr!("{base}/api/todos/{id}").as_str())
            .json(&json!({"title": ""}))
            .send()
            .await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let pending: Vec<Value> = client
            .get(format_sstr!("{base}/api/todos?completed=false").as_str())
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        assert!(pending.is_empty());

        for url in ["/api/todos?completed=maybe", "/api/todos/abc"] {
            let response = client
                .get(format_sstr!("{base}{url}").as_str())
                .send()
                .await?;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            let body: Value = response.json().await?;
            assert!(body["message"].is_string());
        }
        let response = client
            .post(format_sstr!("{base}/api/todos").as_str())
            .header("content-type", "application/json")
            .body("{\"title\": ")
            .send()
            .await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: Value = response.json().await?;
        assert!(body["message"].is_string());

        let response = client
            .delete(format_sstr!("{base}/api/todos/{id}").as_str())
            .send()
            .await?;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = client
            .get(format_sstr!("{base}/api/todos/{id}").as_str())
            .send()
            .await?;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body: Value = response.json().await?;
        assert_eq!(body["message"], "Todo not found");

        let response = client
            .delete(format_sstr!("{base}/api/todos/{id}").as_str())
            .send()
            .await?;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        Ok(())
    }

    #[tokio::test]
    async fn test_calendar_disconnected() -> Result<(), Error> {
        let dir = TempDir::new()?;
        let base = spawn_app(test_config(&dir).into()).await?;
        let client = Client::builder().redirect(Policy::none()).build()?;

        let events: Value = client
            .get(format_sstr!("{base}/api/calendar/events?days=3").as_str())
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        assert_eq!(events, json!({"events": [], "calendar_connected": false}));

        let status: Value = client
            .get(format_sstr!("{base}/api/calendar/status").as_str())
            .send()
            .await?
            .json()
            .await?;
        assert_eq!(status, json!({"connected": false, "calendar_id": null}));

        let events: Value = client
            .get(format_sstr!("{base}/api/calendar/events?days=10000000").as_str())
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        assert_eq!(events, json!({"events": [], "calendar_connected": false}));

        let response = client
            .get(format_sstr!("{base}/api/calendar/auth").as_str())
            .send()
            .await?;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response = client
            .get(format_sstr!("{base}/api/calendar/callback").as_str())
            .send()
            .await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let health: Value = client
            .get(format_sstr!("{base}/health").as_str())
            .send()
            .await?
            .json()
            .await?;
        let response = client
            .get(format_sstr!("{base}/api/calendar/events?days=abc").as_str())
            .send()
            .await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: Value = response.json().await?;
        assert!(body["message"].is_string());

        assert_eq!(
            health,
            json!({"status": "healthy", "telegram_bot": false, "google_calendar": false})
        );

        let api: Value = client
            .get(format_sstr!("{base}/api/openapi/json").as_str())
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        assert!(api["paths"]["/api/todos/{id}"].is_object());
        Ok(())
    }

    #[tokio::test]
    async fn test_oauth_round_trip() -> Result<(), Error> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("code=good-code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "access",
                "refresh_token": "refresh",
                "expires_in": 3600,
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        let dir = TempDir::new()?;
        let config = ConfigInner {
            google_client_id: "client".into(),
            google_client_secret: "secret".into(),
            gcal_token_uri: format_sstr!("{}/token", server.uri()),
            ..test_config(&dir)
        };
        let base = spawn_app(config.into()).await?;
        let client = Client::builder().redirect(Policy::none()).build()?;

        let response = client
            .get(format_sstr!("{base}/api/calendar/auth").as_str())
            .send()
            .await?;
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        let location = response
            .headers()
            .get("location")
            .and_then(|h| h.to_str().ok())
            .unwrap_or_default();
        assert!(location.contains("access_type=offline"));

        let response = client
            .get(format_sstr!("{base}/api/calendar/callback?code=bad-code").as_str())
            .send()
            .await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: Value = response.json().await?;
        assert!(body["message"].as_str().unwrap_or_default().contains("invalid_grant"));

        let response = client
            .get(format_sstr!("{base}/api/calendar/callback?code=good-code").as_str())
            .send()
            .await?;
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(
            response.headers().get("location").and_then(|h| h.to_str().ok()),
            Some("http://dashboard.local:5173?calendar_connected=true")
        );

        let status: Value = client
            .get(format_sstr!("{base}/api/calendar/status").as_str())
            .send()
            .await?
            .json()
            .await?;
        assert_eq!(status, json!({"connected": true, "calendar_id": "primary"}));
        Ok(())
    }
}
