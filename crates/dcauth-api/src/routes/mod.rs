//! HTTP routes

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use dcauth_auth::ldap::AuthRequest;
use dcauth_core::error::ProblemDetails;
use dcauth_core::Error;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error};

use crate::gateway::CheckAuthResponse;
use crate::server::AppState;

/// Error response wrapper
///
/// Client errors become `{"error": code}`; everything else becomes an
/// `application/problem+json` document.
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if self.0.is_client_error() {
            return (status, Json(json!({ "error": self.0.code() }))).into_response();
        }

        error!("Request failed: {}", self.0);
        (
            status,
            [(header::CONTENT_TYPE, "application/problem+json")],
            Json(ProblemDetails::from(&self.0)),
        )
            .into_response()
    }
}

/// `POST /checkAuth` body
#[derive(Deserialize)]
pub struct CheckAuthPayload {
    #[serde(default, alias = "Username")]
    pub username: Option<String>,
    #[serde(default, alias = "Password")]
    pub password: Option<String>,
    #[serde(default, alias = "Domain")]
    pub domain: Option<String>,
}

impl CheckAuthPayload {
    fn into_request(self) -> Result<AuthRequest, Error> {
        match (self.username, self.password) {
            (Some(username), Some(password)) => AuthRequest::new(username, password, self.domain),
            _ => Err(Error::MissingCredentials),
        }
    }
}

/// POST /checkAuth - Authenticate against the directory
pub async fn check_auth(
    State(state): State<AppState>,
    payload: Result<Json<CheckAuthPayload>, JsonRejection>,
) -> Result<Json<CheckAuthResponse>, ApiError> {
    let Json(payload) = payload.map_err(|rejection| {
        debug!("Unusable /checkAuth body: {}", rejection.body_text());
        Error::MissingCredentials
    })?;

    let request = payload.into_request()?;
    let response = state.gateway.handle(request).await?;

    Ok(Json(response))
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": dcauth_core::VERSION,
        "uptime_seconds": state.start_time.elapsed().as_secs(),
    }))
}

#[cfg(test)]
mod tests {
    use crate::gateway::AuthGateway;
    use crate::server::{create_router, AppState};
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        Router,
    };
    use dcauth_auth::testing::{FakeResponse, ScriptedConnector};
    use dcauth_auth::TokenIssuer;
    use dcauth_core::{MapConfigSource, TokenSettings};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Instant;
    use tower::ServiceExt;

    const KEY: &str = "0123456789abcdef0123456789abcdef";

    fn config() -> MapConfigSource {
        MapConfigSource::new()
            .with("DomainController:Url", "ldaps://dc1.example.com")
            .with("Jwt:Key", KEY)
            .with("Jwt:Issuer", "dcauth")
    }

    fn app(config: MapConfigSource, connector: ScriptedConnector) -> Router {
        create_router(AppState {
            gateway: Arc::new(AuthGateway::new(Arc::new(config), Arc::new(connector))),
            metrics: None,
            start_time: Instant::now(),
        })
    }

    async fn post(app: Router, body: &str) -> (StatusCode, Option<String>, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/checkAuth")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, content_type, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_check_auth_success() {
        let app = app(config(), ScriptedConnector::new(vec![FakeResponse::Accept]));
        let (status, _, body) = post(
            app,
            r#"{"username":"alice@example.com","password":"correct"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["authenticated"], json!(true));

        let token = body["token"].as_str().unwrap();
        assert!(!token.is_empty());

        let settings = TokenSettings::from_source(&config()).unwrap();
        let claims = TokenIssuer::new(&settings).unwrap().verify(token).unwrap();
        assert_eq!(claims.sub, "alice@example.com");
        assert_eq!(claims.iss.as_deref(), Some("dcauth"));
    }

    #[tokio::test]
    async fn test_check_auth_rejected() {
        let app = app(config(), ScriptedConnector::accepting("correct"));
        let (status, _, body) = post(
            app,
            r#"{"Username":"bob","Password":"wrong","Domain":"CORP"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "authenticated": false }));
    }

    #[tokio::test]
    async fn test_check_auth_unconfigured_directory() {
        let config = MapConfigSource::new().with("Jwt:Key", KEY);
        let app = app(config, ScriptedConnector::accepting("pw"));
        let (status, content_type, body) =
            post(app, r#"{"username":"alice","password":"pw"}"#).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(content_type.as_deref(), Some("application/problem+json"));
        assert_eq!(body["status"], json!(500));
        assert!(body["detail"]
            .as_str()
            .unwrap()
            .contains("DomainController:Url"));
    }

    #[tokio::test]
    async fn test_check_auth_directory_down() {
        let connector = ScriptedConnector::new(vec![FakeResponse::ConnectError(
            dcauth_auth::ldap::DirectoryError::Connect("Connection refused".into()),
        )]);
        let (status, _, body) = post(
            app(config(), connector),
            r#"{"username":"alice","password":"pw"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.get("authenticated").is_none());
    }

    #[tokio::test]
    async fn test_check_auth_malformed_bodies() {
        for body in [
            "",
            "not json",
            r#"{"password":"pw"}"#,
            r#"{"username":"alice"}"#,
            r#"{"username":"   ","password":"pw"}"#,
        ] {
            let app = app(config(), ScriptedConnector::accepting("pw"));
            let (status, _, response) = post(app, body).await;

            assert_eq!(status, StatusCode::BAD_REQUEST, "{:?}", body);
            assert_eq!(response, json!({ "error": "missing_credentials" }), "{:?}", body);
        }
    }

    #[tokio::test]
    async fn test_health() {
        let app = app(config(), ScriptedConnector::new(vec![]));
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], json!("ok"));
    }

    #[tokio::test]
    async fn test_metrics_disabled() {
        let app = app(config(), ScriptedConnector::new(vec![]));
        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
