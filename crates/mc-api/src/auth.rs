//! # Authentication & Caller Identity
//!
//! Two independent layers:
//!
//! 1. **Service token.** When `AUTH_TOKEN` is configured, every non-health
//!    route requires `Authorization: Bearer <token>`. This gates the API to
//!    the session layer in front of it.
//! 2. **Caller identity.** The session layer resolves who the end user is and
//!    forwards it as `x-caller-email` and `x-caller-role`. Handlers read it via
//!    the [`CallerIdentity`] extractor (required) or [`MaybeCaller`]
//!    (optional).
//!
//! ```text
//! x-caller-email: boss@example.com
//! x-caller-role:  employer
//! ```

use axum::extract::{FromRequestParts, Request};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use subtle::ConstantTimeEq;

use mc_core::{Identity, Role};

use crate::error::{AppError, ErrorBody, ErrorDetail};

pub const CALLER_EMAIL_HEADER: &str = "x-caller-email";
pub const CALLER_ROLE_HEADER: &str = "x-caller-role";

// ── CallerIdentity ──────────────────────────────────────────────────────────

/// The end user on whose behalf a request is made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub email: Identity,
    pub role: Role,
}

impl CallerIdentity {
    pub fn new(email: Identity, role: Role) -> Self {
        Self { email, role }
    }

    /// `Role` orders `Employee < Employer < Admin`.
    pub fn has_role(&self, minimum: Role) -> bool {
        self.role >= minimum
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Admins act on anything; everyone else only on what `owner` holds.
    pub fn can_act_for(&self, owner: &Identity) -> bool {
        self.is_admin() || &self.email == owner
    }

    /// Parse the caller headers. `Ok(None)` when neither header is present.
    pub fn from_headers(headers: &HeaderMap) -> Result<Option<Self>, AppError> {
        let email = header_str(headers, CALLER_EMAIL_HEADER)?;
        let role = header_str(headers, CALLER_ROLE_HEADER)?;
        match (email, role) {
            (None, None) => Ok(None),
            (Some(email), Some(role)) => {
                let email = Identity::new(email)
                    .map_err(|e| AppError::Unauthorized(format!("invalid caller email: {e}")))?;
                let role = role
                    .parse::<Role>()
                    .map_err(|e| AppError::Unauthorized(format!("invalid caller role: {e}")))?;
                Ok(Some(Self { email, role }))
            }
            (Some(_), None) => Err(AppError::Unauthorized(format!(
                "{CALLER_ROLE_HEADER} header missing"
            ))),
            (None, Some(_)) => Err(AppError::Unauthorized(format!(
                "{CALLER_EMAIL_HEADER} header missing"
            ))),
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<Option<&'a str>, AppError> {
    headers
        .get(name)
        .map(|v| {
            v.to_str()
                .map_err(|_| AppError::Unauthorized(format!("{name} header is not valid text")))
        })
        .transpose()
}

impl<S: Send + Sync> FromRequestParts<S> for CallerIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        CallerIdentity::from_headers(&parts.headers)?
            .ok_or_else(|| AppError::Unauthorized("no caller identity on request".into()))
    }
}

/// Caller identity when the route also serves anonymous callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaybeCaller(pub Option<CallerIdentity>);

impl<S: Send + Sync> FromRequestParts<S> for MaybeCaller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        CallerIdentity::from_headers(&parts.headers).map(MaybeCaller)
    }
}

/// 403 unless the caller holds at least `minimum`.
pub fn require_role(caller: &CallerIdentity, minimum: Role) -> Result<(), AppError> {
    if caller.has_role(minimum) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "role '{}' required, caller has '{}'",
            minimum.as_str(),
            caller.role.as_str()
        )))
    }
}

// ── Service token ───────────────────────────────────────────────────────────

/// Custom `Debug` redacts the token value.
#[derive(Clone)]
pub struct AuthConfig {
    pub token: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Constant-time comparison of bearer tokens.
fn constant_time_token_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

/// Reject requests without the configured bearer token. A no-op when
/// `AuthConfig.token` is `None`.
pub async fn auth_middleware(request: Request, next: Next) -> Response {
    let expected = request
        .extensions()
        .get::<AuthConfig>()
        .and_then(|c| c.token.clone());

    let Some(expected) = expected else {
        return next.run(request).await;
    };

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    match auth_header {
        Some(value) => match value.strip_prefix("Bearer ") {
            Some(provided) if constant_time_token_eq(provided, &expected) => next.run(request).await,
            Some(_) => {
                tracing::warn!("authentication failed: invalid bearer token");
                unauthorized_response("invalid bearer token")
            }
            None => {
                tracing::warn!("authentication failed: non-Bearer authorization scheme");
                unauthorized_response("authorization header must use Bearer scheme")
            }
        },
        None => {
            tracing::warn!("authentication failed: missing authorization header");
            unauthorized_response("missing authorization header")
        }
    }
}

fn unauthorized_response(message: &str) -> Response {
    let body = ErrorBody {
        error: ErrorDetail {
            code: "UNAUTHORIZED".to_string(),
            message: message.to_string(),
            details: None,
        },
    };
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::middleware::from_fn;
    use axum::routing::get;
    use axum::Router;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_app(token: Option<String>) -> Router {
        Router::new()
            .route("/test", get(|| async { "ok" }))
            .route(
                "/whoami",
                get(|caller: CallerIdentity| async move {
                    format!("{}:{}", caller.email, caller.role)
                }),
            )
            .layer(from_fn(auth_middleware))
            .layer(axum::Extension(AuthConfig { token }))
    }

    async fn error_message(response: Response) -> String {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let err: serde_json::Value = serde_json::from_slice(&body).unwrap();
        err["error"]["message"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn valid_bearer_token_accepted() {
        let response = test_app(Some("my-secret".into()))
            .oneshot(
                Request::builder()
                    .uri("/test")
                    .header("Authorization", "Bearer my-secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_authorization_header_rejected() {
        let response = test_app(Some("my-secret".into()))
            .oneshot(Request::builder().uri("/test").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(error_message(response).await.contains("missing"));
    }

    #[tokio::test]
    async fn invalid_token_rejected() {
        let response = test_app(Some("my-secret".into()))
            .oneshot(
                Request::builder()
                    .uri("/test")
                    .header("Authorization", "Bearer wrong-token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(error_message(response).await.contains("invalid"));
    }

    #[tokio::test]
    async fn non_bearer_scheme_rejected() {
        let response = test_app(Some("my-secret".into()))
            .oneshot(
                Request::builder()
                    .uri("/test")
                    .header("Authorization", "Basic dXNlcjpwYXNz")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(error_message(response).await.contains("Bearer scheme"));
    }

    #[tokio::test]
    async fn token_disabled_allows_all_requests() {
        let response = test_app(None)
            .oneshot(Request::builder().uri("/test").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn caller_headers_are_extracted_and_normalized() {
        let response = test_app(None)
            .oneshot(
                Request::builder()
                    .uri("/whoami")
                    .header(CALLER_EMAIL_HEADER, "Boss@Example.com")
                    .header(CALLER_ROLE_HEADER, "Employer")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"boss@example.com:employer");
    }

    #[tokio::test]
    async fn missing_caller_headers_rejected() {
        let response = test_app(None)
            .oneshot(Request::builder().uri("/whoami").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn half_a_caller_is_an_error() {
        let mut headers = HeaderMap::new();
        headers.insert(CALLER_EMAIL_HEADER, "w1@example.com".parse().unwrap());
        assert!(CallerIdentity::from_headers(&headers).is_err());
    }

    #[test]
    fn unknown_role_is_an_error() {
        let mut headers = HeaderMap::new();
        headers.insert(CALLER_EMAIL_HEADER, "w1@example.com".parse().unwrap());
        headers.insert(CALLER_ROLE_HEADER, "guest".parse().unwrap());
        assert!(CallerIdentity::from_headers(&headers).is_err());
    }

    #[test]
    fn absent_caller_is_none() {
        assert_eq!(CallerIdentity::from_headers(&HeaderMap::new()).unwrap(), None);
    }

    #[test]
    fn require_role_checks_privilege_order() {
        let employer = CallerIdentity::new(Identity::new("b@example.com").unwrap(), Role::Employer);
        assert!(require_role(&employer, Role::Employee).is_ok());
        assert!(require_role(&employer, Role::Employer).is_ok());
        assert!(matches!(
            require_role(&employer, Role::Admin),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn can_act_for_owner_or_admin() {
        let owner = Identity::new("b@example.com").unwrap();
        let other = Identity::new("c@example.com").unwrap();
        let employer = CallerIdentity::new(owner.clone(), Role::Employer);
        let admin = CallerIdentity::new(other.clone(), Role::Admin);
        assert!(employer.can_act_for(&owner));
        assert!(!employer.can_act_for(&other));
        assert!(admin.can_act_for(&owner));
    }

    #[test]
    fn auth_config_debug_redacts_token() {
        let debug = format!("{:?}", AuthConfig { token: Some("s3cret".into()) });
        assert!(!debug.contains("s3cret"));
        assert!(debug.contains("REDACTED"));
    }
}
