use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

pub const ADMIN_TOKENS_ENV: &str = "SKIFF_ADMIN_TOKENS";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Read-only access to the admin API.
    Viewer,
    /// May also mutate the registry.
    Operator,
}

impl Role {
    pub fn allows(self, required: Role) -> bool {
        matches!(
            (self, required),
            (Role::Operator, _) | (Role::Viewer, Role::Viewer)
        )
    }
}

#[derive(Debug, Clone)]
pub struct AuthContext {
    pub principal: String,
    pub role: Role,
}

#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    pub enabled: bool,
    pub tokens: Arc<HashMap<String, Role>>,
}

impl AuthConfig {
    /// Parse `token:role,token:role`. `None` disables auth.
    pub fn from_spec(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Self::default();
        };

        let mut tokens = HashMap::new();
        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let Some((token, role_raw)) = entry.split_once(':') else {
                tracing::warn!("invalid {ADMIN_TOKENS_ENV} entry, expected token:role");
                continue;
            };
            let role = match role_raw.to_ascii_lowercase().as_str() {
                "viewer" => Role::Viewer,
                "operator" | "admin" => Role::Operator,
                other => {
                    tracing::warn!(role=%other, "unknown role in {ADMIN_TOKENS_ENV}, skipping");
                    continue;
                }
            };
            tokens.insert(token.to_string(), role);
        }

        Self {
            enabled: true,
            tokens: Arc::new(tokens),
        }
    }
}

pub fn parse_auth_from_env() -> AuthConfig {
    let raw = std::env::var(ADMIN_TOKENS_ENV).ok();
    if raw.is_none() {
        tracing::warn!("admin auth disabled: {ADMIN_TOKENS_ENV} not set");
    }
    AuthConfig::from_spec(raw.as_deref())
}

/// Authenticate admin requests and enforce roles: reads need `Viewer`,
/// everything else needs `Operator`.
///
/// Generic over any state type that exposes its `AuthConfig`:
/// `middleware::from_fn_with_state(state, admin_auth::<MyState>)`.
pub async fn admin_auth<S>(
    State(state): State<S>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, std::convert::Infallible>
where
    S: AsRef<AuthConfig> + Clone + Send + Sync + 'static,
{
    let auth = state.as_ref();

    let ctx = if auth.enabled {
        let Some(token) = extract_token(&req) else {
            return Ok(error(StatusCode::UNAUTHORIZED, "missing token"));
        };
        let Some(role) = auth.tokens.get(&token).copied() else {
            return Ok(error(StatusCode::FORBIDDEN, "invalid token"));
        };
        AuthContext {
            principal: token,
            role,
        }
    } else {
        AuthContext {
            principal: "anonymous".into(),
            role: Role::Operator,
        }
    };

    let required = if req.method() == Method::GET {
        Role::Viewer
    } else {
        Role::Operator
    };
    if !ctx.role.allows(required) {
        return Ok(error(StatusCode::FORBIDDEN, "insufficient permissions"));
    }

    req.extensions_mut().insert(ctx);
    Ok(next.run(req).await)
}

fn extract_token(req: &Request<Body>) -> Option<String> {
    req.headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|s| s.to_string())
}

fn error(status: StatusCode, msg: &str) -> Response {
    let code = if status == StatusCode::UNAUTHORIZED {
        "unauthorized"
    } else {
        "forbidden"
    };
    (
        status,
        Json(serde_json::json!({"error": {"code": code, "message": msg}})),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_allows() {
        assert!(Role::Operator.allows(Role::Viewer));
        assert!(Role::Operator.allows(Role::Operator));
        assert!(Role::Viewer.allows(Role::Viewer));
        assert!(!Role::Viewer.allows(Role::Operator));
    }

    #[test]
    fn test_from_spec() {
        let cfg = AuthConfig::from_spec(Some("abc:viewer, def:operator,bad,ghi:root"));
        assert!(cfg.enabled);
        assert_eq!(cfg.tokens.get("abc"), Some(&Role::Viewer));
        assert_eq!(cfg.tokens.get("def"), Some(&Role::Operator));
        assert_eq!(cfg.tokens.len(), 2);

        assert!(!AuthConfig::from_spec(None).enabled);
    }
}
