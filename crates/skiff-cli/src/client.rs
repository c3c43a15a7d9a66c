use serde_json::Value;

pub fn auth(builder: reqwest::RequestBuilder, token: Option<&String>) -> reqwest::RequestBuilder {
    match token {
        Some(t) => builder.bearer_auth(t),
        None => builder,
    }
}

/// Build an admin API URL from the server base URL.
pub fn admin_url(base: &str, path: &str) -> String {
    format!("{}/admin{}", base.trim_end_matches('/'), path)
}

/// Pull the human-readable message out of an error body, falling back to
/// the raw text.
pub fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            let err = v.get("error")?;
            let code = err.get("code")?.as_str()?;
            let message = err.get("message")?.as_str()?;
            Some(format!("{message} ({code})"))
        })
        .unwrap_or_else(|| body.trim().to_string())
}
