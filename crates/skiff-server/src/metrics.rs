use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::state::AppState;

#[derive(Debug, Default)]
pub struct Metrics {
    pub requests_total: AtomicU64,
    pub requests_inflight: AtomicU64,
    pub status_2xx: AtomicU64,
    pub status_4xx: AtomicU64,
    pub status_5xx: AtomicU64,
    /// Admin changes applied in memory but not written to the state store.
    pub persistence_errors: AtomicU64,
}

/// GET /metrics, Prometheus text exposition format.
pub async fn metrics_handler(State(st): State<AppState>) -> impl IntoResponse {
    let m = &st.metrics;
    let mut body = String::new();
    for (name, kind, help, value) in [
        ("skiff_http_requests_total", "counter", "HTTP requests served.", &m.requests_total),
        ("skiff_http_requests_inflight", "gauge", "HTTP requests in progress.", &m.requests_inflight),
        ("skiff_http_responses_2xx", "counter", "2xx responses.", &m.status_2xx),
        ("skiff_http_responses_4xx", "counter", "4xx responses.", &m.status_4xx),
        ("skiff_http_responses_5xx", "counter", "5xx responses.", &m.status_5xx),
        (
            "skiff_persistence_errors_total",
            "counter",
            "Registry changes that failed to persist.",
            &m.persistence_errors,
        ),
    ] {
        let _ = write!(
            body,
            "# HELP {name} {help}\n# TYPE {name} {kind}\n{name} {}\n",
            value.load(Ordering::Relaxed)
        );
    }
    st.router.metrics().render(&mut body);
    st.lifecycle.metrics().render(&mut body);
    (StatusCode::OK, body)
}

pub async fn track_requests(
    State(st): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, std::convert::Infallible> {
    st.metrics.requests_inflight.fetch_add(1, Ordering::Relaxed);
    let resp = next.run(req).await;
    st.metrics.requests_inflight.fetch_sub(1, Ordering::Relaxed);
    st.metrics.requests_total.fetch_add(1, Ordering::Relaxed);

    let status = resp.status().as_u16();
    if status >= 500 {
        st.metrics.status_5xx.fetch_add(1, Ordering::Relaxed);
    } else if status >= 400 {
        st.metrics.status_4xx.fetch_add(1, Ordering::Relaxed);
    } else if status >= 200 {
        st.metrics.status_2xx.fetch_add(1, Ordering::Relaxed);
    }

    Ok(resp)
}
