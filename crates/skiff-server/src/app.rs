use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use skiff_common::auth::admin_auth;

use crate::handlers::admin::{
    cluster_status, deploy_version, deregister_application, get_application, get_model,
    link_application, list_applications, list_models, list_replicas, register_application,
    remove_model, set_active_version, set_replicas, unlink_application,
};
use crate::handlers::healthz;
use crate::handlers::predict::predict;
use crate::metrics::{metrics_handler, track_requests};
use crate::state::AppState;

pub fn build_app(st: AppState) -> Router {
    // Admin control API, behind token auth when configured.
    let admin_routes = Router::new()
        .route(
            "/applications",
            get(list_applications).post(register_application),
        )
        .route(
            "/applications/:name",
            get(get_application).delete(deregister_application),
        )
        .route(
            "/applications/:name/link",
            put(link_application).delete(unlink_application),
        )
        .route("/models", get(list_models))
        .route("/models/:name", get(get_model).delete(remove_model))
        .route("/models/:name/versions", post(deploy_version))
        .route("/models/:name/active", put(set_active_version))
        .route(
            "/models/:name/versions/:version/replicas",
            put(set_replicas),
        )
        .route("/replicas", get(list_replicas))
        .route("/status", get(cluster_status))
        .layer(middleware::from_fn_with_state(
            st.clone(),
            admin_auth::<AppState>,
        ));

    // Query path and probes: no auth.
    let public_routes = Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_handler))
        .route("/:app/predict", post(predict));

    public_routes
        .nest("/admin", admin_routes)
        .layer(middleware::from_fn_with_state(st.clone(), track_requests))
        .with_state(st)
}
