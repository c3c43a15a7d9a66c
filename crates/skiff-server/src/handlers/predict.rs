use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use skiff_common::{PredictRequest, QueryError, RoutingError};

use crate::handlers::error_response;
use crate::state::AppState;

/// POST /:app/predict
pub async fn predict(
    State(st): State<AppState>,
    Path(app): Path<String>,
    body: Result<Json<PredictRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(b) => b,
        Err(rejection) => {
            return error_response(StatusCode::BAD_REQUEST, "invalid_body", &rejection.body_text())
        }
    };

    match st.router.predict(&app, req.input).await {
        Ok(prediction) => {
            // There is no configured default for an application that does
            // not exist, so the fallback carries a null output and a 404.
            let status = match prediction.cause {
                Some(RoutingError::UnknownApplication(_)) => StatusCode::NOT_FOUND,
                _ => StatusCode::OK,
            };
            (status, Json(prediction.response)).into_response()
        }
        Err(e @ QueryError::InvalidInput { .. }) => {
            error_response(StatusCode::BAD_REQUEST, "invalid_input", &e.to_string())
        }
    }
}
