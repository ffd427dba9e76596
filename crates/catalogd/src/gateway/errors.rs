//! Maps [`CatalogError`] onto HTTP status codes at the one boundary that
//! needs to know about them; `catalogd-core` itself stays free of any HTTP
//! concept.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use catalogd_core::errors::CatalogError;

pub struct GatewayError(pub CatalogError);

impl From<CatalogError> for GatewayError {
    fn from(err: CatalogError) -> Self {
        Self(err)
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CatalogError::NotFound { .. } => StatusCode::NOT_FOUND,
            CatalogError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            CatalogError::InvalidInput { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            CatalogError::Gone { .. } => StatusCode::GONE,
            CatalogError::Conflict { .. } => StatusCode::CONFLICT,
            CatalogError::TransientInfra { .. } => StatusCode::SERVICE_UNAVAILABLE,
            CatalogError::BuildTool { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            CatalogError::ObjectStore { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            CatalogError::Spec { .. } => StatusCode::BAD_REQUEST,
            CatalogError::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            CatalogError::Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            CatalogError::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.0.to_string()).into_response()
    }
}
