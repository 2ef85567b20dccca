//! Response construction.
//!
//! # Responsibilities
//! - Fixed responses for endpoints declared in configuration

use axum::body::Bytes;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::config::schema::EndpointConfig;

/// A fixed response served by a configured endpoint.
#[derive(Debug, Clone)]
pub struct StaticResponse {
    status: StatusCode,
    content_type: HeaderValue,
    body: Bytes,
}

impl StaticResponse {
    /// Build from a configured endpoint. Values that fail to parse fall back
    /// to `200 OK` and `text/plain`; validation rejects them earlier.
    pub fn from_config(config: &EndpointConfig) -> Self {
        Self {
            status: StatusCode::from_u16(config.status).unwrap_or(StatusCode::OK),
            content_type: HeaderValue::from_str(&config.content_type)
                .unwrap_or_else(|_| HeaderValue::from_static("text/plain; charset=utf-8")),
            body: Bytes::from(config.body.clone()),
        }
    }
}

impl IntoResponse for StaticResponse {
    fn into_response(self) -> Response {
        (
            self.status,
            [(header::CONTENT_TYPE, self.content_type)],
            self.body,
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_on_unparseable_values() {
        let config = EndpointConfig {
            name: "odd".into(),
            methods: None,
            paths: None,
            status: 42,
            body: "x".into(),
            content_type: "bad\nvalue".into(),
        };
        let response = StaticResponse::from_config(&config).into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
    }
}
