//! Thin HTTP layer over `reqwest`.
//!
//! Owns the hard per-request timeout and the mapping from transport/status
//! failures into the [`ApiError`] taxonomy, so the gateways never touch
//! `reqwest` error types directly.

use crate::error::{ApiError, ProviderErrorKind};
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpClient {
    pub fn new(timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Network { service: "http", message: e.to_string() })?;
        Ok(Self { client, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// GET `url` with query parameters and decode the JSON body.
    pub async fn get_json(
        &self,
        service: &'static str,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<Value, ApiError> {
        tracing::debug!(service, url, "outbound request");

        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| self.map_transport_error(service, e))?;

        let status = response.status();
        if let Some(kind) = status_error_kind(status) {
            tracing::debug!(service, status = %status, "provider error");
            return Err(ApiError::Provider { service, kind });
        }

        response.json::<Value>().await.map_err(|_| ApiError::Provider {
            service,
            kind: ProviderErrorKind::Malformed,
        })
    }

    fn map_transport_error(&self, service: &'static str, e: reqwest::Error) -> ApiError {
        if e.is_timeout() {
            ApiError::Timeout { service, timeout: self.timeout }
        } else {
            ApiError::Network { service, message: e.to_string() }
        }
    }
}

fn status_error_kind(status: StatusCode) -> Option<ProviderErrorKind> {
    if status.is_success() {
        return None;
    }
    Some(match status {
        StatusCode::UNAUTHORIZED => ProviderErrorKind::Unauthorized,
        StatusCode::FORBIDDEN => ProviderErrorKind::Forbidden,
        StatusCode::NOT_FOUND => ProviderErrorKind::NotFound,
        StatusCode::TOO_MANY_REQUESTS => ProviderErrorKind::RateLimited,
        s if s.is_server_error() => ProviderErrorKind::ServerError,
        _ => ProviderErrorKind::Malformed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_covers_the_taxonomy() {
        assert_eq!(status_error_kind(StatusCode::OK), None);
        assert_eq!(status_error_kind(StatusCode::CREATED), None);
        assert_eq!(
            status_error_kind(StatusCode::UNAUTHORIZED),
            Some(ProviderErrorKind::Unauthorized)
        );
        assert_eq!(status_error_kind(StatusCode::FORBIDDEN), Some(ProviderErrorKind::Forbidden));
        assert_eq!(status_error_kind(StatusCode::NOT_FOUND), Some(ProviderErrorKind::NotFound));
        assert_eq!(
            status_error_kind(StatusCode::TOO_MANY_REQUESTS),
            Some(ProviderErrorKind::RateLimited)
        );
        assert_eq!(
            status_error_kind(StatusCode::INTERNAL_SERVER_ERROR),
            Some(ProviderErrorKind::ServerError)
        );
        assert_eq!(
            status_error_kind(StatusCode::BAD_GATEWAY),
            Some(ProviderErrorKind::ServerError)
        );
        assert_eq!(status_error_kind(StatusCode::IM_A_TEAPOT), Some(ProviderErrorKind::Malformed));
    }

    #[test]
    fn client_builds_with_timeout() {
        let client = HttpClient::new(Duration::from_secs(30)).unwrap();
        assert_eq!(client.timeout(), Duration::from_secs(30));
    }
}
