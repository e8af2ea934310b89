//! Conversions from external infrastructure errors into domain errors.

use reqwest::Error as HttpError;
use tern_domain::TernError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub TernError);

impl From<InfraError> for TernError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<TernError> for InfraError {
    fn from(value: TernError) -> Self {
        InfraError(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoTernError {
    fn into_tern(self) -> TernError;
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → TernError */
/* -------------------------------------------------------------------------- */

impl IntoTernError for HttpError {
    fn into_tern(self) -> TernError {
        if self.is_timeout() {
            return TernError::NetworkError("HTTP request timed out".into());
        }

        if self.is_connect() {
            return TernError::NetworkError("HTTP connection failure".into());
        }

        if self.is_decode() {
            return TernError::InvalidResponse(format!("failed to decode response body: {self}"));
        }

        if self.is_builder() {
            return TernError::Internal(format!("invalid HTTP request: {self}"));
        }

        if let Some(status) = self.status() {
            let code = status.as_u16();
            let message =
                format!("HTTP {} {}", code, status.canonical_reason().unwrap_or("unknown status"));

            return match code {
                401 => TernError::AccessDenied,
                500..=599 => TernError::ServerError { message },
                _ => TernError::InvalidResponse(message),
            };
        }

        TernError::NetworkError(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(value.into_tern())
    }
}

/* -------------------------------------------------------------------------- */
/* std::io::Error → TernError */
/* -------------------------------------------------------------------------- */

impl IntoTernError for std::io::Error {
    fn into_tern(self) -> TernError {
        use std::io::ErrorKind;

        match self.kind() {
            ErrorKind::NotFound => TernError::Storage(format!("file not found: {self}")),
            ErrorKind::PermissionDenied => TernError::Storage(format!("permission denied: {self}")),
            ErrorKind::AddrInUse | ErrorKind::AddrNotAvailable => {
                TernError::NetworkError(format!("cannot bind local address: {self}"))
            }
            _ => TernError::Storage(self.to_string()),
        }
    }
}

impl From<std::io::Error> for InfraError {
    fn from(value: std::io::Error) -> Self {
        InfraError(value.into_tern())
    }
}

/* -------------------------------------------------------------------------- */
/* serde_json::Error → TernError */
/* -------------------------------------------------------------------------- */

impl IntoTernError for serde_json::Error {
    fn into_tern(self) -> TernError {
        use serde_json::error::Category;

        match self.classify() {
            Category::Io => TernError::Storage(format!("I/O failure while handling JSON: {self}")),
            Category::Syntax | Category::Data | Category::Eof => {
                TernError::Storage(format!("malformed JSON document: {self}"))
            }
        }
    }
}

impl From<serde_json::Error> for InfraError {
    fn from(value: serde_json::Error) -> Self {
        InfraError(value.into_tern())
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use reqwest::{Client, StatusCode};
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[test]
    fn io_errors_map_by_kind() {
        let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "queue.json");
        assert!(matches!(TernError::from(InfraError::from(missing)), TernError::Storage(_)));

        let in_use = std::io::Error::new(std::io::ErrorKind::AddrInUse, "port 8765");
        assert!(matches!(TernError::from(InfraError::from(in_use)), TernError::NetworkError(_)));
    }

    #[test]
    fn malformed_json_maps_to_storage_error() {
        let err = serde_json::from_str::<serde_json::Value>("{ not json").unwrap_err();
        let mapped: TernError = InfraError::from(err).into();
        assert!(matches!(mapped, TernError::Storage(msg) if msg.contains("malformed")));
    }

    #[tokio::test]
    async fn http_status_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(StatusCode::UNAUTHORIZED))
            .mount(&server)
            .await;

        let client = Client::builder().no_proxy().build().unwrap();
        let error = client.get(server.uri()).send().await.unwrap().error_for_status().unwrap_err();

        let mapped: TernError = InfraError::from(error).into();
        assert_eq!(mapped, TernError::AccessDenied);
    }

    #[tokio::test]
    async fn connection_refused_maps_to_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = Client::builder().no_proxy().build().unwrap();
        let error = client.get(format!("http://{addr}")).send().await.unwrap_err();

        let mapped: TernError = InfraError::from(error).into();
        assert!(matches!(mapped, TernError::NetworkError(_)));
    }
}
