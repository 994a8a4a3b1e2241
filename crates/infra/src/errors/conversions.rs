//! Conversions from external infrastructure errors into domain errors.

use reqwest::Error as HttpError;
use sgsync_domain::{SgsyncError, TransportError, TransportErrorKind};

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub SgsyncError);

impl From<InfraError> for SgsyncError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<SgsyncError> for InfraError {
    fn from(value: SgsyncError) -> Self {
        InfraError(value)
    }
}

/// Classify a failed exchange for the core [`Transport`] port.
///
/// [`Transport`]: sgsync_core::Transport
pub trait IntoTransportError {
    fn into_transport(self) -> TransportError;
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → TransportError */
/* -------------------------------------------------------------------------- */

impl IntoTransportError for HttpError {
    fn into_transport(self) -> TransportError {
        if self.is_timeout() {
            return TransportError::timeout("HTTP request timed out");
        }

        if self.is_connect() {
            return TransportError::connect(format!("HTTP connection failure: {self}"));
        }

        if self.is_body() || self.is_decode() {
            return TransportError::new(
                TransportErrorKind::Body,
                format!("failed to read response body: {self}"),
            );
        }

        TransportError::new(TransportErrorKind::Request, self.to_string())
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → SgsyncError */
/* -------------------------------------------------------------------------- */

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        if value.is_builder() {
            return InfraError(SgsyncError::Config(format!(
                "invalid HTTP client settings: {value}"
            )));
        }
        InfraError(SgsyncError::Network(value.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::time::Duration;

    use reqwest::Client;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn slow_response_maps_to_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let client =
            Client::builder().timeout(Duration::from_millis(50)).no_proxy().build().unwrap();
        let error = client.get(server.uri()).send().await.unwrap_err();

        let mapped = error.into_transport();
        assert_eq!(mapped.kind, TransportErrorKind::Timeout);
        assert_eq!(mapped.message, "HTTP request timed out");
    }

    #[tokio::test]
    async fn refused_connection_maps_to_connect() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = Client::builder().no_proxy().build().unwrap();
        let error = client.get(format!("http://{addr}")).send().await.unwrap_err();

        let mapped = error.into_transport();
        assert_eq!(mapped.kind, TransportErrorKind::Connect);
        assert!(mapped.message.starts_with("HTTP connection failure"));
    }

    #[test]
    fn invalid_request_url_is_config_error() {
        let error = Client::new().get("not a url").build().unwrap_err();

        let mapped: SgsyncError = InfraError::from(error).into();
        assert!(matches!(
            mapped,
            SgsyncError::Config(msg) if msg.starts_with("invalid HTTP client settings")
        ));
    }
}
