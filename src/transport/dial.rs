//! Opening handshake.
//!
//! Used for both the initial connect and every reconnect attempt.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Once;

use futures_util::stream::{SplitSink, SplitStream};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info};

use crate::error::{Error, Result};

use super::config::ConnectionConfig;

// ============================================================================
// Types
// ============================================================================

/// Client WebSocket stream (plain or TLS).
pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Write half of a [`WsStream`].
pub(crate) type WsSink = SplitSink<WsStream, Message>;

/// Read half of a [`WsStream`].
pub(crate) type WsSource = SplitStream<WsStream>;

// ============================================================================
// TLS
// ============================================================================

static CRYPTO_PROVIDER: Once = Once::new();

/// Installs the process-wide rustls provider once.
fn ensure_crypto_provider() {
    CRYPTO_PROVIDER.call_once(|| {
        // Another component may have installed one already.
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

// ============================================================================
// Handshake
// ============================================================================

/// Builds the handshake request: URL plus every configured header.
///
/// Repeated header names are appended, not replaced.
pub(crate) fn build_request(config: &ConnectionConfig) -> Result<Request> {
    let mut request = config
        .url
        .as_str()
        .into_client_request()
        .map_err(|e| Error::dial(&config.url, e.to_string()))?;

    let headers = request.headers_mut();
    for (name, value) in &config.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::dial(&config.url, format!("header {name:?}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| Error::dial(&config.url, format!("header {name}: {e}")))?;
        headers.append(name, value);
    }

    Ok(request)
}

/// Performs the opening handshake within the configured timeout.
///
/// # Errors
///
/// Returns [`Error::Dial`] if the request cannot be built, the handshake
/// fails, or it does not complete within `handshake_timeout`.
pub(crate) async fn dial(config: &ConnectionConfig) -> Result<WsStream> {
    ensure_crypto_provider();
    let request = build_request(config)?;

    debug!(url = %config.url, "Dialing");

    let outcome = timeout(config.handshake_timeout, connect_async(request))
        .await
        .map_err(|_| {
            Error::dial(
                &config.url,
                format!(
                    "handshake timed out after {}ms",
                    config.handshake_timeout.as_millis()
                ),
            )
        })?;

    match outcome {
        Ok((stream, response)) => {
            if config.dump {
                dump_response(
                    &config.url,
                    response.status(),
                    response.headers(),
                    response.body().as_deref(),
                );
            }
            debug!(url = %config.url, status = %response.status(), "Handshake complete");
            Ok(stream)
        }
        Err(e) => {
            if config.dump
                && let WsError::Http(response) = &e
            {
                dump_response(
                    &config.url,
                    response.status(),
                    response.headers(),
                    response.body().as_deref(),
                );
            }
            Err(Error::dial(&config.url, e.to_string()))
        }
    }
}

/// Logs a handshake response in full.
fn dump_response(url: &str, status: StatusCode, headers: &HeaderMap, body: Option<&[u8]>) {
    let mut rendered = format!("HTTP/1.1 {status}\r\n");
    for (name, value) in headers {
        rendered.push_str(name.as_str());
        rendered.push_str(": ");
        rendered.push_str(&String::from_utf8_lossy(value.as_bytes()));
        rendered.push_str("\r\n");
    }
    rendered.push_str("\r\n");
    if let Some(body) = body {
        rendered.push_str(&String::from_utf8_lossy(body));
    }

    info!(url, response = %rendered, "Handshake response");
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use crate::transport::testing::{TestServer, unreachable_url};

    #[test]
    fn test_build_request_appends_repeated_headers() {
        let config = ConnectionConfig::new("ws://127.0.0.1:9/ws")
            .with_header("X-Tag", "a")
            .with_header("X-Tag", "b");

        let request = build_request(&config).unwrap();
        let values: Vec<_> = request
            .headers()
            .get_all("x-tag")
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();

        assert_eq!(values, vec!["a", "b"]);
        assert_eq!(request.uri().path(), "/ws");
    }

    #[test]
    fn test_build_request_rejects_bad_url() {
        let config = ConnectionConfig::new("not a url");
        assert!(matches!(build_request(&config), Err(Error::Dial { .. })));
    }

    #[tokio::test]
    async fn test_dial_unreachable() {
        let config = ConnectionConfig::new(unreachable_url().await)
            .with_handshake_timeout(Duration::from_secs(2));

        let err = dial(&config).await.unwrap_err();
        assert!(matches!(err, Error::Dial { .. }));
    }

    #[tokio::test]
    async fn test_dial_sends_headers() {
        let server = TestServer::bind().await;
        let config = ConnectionConfig::new(server.url("/stream"))
            .with_header("X-Api-Key", "secret")
            .with_dump();

        let (dialed, accepted) = tokio::join!(dial(&config), server.accept_with_request());
        assert!(dialed.is_ok());

        let (_socket, handshake) = accepted;
        assert_eq!(handshake.path, "/stream");
        assert_eq!(handshake.headers["x-api-key"], "secret");
    }
}
