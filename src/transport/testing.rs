//! In-process WebSocket server for transport tests.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderMap;
use tokio_tungstenite::{WebSocketStream, accept_async, accept_hdr_async};

/// Server-side socket.
pub(crate) type ServerSocket = WebSocketStream<TcpStream>;

/// What the client sent in its opening handshake.
pub(crate) struct Handshake {
    pub path: String,
    pub headers: HeaderMap,
}

/// Loopback listener bound to a random port.
pub(crate) struct TestServer {
    listener: TcpListener,
    addr: SocketAddr,
}

impl TestServer {
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        Self { listener, addr }
    }

    pub fn url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    pub async fn accept(&self) -> ServerSocket {
        let (stream, _) = timeout(Duration::from_secs(5), self.listener.accept())
            .await
            .expect("client should connect")
            .unwrap();
        accept_async(stream).await.unwrap()
    }

    pub async fn accept_with_request(&self) -> (ServerSocket, Handshake) {
        let (stream, _) = timeout(Duration::from_secs(5), self.listener.accept())
            .await
            .expect("client should connect")
            .unwrap();

        let mut captured = None;
        let socket = accept_hdr_async(stream, |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
            captured = Some(Handshake {
                path: request.uri().path().to_string(),
                headers: request.headers().clone(),
            });
            Ok(response)
        })
        .await
        .unwrap();

        (socket, captured.expect("handshake callback ran"))
    }
}

/// Next text frame, skipping control frames. `None` once the socket closes.
pub(crate) async fn next_text(socket: &mut ServerSocket) -> Option<String> {
    loop {
        let frame = timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("frame should arrive")?;
        match frame {
            Ok(Message::Text(text)) => return Some(text.to_string()),
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => continue,
            Ok(Message::Binary(_)) => continue,
            Ok(Message::Close(_)) | Err(_) => return None,
        }
    }
}

/// Next ping payload, skipping everything else.
pub(crate) async fn next_ping(socket: &mut ServerSocket) -> Option<Vec<u8>> {
    loop {
        let frame = timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("frame should arrive")?;
        match frame {
            Ok(Message::Ping(payload)) => return Some(payload.to_vec()),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
}

/// A loopback URL nothing listens on.
pub(crate) async fn unreachable_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("ws://{addr}/ws")
}
