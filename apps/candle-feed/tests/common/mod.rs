//! Shared helpers for integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

/// How long a test waits for something that should happen.
pub const WAIT: Duration = Duration::from_secs(3);

/// In-process WebSocket server that hands every accepted connection to the
/// test.
pub struct WsServer {
    pub url: String,
    accepted: mpsc::UnboundedReceiver<WsConn>,
}

/// Server side of one accepted connection. Dropping it closes the socket.
pub struct WsConn {
    incoming: mpsc::UnboundedReceiver<String>,
    outgoing: mpsc::UnboundedSender<Option<String>>,
}

impl WsServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (accepted_tx, accepted) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                    continue;
                };
                let (incoming_tx, incoming) = mpsc::unbounded_channel();
                let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<Option<String>>();
                if accepted_tx.send(WsConn { incoming, outgoing }).is_err() {
                    break;
                }

                tokio::spawn(async move {
                    let (mut sink, mut stream) = ws.split();
                    loop {
                        tokio::select! {
                            frame = stream.next() => match frame {
                                Some(Ok(Message::Text(text))) => {
                                    let _ = incoming_tx.send(text.as_str().to_owned());
                                }
                                Some(Ok(_)) => {}
                                _ => break,
                            },
                            out = outgoing_rx.recv() => match out {
                                Some(Some(text)) => {
                                    if sink.send(Message::Text(text.into())).await.is_err() {
                                        break;
                                    }
                                }
                                _ => {
                                    let _ = sink.close().await;
                                    break;
                                }
                            },
                        }
                    }
                });
            }
        });

        Self {
            url: format!("ws://{addr}"),
            accepted,
        }
    }

    /// Next accepted connection.
    pub async fn accept(&mut self) -> WsConn {
        timeout(WAIT, self.accepted.recv())
            .await
            .expect("no connection accepted")
            .expect("server stopped")
    }
}

impl WsConn {
    /// Next text frame from the client, parsed as JSON.
    pub async fn recv_json(&mut self) -> Value {
        let text = timeout(WAIT, self.incoming.recv())
            .await
            .expect("no frame received")
            .expect("connection closed");
        serde_json::from_str(&text).unwrap()
    }

    /// Assert the client sends nothing for `window`.
    pub async fn expect_silence(&mut self, window: Duration) {
        if let Ok(Some(text)) = timeout(window, self.incoming.recv()).await {
            panic!("unexpected frame: {text}");
        }
    }

    /// Send a JSON frame to the client.
    pub fn send_json(&self, value: &Value) {
        self.outgoing.send(Some(value.to_string())).unwrap();
    }

    /// Close the connection from the server side.
    pub fn close(&self) {
        let _ = self.outgoing.send(None);
    }
}
