//! Shared harness: a relay server on an ephemeral port plus TCP peers

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use edgerelay_core::AuthToken;
use edgerelay_relay::{Relay, SessionConfig, TcpDialer};
use edgerelay_server::Server;

pub const TOKEN: &str = "d342d11e-d424-4583-b36e-524ab1f0afa4";
pub const WS_PATH: &str = "/ws";

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .try_init();
}

pub fn token() -> AuthToken {
    TOKEN.parse().unwrap()
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub relay: Relay<TcpDialer>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with(SessionConfig::new(&token())).await
    }

    pub async fn start_with(config: SessionConfig) -> Self {
        init_tracing();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let relay = Relay::new(config, TcpDialer::new());
        let server = Server::with_relay(listener, relay.clone(), WS_PATH);
        let addr = server.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            server
                .run(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            relay,
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn connect(&self) -> Client {
        let (ws, _) = connect_async(format!("ws://{}{}", self.addr, WS_PATH)).await.unwrap();
        ws
    }

    /// Wait until exactly `n` sessions are live
    pub async fn wait_sessions(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.relay.active_sessions() != n {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("session count did not settle");
    }

    pub async fn wait_idle(&self) {
        self.wait_sessions(0).await;
    }

    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
        }
    }
}

/// TCP server echoing every connection back to itself
pub async fn echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = stream.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });
    addr
}

/// TCP server that sends `greeting` and then closes each connection
pub async fn greeting_server(greeting: &'static [u8]) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let _ = stream.write_all(greeting).await;
            let _ = stream.shutdown().await;
        }
    });
    addr
}

/// Echo server that reports each connection's full input once it hits EOF
pub async fn recording_echo_server() -> (SocketAddr, tokio::sync::mpsc::UnboundedReceiver<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut received = Vec::new();
                let mut buf = [0u8; 4096];
                loop {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            received.extend_from_slice(&buf[..n]);
                            if stream.write_all(&buf[..n]).await.is_err() {
                                break;
                            }
                        }
                    }
                }
                let _ = tx.send(received);
            });
        }
    });
    (addr, rx)
}

/// An address nothing listens on
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

pub async fn send_binary(ws: &mut Client, data: Vec<u8>) {
    ws.send(Message::Binary(data.into())).await.unwrap();
}

/// Collect binary messages until `n` bytes arrived
pub async fn read_bytes(ws: &mut Client, n: usize) -> Vec<u8> {
    let mut out = Vec::new();
    while out.len() < n {
        match tokio::time::timeout(Duration::from_secs(5), ws.next()).await.unwrap() {
            Some(Ok(Message::Binary(data))) => out.extend_from_slice(&data),
            Some(Ok(Message::Pong(_))) => continue,
            other => panic!("expected binary data, got {:?}", other),
        }
    }
    out
}

/// Skip data frames until the close frame and return its code
pub async fn close_code(ws: &mut Client) -> u16 {
    loop {
        match tokio::time::timeout(Duration::from_secs(5), ws.next()).await.unwrap() {
            Some(Ok(Message::Close(Some(frame)))) => {
                assert!(frame.reason.is_empty());
                return u16::from(frame.code);
            }
            Some(Ok(Message::Binary(_))) => continue,
            other => panic!("expected close frame, got {:?}", other),
        }
    }
}
