//! edgerelay Server
//!
//! HTTP front end: upgrades requests on the tunnel path to WebSocket relay
//! sessions and answers everything else with a decoy page.

pub mod decoy;
mod ws;

pub use ws::WsTransport;

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::{State, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{debug, info};

use edgerelay_relay::{Dialer, Relay, SessionConfig, TcpDialer};
use edgerelay_settings::{Settings, SettingsError};

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid settings: {0}")]
    Settings(#[from] SettingsError),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP server error: {0}")]
    Serve(std::io::Error),
}

pub type Result<T> = std::result::Result<T, ServerError>;

/// Build the session config described by `settings`
pub fn session_config(settings: &Settings) -> Result<SessionConfig> {
    let token = settings.auth_token()?;
    Ok(SessionConfig::new(&token)
        .with_idle_timeout(settings.relay.idle_timeout())
        .with_connect_timeout(settings.relay.connect_timeout())
        .with_max_pending_bytes(settings.relay.max_pending_bytes))
}

/// Routes `ws_path` to the relay and everything else to the decoy page
pub fn router<D: Dialer>(relay: Relay<D>, ws_path: &str) -> Router {
    Router::new()
        .route(ws_path, any(upgrade::<D>))
        .fallback(decoy::page)
        .with_state(relay)
}

async fn upgrade<D: Dialer>(
    State(relay): State<Relay<D>>,
    request: std::result::Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    match request {
        Ok(ws) => ws
            .on_upgrade(move |socket| async move {
                relay.create_session(WsTransport::new(socket));
            })
            .into_response(),
        Err(rejection) => {
            debug!("Not an upgrade on tunnel path: {}", rejection);
            decoy::page().await
        }
    }
}

/// A bound HTTP listener with its relay
pub struct Server<D: Dialer> {
    listener: TcpListener,
    relay: Relay<D>,
    ws_path: String,
}

impl Server<TcpDialer> {
    /// Validate `settings` and bind the configured address
    pub async fn bind(settings: &Settings) -> Result<Self> {
        settings.validate()?;
        let relay = Relay::new(session_config(settings)?, TcpDialer::new());

        let addr = settings.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;

        Ok(Self::with_relay(listener, relay, &settings.server.ws_path))
    }
}

impl<D: Dialer> Server<D> {
    pub fn with_relay(listener: TcpListener, relay: Relay<D>, ws_path: &str) -> Self {
        Self {
            listener,
            relay,
            ws_path: ws_path.to_string(),
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle on the relay, for watching live sessions
    pub fn relay(&self) -> Relay<D> {
        self.relay.clone()
    }

    /// Serve until `shutdown` resolves
    ///
    /// Stops accepting on shutdown. Sessions already upgraded keep running;
    /// see [`drain`].
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Ok(addr) = self.listener.local_addr() {
            info!("Listening on {} (tunnel path {})", addr, self.ws_path);
        }

        let app = router(self.relay.clone(), &self.ws_path);
        axum::serve(self.listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(ServerError::Serve)?;

        info!("Listener stopped with {} active sessions", self.relay.active_sessions());
        Ok(())
    }
}

/// Bind from `settings` and serve until `shutdown` resolves
pub async fn serve<F>(settings: &Settings, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    Server::bind(settings).await?.run(shutdown).await
}

/// Wait for every session to end, up to `grace`.
///
/// Returns false if sessions were still running when the grace period ran out.
pub async fn drain<D: Dialer>(relay: &Relay<D>, grace: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + grace;
    loop {
        let active = relay.active_sessions();
        if active == 0 {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            info!("{} sessions still active after {:?}", active, grace);
            return false;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::sync::oneshot;

    const TOKEN: &str = "d342d11e-d424-4583-b36e-524ab1f0afa4";

    fn settings() -> Settings {
        let mut settings = Settings::default();
        settings.server.listen_addr = "127.0.0.1".to_string();
        settings.server.port = 0;
        settings.relay.auth_token = Some(TOKEN.to_string());
        settings
    }

    async fn start() -> (SocketAddr, oneshot::Sender<()>, tokio::task::JoinHandle<Result<()>>) {
        let server = Server::bind(&settings()).await.unwrap();
        let addr = server.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.run(async {
            let _ = shutdown_rx.await;
        }));
        (addr, shutdown_tx, handle)
    }

    #[tokio::test]
    async fn test_decoy_on_unknown_path() {
        let (addr, shutdown, handle) = start().await;

        let response = reqwest::get(format!("http://{}/index.html", addr)).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert!(response
            .headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/html"));
        assert!(response.text().await.unwrap().contains("<html"));

        shutdown.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_plain_get_on_tunnel_path_gets_decoy() {
        let (addr, shutdown, handle) = start().await;

        let on_path = reqwest::get(format!("http://{}/ws", addr)).await.unwrap();
        let elsewhere = reqwest::get(format!("http://{}/", addr)).await.unwrap();
        assert_eq!(on_path.status(), reqwest::StatusCode::OK);
        assert_eq!(on_path.text().await.unwrap(), elsewhere.text().await.unwrap());

        shutdown.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_bind_rejects_invalid_settings() {
        let mut bad = settings();
        bad.relay.auth_token = None;
        assert!(matches!(
            Server::bind(&bad).await,
            Err(ServerError::Settings(SettingsError::MissingToken))
        ));
    }

    #[test]
    fn test_session_config_from_settings() {
        let mut settings = settings();
        settings.relay.idle_timeout_secs = 42;
        settings.relay.max_pending_bytes = 512;
        let config = session_config(&settings).unwrap();
        assert_eq!(config.idle_timeout, Duration::from_secs(42));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.max_pending_bytes, 512);
    }

    #[tokio::test]
    async fn test_drain_with_no_sessions() {
        let relay = Relay::new(session_config(&settings()).unwrap(), TcpDialer::new());
        assert!(drain(&relay, Duration::from_millis(10)).await);
    }
}
