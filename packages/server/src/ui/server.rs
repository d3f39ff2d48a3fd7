//! Server execution logic.

use std::sync::Arc;

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::{
    config::HubConfig,
    infrastructure::registry::RoomRegistry,
    usecase::{ConnectParticipantUseCase, DisconnectParticipantUseCase, EventDispatcher},
};

use super::{
    handler::{debug_registry_state, health_check, websocket_handler},
    signal::shutdown_signal,
    state::AppState,
};

/// WebSocket chat hub server
///
/// # Example
///
/// ```ignore
/// let server = Server::new(
///     connect_participant_usecase,
///     disconnect_participant_usecase,
///     dispatcher,
///     registry,
///     config,
/// );
/// server.run("127.0.0.1".to_string(), 8080).await?;
/// ```
pub struct Server {
    state: Arc<AppState>,
}

impl Server {
    /// Create a new Server instance
    ///
    /// # Arguments
    ///
    /// * `connect_participant_usecase` - UseCase for admitting connections
    /// * `disconnect_participant_usecase` - UseCase for evicting connections
    /// * `dispatcher` - Routes inbound events to their UseCase
    /// * `registry` - Connection registry, read by the debug endpoint
    /// * `config` - Hub tunables
    pub fn new(
        connect_participant_usecase: Arc<ConnectParticipantUseCase>,
        disconnect_participant_usecase: Arc<DisconnectParticipantUseCase>,
        dispatcher: Arc<EventDispatcher>,
        registry: Arc<RoomRegistry>,
        config: HubConfig,
    ) -> Self {
        Self {
            state: Arc::new(AppState {
                connect_participant_usecase,
                disconnect_participant_usecase,
                dispatcher,
                registry,
                config,
            }),
        }
    }

    /// Build the router without binding a socket
    pub fn router(&self) -> Router {
        Router::new()
            // WebSocket エンドポイント
            .route("/ws", get(websocket_handler))
            // HTTP エンドポイント
            .route("/api/health", get(health_check))
            .route("/debug/registry", get(debug_registry_state))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Run the WebSocket chat hub
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to the specified address or
    /// if there's an error during server execution.
    pub async fn run(self, host: String, port: u16) -> Result<(), Box<dyn std::error::Error>> {
        let app = self.router();

        // Bind the server to the host and port
        let bind_addr = format!("{}:{}", host, port);
        let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

        tracing::info!("Chat hub listening on {}", listener.local_addr()?);
        tracing::info!("Connect to: ws://{}/ws?user_id=<id>", bind_addr);
        tracing::info!("Press Ctrl+C to shutdown gracefully");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server shutdown complete");

        Ok(())
    }
}
