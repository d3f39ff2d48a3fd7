//! Hiroba chat hub server.
//!
//! Accepts WebSocket connections on `/ws?user_id=<id>`, lets each connection
//! join one room at a time and fans messages and typing signals out to the
//! members of that room.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin hiroba-server
//! cargo run --bin hiroba-server -- --host 0.0.0.0 --port 3000 --seed-rooms general,random
//! ```

use std::{sync::Arc, time::Duration};

use clap::Parser;
use hiroba_server::{
    config::{HubConfig, OverflowPolicy},
    domain::RoomKind,
    infrastructure::{registry::RoomRegistry, repository::InMemoryChatStore},
    ui::Server,
    usecase::{
        ConnectParticipantUseCase, DisconnectParticipantUseCase, EventDispatcher,
        JoinRoomUseCase, SendMessageUseCase, TypingUseCase,
    },
};
use hiroba_shared::{logger::setup_logger, time::SystemClock};

#[derive(Parser, Debug)]
#[command(name = "hiroba-server")]
#[command(about = "Room-based WebSocket chat hub", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, default_value = "8080")]
    port: u16,

    /// Frames each connection may have queued before fan-out skips it
    #[arg(long, default_value = "256")]
    outbound_capacity: usize,

    /// Seconds without a pong before a connection is dropped
    #[arg(long, default_value = "60")]
    read_timeout_secs: u64,

    /// Seconds between pings; must be shorter than the read timeout
    #[arg(long, default_value = "54")]
    ping_interval_secs: u64,

    /// Upper bound on a single socket write, in seconds
    #[arg(long, default_value = "10")]
    write_timeout_secs: u64,

    /// Messages sent in the history event after a join (1..=100)
    #[arg(long, default_value = "50")]
    history_limit: usize,

    /// Largest inbound frame accepted, in bytes
    #[arg(long, default_value = "524288")]
    max_message_size: usize,

    /// What to do with a member whose outbound queue is full
    #[arg(long, value_enum, default_value_t = OverflowPolicy::Drop)]
    overflow_policy: OverflowPolicy,

    /// Comma separated names of rooms created at startup
    #[arg(long, value_delimiter = ',', default_value = "general")]
    seed_rooms: Vec<String>,
}

impl Args {
    fn hub_config(&self) -> HubConfig {
        HubConfig {
            outbound_capacity: self.outbound_capacity,
            read_timeout: Duration::from_secs(self.read_timeout_secs),
            ping_interval: Duration::from_secs(self.ping_interval_secs),
            write_timeout: Duration::from_secs(self.write_timeout_secs),
            history_limit: self.history_limit,
            max_message_size: self.max_message_size,
            overflow_policy: self.overflow_policy,
        }
    }
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "info");

    let args = Args::parse();
    let config = match args.hub_config().validate() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize dependencies in order:
    // 1. ChatStore
    // 2. RoomRegistry
    // 3. UseCases
    // 4. EventDispatcher
    // 5. Server

    // 1. Create ChatStore (in-memory) and seed rooms
    let clock = Arc::new(SystemClock);
    let store = Arc::new(InMemoryChatStore::new(clock.clone()));
    for name in args.seed_rooms.iter().filter(|name| !name.trim().is_empty()) {
        match store.create_room(name.trim(), RoomKind::Group).await {
            Ok(room) => tracing::info!("Room {} '{}' created!", room.id, room.name),
            Err(e) => {
                tracing::error!("Failed to seed room '{}': {}", name, e);
                std::process::exit(1);
            }
        }
    }

    // 2. Create RoomRegistry
    let registry = Arc::new(RoomRegistry::new(clock, config.overflow_policy));

    // 3. Create UseCases
    let connect_participant_usecase = Arc::new(ConnectParticipantUseCase::new(
        registry.clone(),
        config.outbound_capacity,
    ));
    let disconnect_participant_usecase =
        Arc::new(DisconnectParticipantUseCase::new(registry.clone()));
    let join_room_usecase = Arc::new(JoinRoomUseCase::new(
        store.clone(),
        registry.clone(),
        config.history_limit,
    ));
    let send_message_usecase = Arc::new(SendMessageUseCase::new(store, registry.clone()));
    let typing_usecase = Arc::new(TypingUseCase::new(registry.clone()));

    // 4. Create EventDispatcher
    let dispatcher = Arc::new(EventDispatcher::new(
        join_room_usecase,
        send_message_usecase,
        typing_usecase,
        registry.clone(),
    ));

    // 5. Create and run the server
    let server = Server::new(
        connect_participant_usecase,
        disconnect_participant_usecase,
        dispatcher,
        registry,
        config,
    );
    if let Err(e) = server.run(args.host, args.port).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
