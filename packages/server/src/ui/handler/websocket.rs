//! WebSocket connection handlers.
//!
//! Each connection runs two tasks:
//!
//! - reader loop: decodes inbound frames and hands them to the dispatcher;
//!   the read deadline is pushed back on every pong
//! - writer loop: drains the outbound queue onto the socket and pings on a
//!   fixed interval; every write is bounded by the write timeout
//!
//! Eviction is the one teardown signal. It stops the writer without
//! flushing the backlog; the writer sends a close frame and exits, the
//! reader is aborted and the socket is dropped.

use std::{fmt::Display, sync::Arc, time::Duration};

use axum::{
    body::Bytes,
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::IntoResponse,
};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde::Deserialize;
use thiserror::Error;
use tokio::time::{Instant, MissedTickBehavior, interval_at, timeout, timeout_at};

use crate::{
    domain::{ConnectionContext, OutboundReceiver, UserId},
    ui::state::AppState,
    usecase::EventDispatcher,
};

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    pub user_id: Option<String>,
}

/// Why the reader loop stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderExit {
    /// The peer sent a close frame or the stream ended
    Closed,
    /// No pong within the read timeout
    TimedOut,
    /// Transport error, including an oversized frame
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WriteError {
    #[error("write did not complete within {0:?}")]
    TimedOut(Duration),

    #[error("socket write failed: {0}")]
    Socket(String),
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConnectQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let Some(raw_user_id) = query.user_id else {
        tracing::warn!("Rejecting connection without user_id");
        return Err(StatusCode::BAD_REQUEST);
    };

    // Convert String -> UserId (Domain Model)
    let user_id = match raw_user_id.parse::<i64>().ok().map(UserId::new) {
        Some(Ok(id)) => id,
        _ => {
            tracing::warn!("Invalid user_id: '{}'", raw_user_id);
            return Err(StatusCode::BAD_REQUEST);
        }
    };

    let max_message_size = state.config.max_message_size;
    Ok(ws
        .max_message_size(max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, state, user_id)))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, user_id: UserId) {
    let (context, queue) = state.connect_participant_usecase.execute(user_id).await;
    let (sink, stream) = socket.split();
    serve_connection(stream, sink, state, context, queue).await;
}

/// Run the reader and writer of an admitted connection until one of them
/// ends, then stop the other and evict the connection.
pub async fn serve_connection<St, Si, E>(
    stream: St,
    sink: Si,
    state: Arc<AppState>,
    context: ConnectionContext,
    queue: OutboundReceiver,
) where
    St: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
    E: Display + Send + 'static,
    Si: Sink<Message> + Unpin + Send + 'static,
    Si::Error: Display + Send,
{
    let ping_interval = state.config.ping_interval;
    let write_timeout = state.config.write_timeout;
    let mut writer = tokio::spawn(writer_loop(sink, queue, ping_interval, write_timeout));

    let read_timeout = state.config.read_timeout;
    let reader_state = state.clone();
    let mut reader = tokio::spawn(async move {
        reader_loop(stream, &reader_state.dispatcher, context, read_timeout).await
    });

    let reader_finished_first = tokio::select! {
        exit = &mut reader => {
            match exit {
                Ok(exit) => tracing::info!("Reader of connection '{}' stopped: {:?}", context.id, exit),
                Err(e) => tracing::error!("Reader of connection '{}' panicked: {}", context.id, e),
            }
            true
        }
        result = &mut writer => {
            match result {
                Ok(Ok(())) => tracing::info!("Writer of connection '{}' finished", context.id),
                Ok(Err(e)) => tracing::warn!("Writer of connection '{}' failed: {}", context.id, e),
                Err(e) => tracing::error!("Writer of connection '{}' panicked: {}", context.id, e),
            }
            false
        }
    };

    if reader_finished_first {
        // Evicting stops the writer; it sends a close frame and exits
        state.disconnect_participant_usecase.execute(&context).await;
        if let Ok(Err(e)) = writer.await {
            tracing::debug!("Writer of connection '{}' ended with: {}", context.id, e);
        }
    } else {
        // Evicted (or the socket failed): stop reading from this peer right away
        reader.abort();
        let _ = reader.await;
        state.disconnect_participant_usecase.execute(&context).await;
    }
}

/// Read frames until the peer goes away or stops answering pings.
pub async fn reader_loop<S, E>(
    mut stream: S,
    dispatcher: &EventDispatcher,
    context: ConnectionContext,
    read_timeout: Duration,
) -> ReaderExit
where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let mut deadline = Instant::now() + read_timeout;
    loop {
        let frame = match timeout_at(deadline, stream.next()).await {
            Err(_) => return ReaderExit::TimedOut,
            Ok(None) => return ReaderExit::Closed,
            Ok(Some(Err(e))) => return ReaderExit::Failed(e.to_string()),
            Ok(Some(Ok(frame))) => frame,
        };

        match frame {
            Message::Text(text) => {
                tracing::debug!("Received from '{}': {}", context.id, text.as_str());
                dispatcher.handle_text_frame(&context, text.as_str()).await;
            }
            Message::Pong(_) => deadline = Instant::now() + read_timeout,
            Message::Close(_) => {
                tracing::info!("Connection '{}' requested close", context.id);
                return ReaderExit::Closed;
            }
            Message::Binary(_) => {
                tracing::debug!("Ignoring binary frame from '{}'", context.id);
            }
            // Answered by the transport
            Message::Ping(_) => {}
        }
    }
}

/// Drain the outbound queue onto `sink` and keep the peer alive with pings.
///
/// Returns `Ok(())` after writing a close frame once the connection is
/// evicted (backlog discarded) or its queue is closed and drained.
pub async fn writer_loop<S>(
    mut sink: S,
    mut queue: OutboundReceiver,
    ping_interval: Duration,
    write_timeout: Duration,
) -> Result<(), WriteError>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let mut ticker = interval_at(Instant::now() + ping_interval, ping_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            frame = queue.recv() => match frame {
                Some(text) => write_frame(&mut sink, Message::Text(text.into()), write_timeout).await?,
                None => {
                    write_frame(&mut sink, Message::Close(None), write_timeout).await?;
                    return Ok(());
                }
            },
            _ = ticker.tick() => {
                write_frame(&mut sink, Message::Ping(Bytes::new()), write_timeout).await?;
            }
        }
    }
}

async fn write_frame<S>(sink: &mut S, frame: Message, write_timeout: Duration) -> Result<(), WriteError>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    match timeout(write_timeout, sink.send(frame)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(WriteError::Socket(e.to_string())),
        Err(_) => Err(WriteError::TimedOut(write_timeout)),
    }
}
