//! Routes decoded inbound events to their use case.
//!
//! Every failure is reported back to the originating connection as an
//! `error` event. Nothing here closes the connection.

use std::sync::Arc;

use crate::{
    domain::{ConnectionContext, PushError, RoomId},
    infrastructure::{
        dto::websocket::{ClientEvent, CodecError, ServerEvent},
        registry::RoomRegistry,
    },
};

use super::{
    JoinRoomUseCase, SendMessageUseCase, TypingUseCase,
    error::{DispatchError, JoinRoomError},
};

pub struct EventDispatcher {
    join_room_usecase: Arc<JoinRoomUseCase>,
    send_message_usecase: Arc<SendMessageUseCase>,
    typing_usecase: Arc<TypingUseCase>,
    registry: Arc<RoomRegistry>,
}

impl EventDispatcher {
    pub fn new(
        join_room_usecase: Arc<JoinRoomUseCase>,
        send_message_usecase: Arc<SendMessageUseCase>,
        typing_usecase: Arc<TypingUseCase>,
        registry: Arc<RoomRegistry>,
    ) -> Self {
        Self {
            join_room_usecase,
            send_message_usecase,
            typing_usecase,
            registry,
        }
    }

    /// Handle one text frame read from the socket.
    ///
    /// A frame that is not a JSON envelope at all is logged and skipped.
    pub async fn handle_text_frame(&self, context: &ConnectionContext, text: &str) {
        let event = match ClientEvent::decode(text) {
            Ok(event) => event,
            Err(CodecError::MalformedEnvelope(e)) => {
                tracing::warn!(
                    "Ignoring malformed frame from connection '{}': {}",
                    context.id,
                    e
                );
                return;
            }
            Err(e) => {
                tracing::warn!("Invalid payload from connection '{}': {}", context.id, e);
                self.report_error(context, &DispatchError::InvalidPayload(e))
                    .await;
                return;
            }
        };

        let kind = event.kind().to_string();
        if let Err(e) = self.dispatch(context, event).await {
            tracing::warn!(
                "Failed to handle '{}' from connection '{}' (user {}): {}",
                kind,
                context.id,
                context.user_id,
                e
            );
            self.report_error(context, &e).await;
        }
    }

    /// Run the use case matching `event`.
    pub async fn dispatch(
        &self,
        context: &ConnectionContext,
        event: ClientEvent,
    ) -> Result<(), DispatchError> {
        match event {
            ClientEvent::JoinRoom(payload) => {
                let room_id =
                    RoomId::new(payload.room_id).map_err(JoinRoomError::InvalidRoomId)?;
                self.join_room_usecase.execute(context, room_id).await?;
            }
            ClientEvent::SendMessage(payload) => {
                self.send_message_usecase
                    .execute(context, payload.content, payload.reply_to_id)
                    .await?;
            }
            ClientEvent::Typing => {
                self.typing_usecase.execute(context).await?;
            }
            ClientEvent::Unknown(tag) => return Err(DispatchError::UnknownEvent(tag)),
        }
        Ok(())
    }

    /// Queue an `error` event for the originating connection.
    ///
    /// Best-effort: when the queue is full the report is dropped.
    async fn report_error(&self, context: &ConnectionContext, error: &DispatchError) {
        let json = match ServerEvent::error(error.to_string()).encode() {
            Ok(json) => json,
            Err(e) => {
                tracing::error!("Failed to encode error event: {}", e);
                return;
            }
        };
        match self.registry.push_to(&context.id, json).await {
            Ok(()) => {}
            Err(PushError::QueueFull) => tracing::warn!(
                "Dropped error report for connection '{}', queue full",
                context.id
            ),
            Err(e) => tracing::debug!("Error report for '{}' not sent: {}", context.id, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::OverflowPolicy,
        domain::{OutboundReceiver, RoomKind, UserId},
        infrastructure::{dto::websocket::JoinRoomPayload, repository::InMemoryChatStore},
        usecase::ConnectParticipantUseCase,
    };
    use hiroba_shared::time::ManualClock;

    // ========================================
    // テスト作業記録
    // ========================================
    // 【何をテストするか】
    // - テキストフレームから各ユースケースへの振り分け
    // - 失敗時に送信元へ error イベントが返ること
    // - 壊れたフレームは無視され、接続が維持されること
    // ========================================

    struct Fixture {
        dispatcher: EventDispatcher,
        registry: Arc<RoomRegistry>,
        store: Arc<InMemoryChatStore>,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let store = Arc::new(InMemoryChatStore::new(clock.clone()));
        let registry = Arc::new(RoomRegistry::new(clock, OverflowPolicy::Drop));
        let dispatcher = EventDispatcher::new(
            Arc::new(JoinRoomUseCase::new(store.clone(), registry.clone(), 50)),
            Arc::new(SendMessageUseCase::new(store.clone(), registry.clone())),
            Arc::new(TypingUseCase::new(registry.clone())),
            registry.clone(),
        );
        Fixture {
            dispatcher,
            registry,
            store,
        }
    }

    async fn connect(f: &Fixture, user: i64) -> (ConnectionContext, OutboundReceiver) {
        ConnectParticipantUseCase::new(f.registry.clone(), 8)
            .execute(UserId::new(user).unwrap())
            .await
    }

    fn error_message(rx: &mut OutboundReceiver) -> String {
        match ServerEvent::decode(&rx.try_recv().unwrap()).unwrap() {
            ServerEvent::Error(payload) => payload.message,
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_join_then_send_message() {
        // テスト項目: join_room → send_message で history と new_message が届く
        // given (前提条件):
        let f = fixture();
        let room = f.store.create_room("general", RoomKind::Group).await.unwrap();
        let (context, mut rx) = connect(&f, 1).await;

        // when (操作):
        f.dispatcher
            .handle_text_frame(
                &context,
                &format!(r#"{{"type":"join_room","payload":{{"room_id":{}}}}}"#, room.id),
            )
            .await;
        f.dispatcher
            .handle_text_frame(
                &context,
                r#"{"type":"send_message","payload":{"content":"hello"}}"#,
            )
            .await;

        // then (期待する結果):
        assert!(matches!(
            ServerEvent::decode(&rx.try_recv().unwrap()).unwrap(),
            ServerEvent::History(_)
        ));
        match ServerEvent::decode(&rx.try_recv().unwrap()).unwrap() {
            ServerEvent::NewMessage(payload) => {
                assert_eq!(payload.content, "hello");
                assert_eq!(payload.sender_id, 1);
            }
            other => panic!("expected new_message, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_send_before_join_reports_error() {
        // テスト項目: join 前の send_message は送信元にだけ error が返る
        // given (前提条件):
        let f = fixture();
        let (context, mut rx) = connect(&f, 1).await;

        // when (操作):
        f.dispatcher
            .handle_text_frame(
                &context,
                r#"{"type":"send_message","payload":{"content":"hi"}}"#,
            )
            .await;

        // then (期待する結果):
        assert_eq!(
            error_message(&mut rx),
            "must join a room before sending messages"
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unknown_event_type_reports_error() {
        // テスト項目: 未知の type には error が返る
        // given (前提条件):
        let f = fixture();
        let (context, mut rx) = connect(&f, 1).await;

        // when (操作):
        f.dispatcher
            .handle_text_frame(&context, r#"{"type":"dance","payload":{}}"#)
            .await;

        // then (期待する結果):
        assert_eq!(error_message(&mut rx), "unknown event type: dance");
    }

    #[tokio::test]
    async fn test_malformed_frame_is_ignored() {
        // テスト項目: JSON として壊れたフレームは無視され、何も返らない
        // given (前提条件):
        let f = fixture();
        let (context, mut rx) = connect(&f, 1).await;

        // when (操作):
        f.dispatcher.handle_text_frame(&context, "{not json").await;

        // then (期待する結果):
        assert!(rx.try_recv().is_err());
        assert_eq!(f.registry.connection_count().await, 1);
    }

    #[tokio::test]
    async fn test_invalid_payload_reports_error() {
        // テスト項目: join_room の payload が不正な場合は error が返る
        // given (前提条件):
        let f = fixture();
        let (context, mut rx) = connect(&f, 1).await;

        // when (操作):
        f.dispatcher
            .handle_text_frame(&context, r#"{"type":"join_room","payload":{"room_id":"x"}}"#)
            .await;

        // then (期待する結果):
        assert!(error_message(&mut rx).contains("join_room"));
    }

    #[tokio::test]
    async fn test_join_missing_room_keeps_membership() {
        // テスト項目: 存在しない Room への join は error が返り、所属は変わらない
        // given (前提条件):
        let f = fixture();
        let room = f.store.create_room("general", RoomKind::Group).await.unwrap();
        let (context, mut rx) = connect(&f, 1).await;
        f.dispatcher
            .dispatch(
                &context,
                ClientEvent::JoinRoom(JoinRoomPayload {
                    room_id: room.id.value(),
                }),
            )
            .await
            .unwrap();
        let _ = rx.try_recv();

        // when (操作):
        f.dispatcher
            .handle_text_frame(&context, r#"{"type":"join_room","payload":{"room_id":404}}"#)
            .await;

        // then (期待する結果):
        assert_eq!(
            error_message(&mut rx),
            "failed to join room: room 404 not found"
        );
        assert_eq!(f.registry.room_of(&context.id).await, Some(room.id));
    }

    #[tokio::test]
    async fn test_typing_fans_out_to_room() {
        // テスト項目: 同じ Room の 2 接続の片方が typing すると両方に届く
        // given (前提条件):
        let f = fixture();
        let room_id = RoomId::new(5).unwrap();
        let (alice, mut rx_alice) = connect(&f, 1).await;
        let (bob, mut rx_bob) = connect(&f, 2).await;
        f.registry.join_room(&alice.id, room_id).await.unwrap();
        f.registry.join_room(&bob.id, room_id).await.unwrap();

        // when (操作):
        f.dispatcher
            .handle_text_frame(&alice, r#"{"type":"typing"}"#)
            .await;

        // then (期待する結果):
        let expected = r#"{"type":"typing","payload":{"user_ids":[1]}}"#;
        assert_eq!(rx_alice.try_recv().unwrap(), expected);
        assert_eq!(rx_bob.try_recv().unwrap(), expected);
    }
}
