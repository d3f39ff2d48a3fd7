//! In-process connection registry.
//!
//! ## 責務
//!
//! - 接続中の全コネクションの管理（admit / evict）
//! - コネクション ↔ Room の対応付け（1 コネクションにつき最大 1 Room）
//! - Room メンバーへのファンアウト（broadcast）
//! - 入力中（typing）状態の記録と参照
//!
//! ## ロック方針
//!
//! 4 つのマップは 1 つの `RwLock` で保護されます。変更は書き込みロック、
//! broadcast / typing の参照は読み取りロックで行います。ロックを保持したまま
//! I/O（ソケット書き込み・ストアへの問い合わせ）を行うことはありません。
//! broadcast は宛先をスナップショットしてからロックを解放し、その後で
//! 各コネクションのキューへ `try_send` します。

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use hiroba_shared::time::Clock;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::{
    config::OverflowPolicy,
    domain::{Connection, ConnectionId, PushError, RoomId, UserId},
};

/// A user counts as typing for this long after their last signal
pub const TYPING_WINDOW_MILLIS: i64 = 3_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("connection {0} is not registered")]
    ConnectionNotFound(ConnectionId),
}

/// Result of a fan-out
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Members the payload was queued for
    pub delivered: usize,
    /// Members whose queue was full
    pub dropped: Vec<ConnectionId>,
    /// Members evicted because of a full queue (`OverflowPolicy::Evict` only)
    pub evicted: Vec<ConnectionId>,
}

#[derive(Debug, Default)]
struct RegistryState {
    connections: HashMap<ConnectionId, Connection>,
    room_members: HashMap<RoomId, HashSet<ConnectionId>>,
    connection_room: HashMap<ConnectionId, RoomId>,
    typing: HashMap<RoomId, HashMap<UserId, i64>>,
}

impl RegistryState {
    /// Remove `id` from its current room, dropping the room entry once empty.
    fn detach(&mut self, id: &ConnectionId) -> Option<RoomId> {
        let room_id = self.connection_room.remove(id)?;
        if let Some(members) = self.room_members.get_mut(&room_id) {
            members.remove(id);
            if members.is_empty() {
                self.room_members.remove(&room_id);
            }
        }
        Some(room_id)
    }
}

/// Shared state mapping connections to rooms.
///
/// Constructed once at startup and handed out behind an `Arc`.
pub struct RoomRegistry {
    state: RwLock<RegistryState>,
    clock: Arc<dyn Clock>,
    overflow_policy: OverflowPolicy,
}

impl RoomRegistry {
    pub fn new(clock: Arc<dyn Clock>, overflow_policy: OverflowPolicy) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            clock,
            overflow_policy,
        }
    }

    /// Register a new connection. It belongs to no room yet.
    pub async fn admit(&self, connection: Connection) {
        let id = connection.id;
        let user_id = connection.user_id;
        let mut state = self.state.write().await;
        state.connections.insert(id, connection);
        tracing::debug!("Connection '{}' (user {}) admitted", id, user_id);
    }

    /// Remove a connection and everything that refers to it.
    ///
    /// Fires the connection's close signal: its writer loop stops without
    /// flushing the backlog and sends a close frame. Returns `false` if the
    /// connection was already gone, so calling it twice is safe.
    pub async fn evict(&self, id: &ConnectionId) -> bool {
        let removed = {
            let mut state = self.state.write().await;
            state.detach(id);
            state.connections.remove(id)
        };

        match removed {
            Some(connection) => {
                connection.close();
                tracing::debug!(
                    "Connection '{}' (user {}) evicted",
                    connection.id,
                    connection.user_id
                );
                true
            }
            None => false,
        }
    }

    /// Move a connection into `room_id`, leaving its previous room.
    ///
    /// Only membership bookkeeping happens here; store-side checks must be
    /// done by the caller before this is invoked. Returns the previous room.
    pub async fn join_room(
        &self,
        id: &ConnectionId,
        room_id: RoomId,
    ) -> Result<Option<RoomId>, RegistryError> {
        let mut state = self.state.write().await;
        if !state.connections.contains_key(id) {
            return Err(RegistryError::ConnectionNotFound(*id));
        }

        let previous = state.detach(id);
        state.room_members.entry(room_id).or_default().insert(*id);
        state.connection_room.insert(*id, room_id);
        Ok(previous)
    }

    /// Room the connection currently belongs to
    pub async fn room_of(&self, id: &ConnectionId) -> Option<RoomId> {
        let state = self.state.read().await;
        state.connection_room.get(id).copied()
    }

    /// Queue a frame for a single connection without waiting.
    pub async fn push_to(&self, id: &ConnectionId, payload: String) -> Result<(), PushError> {
        let connection = {
            let state = self.state.read().await;
            state.connections.get(id).cloned()
        };

        match connection {
            Some(connection) => connection.try_push(payload),
            None => Err(PushError::NotRegistered),
        }
    }

    /// Queue `payload` for every member of `room_id`.
    ///
    /// Never waits on a slow member: a full queue costs that member this one
    /// message (or its connection, under `OverflowPolicy::Evict`).
    pub async fn broadcast(&self, room_id: RoomId, payload: &str) -> BroadcastReport {
        let recipients: Vec<Connection> = {
            let state = self.state.read().await;
            state
                .room_members
                .get(&room_id)
                .map(|members| {
                    members
                        .iter()
                        .filter_map(|id| state.connections.get(id).cloned())
                        .collect()
                })
                .unwrap_or_default()
        };

        let mut report = BroadcastReport::default();
        for recipient in &recipients {
            match recipient.try_push(payload.to_string()) {
                Ok(()) => report.delivered += 1,
                Err(PushError::QueueFull) => {
                    tracing::warn!(
                        "Outbound queue of connection '{}' (user {}) is full, dropping message for room {}",
                        recipient.id,
                        recipient.user_id,
                        room_id
                    );
                    report.dropped.push(recipient.id);
                }
                Err(e) => {
                    tracing::debug!(
                        "Skipping connection '{}' during broadcast: {}",
                        recipient.id,
                        e
                    );
                }
            }
        }
        drop(recipients);

        if self.overflow_policy == OverflowPolicy::Evict {
            for id in &report.dropped {
                if self.evict(id).await {
                    tracing::warn!("Evicted slow consumer '{}'", id);
                    report.evicted.push(*id);
                }
            }
        }

        report
    }

    /// Record that `user_id` is typing in `room_id` now.
    pub async fn set_typing(&self, room_id: RoomId, user_id: UserId) {
        let now = self.clock.now_millis();
        let mut state = self.state.write().await;
        state
            .typing
            .entry(room_id)
            .or_default()
            .insert(user_id, now);
    }

    /// Users who signalled typing in `room_id` within the last
    /// [`TYPING_WINDOW_MILLIS`], sorted by id.
    pub async fn typing_users(&self, room_id: RoomId) -> Vec<UserId> {
        let now = self.clock.now_millis();
        let state = self.state.read().await;
        let mut users: Vec<UserId> = state
            .typing
            .get(&room_id)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|(_, at)| now - **at < TYPING_WINDOW_MILLIS)
                    .map(|(user_id, _)| *user_id)
                    .collect()
            })
            .unwrap_or_default();
        users.sort();
        users
    }

    pub async fn connection_count(&self) -> usize {
        self.state.read().await.connections.len()
    }

    /// Current members of a room
    pub async fn members(&self, room_id: RoomId) -> Vec<ConnectionId> {
        let state = self.state.read().await;
        state
            .room_members
            .get(&room_id)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Member count of every non-empty room, sorted by room id
    pub async fn occupancy(&self) -> Vec<(RoomId, usize)> {
        let state = self.state.read().await;
        let mut rooms: Vec<(RoomId, usize)> = state
            .room_members
            .iter()
            .map(|(room_id, members)| (*room_id, members.len()))
            .collect();
        rooms.sort();
        rooms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OutboundReceiver;
    use hiroba_shared::time::{ManualClock, SystemClock};

    // ========================================
    // テスト作業記録
    // ========================================
    // 【何をテストするか】
    // - admit / evict / join_room による所属管理
    // - connection_room と room_members の整合性
    // - broadcast のバックプレッシャー方針（drop / evict）
    // - typing の 3 秒ウィンドウ
    //
    // 【なぜこのテストが必要か】
    // - RoomRegistry はハブ内で唯一の共有可変状態
    // - 遅いクライアントが他のクライアントへの配信を妨げないことを保証する
    // ========================================

    fn room(id: i64) -> RoomId {
        RoomId::new(id).unwrap()
    }

    fn user(id: i64) -> UserId {
        UserId::new(id).unwrap()
    }

    fn create_registry(policy: OverflowPolicy) -> RoomRegistry {
        RoomRegistry::new(Arc::new(SystemClock), policy)
    }

    async fn admit(
        registry: &RoomRegistry,
        user_id: i64,
        capacity: usize,
    ) -> (ConnectionId, OutboundReceiver) {
        let (connection, rx) = Connection::open(user(user_id), capacity);
        let id = connection.id;
        registry.admit(connection).await;
        (id, rx)
    }

    /// connection_room[c] == r ⇔ c ∈ room_members[r]
    async fn assert_consistent(registry: &RoomRegistry) {
        let state = registry.state.read().await;
        for (id, room_id) in &state.connection_room {
            assert!(state.connections.contains_key(id));
            assert!(
                state
                    .room_members
                    .get(room_id)
                    .is_some_and(|members| members.contains(id))
            );
        }
        for (room_id, members) in &state.room_members {
            assert!(!members.is_empty());
            for id in members {
                assert_eq!(state.connection_room.get(id), Some(room_id));
            }
        }
    }

    #[tokio::test]
    async fn test_admit_then_evict_is_idempotent() {
        // テスト項目: evict は 2 回呼んでも安全で、送信キューが閉じられる
        // given (前提条件):
        let registry = create_registry(OverflowPolicy::Drop);
        let (id, mut rx) = admit(&registry, 1, 4).await;
        assert_eq!(registry.connection_count().await, 1);

        // when (操作):
        let first = registry.evict(&id).await;
        let second = registry.evict(&id).await;

        // then (期待する結果):
        assert!(first);
        assert!(!second);
        assert_eq!(registry.connection_count().await, 0);
        assert!(rx.is_evicted());
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_join_moves_between_rooms() {
        // テスト項目: 別の Room に join すると前の Room から抜ける
        // given (前提条件):
        let registry = create_registry(OverflowPolicy::Drop);
        let (id, _rx) = admit(&registry, 1, 4).await;
        registry.join_room(&id, room(1)).await.unwrap();

        // when (操作):
        let previous = registry.join_room(&id, room(2)).await.unwrap();

        // then (期待する結果):
        assert_eq!(previous, Some(room(1)));
        assert_eq!(registry.room_of(&id).await, Some(room(2)));
        assert!(registry.members(room(1)).await.is_empty());
        assert_eq!(registry.members(room(2)).await, vec![id]);
        assert_eq!(registry.occupancy().await, vec![(room(2), 1)]);
        assert_consistent(&registry).await;
    }

    #[tokio::test]
    async fn test_rejoin_same_room_keeps_single_membership() {
        // テスト項目: 同じ Room に再度 join しても所属は 1 つのまま
        // given (前提条件):
        let registry = create_registry(OverflowPolicy::Drop);
        let (id, _rx) = admit(&registry, 1, 4).await;
        registry.join_room(&id, room(3)).await.unwrap();

        // when (操作):
        let previous = registry.join_room(&id, room(3)).await.unwrap();

        // then (期待する結果):
        assert_eq!(previous, Some(room(3)));
        assert_eq!(registry.members(room(3)).await, vec![id]);
        assert_consistent(&registry).await;
    }

    #[tokio::test]
    async fn test_evict_removes_room_membership() {
        // テスト項目: Room 所属中のコネクションを evict すると所属も消える
        // given (前提条件):
        let registry = create_registry(OverflowPolicy::Drop);
        let (a, _rx_a) = admit(&registry, 1, 4).await;
        let (b, _rx_b) = admit(&registry, 2, 4).await;
        registry.join_room(&a, room(5)).await.unwrap();
        registry.join_room(&b, room(5)).await.unwrap();

        // when (操作):
        registry.evict(&a).await;

        // then (期待する結果):
        assert_eq!(registry.room_of(&a).await, None);
        assert_eq!(registry.members(room(5)).await, vec![b]);
        assert_consistent(&registry).await;
    }

    #[tokio::test]
    async fn test_join_unknown_connection_fails() {
        // テスト項目: 登録されていないコネクションは join できない
        // given (前提条件):
        let registry = create_registry(OverflowPolicy::Drop);
        let (id, _rx) = admit(&registry, 1, 4).await;
        registry.evict(&id).await;

        // when (操作):
        let result = registry.join_room(&id, room(1)).await;

        // then (期待する結果):
        assert_eq!(result, Err(RegistryError::ConnectionNotFound(id)));
        assert!(registry.members(room(1)).await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_joins_and_evictions_keep_invariant() {
        // テスト項目: 並行した join / evict の後も所属マップの整合性が保たれる
        // given (前提条件):
        let registry = Arc::new(create_registry(OverflowPolicy::Drop));
        let mut connections = Vec::new();
        for n in 0..16 {
            connections.push(admit(&registry, n + 1, 4).await);
        }

        // when (操作):
        let mut handles = Vec::new();
        for (n, (id, _)) in connections.iter().enumerate() {
            let registry = registry.clone();
            let id = *id;
            handles.push(tokio::spawn(async move {
                for step in 0..20 {
                    let target = room(((n + step) % 3 + 1) as i64);
                    let _ = registry.join_room(&id, target).await;
                    if n % 5 == 0 && step == 10 {
                        registry.evict(&id).await;
                    }
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // then (期待する結果):
        assert_consistent(&registry).await;
        assert_eq!(registry.connection_count().await, 12);
        let members: usize = registry.occupancy().await.iter().map(|(_, n)| n).sum();
        assert_eq!(members, 12);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_only_room_members() {
        // テスト項目: broadcast は対象 Room のメンバーにだけ届く
        // given (前提条件):
        let registry = create_registry(OverflowPolicy::Drop);
        let (a, mut rx_a) = admit(&registry, 1, 4).await;
        let (b, mut rx_b) = admit(&registry, 2, 4).await;
        let (_c, mut rx_c) = admit(&registry, 3, 4).await;
        registry.join_room(&a, room(5)).await.unwrap();
        registry.join_room(&b, room(5)).await.unwrap();

        // when (操作):
        let report = registry.broadcast(room(5), "hello").await;

        // then (期待する結果):
        assert_eq!(report.delivered, 2);
        assert!(report.dropped.is_empty());
        assert_eq!(rx_a.try_recv().unwrap(), "hello");
        assert_eq!(rx_b.try_recv().unwrap(), "hello");
        assert!(rx_c.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_drops_for_full_queue_only() {
        // テスト項目: キューが満杯のメンバーだけ取りこぼし、他の N-1 人には届く
        // given (前提条件):
        let registry = create_registry(OverflowPolicy::Drop);
        let (slow, mut rx_slow) = admit(&registry, 1, 1).await;
        let (a, mut rx_a) = admit(&registry, 2, 4).await;
        let (b, mut rx_b) = admit(&registry, 3, 4).await;
        for id in [&slow, &a, &b] {
            registry.join_room(id, room(5)).await.unwrap();
        }
        registry.push_to(&slow, "backlog".to_string()).await.unwrap();

        // when (操作):
        let report = registry.broadcast(room(5), "overflow").await;

        // then (期待する結果):
        assert_eq!(report.delivered, 2);
        assert_eq!(report.dropped, vec![slow]);
        assert!(report.evicted.is_empty());
        assert_eq!(rx_a.try_recv().unwrap(), "overflow");
        assert_eq!(rx_b.try_recv().unwrap(), "overflow");
        assert_eq!(rx_slow.try_recv().unwrap(), "backlog");
        assert!(rx_slow.try_recv().is_err());
        // slow consumer stays connected under the drop policy
        assert_eq!(registry.room_of(&slow).await, Some(room(5)));
    }

    #[tokio::test]
    async fn test_broadcast_evicts_full_queue_under_evict_policy() {
        // テスト項目: Evict 方針では満杯のメンバーが切断され、他のメンバーには届く
        // given (前提条件):
        let registry = create_registry(OverflowPolicy::Evict);
        let (slow, mut rx_slow) = admit(&registry, 1, 1).await;
        let (a, mut rx_a) = admit(&registry, 2, 4).await;
        registry.join_room(&slow, room(5)).await.unwrap();
        registry.join_room(&a, room(5)).await.unwrap();
        registry.push_to(&slow, "backlog".to_string()).await.unwrap();

        // when (操作):
        let report = registry.broadcast(room(5), "overflow").await;

        // then (期待する結果):
        assert_eq!(report.delivered, 1);
        assert_eq!(report.evicted, vec![slow]);
        assert_eq!(rx_a.try_recv().unwrap(), "overflow");
        // the backlog is discarded, not delivered at the slow pace
        assert!(rx_slow.is_evicted());
        assert_eq!(rx_slow.recv().await, None);
        assert_eq!(registry.members(room(5)).await, vec![a]);
        assert_consistent(&registry).await;
    }

    #[tokio::test]
    async fn test_broadcast_to_empty_room() {
        // テスト項目: メンバーのいない Room への broadcast は何もしない
        // given (前提条件):
        let registry = create_registry(OverflowPolicy::Drop);

        // when (操作):
        let report = registry.broadcast(room(9), "nobody").await;

        // then (期待する結果):
        assert_eq!(report, BroadcastReport::default());
    }

    #[tokio::test]
    async fn test_push_to_unregistered_connection() {
        // テスト項目: 登録されていないコネクションへの push は NotRegistered
        // given (前提条件):
        let registry = create_registry(OverflowPolicy::Drop);
        let (id, _rx) = admit(&registry, 1, 4).await;
        registry.evict(&id).await;

        // when (操作):
        let result = registry.push_to(&id, "late".to_string()).await;

        // then (期待する結果):
        assert_eq!(result, Err(PushError::NotRegistered));
    }

    #[tokio::test]
    async fn test_typing_window_excludes_exactly_three_seconds() {
        // テスト項目: typing は 3 秒未満なら含まれ、ちょうど 3 秒で除外される
        // given (前提条件):
        let clock = Arc::new(ManualClock::new(10_000));
        let registry = RoomRegistry::new(clock.clone(), OverflowPolicy::Drop);
        registry.set_typing(room(5), user(7)).await;

        // when (操作):
        clock.advance(2_999);
        let just_before = registry.typing_users(room(5)).await;
        clock.advance(1);
        let at_boundary = registry.typing_users(room(5)).await;

        // then (期待する結果):
        assert_eq!(just_before, vec![user(7)]);
        assert!(at_boundary.is_empty());
    }

    #[tokio::test]
    async fn test_typing_refresh_and_room_isolation() {
        // テスト項目: typing の再送で期限が延び、他の Room には影響しない
        // given (前提条件):
        let clock = Arc::new(ManualClock::new(0));
        let registry = RoomRegistry::new(clock.clone(), OverflowPolicy::Drop);
        registry.set_typing(room(1), user(2)).await;
        registry.set_typing(room(1), user(1)).await;
        registry.set_typing(room(2), user(3)).await;

        // when (操作):
        clock.advance(2_000);
        registry.set_typing(room(1), user(2)).await;
        clock.advance(2_000);

        // then (期待する結果):
        assert_eq!(registry.typing_users(room(1)).await, vec![user(2)]);
        assert!(registry.typing_users(room(2)).await.is_empty());
        assert!(registry.typing_users(room(3)).await.is_empty());
    }
}
