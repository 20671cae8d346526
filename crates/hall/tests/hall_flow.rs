//! End-to-end behaviour of the hall module against scripted collaborators.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use hall::memory::{AnnouncementLog, MemoryBalances, MemoryLedger, MemoryProfileCache};
use hall::services::{BalanceRow, LedgerEntryKind, PageWindow};
use hall::{
    ANNOUNCE_ROUTE, Announcement, AnnouncementSource, BalanceStore, ConnectionSender, HallConfig,
    HallModule, HallServices, LoginOutcome, PollOutcome, Reply, RequestContext, UpstreamError,
    UserService, spawn_fanout,
};
use hall_protocol::{
    Codec, ConnectionId, JsonCodec, LoginCredentials, Message, RankRequest, RankResponse,
    ReplyEnvelope, UserInfoRequest, UserProfile,
};
use tokio::sync::mpsc;

// =========================================================================
// Fakes
// =========================================================================

/// User service that answers each route with a canned `data` payload.
#[derive(Default)]
struct ScriptedUsers {
    replies: Mutex<HashMap<String, Result<Vec<u8>, UpstreamError>>>,
    calls: Mutex<Vec<Message>>,
}

impl ScriptedUsers {
    fn answer(&self, route: &str, reply: Result<Vec<u8>, UpstreamError>) {
        self.replies.lock().unwrap().insert(route.to_string(), reply);
    }

    fn calls(&self) -> Vec<Message> {
        self.calls.lock().unwrap().clone()
    }
}

impl UserService for ScriptedUsers {
    async fn request_sync(&self, message: Message) -> Result<Message, UpstreamError> {
        self.calls.lock().unwrap().push(message.clone());
        let reply = self
            .replies
            .lock()
            .unwrap()
            .get(&message.route)
            .cloned()
            .unwrap_or_else(|| Err(UpstreamError::new("user service", "no script")))?;
        Ok(Message::new("User", message.route, reply, message.reply))
    }
}

/// Balance store that records the windows it was asked for.
#[derive(Default)]
struct RecordingBalances {
    windows: Mutex<Vec<PageWindow>>,
}

impl BalanceStore for RecordingBalances {
    async fn balance_page(&self, window: PageWindow) -> Result<Vec<BalanceRow>, UpstreamError> {
        self.windows.lock().unwrap().push(window);
        Ok(vec![BalanceRow {
            name: "Carol".into(),
            balance: 42,
        }])
    }
}

struct DownBalances;

impl BalanceStore for DownBalances {
    async fn balance_page(&self, _window: PageWindow) -> Result<Vec<BalanceRow>, UpstreamError> {
        Err(UpstreamError::new("balances", "connection refused"))
    }
}

/// Connection sender that fails for one id and records the rest.
#[derive(Default)]
struct FlakySender {
    broken: Option<ConnectionId>,
    delivered: Mutex<Vec<(ConnectionId, Vec<u8>)>>,
}

impl ConnectionSender for FlakySender {
    async fn send_to(
        &self,
        connection_id: &ConnectionId,
        route: &str,
        payload: &[u8],
    ) -> Result<(), UpstreamError> {
        assert_eq!(route, ANNOUNCE_ROUTE);
        if self.broken.as_ref() == Some(connection_id) {
            return Err(UpstreamError::new("dispatch", "connection gone"));
        }
        self.delivered
            .lock()
            .unwrap()
            .push((connection_id.clone(), payload.to_vec()));
        Ok(())
    }
}

// =========================================================================
// Harness
// =========================================================================

type Hall<B> = HallModule<ScriptedUsers, AnnouncementLog, B, MemoryLedger, MemoryProfileCache>;

struct Harness<B> {
    hall: Hall<B>,
    queue: mpsc::Receiver<Announcement>,
    users: Arc<ScriptedUsers>,
    log: Arc<AnnouncementLog>,
    ledger: Arc<MemoryLedger>,
    profiles: Arc<MemoryProfileCache>,
}

fn harness_with<B: BalanceStore>(balances: Arc<B>, config: HallConfig) -> Harness<B> {
    let users = Arc::new(ScriptedUsers::default());
    let log = Arc::new(AnnouncementLog::new());
    let ledger = Arc::new(MemoryLedger::new());
    let profiles = Arc::new(MemoryProfileCache::new());

    let (hall, queue) = HallModule::new(
        HallServices {
            users: Arc::clone(&users),
            announcements: Arc::clone(&log),
            balances,
            ledger: Arc::clone(&ledger),
            profiles: Arc::clone(&profiles),
            secret: Arc::new(|token: &str, session: &str| format!("key:{token}:{session}")),
        },
        &config,
    );

    Harness {
        hall,
        queue,
        users,
        log,
        ledger,
        profiles,
    }
}

fn harness() -> Harness<MemoryBalances> {
    harness_with(Arc::new(MemoryBalances::new()), HallConfig::default())
}

fn cid(id: &str) -> ConnectionId {
    ConnectionId::from(id)
}

fn envelope(code: u32, payload: &impl serde::Serialize) -> Vec<u8> {
    let data = JsonCodec.encode(payload).unwrap();
    let mut envelope = ReplyEnvelope::success(data);
    envelope.code = code;
    JsonCodec.encode(&envelope).unwrap()
}

fn credentials() -> LoginCredentials {
    LoginCredentials {
        token: "tok-alice".into(),
        session: "sess-1".into(),
    }
}

fn alice_profile() -> UserProfile {
    UserProfile {
        name: "Alice".into(),
        session: "sess-2".into(),
        ..UserProfile::default()
    }
}

fn rank_request(rank_type: i64, per_page: i64, page: i64) -> Vec<u8> {
    JsonCodec
        .encode(&RankRequest {
            token: "tok-alice".into(),
            session: "sess-1".into(),
            rank_type,
            number_per_page: per_page,
            current_page: page,
        })
        .unwrap()
}

async fn dispatch<B: BalanceStore>(hall: &Hall<B>, route: &str, ctx: RequestContext) {
    hall.dispatch(route, ctx).await;
}

async fn rank_reply<B: BalanceStore>(hall: &Hall<B>, data: Vec<u8>) -> Reply {
    let (ctx, rx) = RequestContext::new(cid("c1"), data);
    dispatch(hall, "rank", ctx).await;
    rx.await.unwrap()
}

fn decode_rank(reply: Reply) -> RankResponse {
    let Reply::Success(data) = reply else {
        panic!("expected success, got {reply:?}");
    };
    JsonCodec.decode(&data).unwrap()
}

// =========================================================================
// Lifecycle
// =========================================================================

#[test]
fn test_module_name_and_routes() {
    let h = harness();
    assert_eq!(h.hall.name(), "Hall");
    assert_eq!(h.hall.routes(), ["login", "rank"]);
}

#[test]
fn test_connect_twice_keeps_single_entry_and_disconnect_removes_it() {
    let h = harness();

    h.hall.on_connect(&cid("c1"));
    h.hall.registry().set_token(&cid("c1"), "tok").unwrap();
    h.hall.on_connect(&cid("c1"));

    assert_eq!(h.hall.registry().len(), 1);
    assert_eq!(h.hall.registry().token(&cid("c1")).as_deref(), Some("tok"));

    h.hall.on_disconnect(&cid("c1"));
    h.hall.on_disconnect(&cid("c1"));
    assert!(h.hall.registry().is_empty());
}

#[tokio::test]
async fn test_dispatch_unknown_route_replies_server_error() {
    let h = harness();
    let (ctx, rx) = RequestContext::new(cid("c1"), Vec::new());

    dispatch(&h.hall, "shop", ctx).await;

    let reply = rx.await.unwrap();
    assert!(
        matches!(&reply, Reply::ServerError(msg) if msg.contains("unknown route shop")),
        "got {reply:?}"
    );
}

// =========================================================================
// Login
// =========================================================================

#[tokio::test]
async fn test_login_success_relays_reply_and_attaches_token() {
    let h = harness();
    h.hall.on_connect(&cid("c1"));
    let login_reply = envelope(200, &credentials());
    h.users.answer("login", Ok(login_reply.clone()));
    h.users.answer("getUserInfo", Ok(envelope(200, &alice_profile())));

    let (mut ctx, rx) = RequestContext::new(cid("c1"), b"{\"account\":\"alice\"}".to_vec());
    let outcome = h.hall.login_relay().handle(&mut ctx).await;

    assert_eq!(rx.await.unwrap(), Reply::Binary(login_reply));
    assert_eq!(
        h.hall.registry().token(&cid("c1")).as_deref(),
        Some("tok-alice")
    );

    let LoginOutcome::Accepted {
        credentials: accepted,
        enrichment,
    } = outcome
    else {
        panic!("expected Accepted, got {outcome:?}");
    };
    assert_eq!(accepted, credentials());
    enrichment.await.unwrap();

    let records = h.log.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].text, "user Alice has logged in");
    assert_eq!(records[0].from, "service");
}

#[tokio::test]
async fn test_login_forwards_body_and_signs_profile_request() {
    let h = harness();
    h.hall.on_connect(&cid("c1"));
    h.users.answer("login", Ok(envelope(200, &credentials())));
    h.users.answer("getUserInfo", Ok(envelope(200, &alice_profile())));

    let (mut ctx, _rx) = RequestContext::new(cid("c1"), b"raw-login-body".to_vec());
    if let LoginOutcome::Accepted { enrichment, .. } = h.hall.login_relay().handle(&mut ctx).await
    {
        enrichment.await.unwrap();
    }

    let calls = h.users.calls();
    assert_eq!(calls.len(), 2);

    assert_eq!(calls[0].module, "User");
    assert_eq!(calls[0].route, "login");
    assert_eq!(calls[0].data, b"raw-login-body");
    assert_eq!(calls[0].reply.len(), 8);

    assert_eq!(calls[1].route, "getUserInfo");
    let body: UserInfoRequest = JsonCodec.decode(&calls[1].data).unwrap();
    assert_eq!(body.token, "tok-alice");
    assert_eq!(body.session, "sess-1");
    assert_eq!(body.secret_key, "key:tok-alice:sess-1");
    assert_ne!(calls[0].reply, calls[1].reply);
}

#[tokio::test]
async fn test_login_rejected_relays_reply_and_leaves_registry_untouched() {
    let h = harness();
    h.hall.on_connect(&cid("c1"));
    let rejection = JsonCodec
        .encode(&ReplyEnvelope::error(401, "bad password"))
        .unwrap();
    h.users.answer("login", Ok(rejection.clone()));

    let (mut ctx, rx) = RequestContext::new(cid("c1"), Vec::new());
    let outcome = h.hall.login_relay().handle(&mut ctx).await;

    assert!(matches!(outcome, LoginOutcome::Rejected { code: 401 }));
    assert_eq!(rx.await.unwrap(), Reply::Binary(rejection));
    assert_eq!(h.hall.registry().token(&cid("c1")), None);
    assert_eq!(h.users.calls().len(), 1, "no profile fetch after a rejection");
    assert!(h.log.is_empty());
}

#[tokio::test]
async fn test_login_garbage_reply_is_still_relayed() {
    let h = harness();
    h.hall.on_connect(&cid("c1"));
    h.users.answer("login", Ok(b"not json".to_vec()));

    let (mut ctx, rx) = RequestContext::new(cid("c1"), Vec::new());
    let outcome = h.hall.login_relay().handle(&mut ctx).await;

    assert!(matches!(outcome, LoginOutcome::Malformed));
    assert_eq!(rx.await.unwrap(), Reply::Binary(b"not json".to_vec()));
    assert_eq!(h.hall.registry().token(&cid("c1")), None);
}

#[tokio::test]
async fn test_login_user_service_down_replies_server_error() {
    let h = harness();
    h.hall.on_connect(&cid("c1"));
    h.users.answer(
        "login",
        Err(UpstreamError::new("user service", "connection refused")),
    );

    let (ctx, rx) = RequestContext::new(cid("c1"), Vec::new());
    dispatch(&h.hall, "login", ctx).await;

    let reply = rx.await.unwrap();
    assert!(
        matches!(&reply, Reply::ServerError(msg) if msg.starts_with("upstream unavailable")),
        "got {reply:?}"
    );
    assert_eq!(h.hall.registry().token(&cid("c1")), None);
}

#[tokio::test]
async fn test_login_profile_failure_publishes_nothing_but_keeps_token() {
    let h = harness();
    h.hall.on_connect(&cid("c1"));
    h.users.answer("login", Ok(envelope(200, &credentials())));
    h.users.answer(
        "getUserInfo",
        Ok(JsonCodec
            .encode(&ReplyEnvelope::error(500, "db down"))
            .unwrap()),
    );

    let (mut ctx, _rx) = RequestContext::new(cid("c1"), Vec::new());
    let LoginOutcome::Accepted { enrichment, .. } = h.hall.login_relay().handle(&mut ctx).await
    else {
        panic!("login itself succeeded");
    };
    enrichment.await.unwrap();

    assert!(h.log.is_empty());
    assert_eq!(
        h.hall.registry().token(&cid("c1")).as_deref(),
        Some("tok-alice")
    );
}

#[tokio::test]
async fn test_login_for_closed_connection_does_not_register_it() {
    let h = harness();
    h.users.answer("login", Ok(envelope(200, &credentials())));
    h.users.answer("getUserInfo", Ok(envelope(200, &alice_profile())));

    let (mut ctx, _rx) = RequestContext::new(cid("gone"), Vec::new());
    let outcome = h.hall.login_relay().handle(&mut ctx).await;

    assert!(matches!(outcome, LoginOutcome::Accepted { .. }));
    assert!(!h.hall.registry().contains(&cid("gone")));
}

// =========================================================================
// Rank
// =========================================================================

#[tokio::test]
async fn test_rank_earned_money_sums_earnings_and_resolves_names() {
    let h = harness();
    h.ledger.record("A", LedgerEntryKind::Earning, 300);
    h.ledger.record("B", LedgerEntryKind::Earning, 700);
    h.ledger.record("A", LedgerEntryKind::Earning, 200);
    h.ledger.record("B", LedgerEntryKind::Deposit, 10_000);
    h.profiles.insert_user("A", "Alice");
    h.profiles.insert_user("B", "Bob");

    let response = decode_rank(rank_reply(&h.hall, rank_request(3, 10, 1)).await);

    let earned = response.earn_money_list.unwrap();
    let rows: Vec<_> = earned.iter().map(|i| (i.name.as_str(), i.money)).collect();
    assert_eq!(rows, [("Bob", 700), ("Alice", 500)]);
    assert_eq!(response.own_money_list, None);
    assert_eq!(response.online_time_list, None);
    assert_eq!(response.number_per_page, 10);
    assert_eq!(response.current_page, 1);
    assert_eq!(response.total_page, 0);
    assert_eq!(response.session, "sess-1");
}

#[tokio::test]
async fn test_rank_owned_money_second_page_queries_offset_ten() {
    let balances = Arc::new(RecordingBalances::default());
    let h = harness_with(Arc::clone(&balances), HallConfig::default());

    rank_reply(&h.hall, rank_request(2, 10, 2)).await;
    rank_reply(&h.hall, rank_request(2, 0, 0)).await;

    assert_eq!(
        *balances.windows.lock().unwrap(),
        [
            PageWindow { offset: 10, limit: 10 },
            PageWindow { offset: 0, limit: 10 },
        ]
    );
}

#[tokio::test]
async fn test_rank_default_page_size_comes_from_config() {
    let balances = Arc::new(RecordingBalances::default());
    let config = HallConfig {
        default_page_size: 25,
        ..HallConfig::default()
    };
    let h = harness_with(Arc::clone(&balances), config);

    let response = decode_rank(rank_reply(&h.hall, rank_request(2, -1, 3)).await);

    assert_eq!(response.number_per_page, 25);
    assert_eq!(
        *balances.windows.lock().unwrap(),
        [PageWindow { offset: 50, limit: 25 }]
    );
}

#[tokio::test]
async fn test_rank_zero_default_page_size_in_config_falls_back_to_ten() {
    let balances = Arc::new(RecordingBalances::default());
    let config = HallConfig {
        default_page_size: 0,
        ..HallConfig::default()
    };
    let h = harness_with(Arc::clone(&balances), config);

    let response = decode_rank(rank_reply(&h.hall, rank_request(2, 0, 1)).await);

    assert_eq!(response.number_per_page, 10);
    assert_eq!(
        *balances.windows.lock().unwrap(),
        [PageWindow { offset: 0, limit: 10 }]
    );
}

#[tokio::test]
async fn test_rank_online_time_is_empty_with_page_metadata() {
    let h = harness();

    let response = decode_rank(rank_reply(&h.hall, rank_request(1, 5, 1)).await);

    assert_eq!(response.online_time_list, Some(Vec::new()));
    assert_eq!(response.number_per_page, 5);
}

#[tokio::test]
async fn test_rank_all_returns_every_board_without_page_metadata() {
    let h = harness();
    h.ledger.record("A", LedgerEntryKind::Earning, 10);
    h.profiles.insert_user("A", "Alice");

    let response = decode_rank(rank_reply(&h.hall, rank_request(0, 10, 1)).await);

    assert!(response.online_time_list.is_some());
    assert!(response.own_money_list.is_some());
    assert_eq!(response.earn_money_list.unwrap().len(), 1);
    assert_eq!(response.number_per_page, 0);
    assert_eq!(response.current_page, 0);
}

#[tokio::test]
async fn test_rank_all_fails_when_one_board_fails() {
    let h = harness_with(Arc::new(DownBalances), HallConfig::default());
    h.ledger.record("A", LedgerEntryKind::Earning, 10);
    h.profiles.insert_user("A", "Alice");

    let reply = rank_reply(&h.hall, rank_request(0, 10, 1)).await;

    assert!(
        matches!(&reply, Reply::ServerError(msg) if msg.contains("connection refused")),
        "got {reply:?}"
    );
}

#[tokio::test]
async fn test_rank_earned_missing_profile_fails_request() {
    let h = harness();
    h.ledger.record("A", LedgerEntryKind::Earning, 10);
    h.ledger.record("B", LedgerEntryKind::Earning, 5);
    h.profiles.insert_user("A", "Alice");

    let reply = rank_reply(&h.hall, rank_request(3, 10, 1)).await;

    assert!(
        matches!(&reply, Reply::ServerError(msg) if msg.starts_with("not found")),
        "got {reply:?}"
    );
}

#[tokio::test]
async fn test_rank_earned_malformed_profile_fails_request() {
    let h = harness();
    h.ledger.record("A", LedgerEntryKind::Earning, 10);
    h.profiles.insert_raw("A", r#"{"name":"Alice"}"#);

    let reply = rank_reply(&h.hall, rank_request(3, 10, 1)).await;

    assert!(
        matches!(&reply, Reply::ServerError(msg) if msg.starts_with("decode error")),
        "got {reply:?}"
    );
}

#[tokio::test]
async fn test_rank_unknown_type_replies_server_error() {
    let h = harness();

    let reply = rank_reply(&h.hall, rank_request(9, 10, 1)).await;

    assert!(matches!(reply, Reply::ServerError(msg) if msg.contains("unknown rank type 9")));
}

#[tokio::test]
async fn test_rank_undecodable_body_replies_server_error() {
    let h = harness();

    let reply = rank_reply(&h.hall, b"{{{".to_vec()).await;

    assert!(matches!(reply, Reply::ServerError(_)));
}

#[tokio::test]
async fn test_rank_echoes_renewed_session() {
    let h = harness();
    let (ctx, rx) = RequestContext::new(cid("c1"), rank_request(1, 10, 1));

    dispatch(&h.hall, "rank", ctx.with_renewed_session("sess-renewed")).await;

    assert_eq!(decode_rank(rx.await.unwrap()).session, "sess-renewed");
}

// =========================================================================
// Announcements
// =========================================================================

#[tokio::test]
async fn test_announcements_are_queued_in_publish_order() {
    let mut h = harness();
    h.hall.on_connect(&cid("c1"));

    for text in ["one", "two", "three"] {
        h.log.publish(text, "admin").await.unwrap();
        assert_eq!(
            h.hall.poll_announcements().await,
            PollOutcome::Enqueued { recipients: 1 }
        );
    }
    assert_eq!(h.hall.poll_announcements().await, PollOutcome::Idle);

    let mut texts = Vec::new();
    while let Ok(announcement) = h.queue.try_recv() {
        texts.push(String::from_utf8(announcement.payload).unwrap());
    }
    assert_eq!(texts, ["one", "two", "three"]);
}

#[tokio::test(start_paused = true)]
async fn test_poll_waits_while_queue_is_full_and_keeps_the_announcement() {
    let config = HallConfig {
        announce_queue_capacity: 1,
        ..HallConfig::default()
    };
    let mut h = harness_with(Arc::new(MemoryBalances::new()), config);

    h.log.publish("first", "admin").await.unwrap();
    assert!(matches!(
        h.hall.poll_announcements().await,
        PollOutcome::Enqueued { .. }
    ));

    h.log.publish("second", "admin").await.unwrap();
    let blocked =
        tokio::time::timeout(Duration::from_secs(5), h.hall.poll_announcements()).await;
    assert!(blocked.is_err(), "poll should wait for queue space");

    let first = h.queue.recv().await.unwrap();
    assert_eq!(first.payload, b"first");

    // The cancelled step never took "second" out of the log.
    assert!(matches!(
        h.hall.poll_announcements().await,
        PollOutcome::Enqueued { .. }
    ));
    let second = h.queue.recv().await.unwrap();
    assert_eq!(second.payload, b"second");
}

#[tokio::test]
async fn test_fanout_failure_for_one_recipient_does_not_affect_others() {
    let h = harness();
    for id in ["c1", "c2", "c3"] {
        h.hall.on_connect(&cid(id));
    }
    let sender = Arc::new(FlakySender {
        broken: Some(cid("c2")),
        ..FlakySender::default()
    });

    let Harness { hall, queue, log, .. } = h;
    let fanout = spawn_fanout(queue, Arc::clone(&sender));

    log.publish("welcome all", "admin").await.unwrap();
    hall.poll_announcements().await;
    drop(hall);
    fanout.await.unwrap();

    for _ in 0..20 {
        if sender.delivered.lock().unwrap().len() == 2 {
            break;
        }
        tokio::task::yield_now().await;
    }

    let mut delivered = sender.delivered.lock().unwrap().clone();
    delivered.sort();
    assert_eq!(
        delivered,
        [
            (cid("c1"), b"welcome all".to_vec()),
            (cid("c3"), b"welcome all".to_vec()),
        ]
    );
}

#[tokio::test]
async fn test_welcome_announcement_reaches_connected_clients() {
    let h = harness();
    h.hall.on_connect(&cid("c1"));
    h.hall.on_connect(&cid("c2"));
    h.users.answer("login", Ok(envelope(200, &credentials())));
    h.users.answer("getUserInfo", Ok(envelope(200, &alice_profile())));

    let (mut ctx, _rx) = RequestContext::new(cid("c1"), Vec::new());
    if let LoginOutcome::Accepted { enrichment, .. } = h.hall.login_relay().handle(&mut ctx).await
    {
        enrichment.await.unwrap();
    }

    let mut queue = h.queue;
    assert_eq!(
        h.hall.poll_announcements().await,
        PollOutcome::Enqueued { recipients: 2 }
    );
    let announcement = queue.recv().await.unwrap();
    assert_eq!(announcement.payload, b"user Alice has logged in");
    assert_eq!(announcement.reply_route, ANNOUNCE_ROUTE);
}
