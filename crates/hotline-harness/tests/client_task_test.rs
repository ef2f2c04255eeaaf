//! End-to-end client task tests over the in-process simulation link.
//!
//! [`ChatClient::spawn`] runs the real task loop here: tokio channels, the
//! select loop, and the tick interval are all live, while the transport is
//! a [`SimTransport`] and the clock is a [`MockEnv`]. Tokio's paused clock
//! auto-advances the task's ticker; engine timeouts move only when a test
//! advances the mock clock, so every timeout in these tests is explicit.

use std::time::Duration;

use hotline_client::{
    CacheBridge, ChatClient, ClientError, ClientIdentity, DEFAULT_JOIN_TIMEOUT, EngineConfig,
    EngineNotice, MemoryCache,
};
use hotline_core::env::test_utils::MockEnv;
use hotline_harness::{SimBroker, SimNet, SimTransport};
use hotline_proto::{ConversationId, DeliveryState, MessageKind, Payload, UserId};
use tokio::{sync::broadcast, time::timeout};

const CONV: ConversationId = 0xC0FFEE;
const SELF_ID: UserId = 42;
const PEER_ID: UserId = 707;

/// Upper bound on any single wait; paused time makes this instant.
const WAIT: Duration = Duration::from_secs(5);

fn spawn_client<C: CacheBridge>(cache: C) -> (ChatClient, SimNet, MockEnv) {
    let (transport, net) = SimTransport::new(SimBroker::new());
    let env = MockEnv::new();
    let client = ChatClient::spawn(
        transport,
        env.clone(),
        "sim://broker",
        ClientIdentity::new(SELF_ID, "ada"),
        EngineConfig::default(),
        cache,
    );
    (client, net, env)
}

/// Let the task drain queued work and observe at least one tick.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(600)).await;
}

async fn wait_until_connected(client: &ChatClient) {
    let poll = async {
        loop {
            if client.status().await.expect("task alive").connected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    };
    timeout(WAIT, poll).await.expect("connected within the wait budget");
}

async fn wait_for<F>(
    notices: &mut broadcast::Receiver<EngineNotice>,
    mut matches: F,
) -> EngineNotice
where
    F: FnMut(&EngineNotice) -> bool,
{
    let wait = async {
        loop {
            let notice = notices.recv().await.expect("notice stream open");
            if matches(&notice) {
                return notice;
            }
        }
    };
    timeout(WAIT, wait).await.expect("notice within the wait budget")
}

#[tokio::test(start_paused = true)]
async fn connect_join_send_confirm_round_trip() {
    let cache = MemoryCache::new();
    let (client, _net, _env) = spawn_client(cache.clone());
    let mut notices = client.subscribe();

    wait_until_connected(&client).await;
    client.join_conversation(CONV).await.expect("join acked");

    let queued = client
        .send_message(CONV, MessageKind::Text, "optimism pays")
        .await
        .expect("send accepted");
    assert_eq!(queued.status, DeliveryState::Sending);
    assert_eq!(queued.id, None);
    let optimistic_id = queued.optimistic_id.expect("optimistic id assigned");

    let confirmed = wait_for(&mut notices, |notice| {
        matches!(
            notice,
            EngineNotice::MessageConfirmed { optimistic_id: oid, .. } if *oid == optimistic_id
        )
    })
    .await;
    let EngineNotice::MessageConfirmed { message, .. } = confirmed else { unreachable!() };
    assert_eq!(message.id, Some(1));
    assert_eq!(message.content, "optimism pays");

    let snapshot = client.snapshot(CONV).await.expect("task alive").expect("conversation known");
    assert_eq!(snapshot.messages().len(), 1);
    assert_eq!(snapshot.messages()[0].status, DeliveryState::Sent);

    // The confirmed copy was written through to the cache.
    assert_eq!(cache.messages(CONV).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn refused_join_surfaces_rejection() {
    let (client, net, _env) = spawn_client(MemoryCache::new());
    wait_until_connected(&client).await;

    net.with_broker(|broker| broker.script_mut().refuse_joins = 1);

    let error = client.join_conversation(CONV).await.expect_err("join refused");
    let ClientError::Rejected { reason } = error else {
        panic!("expected a rejection, got {error:?}")
    };
    assert!(reason.contains("not a member"), "unexpected reason: {reason}");

    // The script covered one join; the next one goes through.
    client.join_conversation(CONV).await.expect("second join acked");
}

#[tokio::test(start_paused = true)]
async fn join_times_out_when_the_link_swallows_frames() {
    let (client, net, env) = spawn_client(MemoryCache::new());
    wait_until_connected(&client).await;

    net.set_drop_outbound(true);

    let pending = tokio::spawn({
        let client = client.clone();
        async move { client.join_conversation(CONV).await }
    });

    // Let the join request leave (and vanish), then cross the deadline.
    settle().await;
    env.advance(DEFAULT_JOIN_TIMEOUT + Duration::from_secs(1));
    settle().await;

    let result = timeout(WAIT, pending)
        .await
        .expect("join resolved within the wait budget")
        .expect("join task not aborted");
    let error = result.expect_err("join should time out");
    let ClientError::Rejected { reason } = error else {
        panic!("expected a rejection, got {error:?}")
    };
    assert!(reason.contains("timed out"), "unexpected reason: {reason}");
}

#[tokio::test(start_paused = true)]
async fn sever_backs_off_then_redials_and_resumes_joins() {
    let (client, net, env) = spawn_client(MemoryCache::new());
    let mut notices = client.subscribe();

    wait_until_connected(&client).await;
    client.join_conversation(CONV).await.expect("join acked");
    client
        .send_message(CONV, MessageKind::Text, "before the cut")
        .await
        .expect("send accepted");
    wait_for(&mut notices, |notice| matches!(notice, EngineNotice::MessageConfirmed { .. })).await;

    net.take_sent();
    net.sever("gateway restart");
    settle().await;

    // The loss is observed, but the backoff delay runs on the mock clock.
    assert!(!client.status().await.expect("task alive").connected);
    assert_eq!(net.dial_count(), 1, "redialed before the backoff elapsed");

    env.advance(Duration::from_secs(2));
    wait_until_connected(&client).await;
    assert_eq!(net.dial_count(), 2);

    // The remembered membership was replayed on the fresh session.
    let sent = net.sent_frames();
    let joins: Vec<_> = sent
        .iter()
        .filter(|frame| matches!(Payload::from_frame(frame), Ok(Payload::JoinConversation)))
        .collect();
    assert_eq!(joins.len(), 1);
    assert_eq!(joins[0].header.conversation_id(), CONV);

    // Local history survived the outage.
    let snapshot = client.snapshot(CONV).await.expect("task alive").expect("conversation known");
    assert_eq!(snapshot.messages().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn peer_traffic_reaches_subscribers_and_cache() {
    let cache = MemoryCache::new();
    let (client, net, _env) = spawn_client(cache.clone());
    let mut notices = client.subscribe();

    wait_until_connected(&client).await;
    client.join_conversation(CONV).await.expect("join acked");

    net.deliver_typing(CONV, PEER_ID, "grace", true);
    let notice =
        wait_for(&mut notices, |notice| matches!(notice, EngineNotice::TypingChanged { .. })).await;
    let EngineNotice::TypingChanged { typing, .. } = notice else { unreachable!() };
    assert_eq!(typing.len(), 1);
    assert_eq!(typing[0].user_id, PEER_ID);

    net.deliver_new_message(CONV, PEER_ID, "grace", "are we live?");
    let notice =
        wait_for(&mut notices, |notice| matches!(notice, EngineNotice::MessageReceived { .. }))
            .await;
    let EngineNotice::MessageReceived { message, .. } = notice else { unreachable!() };
    assert_eq!(message.content, "are we live?");
    assert_eq!(message.status, DeliveryState::Delivered);

    // No conversation is active, so the delivery counts as unread.
    let snapshot = client.snapshot(CONV).await.expect("task alive").expect("conversation known");
    assert_eq!(snapshot.unread(), 1);
    assert_eq!(cache.messages(CONV).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn fetch_messages_returns_the_applied_page() {
    let (client, net, _env) = spawn_client(MemoryCache::new());
    wait_until_connected(&client).await;
    client.join_conversation(CONV).await.expect("join acked");

    net.with_broker(|broker| broker.seed_history(CONV, 30, 7));

    let page = client.fetch_messages(CONV, Some(10), None, None).await.expect("fetch succeeds");
    assert_eq!(page.messages.len(), 10);
    assert!(page.has_more);
    assert_eq!(page.total, 30);
    // Newest page: the last ten of thirty seeded messages.
    assert_eq!(page.messages[0].id, Some(21));
    assert_eq!(page.messages[9].id, Some(30));
}

#[tokio::test(start_paused = true)]
async fn disconnect_stays_offline_until_reconnect() {
    let (client, net, env) = spawn_client(MemoryCache::new());
    wait_until_connected(&client).await;
    assert_eq!(net.dial_count(), 1);

    client.disconnect().await.expect("task alive");
    settle().await;
    let status = client.status().await.expect("task alive");
    assert!(!status.connected);
    assert!(!status.connecting);

    // No automatic redial, however much time passes.
    env.advance(Duration::from_secs(120));
    settle().await;
    assert_eq!(net.dial_count(), 1);

    client.reconnect().await.expect("task alive");
    wait_until_connected(&client).await;
    assert_eq!(net.dial_count(), 2);
}
