//! Cache-failure injection tests.
//!
//! The cache is a write-only mirror: every write can fail and the sync
//! state must not care. These tests run the full client task with a
//! [`FlakyCache`] wrapping the real in-memory cache and check that sync
//! results are identical no matter how many writes are dropped, and that
//! failure injection itself is deterministic per seed.

use std::time::Duration;

use hotline_client::{
    CacheBridge, ChatClient, ClientIdentity, EngineConfig, EngineNotice, MemoryCache,
};
use hotline_core::env::test_utils::MockEnv;
use hotline_harness::{FlakyCache, SimBroker, SimNet, SimTransport};
use hotline_proto::{ConversationId, DeliveryState, MessageKind, UserId};
use tokio::time::timeout;

const CONV: ConversationId = 0xBEEF;
const SELF_ID: UserId = 42;
const PEER_ID: UserId = 808;

const WAIT: Duration = Duration::from_secs(5);

fn spawn_client<C: CacheBridge>(cache: C) -> (ChatClient, SimNet) {
    let (transport, net) = SimTransport::new(SimBroker::new());
    let client = ChatClient::spawn(
        transport,
        MockEnv::new(),
        "sim://broker",
        ClientIdentity::new(SELF_ID, "ada"),
        EngineConfig::default(),
        cache,
    );
    (client, net)
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

/// Join, send four messages, wait for their confirmations, then take one
/// peer delivery. Returns the final local message list.
async fn run_sync_flow<C: CacheBridge>(cache: C) -> Vec<(Option<u64>, DeliveryState)> {
    let (client, net) = spawn_client(cache);
    let mut notices = client.subscribe();

    wait_until_connected(&client).await;
    client.join_conversation(CONV).await.expect("join acked");

    for content in ["one", "two", "three", "four"] {
        client.send_message(CONV, MessageKind::Text, content).await.expect("send accepted");
    }

    let confirmations = async {
        let mut seen = 0;
        while seen < 4 {
            if let Ok(EngineNotice::MessageConfirmed { .. }) = notices.recv().await {
                seen += 1;
            }
        }
    };
    timeout(WAIT, confirmations).await.expect("all sends confirmed");

    net.deliver_new_message(CONV, PEER_ID, "grace", "got them");
    let delivery = async {
        loop {
            if let Ok(EngineNotice::MessageReceived { .. }) = notices.recv().await {
                return;
            }
        }
    };
    timeout(WAIT, delivery).await.expect("delivery observed");

    let snapshot = client.snapshot(CONV).await.expect("task alive").expect("conversation known");
    snapshot.messages().iter().map(|message| (message.id, message.status)).collect()
}

#[tokio::test(start_paused = true)]
async fn total_cache_failure_never_disturbs_sync() {
    let cache = FlakyCache::new(MemoryCache::new(), 1.0);
    let messages = run_sync_flow(cache.clone()).await;

    // Sync state is complete even though not one write landed.
    assert_eq!(messages.len(), 5);
    for (index, (id, status)) in messages.iter().enumerate() {
        assert_eq!(*id, Some(index as u64 + 1));
        let expected = if index < 4 { DeliveryState::Sent } else { DeliveryState::Delivered };
        assert_eq!(*status, expected);
    }

    assert!(cache.write_attempts() >= 5, "every confirmation and delivery hits the cache");
    assert!(cache.inner().messages(CONV).is_empty());
    assert_eq!(cache.inner().conversation_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn sync_state_is_identical_with_and_without_cache_failures() {
    let healthy = MemoryCache::new();
    let flaky = FlakyCache::with_seed(MemoryCache::new(), 0.5, 42);

    let baseline = run_sync_flow(healthy.clone()).await;
    let with_failures = run_sync_flow(flaky.clone()).await;

    assert_eq!(baseline, with_failures);

    // The healthy run mirrored everything; the flaky run only part of it.
    assert_eq!(healthy.messages(CONV).len(), 5);
    assert!(flaky.inner().messages(CONV).len() <= 5);
    assert_eq!(flaky.write_attempts(), 5);
}

#[tokio::test(start_paused = true)]
async fn same_seed_drops_the_same_writes() {
    let first = FlakyCache::with_seed(MemoryCache::new(), 0.5, 7);
    let second = FlakyCache::with_seed(MemoryCache::new(), 0.5, 7);

    let left = run_sync_flow(first.clone()).await;
    let right = run_sync_flow(second.clone()).await;
    assert_eq!(left, right);

    let landed = |cache: &FlakyCache<MemoryCache>| {
        cache.inner().messages(CONV).iter().filter_map(|message| message.id).collect::<Vec<_>>()
    };
    assert_eq!(landed(&first), landed(&second));
    assert_eq!(first.write_attempts(), second.write_attempts());
}
