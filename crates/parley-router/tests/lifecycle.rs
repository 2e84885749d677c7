mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{Barrier, Notify};
use tokio_test::assert_ok;
use tokio_util::sync::CancellationToken;

use common::{CountingStore, RecordingSender};
use parley_core::{ConversationKey, Event, EventFeed, channel};
use parley_router::{
    Ctx, DispatchMode, DrainConfig, Filter, Router, RouterConfig, ShutdownError,
};

struct Harness {
    router: Router,
    feed: EventFeed,
    store: Arc<CountingStore>,
    token: CancellationToken,
}

impl Harness {
    fn new(config: RouterConfig) -> Self {
        let (feed, source) = channel(64);
        let store = CountingStore::shared();
        let router = Router::builder(source, RecordingSender::shared(), store.clone())
            .config(config)
            .build();
        Self {
            router,
            feed,
            store,
            token: CancellationToken::new(),
        }
    }

    fn start(&self) -> tokio::task::JoinHandle<()> {
        let router = self.router.clone();
        let token = self.token.clone();
        tokio::spawn(async move { router.listen(token).await })
    }
}

fn config(workers: usize, dispatch: DispatchMode) -> RouterConfig {
    RouterConfig {
        workers,
        dispatch,
        ..RouterConfig::default()
    }
}

async fn wait_for(what: &str, check: impl Fn() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {what}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_listen_serves_events_and_drains() {
    let harness = Harness::new(config(4, DispatchMode::Shared));
    let hits = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&hits);
    harness.router.register(Filter::any(), move |_ctx: Arc<Ctx>| {
        let counted = Arc::clone(&counted);
        async move {
            counted.fetch_add(1, Ordering::SeqCst);
        }
    });

    let listening = harness.start();
    for id in 0..10 {
        assert_ok!(harness.feed.push(Event::message(id, id, id, "hi")).await);
    }
    wait_for("ten events", || hits.load(Ordering::SeqCst) == 10).await;

    assert_ok!(harness.router.shutdown(&harness.token).await);
    assert_ok!(listening.await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writes_to_one_conversation_race() {
    let harness = Harness::new(config(2, DispatchMode::Shared));
    let both_in_flight = Arc::new(Barrier::new(2));
    let writes: Arc<Mutex<Vec<String>>> = Arc::default();

    let barrier = Arc::clone(&both_in_flight);
    let log = Arc::clone(&writes);
    harness.router.register(Filter::message(), move |ctx: Arc<Ctx>| {
        let barrier = Arc::clone(&barrier);
        let log = Arc::clone(&log);
        async move {
            barrier.wait().await;
            let label = ctx.text().unwrap_or_default().to_string();
            if label == "second" {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            ctx.update_state(label.clone(), HashMap::new()).await?;
            log.lock().push(label);
            Ok::<_, parley_router::BoxError>(())
        }
    });

    let listening = harness.start();
    assert_ok!(harness.feed.push(Event::message(1, 7, 7, "first")).await);
    assert_ok!(harness.feed.push(Event::message(2, 7, 7, "second")).await);
    wait_for("both writes", || writes.lock().len() == 2).await;

    // No per-conversation serialization: whichever write lands last wins.
    let last = writes.lock().last().cloned();
    let stored = harness.store.label(ConversationKey::new(7, 7)).await;
    assert_eq!(stored, last);
    assert_eq!(stored.as_deref(), Some("second"));

    assert_ok!(harness.router.shutdown(&harness.token).await);
    assert_ok!(listening.await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sharded_mode_keeps_conversation_order() {
    let harness = Harness::new(config(4, DispatchMode::Sharded));
    let seen: Arc<Mutex<HashMap<i64, Vec<i64>>>> = Arc::default();

    let log = Arc::clone(&seen);
    harness.router.register(Filter::any(), move |ctx: Arc<Ctx>| {
        let log = Arc::clone(&log);
        async move {
            // Later events sleep less, so a shared queue would reorder them.
            let delay = 20u64.saturating_sub(ctx.event().id as u64);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            log.lock()
                .entry(ctx.user_id())
                .or_default()
                .push(ctx.event().id);
        }
    });

    let listening = harness.start();
    for id in 0..20 {
        let user = id % 2;
        assert_ok!(harness.feed.push(Event::message(id, user, user, "step")).await);
    }
    wait_for("all events", || {
        seen.lock().values().map(Vec::len).sum::<usize>() == 20
    })
    .await;

    let seen = seen.lock().clone();
    assert_eq!(seen[&0], (0..20).step_by(2).collect::<Vec<_>>());
    assert_eq!(seen[&1], (1..20).step_by(2).collect::<Vec<_>>());

    assert_ok!(harness.router.shutdown(&harness.token).await);
    assert_ok!(listening.await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shutdown_waits_for_in_flight_handler() {
    let harness = Harness::new(config(2, DispatchMode::Shared));
    let started = Arc::new(Notify::new());
    let finished = Arc::new(AtomicBool::new(false));

    let (on_start, done) = (Arc::clone(&started), Arc::clone(&finished));
    harness.router.register(Filter::any(), move |_ctx: Arc<Ctx>| {
        let (on_start, done) = (Arc::clone(&on_start), Arc::clone(&done));
        async move {
            on_start.notify_one();
            tokio::time::sleep(Duration::from_millis(200)).await;
            done.store(true, Ordering::SeqCst);
        }
    });

    let listening = harness.start();
    assert_ok!(harness.feed.push(Event::message(1, 1, 1, "slow")).await);
    started.notified().await;

    assert_ok!(harness.router.shutdown(&harness.token).await);
    assert!(finished.load(Ordering::SeqCst));
    assert_ok!(listening.await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shutdown_gives_up_at_deadline() {
    let mut config = config(1, DispatchMode::Shared);
    config.drain = DrainConfig {
        initial_backoff_ms: 10,
        max_backoff_ms: 40,
        multiplier: 2.0,
        deadline_ms: 150,
    };
    let harness = Harness::new(config);
    let started = Arc::new(Notify::new());
    let cancelled = Arc::new(AtomicBool::new(false));

    let (on_start, seen_cancel) = (Arc::clone(&started), Arc::clone(&cancelled));
    harness.router.register(Filter::any(), move |ctx: Arc<Ctx>| {
        let (on_start, seen_cancel) = (Arc::clone(&on_start), Arc::clone(&seen_cancel));
        async move {
            on_start.notify_one();
            tokio::select! {
                _ = ctx.cancellation().cancelled() => seen_cancel.store(true, Ordering::SeqCst),
                _ = tokio::time::sleep(Duration::from_secs(10)) => {}
            }
        }
    });

    let listening = harness.start();
    assert_ok!(harness.feed.push(Event::message(1, 1, 1, "stuck")).await);
    started.notified().await;

    let begun = std::time::Instant::now();
    let err = harness.router.shutdown(&harness.token).await.unwrap_err();
    assert!(begun.elapsed() >= Duration::from_millis(150));
    match err {
        ShutdownError::DrainTimeout {
            deadline,
            in_flight,
        } => {
            assert_eq!(deadline, Duration::from_millis(150));
            assert!(in_flight >= 1);
        }
    }

    // The timed-out handler is told to stop and does.
    wait_for("handler cancellation", || cancelled.load(Ordering::SeqCst)).await;
    assert_ok!(listening.await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_closed_source_stops_workers() {
    let harness = Harness::new(config(3, DispatchMode::Sharded));
    let hits = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&hits);
    harness.router.register(Filter::any(), move |_ctx: Arc<Ctx>| {
        let counted = Arc::clone(&counted);
        async move {
            counted.fetch_add(1, Ordering::SeqCst);
        }
    });

    let listening = harness.start();
    assert_ok!(harness.feed.push(Event::message(1, 1, 1, "last")).await);
    let Harness {
        router, feed, token, ..
    } = harness;
    wait_for("workers to start", || router.in_flight() > 0).await;
    drop(feed);

    // Closing the source alone ends the pump and every shard worker.
    wait_for("workers to exit", || router.in_flight() == 0).await;
    assert!(!token.is_cancelled());
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    assert_ok!(router.shutdown(&token).await);
    assert_ok!(listening.await);
}

#[tokio::test]
async fn test_second_listen_returns_immediately() {
    let harness = Harness::new(config(1, DispatchMode::Shared));
    harness.token.cancel();

    let first = tokio::time::timeout(
        Duration::from_secs(1),
        harness.router.listen(harness.token.clone()),
    )
    .await;
    assert!(first.is_ok());

    // The source is consumed; a live token does not keep this call waiting.
    let second = tokio::time::timeout(
        Duration::from_secs(1),
        harness.router.listen(CancellationToken::new()),
    )
    .await;
    assert!(second.is_ok());

    assert_ok!(harness.router.shutdown(&harness.token).await);
}
