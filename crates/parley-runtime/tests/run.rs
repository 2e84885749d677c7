use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_test::assert_ok;

use parley_core::{Event, MemoryStateStore, MessageId, Reply, SendResult, Sender, channel};
use parley_router::{Ctx, DispatchMode, Filter};
use parley_runtime::{ParleyConfig, ParleyRuntime, RuntimeError};

#[derive(Default)]
struct Outbox(Mutex<Vec<Reply>>);

impl Outbox {
    fn len(&self) -> usize {
        self.0.lock().len()
    }
}

#[async_trait]
impl Sender for Outbox {
    async fn send(&self, _chat_id: i64, reply: Reply) -> SendResult<MessageId> {
        let mut sent = self.0.lock();
        sent.push(reply);
        Ok(sent.len() as MessageId)
    }
}

fn runtime(workers: usize) -> ParleyRuntime {
    let mut config = ParleyConfig::default();
    config.router.workers = workers;
    config.router.dispatch = DispatchMode::Sharded;
    config.router.drain.deadline_ms = 500;
    ParleyRuntime::from_config(&config)
}

async fn until(check: impl Fn() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "condition never became true");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_run_until_serves_then_drains() {
    let runtime = runtime(4);
    let (feed, source) = channel(8);
    let outbox = Arc::new(Outbox::default());
    let router = runtime.router(source, outbox.clone(), Arc::new(MemoryStateStore::new()));
    assert_eq!(router.config().workers, 4);
    assert_eq!(router.config().dispatch, DispatchMode::Sharded);

    router.register(Filter::command("start"), |ctx: Arc<Ctx>| async move {
        ctx.reply("welcome").await.map(|_| ())
    });

    for id in 1..=3 {
        assert_ok!(feed.push(Event::message(id, 10, 10, "/start")).await);
    }

    let seen = outbox.clone();
    assert_ok!(runtime.run_until(&router, until(move || seen.len() == 3)).await);
    assert_eq!(outbox.len(), 3);
}

#[tokio::test]
async fn test_second_run_reports_already_listening() {
    let runtime = runtime(1);
    let (_feed, source) = channel(1);
    let router = runtime.router(
        source,
        Arc::new(Outbox::default()),
        Arc::new(MemoryStateStore::new()),
    );

    assert_ok!(runtime.run_until(&router, async {}).await);

    let err = runtime
        .run_until(&router, std::future::pending::<()>())
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::AlreadyListening));
}
