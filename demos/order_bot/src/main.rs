//! Order Bot Example
//!
//! A small food-ordering conversation built on Parley. Events are read as
//! JSON lines from stdin and replies are logged.
//!
//! # Conversation
//!
//! ```text
//! /start ──▶ awaiting_name ──(any text)──▶ ordering ──[Add]──▶ ordering
//!                                              │
//!                                           /checkout ──(payment)──▶ cleared
//! ```
//!
//! # Usage
//!
//! ```bash
//! cat <<'JSON' | cargo run --package order-bot
//! {"id": 1, "user_id": 7, "chat_id": 7, "type": "message", "text": "/start"}
//! {"id": 2, "user_id": 7, "chat_id": 7, "type": "message", "text": "Ada"}
//! {"id": 3, "user_id": 7, "chat_id": 7, "type": "callback", "data": "query:add , value:pizza"}
//! {"id": 4, "user_id": 7, "chat_id": 7, "type": "message", "text": "/checkout"}
//! {"id": 5, "user_id": 7, "chat_id": 7, "type": "payment", "payload": "order", "currency": "EUR", "total_amount": 1200}
//! JSON
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use parley::core::{MessageId, SendResult};
use parley::prelude::*;
use parley::runtime::ConfigLoader;

const MENU: &[(&str, &str)] = &[("pizza", "Pizza"), ("salad", "Salad"), ("soup", "Soup")];

#[derive(Parser, Debug)]
#[command(name = "order-bot", about = "Food ordering bot reading JSON-lines events from stdin")]
struct Args {
    /// Configuration file (defaults to ./parley.toml if present).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the number of workers.
    #[arg(short, long)]
    workers: Option<usize>,

    /// Let any worker take any event. Without it events are sharded by
    /// conversation, since the steps of one order arrive back to back on
    /// stdin and must run in sequence.
    #[arg(long)]
    shared: bool,

    /// How long to keep serving after stdin closes, in milliseconds.
    #[arg(long, default_value_t = 200)]
    linger_ms: u64,
}

impl Args {
    fn dispatch_mode(&self) -> DispatchMode {
        if self.shared {
            DispatchMode::Shared
        } else {
            DispatchMode::Sharded
        }
    }
}

// ============================================================================
// Collaborators
// ============================================================================

/// Reads one JSON event per line. Malformed lines are skipped.
struct StdinSource {
    lines: Lines<BufReader<Stdin>>,
    closed: Arc<Notify>,
}

#[async_trait]
impl EventSource for StdinSource {
    async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => match serde_json::from_str(&line) {
                    Ok(event) => return Some(event),
                    Err(e) => warn!(error = %e, "Skipping malformed event line"),
                },
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Failed to read stdin");
                    break;
                }
            }
        }
        self.closed.notify_one();
        None
    }
}

/// Logs every reply instead of talking to a platform.
#[derive(Default)]
struct LogSender {
    next_id: std::sync::atomic::AtomicI64,
}

#[async_trait]
impl Sender for LogSender {
    async fn send(&self, chat_id: i64, reply: Reply) -> SendResult<MessageId> {
        let id = self
            .next_id
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        match &reply {
            Reply::Text { text } => info!(chat_id, "bot: {text}"),
            Reply::Keyboard { text, buttons } => {
                let labels: Vec<&str> = buttons.iter().flatten().map(|b| b.text.as_str()).collect();
                info!(chat_id, buttons = ?labels, "bot: {text}");
            }
            Reply::Media { url, caption } => {
                info!(chat_id, url = %url, caption = ?caption, "bot: <media>")
            }
        }
        Ok(id)
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn start(ctx: Arc<Ctx>) -> Result<(), BoxError> {
    ctx.clear_state().await?;
    ctx.update_state("awaiting_name", HashMap::new()).await?;
    ctx.reply("Welcome! What's your name?").await?;
    Ok(())
}

async fn got_name(ctx: Arc<Ctx>) -> Result<(), BoxError> {
    let name = ctx.text().unwrap_or_default().trim().to_string();
    let data = HashMap::from([("name".to_string(), name.clone())]);
    ctx.update_state("ordering", data).await?;

    let buttons = MENU
        .iter()
        .map(|(key, label)| {
            Button::callback(*label, &CallbackData::new("add", *key)).map(|button| vec![button])
        })
        .collect::<Result<_, _>>()?;
    ctx.send(Reply::keyboard(format!("Hi {name}, what would you like?"), buttons))
        .await?;
    Ok(())
}

async fn add_item(ctx: Arc<Ctx>) -> Result<(), BoxError> {
    let Some(data) = ctx.callback() else {
        return Ok(());
    };
    let field = format!("cart.{}", data.value);
    let count = ctx
        .get_state_field(&field)
        .await?
        .and_then(|n| n.parse::<u32>().ok())
        .unwrap_or(0);
    ctx.merge_state_data(HashMap::from([(field, (count + 1).to_string())]))
        .await?;
    ctx.reply(format!("Added {} (x{})", data.value, count + 1))
        .await?;
    Ok(())
}

async fn checkout(ctx: Arc<Ctx>) -> Result<(), BoxError> {
    let state = ctx.get_state().await?;
    let mut items: Vec<String> = state
        .data
        .iter()
        .filter_map(|(k, v)| k.strip_prefix("cart.").map(|item| format!("{v} x {item}")))
        .collect();
    if items.is_empty() {
        ctx.reply("Your cart is empty.").await?;
        return Ok(());
    }
    items.sort();
    ctx.update_state("awaiting_payment", state.data).await?;
    ctx.reply(format!("Your order: {}. Please pay to confirm.", items.join(", ")))
        .await?;
    Ok(())
}

async fn paid(ctx: Arc<Ctx>) -> Result<(), BoxError> {
    let name = ctx.get_state_field("name").await?.unwrap_or_default();
    ctx.clear_state().await?;
    ctx.reply(format!("Thanks {name}, your order is on its way!"))
        .await?;
    Ok(())
}

async fn fallback(ctx: Arc<Ctx>) {
    if let Err(e) = ctx.reply("Send /start to place an order.").await {
        warn!(error = %e, "Failed to send fallback reply");
    }
}

// ============================================================================
// Middleware
// ============================================================================

fn timing() -> Middleware {
    Middleware::from_fn(|ctx: Arc<Ctx>, next: Next| async move {
        let started = Instant::now();
        let result = next.run(ctx.clone()).await;
        debug!(event_id = ctx.event().id, elapsed = ?started.elapsed(), "Handled");
        result
    })
    .named("timing")
}

/// Drops events from chats that are not private conversations.
fn private_only() -> Middleware {
    Middleware::from_fn(|ctx: Arc<Ctx>, next: Next| async move {
        if ctx.user_id() != ctx.chat_id() {
            debug!(chat_id = ctx.chat_id(), "Ignoring group chat");
            return Ok(());
        }
        next.run(ctx).await
    })
    .named("private_only")
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut loader = ConfigLoader::new().with_current_dir();
    if let Some(path) = &args.config {
        loader = loader.file(path);
    }
    let mut config = loader.load()?;
    if let Some(workers) = args.workers {
        config.router.workers = workers;
    }
    config.router.dispatch = args.dispatch_mode();
    let runtime = ParleyRuntime::from_config(&config);

    let closed = Arc::new(Notify::new());
    let source = StdinSource {
        lines: BufReader::new(tokio::io::stdin()).lines(),
        closed: closed.clone(),
    };
    let router = runtime.router(
        source,
        Arc::new(LogSender::default()),
        Arc::new(MemoryStateStore::new()),
    );

    // ========================================================================
    // Register Routes
    // ========================================================================

    let orders = router.group();
    orders.use_middleware([timing(), private_only()]);
    orders
        .register(Filter::command("start"), start)
        .register(
            Filter::state("awaiting_name").and(|ctx| ctx.text().is_some()),
            got_name,
        )
        .register(Filter::callback("add"), add_item)
        .register(Filter::command("checkout"), checkout)
        .register(
            Filter::state("awaiting_payment")
                .and(|ctx| matches!(ctx.event().kind, EventKind::Payment { .. })),
            paid,
        );

    router.register(Filter::any(), fallback);
    info!(routes = router.route_count(), "Order bot ready");

    let linger = Duration::from_millis(args.linger_ms);
    runtime
        .run_until(&router, async move {
            tokio::select! {
                _ = closed.notified() => {
                    info!("stdin closed, finishing queued events");
                    tokio::time::sleep(linger).await;
                }
                _ = tokio::signal::ctrl_c() => {}
            }
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversations_are_sharded_by_default() {
        let args = Args::try_parse_from(["order-bot"]).unwrap();
        assert_eq!(args.dispatch_mode(), DispatchMode::Sharded);

        let args = Args::try_parse_from(["order-bot", "--shared", "-w", "8"]).unwrap();
        assert_eq!(args.dispatch_mode(), DispatchMode::Shared);
        assert_eq!(args.workers, Some(8));
    }
}
