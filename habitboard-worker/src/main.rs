mod events;

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::Layer;
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use habitboard_core::Data;
use habitboard_database::store::{
    DEFAULT_TRANSACTION_MAX_ATTEMPTS, DEFAULT_TRANSACTION_RETRY_BACKOFF,
};
use habitboard_database::{Database, DocumentStore, TransactionSettings};
use habitboard_utils::env::{env_bool, env_string, env_u64};
use habitboard_utils::path::DocumentPattern;

const DEFAULT_TRIGGER_PATTERN: &str = "users/{uid}/habits/{hid}";
const DEFAULT_KEY_PREFIX: &str = "habitboard:prod";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(filter_fn(|metadata| {
            *metadata.level() <= tracing::Level::INFO
        }));

    tracing_subscriber::registry().with(fmt_layer).init();

    // Load the .env file
    dotenvy::dotenv().ok();

    let store = build_store().with_transaction_settings(TransactionSettings {
        max_attempts: u32::try_from(env_u64(
            "TX_MAX_ATTEMPTS",
            u64::from(DEFAULT_TRANSACTION_MAX_ATTEMPTS),
        ))
        .unwrap_or(DEFAULT_TRANSACTION_MAX_ATTEMPTS),
        retry_backoff: Duration::from_millis(env_u64(
            "TX_RETRY_BACKOFF_MS",
            DEFAULT_TRANSACTION_RETRY_BACKOFF.as_millis() as u64,
        )),
    });
    let settings = store.transaction_settings();
    info!(
        max_attempts = settings.max_attempts,
        retry_backoff_ms = settings.retry_backoff.as_millis() as u64,
        "Transaction retry policy configured."
    );

    if store.is_redis_enabled() {
        if let Err(err) = store.ping().await {
            warn!(
                ?err,
                "Redis store ping failed; invocations will fail until it is reachable."
            );
        } else {
            info!("Redis store health check passed.");
        }
    }

    let pattern = DocumentPattern::parse(&env_string(
        "HABIT_TRIGGER_PATTERN",
        DEFAULT_TRIGGER_PATTERN,
    ))?;
    if !pattern.wildcards().any(|name| name == "uid") {
        anyhow::bail!("HABIT_TRIGGER_PATTERN `{pattern}` must bind a `{{uid}}` segment");
    }
    let pattern = Arc::new(pattern);

    let concurrency = usize::try_from(env_u64("WORKER_CONCURRENCY", 1))?.max(1);
    let data = Data::new(Database::new(store));

    info!(%pattern, concurrency, "Habitboard worker is listening on stdin.");
    run_event_loop(data, pattern, concurrency).await?;
    info!("Event stream closed; habitboard worker stopped.");

    Ok(())
}

fn build_store() -> DocumentStore {
    let redis_enabled = env_bool("REDIS_ENABLED", false);
    let key_prefix = env_string("REDIS_KEY_PREFIX", DEFAULT_KEY_PREFIX);

    if !redis_enabled {
        info!("Redis store disabled (set REDIS_ENABLED=true to enable); using in-memory store.");
        return DocumentStore::memory();
    }

    match std::env::var("REDIS_URL") {
        Ok(redis_url) => match DocumentStore::redis(&redis_url, key_prefix.clone()) {
            Ok(store) => {
                info!(key_prefix = %key_prefix, "Redis store enabled.");
                store
            }
            Err(err) => {
                warn!(?err, key_prefix = %key_prefix, "Failed to initialize Redis store; continuing with in-memory store.");
                DocumentStore::memory()
            }
        },
        Err(_) => {
            warn!(key_prefix = %key_prefix, "REDIS_ENABLED=true but REDIS_URL is missing; continuing with in-memory store.");
            DocumentStore::memory()
        }
    }
}

async fn run_event_loop(
    data: Data,
    pattern: Arc<DocumentPattern>,
    concurrency: usize,
) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let permits = Arc::new(Semaphore::new(concurrency));
    let mut tasks = JoinSet::new();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let permit = Arc::clone(&permits).acquire_owned().await?;
        let data = data.clone();
        let pattern = Arc::clone(&pattern);
        tasks.spawn(async move {
            events::habit_write::handle_event_line(&data, &pattern, &line).await;
            drop(permit);
        });

        while let Some(joined) = tasks.try_join_next() {
            if let Err(err) = joined {
                error!(?err, "event task panicked");
            }
        }
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(err) = joined {
            error!(?err, "event task panicked");
        }
    }

    Ok(())
}
