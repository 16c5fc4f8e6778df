use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tollgate::config::TollgateConfig;
use tollgate::ratelimit::{DistributedLimiter, RateLimiter, WaitScope};
use tollgate::store::{BucketStore, MemoryStore};

/// Take tokens from a shared token bucket.
#[derive(Debug, Parser)]
#[command(name = "tollgate", version, about)]
struct Cli {
    /// Configuration file (YAML, TOML or JSON)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Bucket name, overriding the configuration
    #[arg(long, global = true)]
    identity: Option<String>,

    /// Tokens added per second, overriding the configuration
    #[arg(long, global = true)]
    rate: Option<f64>,

    /// Bucket capacity, overriding the configuration
    #[arg(long, global = true)]
    burst: Option<u32>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Take tokens if available, without blocking
    Allow {
        /// Number of tokens
        #[arg(default_value_t = 1)]
        n: u32,
    },
    /// Block until tokens are available
    Wait {
        /// Number of tokens
        #[arg(default_value_t = 1)]
        n: u32,

        /// Give up after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let mut config = TollgateConfig::load(cli.config.as_deref())?;
    if let Some(identity) = cli.identity {
        config.limiter.identity = identity;
    }
    if let Some(rate) = cli.rate {
        config.limiter.rate = rate;
    }
    if let Some(burst) = cli.burst {
        config.limiter.burst = burst;
    }
    config.validate()?;
    info!(identity = %config.limiter.identity, "Configuration loaded");

    let store = connect_store(&config).await?;
    let limiter = DistributedLimiter::new(
        &config.limiter.identity,
        store,
        config.limiter.rate,
        config.limiter.burst,
    )?;

    match cli.command {
        Command::Allow { n } => {
            let admitted = limiter.allow_n(Utc::now(), n).await?;
            println!("{}", if admitted { "admitted" } else { "denied" });
        }
        Command::Wait { n, timeout_secs } => {
            let scope = match timeout_secs {
                Some(secs) => WaitScope::with_timeout(Duration::from_secs(secs)),
                None => WaitScope::new(),
            };

            let token = scope.token().clone();
            tokio::spawn(async move {
                if signal::ctrl_c().await.is_ok() {
                    warn!("Received Ctrl+C, cancelling wait");
                    token.cancel();
                }
            });

            match limiter.wait_n(&scope, n).await {
                Ok(()) => println!("admitted"),
                Err(e) if e.is_cancelled() => println!("{}", e),
                Err(e) => return Err(e.into()),
            }
        }
    }

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[cfg(feature = "redis")]
async fn connect_store(config: &TollgateConfig) -> anyhow::Result<Arc<dyn BucketStore>> {
    use anyhow::Context;
    use tollgate::store::RedisStore;

    let Some(url) = config.store.redis_url.as_deref() else {
        info!("Using in-memory store");
        return Ok(Arc::new(MemoryStore::new()));
    };

    info!(url = %url, "Connecting to Redis");
    let client = redis::Client::open(url).context("invalid Redis URL")?;
    let connection = redis::aio::ConnectionManager::new(client)
        .await
        .context("failed to connect to Redis")?;
    Ok(Arc::new(RedisStore::new(connection)))
}

#[cfg(not(feature = "redis"))]
async fn connect_store(config: &TollgateConfig) -> anyhow::Result<Arc<dyn BucketStore>> {
    if config.store.redis_url.is_some() {
        anyhow::bail!("store.redis_url is set but tollgate was built without the `redis` feature");
    }
    info!("Using in-memory store");
    Ok(Arc::new(MemoryStore::new()))
}
