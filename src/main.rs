//! stashkv - A Namespaced, Expiring Key-Value Store
//!
//! Command-line front end over a file-backed storage engine. Each invocation
//! opens the store, runs one command and exits, except `sweep`, which keeps
//! cleaning up stale entries until Ctrl+C.

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::Value;
use stashkv::config::DEFAULT_PREFIX;
use stashkv::{
    CleanupSweeper, EngineConfig, FileBackend, KeyTtl, ObfuscationPolicy, ReadOptions,
    StorageEngine, SweeperConfig, WriteOptions,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Store file used when none is given
const DEFAULT_STORE_PATH: &str = "stashkv.json";

#[derive(Debug, Parser)]
#[command(
    name = "stashkv",
    version,
    about = "A namespaced, expiring key-value store",
    after_help = "EXAMPLES:\n    \
        stashkv set theme '\"dark\"'\n    \
        stashkv --obfuscated-key auth_token set auth_token '\"abc123\"' --ttl-secs 3600\n    \
        STASHKV_OBFUSCATED_KEYS=auth_token stashkv get auth_token\n    \
        stashkv --obfuscated-prefix session_ cleanup\n\n\
        Keep the obfuscation options identical across runs: entries are\n\
        decoded in the mode the options assign to their key."
)]
struct Cli {
    /// Path of the JSON store file
    #[arg(long, env = "STASHKV_STORE", default_value = DEFAULT_STORE_PATH)]
    store: PathBuf,

    /// Namespace prefix for every key
    #[arg(long, env = "STASHKV_PREFIX", default_value = DEFAULT_PREFIX)]
    prefix: String,

    /// Default lifetime of new entries in seconds (default: 24 hours)
    #[arg(long, env = "STASHKV_DEFAULT_TTL_SECS", conflicts_with = "no_default_ttl")]
    default_ttl_secs: Option<u64>,

    /// New entries never expire unless a TTL is given
    #[arg(long)]
    no_default_ttl: bool,

    /// Logical key that is stored obfuscated (repeatable)
    #[arg(
        long = "obfuscated-key",
        env = "STASHKV_OBFUSCATED_KEYS",
        value_delimiter = ','
    )]
    obfuscated_keys: Vec<String>,

    /// Logical key prefix whose keys are stored obfuscated (repeatable)
    #[arg(
        long = "obfuscated-prefix",
        env = "STASHKV_OBFUSCATED_PREFIXES",
        value_delimiter = ','
    )]
    obfuscated_prefixes: Vec<String>,

    /// Obfuscate every key
    #[arg(long, env = "STASHKV_OBFUSCATE_ALL", conflicts_with_all = ["obfuscated_keys", "obfuscated_prefixes"])]
    obfuscate_all: bool,

    /// Key used to mask obfuscated entries
    #[arg(long, env = "STASHKV_OBFUSCATION_KEY", hide_env_values = true)]
    obfuscation_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Store a JSON value
    Set {
        key: String,
        /// JSON text, e.g. '"dark"', '42' or '{"id":1}'
        value: String,
        /// Lifetime in seconds
        #[arg(long, conflicts_with = "never_expire")]
        ttl_secs: Option<u64>,
        /// Store without an expiry
        #[arg(long)]
        never_expire: bool,
    },
    /// Print a live value as JSON
    Get { key: String },
    /// Print whether a live value exists
    Has { key: String },
    /// Print the remaining lifetime of a live value
    Ttl { key: String },
    /// Delete a key
    Remove { key: String },
    /// Delete every key under the prefix
    Clear,
    /// List keys under the prefix
    Keys,
    /// Delete expired, foreign-version and corrupt entries
    Cleanup,
    /// Print a usage report without modifying anything
    Diagnostics,
    /// Run the background cleanup sweeper until Ctrl+C
    Sweep {
        /// Base interval between sweeps in milliseconds
        #[arg(long, default_value_t = 60_000)]
        interval_ms: u64,
    },
}

impl Cli {
    /// Builds the engine configuration from the global options.
    fn engine_config(&self) -> EngineConfig {
        let mut config = EngineConfig::new(self.prefix.clone());

        if self.no_default_ttl {
            config = config.with_default_ttl(None);
        } else if let Some(secs) = self.default_ttl_secs {
            config = config.with_default_ttl(Some(Duration::from_secs(secs)));
        }
        if let Some(key) = &self.obfuscation_key {
            config = config.with_obfuscation_key(key.clone());
        }
        config.with_obfuscation(self.obfuscation_policy())
    }

    /// Builds the obfuscation policy from the global options.
    fn obfuscation_policy(&self) -> ObfuscationPolicy {
        if self.obfuscate_all {
            return ObfuscationPolicy::Always;
        }
        ObfuscationPolicy::keys(&self.obfuscated_keys).with_prefixes(&self.obfuscated_prefixes)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up logging (stderr, so command output stays pipeable)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let backend = FileBackend::open(&cli.store)
        .with_context(|| format!("failed to open store {}", cli.store.display()))?;
    let engine = StorageEngine::new(cli.engine_config(), backend)
        .context("invalid engine configuration")?;

    match cli.command {
        Command::Set {
            key,
            value,
            ttl_secs,
            never_expire,
        } => {
            let value: Value = serde_json::from_str(&value)
                .with_context(|| format!("value for '{}' is not valid JSON", key))?;

            let options = match ttl_secs {
                Some(secs) => WriteOptions::ttl(Duration::from_secs(secs)),
                None if never_expire => WriteOptions::never_expire(),
                None => WriteOptions::default(),
            };

            engine
                .try_set(&key, &value, options)
                .with_context(|| format!("failed to store '{}'", key))?;
            println!("OK");
        }
        Command::Get { key } => match engine.get::<Value>(&key, ReadOptions::default()) {
            Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
            None => println!("(nil)"),
        },
        Command::Has { key } => {
            println!("{}", engine.has(&key, ReadOptions::default()));
        }
        Command::Ttl { key } => match engine.ttl(&key, ReadOptions::default()) {
            Some(KeyTtl::Persistent) => println!("never expires"),
            Some(KeyTtl::Remaining(left)) => println!("{}s", left.as_secs()),
            None => println!("(nil)"),
        },
        Command::Remove { key } => {
            engine.remove(&key);
            println!("OK");
        }
        Command::Clear => {
            println!("(removed {})", engine.clear());
        }
        Command::Keys => {
            for key in engine.keys() {
                println!("{}", key);
            }
        }
        Command::Cleanup => {
            println!("(removed {})", engine.cleanup());
        }
        Command::Diagnostics => {
            println!("{}", serde_json::to_string_pretty(&engine.diagnostics())?);
        }
        Command::Sweep { interval_ms } => sweep(engine, interval_ms).await?,
    }

    Ok(())
}

/// Runs the cleanup sweeper over `engine` until Ctrl+C.
async fn sweep(engine: StorageEngine<FileBackend>, interval_ms: u64) -> anyhow::Result<()> {
    let base_interval = Duration::from_millis(interval_ms.max(1));
    let defaults = SweeperConfig::default();
    let config = SweeperConfig {
        base_interval,
        min_interval: defaults.min_interval.min(base_interval),
        max_interval: defaults.max_interval.max(base_interval),
        ..defaults
    };

    let engine = Arc::new(engine);
    info!(
        store = %engine.backend().path().display(),
        prefix = engine.prefix(),
        "Sweeping stale entries every {:?}, Ctrl+C to stop",
        base_interval
    );
    let sweeper = CleanupSweeper::start(Arc::clone(&engine), config);

    signal::ctrl_c()
        .await
        .context("failed to install Ctrl+C handler")?;
    info!("Shutdown signal received, stopping sweeper...");
    drop(sweeper);

    let stats = engine.stats();
    info!(purged = stats.purged, "Sweeper shutdown complete");
    Ok(())
}
