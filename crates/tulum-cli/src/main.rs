//! tulum: simple, fast, zero-configuration file encryption
//!
//! Usage:
//!   tulum [--key key.asc] [FILE] > FILE.tlm      - encrypt, writing a new key file
//!   tulum --dec [--key key.asc] [FILE.tlm] > FILE - verify and decrypt
//!
//! Input is FILE or stdin; output is always stdout. Logs and errors go to
//! stderr so binary output is never mixed with diagnostics.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use rand::rngs::OsRng;
use std::fs::File;
use std::future::Future;
use std::io::{self, BufWriter, Read};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use tulum_core::config::TulumConfig;
use tulum_crypto::{EngineContext, Janitor};

/// Exit status after a termination signal (128 + SIGINT)
const INTERRUPTED_EXIT: i32 = 130;

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "tulum",
    version,
    about = "Simple, fast, zero-configuration file encryption",
    long_about = "tulum: encrypt a file or stdin to stdout with a freshly generated key file, \
                  or verify and decrypt it back"
)]
struct Cli {
    /// Path to tulum.toml configuration file
    #[arg(long, short = 'c', env = "TULUM_CONFIG", default_value = "tulum.toml")]
    config: PathBuf,

    /// Encrypt from FILE or stdin, writing output to stdout (default)
    #[arg(long, conflicts_with = "dec")]
    enc: bool,

    /// Decrypt from FILE or stdin, writing output to stdout
    #[arg(long)]
    dec: bool,

    /// Path to the key file (overrides config key.path)
    #[arg(long, short = 'k', env = "TULUM_KEY")]
    key: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "TULUM_LOG")]
    log: Option<String>,

    /// Log format
    #[arg(long, env = "TULUM_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    /// Input file (default: stdin)
    file: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq)]
enum LogFormat {
    Json,
    Text,
}

impl LogFormat {
    fn as_str(self) -> &'static str {
        match self {
            LogFormat::Json => "json",
            LogFormat::Text => "text",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Mode {
    Encrypt,
    Decrypt,
}

impl Cli {
    fn mode(&self) -> Mode {
        if self.dec {
            Mode::Decrypt
        } else {
            Mode::Encrypt
        }
    }

    /// Flags win over the config file.
    fn apply_overrides(&self, config: &mut TulumConfig) {
        if let Some(key) = &self.key {
            config.key.path = key.clone();
        }
        if let Some(level) = &self.log {
            config.log.level = level.clone();
        }
        if let Some(format) = self.log_format {
            config.log.format = format.as_str().into();
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = load_config(&cli.config).await?;
    let config_found = loaded.is_some();
    let mut config = loaded.unwrap_or_default();
    cli.apply_overrides(&mut config);
    config.validate().context("invalid configuration")?;

    init_logging(&config.log.level, &config.log.format);
    if !config_found {
        tracing::debug!(
            "config file not found: {}  (using defaults)",
            cli.config.display()
        );
    }

    let janitor = Janitor::new();
    let ctx = EngineContext::from_config(&config, janitor.clone())?;

    // Handlers are registered before the pipeline starts so no staging file
    // can be created unobserved.
    let interrupted = install_interrupt_listener()?;
    tokio::spawn(async move {
        let signal = interrupted.await;
        // Closing also refuses any staging file the pipeline tries to
        // create between here and exit.
        let cleaned = janitor.close();
        warn!(signal, cleaned, "interrupted, removed staging files");
        std::process::exit(INTERRUPTED_EXIT);
    });

    let mode = cli.mode();
    let input = cli.file.clone();
    let key_path = config.key.path.clone();
    info!(?mode, key = %key_path.display(), "tulum starting");

    tokio::task::spawn_blocking(move || run(mode, &ctx, input.as_deref(), &key_path))
        .await
        .context("pipeline task panicked")?
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

fn run(mode: Mode, ctx: &EngineContext, input: Option<&Path>, key_path: &Path) -> Result<()> {
    let reader: Box<dyn Read> = match input {
        Some(path) => Box::new(
            File::open(path).with_context(|| format!("opening input: {}", path.display()))?,
        ),
        None => Box::new(io::stdin().lock()),
    };
    let output = BufWriter::new(io::stdout().lock());

    match mode {
        Mode::Encrypt => tulum_crypto::encrypt(ctx, reader, output, &mut OsRng, key_path)
            .context("encrypting"),
        Mode::Decrypt => tulum_crypto::decrypt(ctx, reader, output, key_path).map_err(|e| {
            let what = if e.is_integrity_failure() {
                "decrypting: input is corrupt or was not encrypted with this key"
            } else {
                "decrypting"
            };
            anyhow::Error::new(e).context(what)
        }),
    }
}

// ── Config loading ────────────────────────────────────────────────────────────

async fn load_config(path: &Path) -> Result<Option<TulumConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading config: {}", path.display()))?;
    let config = toml::from_str(&content)
        .with_context(|| format!("parsing config: {}", path.display()))?;
    Ok(Some(config))
}

// ── Logging ───────────────────────────────────────────────────────────────────

fn init_logging(level: &str, format: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(io::stderr))
                .init();
        }
    }
}

// ── Interrupt handling ────────────────────────────────────────────────────────

/// Register termination handlers now; the returned future resolves with the
/// name of the first signal received.
#[cfg(unix)]
fn install_interrupt_listener() -> Result<impl Future<Output = &'static str>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).context("registering SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("registering SIGINT handler")?;
    let mut sighup = signal(SignalKind::hangup()).context("registering SIGHUP handler")?;

    Ok(async move {
        tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
            _ = sighup.recv() => "SIGHUP",
        }
    })
}

#[cfg(not(unix))]
fn install_interrupt_listener() -> Result<impl Future<Output = &'static str>> {
    Ok(async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "ctrl-c",
            Err(e) => {
                warn!("ctrl-c handler unavailable: {e}");
                std::future::pending().await
            }
        }
    })
}
