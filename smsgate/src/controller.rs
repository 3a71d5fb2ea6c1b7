use std::{
    future::Future,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use serde::Deserialize;
use smsgate_common::{Signal, internal, logging};
use smsgate_dispatch::{DispatchConfig, DispatchObserver, DispatchQueue, Transport};
use smsgate_session::{ConversationHandler, ConversationRouter, SessionCache, SessionConfig};
use smsgate_tracing::traced;
use tokio::sync::broadcast;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "SMSGATE_CONFIG";

const DEFAULT_CONFIG_PATHS: [&str; 2] = [
    "./smsgate.config.ron",
    "/etc/smsgate/smsgate.config.ron",
];

/// Top-level gateway configuration and controller.
///
/// # Examples
///
/// ```ron
/// Gateway (
///     dispatch: (
///         calls_per_second: 4,
///         max_recipients_per_call: 100,
///         max_retries: 5,
///     ),
///     sessions: (
///         max_size: 5000,
///     ),
/// )
/// ```
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
pub struct Gateway {
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(alias = "session", default)]
    pub sessions: SessionConfig,
}

impl Gateway {
    /// Load configuration from the first file [`find_config_file`] finds.
    ///
    /// # Errors
    ///
    /// Fails if no file is found, it can't be read or parsed, or a value is
    /// out of range.
    pub fn load() -> anyhow::Result<Self> {
        Self::from_file(&find_config_file()?)
    }

    /// Load configuration from `path`.
    ///
    /// # Errors
    ///
    /// Fails if the file can't be read or parsed, or a value is out of range.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        Self::from_ron(&content).with_context(|| format!("Invalid config in {}", path.display()))
    }

    /// Parse configuration from RON text.
    ///
    /// # Errors
    ///
    /// Fails if `content` is not valid RON for this structure, or a value is
    /// out of range.
    pub fn from_ron(content: &str) -> anyhow::Result<Self> {
        let gateway: Self = ron::from_str(content)?;
        gateway.validate()?;
        Ok(gateway)
    }

    /// Check every configured value is in range.
    ///
    /// # Errors
    ///
    /// Returns the first offending value.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.dispatch.validate()?;
        self.sessions.max_size()?;
        Ok(())
    }

    /// Build a dispatch queue sending through `transport`.
    ///
    /// # Errors
    ///
    /// Fails if the dispatch configuration is out of range.
    pub fn dispatch_queue(
        &self,
        transport: Arc<dyn Transport>,
        observer: Arc<dyn DispatchObserver>,
    ) -> anyhow::Result<DispatchQueue> {
        Ok(DispatchQueue::new(&self.dispatch, transport, observer)?)
    }

    /// Build an empty session cache.
    ///
    /// # Errors
    ///
    /// Fails if the session configuration is out of range.
    pub fn session_cache<D>(&self) -> anyhow::Result<SessionCache<D>> {
        Ok(SessionCache::from_config(&self.sessions)?)
    }

    /// Build a conversation router backed by a fresh session cache.
    ///
    /// # Errors
    ///
    /// Fails if the session configuration is out of range.
    pub fn conversation_router<D>(
        &self,
        handler: Arc<dyn ConversationHandler<D>>,
    ) -> anyhow::Result<ConversationRouter<D>>
    where
        D: Clone + Default + Send + Sync + 'static,
    {
        let cache = Arc::new(self.session_cache::<D>()?);
        Ok(ConversationRouter::new(cache, handler))
    }

    /// Run `queue` until the process is asked to stop
    ///
    /// Initialises logging, then serves the queue until Ctrl-C or `SIGTERM`
    /// arrives, and shuts it down gracefully.
    ///
    /// # Errors
    ///
    /// Fails if the signal handlers can't be installed or the queue is already
    /// being served elsewhere.
    #[traced(instrument(level = tracing::Level::TRACE, skip_all, err), timing(precision = "s"))]
    pub async fn run(&self, queue: DispatchQueue) -> anyhow::Result<()> {
        logging::init();
        internal!("Gateway running");

        self.serve_until(&queue, wait_for_signal()).await
    }

    /// Serve `queue` until `stop` resolves, then shut it down gracefully.
    ///
    /// The queue is still shut down if `stop` fails; the failure is returned
    /// afterwards.
    ///
    /// # Errors
    ///
    /// Fails if `stop` fails or the queue is already being served elsewhere.
    pub async fn serve_until<F>(&self, queue: &DispatchQueue, stop: F) -> anyhow::Result<()>
    where
        F: Future<Output = anyhow::Result<()>>,
    {
        let (signals, receiver) = broadcast::channel(4);

        let serving = queue.serve(receiver);
        tokio::pin!(serving);

        let stopped = tokio::select! {
            () = &mut serving => {
                anyhow::bail!("Dispatch queue is already being served");
            }
            stopped = stop => stopped,
        };

        internal!("Shutting down...");
        signals
            .send(Signal::Shutdown)
            .context("Dispatch queue stopped listening for shutdown")?;
        serving.await;

        internal!(stats = ?queue.stats(), "Gateway stopped");

        stopped
    }
}

#[traced(instrument(level = tracing::Level::TRACE, err))]
async fn wait_for_signal() -> anyhow::Result<()> {
    let mut terminate =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        r = tokio::signal::ctrl_c() => {
            r?;
            internal!("CTRL+C entered, shutting down");
        }
        _ = terminate.recv() => {
            internal!("Terminate Signal received, shutting down");
        }
    };

    Ok(())
}

/// Find the configuration file using the following precedence:
/// 1. `SMSGATE_CONFIG` environment variable
/// 2. ./smsgate.config.ron (current working directory)
/// 3. /etc/smsgate/smsgate.config.ron (system-wide config)
///
/// # Errors
///
/// Fails if `SMSGATE_CONFIG` names a missing file, or none of the default
/// locations holds one.
pub fn find_config_file() -> anyhow::Result<PathBuf> {
    let defaults = DEFAULT_CONFIG_PATHS.map(PathBuf::from);
    locate_config(std::env::var_os(CONFIG_ENV).map(PathBuf::from), &defaults)
}

fn locate_config(from_env: Option<PathBuf>, defaults: &[PathBuf]) -> anyhow::Result<PathBuf> {
    if let Some(path) = from_env {
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!(
            "{CONFIG_ENV} points to non-existent file: {}",
            path.display()
        );
    }

    if let Some(path) = defaults.iter().find(|path| path.exists()) {
        return Ok(path.clone());
    }

    let paths_tried = defaults
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "No configuration file found. Tried:\n  - {CONFIG_ENV} environment variable\n{paths_tried}"
    )
}
