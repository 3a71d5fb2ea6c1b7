pub mod logging;

pub use tracing;

/// Lifecycle signal broadcast to long-running services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Stop admitting new work and wind down.
    Shutdown,
}
