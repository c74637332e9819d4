//! Engine configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default period between background flushes (2 minutes)
pub const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 120;

/// Which confirmed edits an incoming operation is transformed against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransformWindow {
    /// Edits committed at or after the submitter's last synced clock,
    /// excluding the submitter's own edits
    #[default]
    SinceLastSync,
    /// Every edit in the confirmed log
    FullHistory,
}

impl std::fmt::Display for TransformWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransformWindow::SinceLastSync => write!(f, "since-last-sync"),
            TransformWindow::FullHistory => write!(f, "full-history"),
        }
    }
}

impl std::str::FromStr for TransformWindow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "since-last-sync" | "since-sync" => Ok(TransformWindow::SinceLastSync),
            "full-history" | "full" => Ok(TransformWindow::FullHistory),
            _ => Err(format!("Unknown transform window: {}", s)),
        }
    }
}

/// Tunables for the synchronization engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Seconds between background flushes of each live document
    pub flush_interval_secs: u64,
    pub transform_window: TransformWindow,
}

impl EngineConfig {
    pub fn flush_interval(&self) -> Duration {
        // tokio intervals panic on a zero period
        Duration::from_secs(self.flush_interval_secs.max(1))
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            flush_interval_secs: DEFAULT_FLUSH_INTERVAL_SECS,
            transform_window: TransformWindow::default(),
        }
    }
}
