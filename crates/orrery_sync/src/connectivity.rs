//! Connectivity state machine.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Coarse connection quality, meaningful only while online.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkQuality {
    /// Normal or better bandwidth.
    Fast,
    /// Constrained bandwidth (metered or weak signal).
    Slow,
}

/// The connectivity state reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "state", content = "quality")]
pub enum Connectivity {
    /// No network; the sync manager must not attempt I/O.
    Offline,
    /// Network available with the given quality.
    Online(LinkQuality),
}

impl Connectivity {
    /// Returns true if network I/O may be attempted.
    #[must_use]
    pub fn is_online(&self) -> bool {
        matches!(self, Connectivity::Online(_))
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Connectivity::Offline
    }
}

impl std::fmt::Display for Connectivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Connectivity::Offline => write!(f, "offline"),
            Connectivity::Online(LinkQuality::Fast) => write!(f, "online/fast"),
            Connectivity::Online(LinkQuality::Slow) => write!(f, "online/slow"),
        }
    }
}

/// Single source of truth for "may the sync manager do network I/O now".
///
/// Platform connectivity events feed [`set_online`](Self::set_online) /
/// [`set_offline`](Self::set_offline); everything else only reads. The
/// monitor starts `Offline`: the platform owns the truth and the first
/// signal establishes it, so a cold start never drains before the host
/// reports a network.
#[derive(Debug, Default)]
pub struct ConnectivityMonitor {
    state: RwLock<Connectivity>,
}

impl ConnectivityMonitor {
    /// Creates a monitor in the `Offline` state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an online transition.
    ///
    /// A missing quality hint defaults to [`LinkQuality::Fast`], matching
    /// platforms that report reachability without bandwidth class.
    pub fn set_online(&self, quality: Option<LinkQuality>) {
        *self.state.write() = Connectivity::Online(quality.unwrap_or(LinkQuality::Fast));
    }

    /// Records an offline transition.
    pub fn set_offline(&self) {
        *self.state.write() = Connectivity::Offline;
    }

    /// Returns the current state.
    #[must_use]
    pub fn current(&self) -> Connectivity {
        *self.state.read()
    }

    /// Returns true if network I/O may be attempted right now.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.current().is_online()
    }
}
