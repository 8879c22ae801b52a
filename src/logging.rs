//! Logging setup.
//!
//! Installs a global `tracing` subscriber. Output goes to stderr so that commands printing data
//! (CSV, query results) keep stdout clean. `RUST_LOG` overrides the default filter.

use std::sync::Once;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::util::SubscriberInitExt;

/// Default filter when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "tablesync=info";

/// Output profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Profile {
    /// Human-readable lines.
    #[default]
    Development,
    /// One JSON object per event.
    Production,
    /// Subscriber without output; events are discarded.
    Test,
}

static INIT_ONCE: Once = Once::new();

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber for `profile`.
///
/// Only the first call has an effect. If another global subscriber is already installed it is
/// left in place.
pub fn init(profile: Profile) {
    INIT_ONCE.call_once(|| {
        let installed = match profile {
            Profile::Development => tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_writer(std::io::stderr)
                .finish()
                .try_init(),
            Profile::Production => tracing_subscriber::fmt()
                .json()
                .with_env_filter(env_filter())
                .with_writer(std::io::stderr)
                .finish()
                .try_init(),
            Profile::Test => tracing_subscriber::registry().try_init(),
        };
        if installed.is_err() {
            tracing::debug!("global subscriber already set");
        }
    });
}
