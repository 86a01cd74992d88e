//! Logging initialization
//!
//! The library only emits `tracing` events. Binaries and tests that want
//! them printed call [`init`] once; later calls are no-ops.

use std::sync::Once;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::util::SubscriberInitExt;

/// Output profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// Human-readable output at debug level
    Development,
    /// JSON lines at info level
    Production,
    /// Output routed through the test harness's capture
    Test,
}

impl Profile {
    fn default_filter(&self) -> &'static str {
        match self {
            Profile::Development | Profile::Test => "blockwright=debug",
            Profile::Production => "blockwright=info",
        }
    }
}

static INIT_ONCE: Once = Once::new();

/// Install a global subscriber for `profile`.
///
/// `RUST_LOG` overrides the profile's default filter. If another global
/// subscriber is already installed, it is left in place.
///
/// ```
/// use blockwright::logging::{init, Profile};
///
/// init(Profile::Test);
/// init(Profile::Production); // no-op
/// ```
pub fn init(profile: Profile) {
    INIT_ONCE.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(profile.default_filter()));
        let installed = match profile {
            Profile::Development => tracing_subscriber::fmt().with_env_filter(filter).finish().try_init(),
            Profile::Production => tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .finish()
                .try_init(),
            Profile::Test => tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_test_writer()
                .finish()
                .try_init(),
        };
        if installed.is_err() {
            tracing::debug!("global subscriber already installed");
        }
    });
}
