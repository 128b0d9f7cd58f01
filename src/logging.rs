//! Diagnostics on stderr, filtered by `RUST_LOG` (default `warn`).
//!
//! The `!log <key> <value>` score lines printed by the binaries are not part
//! of this and are always written.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
