//! Tracing setup for binaries and tests embedding the pool.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install a stderr subscriber for the pool crates.
///
/// `RUST_LOG` wins when set; otherwise `CONNPOOL_LOG` picks the level
/// (default `info`). `LOG_FORMAT=json` switches to JSON lines. Returns
/// `false` if a global subscriber was already installed.
pub fn init_tracing() -> bool {
    let filter = match std::env::var("RUST_LOG") {
        Ok(_) => EnvFilter::from_default_env(),
        Err(_) => EnvFilter::new(pool_directive(std::env::var("CONNPOOL_LOG").ok().as_deref())),
    };
    let json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| fmt::layer().with_writer(std::io::stderr)))
        .try_init()
        .is_ok()
}

/// Filter directive covering both workspace crates at the requested level.
fn pool_directive(level: Option<&str>) -> String {
    let level = match level {
        Some("trace") => "trace",
        Some("debug") => "debug",
        Some("warn") | Some("warning") => "warn",
        Some("error") => "error",
        _ => "info",
    };
    format!("connpool={level},bufcache={level}")
}
