use std::sync::Once;

use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

/// Install the process-wide tracing subscriber.
///
/// Honours `RUST_LOG`; without it only `info` events from the bitlink crates are
/// shown. Safe to call more than once, only the first call has an effect.
pub fn init_logging() {
    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("bitlink=info,bitlink_ffi=info,bitlink_jit=info,bitlink_runtime=info")
        });

        fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .compact()
            .init();
    });
}
