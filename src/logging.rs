use std::sync::Once;

static TRACE_INIT: Once = Once::new();

/// Environment variable holding the log filter
pub const LOG_ENV: &str = "FRAMEVM_LOG";
const DEFAULT_FILTER: &str = "warn";

/// Install a stderr subscriber filtered by `FRAMEVM_LOG`, then `RUST_LOG`, then
/// `warn`. Only the first call has an effect.
pub fn init() {
    TRACE_INIT.call_once(|| {
        use tracing_subscriber::fmt;
        use tracing_subscriber::EnvFilter;

        let filter_expr = std::env::var(LOG_ENV)
            .ok()
            .or_else(|| std::env::var("RUST_LOG").ok());

        let builder = fmt().with_writer(std::io::stderr);

        let builder = match filter_expr.and_then(|expr| EnvFilter::try_new(expr).ok()) {
            Some(filter) => builder.with_env_filter(filter),
            None => builder.with_env_filter(DEFAULT_FILTER),
        };

        let _ = builder.try_init();
    });
}
