use tracing_subscriber::EnvFilter;

/// Install the stderr tracing subscriber.
///
/// Honours `RUST_LOG`; otherwise only warnings and errors are shown so the in-place
/// counter on stdout stays readable. Later calls are no-ops (`try_init` refuses a
/// second global subscriber).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
