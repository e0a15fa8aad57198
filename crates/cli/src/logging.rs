use sqlbox_core::SQLBOX_DEBUG_VAR;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the tracing system
///
/// `RUST_LOG` wins when set; otherwise the level is `debug` if requested by
/// flag or by `SQLBOX_DEBUG=1`, and `info` otherwise. Logs go to stderr so
/// stdout stays reserved for results.
pub fn init(debug_flag: bool) -> eyre::Result<()> {
    let default_level = if debug_flag || debug_from_env() {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_level))?;

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(is_tty())
        .compact()
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}

fn debug_from_env() -> bool {
    std::env::var(SQLBOX_DEBUG_VAR).is_ok_and(|value| is_truthy(&value))
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Check if we're running in a TTY environment
fn is_tty() -> bool {
    std::io::IsTerminal::is_terminal(&std::io::stderr())
}
