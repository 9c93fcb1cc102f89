use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Default filter for a `-v` count. `RUST_LOG` replaces it entirely.
///
/// - 0: errors only (failed notifications, broken transport)
/// - 1: bridge lifecycle (attach, init, detach) and host startup
/// - 2: every call, reply and stream notice from the bridge
/// - 3+: the same plus tokio and dependency internals
pub fn default_filter(verbosity: u8) -> &'static str {
	match verbosity {
		0 => "error",
		1 => "warn,bridge_cli=info,bridge_runtime=info",
		2 => "warn,bridge_cli=debug,bridge_runtime=debug",
		_ => "debug,bridge_cli=trace,bridge_runtime=trace",
	}
}

/// Logs go to stderr; stdout carries the frame stream.
pub fn init_logging(verbosity: u8) {
	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(verbosity)));

	tracing_subscriber::fmt()
		.with_env_filter(env_filter)
		.with_writer(std::io::stderr.with_max_level(tracing::Level::TRACE))
		.with_ansi(false)
		.compact()
		.init();
}
