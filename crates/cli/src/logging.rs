use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

pub fn init_logging(verbosity: u8) {
	// 0 = errors only; mismatched-session chatter stays hidden
	// 1 (-v) = session and validation lifecycle
	// 2+ (-vv) = transport traffic and relay connections
	let filter = match verbosity {
		0 => "error",
		1 => "warn,pickwire.session=info,pickwire.validation=info,pickwire.relay=info",
		_ => "debug,hyper=info,axum=info",
	};

	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

	let stderr = std::io::stderr.with_max_level(tracing::Level::TRACE);

	tracing_subscriber::fmt()
		.with_env_filter(env_filter)
		.with_writer(stderr)
		.with_target(true)
		.with_level(true)
		.compact()
		.init();
}
