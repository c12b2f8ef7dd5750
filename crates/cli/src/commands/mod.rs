mod config;
pub mod select;
pub mod validate;

use std::sync::Arc;

use pickwire::PickerContext;
use pickwire_runtime::{FileStore, SharedStore, TransportSet};
use tracing::{info, warn};

use crate::cli::{Cli, Commands, TargetArgs};
use crate::config::{self as cli_config, CliConfig, ConfigPaths};
use crate::error::Result;
use crate::launcher::SystemBrowserLauncher;
use crate::relay::{self, Presence, RelayHandle, RelayState};

pub async fn dispatch(cli: Cli) -> Result<()> {
	let paths = cli.config.map(ConfigPaths::with_config_file).unwrap_or_default();
	let loaded = cli_config::load(&paths.config_file);

	match cli.command {
		Commands::Select(args) => {
			let mut config = loaded;
			apply_target(&mut config, &args.target);
			config.picker.selection_timeout_ms = args.target.timeout_ms.unwrap_or(config.picker.selection_timeout_ms);
			config.picker.auto_close |= args.auto_close;

			let runtime = prepare(&config, &paths).await?;
			let target = select::execute(&runtime.ctx).await?;
			select::print(&target, cli.json)
		}
		Commands::Validate(args) => {
			let mut config = loaded;
			apply_target(&mut config, &args.target);
			config.picker.validation_timeout_ms = args.target.timeout_ms.unwrap_or(config.picker.validation_timeout_ms);

			let items = validate::collect_items(&args.items, args.file.as_deref())?;
			let runtime = prepare(&config, &paths).await?;
			let summary = validate::execute(&runtime.ctx, items, args.single.as_deref()).await?;
			validate::print(&summary, cli.json)?;
			summary.into_result()
		}
		Commands::Config(args) => config::execute(args.action, &paths, loaded, cli.json),
	}
}

fn apply_target(config: &mut CliConfig, target: &TargetArgs) {
	if let Some(domain) = &target.domain {
		config.picker.target_domain = Some(domain.clone());
	}
	if let Some(path) = &target.path {
		config.picker.entry_path = path.clone();
	}
}

/// Everything a running command holds on to. The relay stops when this is dropped.
pub struct Runtime {
	pub ctx: PickerContext,
	pub relay: Option<RelayHandle>,
}

/// Wires the file-backed store, the relay and the system browser launcher.
pub async fn prepare(config: &CliConfig, paths: &ConfigPaths) -> Result<Runtime> {
	let picker = config.picker.clone();
	let namespace = picker.namespace.clone();

	let store: Option<Arc<dyn SharedStore>> = match FileStore::open(&paths.store_dir) {
		Ok(store) => Some(Arc::new(store)),
		Err(err) => {
			warn!(target = "pickwire", dir = %paths.store_dir.display(), error = %err, "shared store unavailable");
			None
		}
	};
	let transports = TransportSet::new(&namespace)
		.with_store(store)
		.with_poll_interval(picker.poll_interval());

	let mut launcher = SystemBrowserLauncher::detect(&namespace);
	let relay = if config.relay.enabled {
		let presence = Presence::new(&namespace);
		let handle = relay::start(
			&config.relay.host,
			config.relay.port,
			RelayState::new(transports.clone(), presence.clone()),
		)
		.await?;
		launcher = launcher.with_presence(presence);
		Some(handle)
	} else {
		info!(target = "pickwire.relay", "relay disabled; remote context must share the store");
		None
	};

	let mut ctx = PickerContext::new(picker, Arc::new(launcher)).with_transports(transports);
	if let Some(handle) = &relay {
		ctx = ctx.with_relay_url(handle.url());
	}

	Ok(Runtime { ctx, relay })
}
