
use std::path::PathBuf;

use clap::builder::Styles;
use clap::builder::styling::AnsiColor;
use clap::{Args, Parser, Subcommand};

/// Pick elements on a live page and re-check saved selectors.
#[derive(Parser, Debug)]
#[command(name = "pickwire")]
#[command(about = "Pick elements on a live page and re-check saved selectors")]
#[command(version)]
#[command(styles = cli_styles())]
pub struct Cli {
	/// Increase verbosity (-v lifecycle, -vv transport traffic)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Print machine-readable JSON instead of text
	#[arg(long, global = true)]
	pub json: bool,

	/// Config file to use instead of the default location
	#[arg(long, global = true, value_name = "FILE")]
	pub config: Option<PathBuf>,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Open the target site and wait for the operator to pick an element.
	Select(SelectArgs),
	/// Check saved selectors against the live target site.
	Validate(ValidateArgs),
	/// Show or change persistent settings.
	Config(ConfigArgs),
}

/// Overrides for the configured target.
#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
	/// Target domain (e.g. shop.example or http://localhost:3000)
	#[arg(long, value_name = "DOMAIN")]
	pub domain: Option<String>,

	/// Entry path on the target domain
	#[arg(long, value_name = "PATH")]
	pub path: Option<String>,

	/// Give up after this many milliseconds
	#[arg(long, value_name = "MS")]
	pub timeout_ms: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct SelectArgs {
	#[command(flatten)]
	pub target: TargetArgs,

	/// Close the page once an element is picked
	#[arg(long)]
	pub auto_close: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ValidateArgs {
	#[command(flatten)]
	pub target: TargetArgs,

	/// Items as ID=SELECTOR (a bare ID has no selector)
	#[arg(value_name = "ID=SELECTOR")]
	pub items: Vec<String>,

	/// Read items from a JSON file (`[{"id": "...", "selector": "..."}]`)
	#[arg(long, value_name = "FILE")]
	pub file: Option<PathBuf>,

	/// Re-test only this item id from the given items
	#[arg(long, value_name = "ID")]
	pub single: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
	#[command(subcommand)]
	pub action: ConfigAction,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
	/// Print every setting.
	Show,
	/// Print the config file location.
	Path,
	/// Set the target domain.
	SetDomain {
		#[arg(value_name = "DOMAIN")]
		domain: String,
	},
	/// Set any setting by key (e.g. `selection-timeout-ms 5000`, `relay.port 4455`).
	Set {
		#[arg(value_name = "KEY")]
		key: String,
		#[arg(value_name = "VALUE")]
		value: String,
	},
}

/// Help colors in cargo's style.
pub fn cli_styles() -> Styles {
	Styles::styled()
		.header(AnsiColor::Green.on_default().bold())
		.usage(AnsiColor::Green.on_default().bold())
		.literal(AnsiColor::Cyan.on_default())
		.placeholder(AnsiColor::Cyan.on_default())
		.valid(AnsiColor::Cyan.on_default())
}
