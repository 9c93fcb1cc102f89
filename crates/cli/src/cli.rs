use std::path::PathBuf;

use clap::builder::Styles;
use clap::builder::styling::AnsiColor;
use clap::{Parser, Subcommand};

fn help_styles() -> Styles {
	Styles::styled()
		.header(AnsiColor::Yellow.on_default().bold())
		.usage(AnsiColor::Yellow.on_default().bold())
		.literal(AnsiColor::Green.on_default())
		.placeholder(AnsiColor::Blue.on_default())
}

#[derive(Parser, Debug)]
#[command(name = "bridge-host")]
#[command(about = "Serve the call and stream bridge over stdin/stdout")]
#[command(version)]
#[command(styles = help_styles())]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Host configuration file (JSON)
	#[arg(short, long, global = true, value_name = "FILE")]
	pub config: Option<PathBuf>,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Attach a bridge to stdin/stdout and serve until stdin closes
	Serve {
		/// Channel name, overriding the config file
		#[arg(long, value_name = "NAME")]
		channel: Option<String>,

		/// Bound on outbound calls in milliseconds, overriding the config file
		#[arg(long, value_name = "MS")]
		timeout_ms: Option<u64>,
	},

	/// Print the effective configuration as JSON
	Config,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn serve_accepts_overrides() {
		let cli = Cli::try_parse_from(["bridge-host", "-vv", "serve", "--channel", "app/main", "--timeout-ms", "250"]).unwrap();
		assert_eq!(cli.verbose, 2);
		match cli.command {
			Commands::Serve { channel, timeout_ms } => {
				assert_eq!(channel.as_deref(), Some("app/main"));
				assert_eq!(timeout_ms, Some(250));
			}
			other => panic!("Expected serve, got {other:?}"),
		}
	}

	#[test]
	fn config_flag_is_global() {
		let cli = Cli::try_parse_from(["bridge-host", "config", "--config", "host.json"]).unwrap();
		assert_eq!(cli.config, Some(PathBuf::from("host.json")));
		assert!(matches!(cli.command, Commands::Config));
	}

	#[test]
	fn a_subcommand_is_required() {
		assert!(Cli::try_parse_from(["bridge-host"]).is_err());
	}

	#[test]
	fn cli_definition_is_consistent() {
		use clap::CommandFactory;
		Cli::command().debug_assert();
	}
}
