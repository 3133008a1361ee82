// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! kubeportal CLI
//!
//! Signs in to a kubeportal instance and lists the resources of the
//! user's namespace. Session state is kept in the state file between runs.

mod commands;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use kubeportal_client::{ApiClient, FileStateStore, SessionManager};
use kubeportal_client_config::{load_config, CliOverrides, LogFormat, LoggingConfig};

#[derive(Parser, Debug)]
#[command(name = "kubeportal", version, about, long_about = None)]
struct Args {
	/// Path to custom configuration file
	#[arg(short, long)]
	config: Option<PathBuf>,

	/// Portal base URL, e.g. https://portal.example.org
	#[arg(long)]
	base_url: Option<String>,

	/// Log level (overrides config)
	#[arg(short, long)]
	log_level: Option<String>,

	/// Log format: pretty, compact or json (overrides config)
	#[arg(long)]
	log_format: Option<String>,

	/// Print results as JSON
	#[arg(long, global = true)]
	json: bool,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Sign in with a password or an identity provider token
	Login {
		#[arg(short, long, required_unless_present = "google_token")]
		username: Option<String>,

		#[arg(long, env = "KUBEPORTAL_PASSWORD", hide_env_values = true)]
		password: Option<String>,

		/// Access token issued by the Google sign-in flow
		#[arg(long, conflicts_with_all = ["username", "password"])]
		google_token: Option<String>,
	},
	/// Sign out and forget the stored session
	Logout,
	/// Show the signed-in user
	Whoami,
	Pods,
	Deployments,
	Services,
	Ingresses {
		/// Check whether each ingress host answers
		#[arg(long)]
		probe: bool,
	},
	/// Persistent volume claims
	Pvcs,
	Storageclasses,
	News,
	/// Cluster statistics
	Info,
	/// Show one page of a pod's logs
	Logs {
		pod: String,

		#[arg(long)]
		page: Option<u32>,
	},
}

impl From<&Args> for CliOverrides {
	fn from(args: &Args) -> Self {
		CliOverrides {
			base_url: args.base_url.clone(),
			log_level: args.log_level.clone(),
			log_format: args.log_format.clone(),
			config_file: args.config.clone(),
			..Default::default()
		}
	}
}

fn init_tracing(logging: &LoggingConfig) {
	let filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| EnvFilter::new(format!("kubeportal={}", logging.level.as_str())));

	match logging.format {
		LogFormat::Json => {
			tracing_subscriber::registry()
				.with(filter)
				.with(fmt::layer().json().with_writer(std::io::stderr))
				.init();
		}
		LogFormat::Compact => {
			tracing_subscriber::registry()
				.with(filter)
				.with(fmt::layer().compact().with_writer(std::io::stderr))
				.init();
		}
		LogFormat::Pretty => {
			tracing_subscriber::registry()
				.with(filter)
				.with(fmt::layer().with_writer(std::io::stderr))
				.init();
		}
	}
}

#[tokio::main]
async fn main() -> Result<()> {
	let args = Args::parse();

	let config = load_config(CliOverrides::from(&args)).context("failed to load configuration")?;
	init_tracing(&config.logging);

	info!(base_url = %config.base_url, api_version = %config.api_version, "starting kubeportal");

	let api = ApiClient::new(&config).context("failed to build HTTP client")?;
	let mut manager = SessionManager::new(api);
	if let Some(path) = &config.state_file {
		debug!(path = %path.display(), "using state file");
		manager = manager.with_store(Arc::new(FileStateStore::new(path.clone())));
	}
	manager
		.restore()
		.await
		.context("failed to read stored session")?;

	let out = commands::Output { json: args.json };
	match args.command {
		Command::Login {
			username,
			password,
			google_token,
		} => commands::login(&manager, username, password, google_token, &out).await,
		Command::Logout => commands::logout(&manager).await,
		Command::Whoami => commands::whoami(&manager, &out).await,
		Command::Pods => commands::pods(&manager, &out).await,
		Command::Deployments => commands::deployments(&manager, &out).await,
		Command::Services => commands::services(&manager, &out).await,
		Command::Ingresses { probe } => {
			commands::ingresses(&manager, probe, config.timeout, &out).await
		}
		Command::Pvcs => commands::pvcs(&manager, &out).await,
		Command::Storageclasses => commands::storageclasses(&manager, &out).await,
		Command::News => commands::news(&manager, &out).await,
		Command::Info => commands::info(&manager, &out).await,
		Command::Logs { pod, page } => commands::logs(&manager, &pod, page, &out).await,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_password_login() {
		let args = Args::try_parse_from([
			"kubeportal",
			"--base-url",
			"https://portal.example",
			"login",
			"-u",
			"ada",
			"--password",
			"pw",
		])
		.unwrap();

		let overrides = CliOverrides::from(&args);
		assert_eq!(overrides.base_url.as_deref(), Some("https://portal.example"));
		assert!(matches!(
			args.command,
			Command::Login { username: Some(ref u), google_token: None, .. } if u == "ada"
		));
	}

	#[test]
	fn google_token_excludes_username() {
		let result = Args::try_parse_from([
			"kubeportal",
			"login",
			"--google-token",
			"tok",
			"--username",
			"ada",
		]);
		assert!(result.is_err());
	}

	#[test]
	fn logs_take_optional_page() {
		let args = Args::try_parse_from(["kubeportal", "logs", "web-0", "--page", "3"]).unwrap();
		assert!(matches!(
			args.command,
			Command::Logs { ref pod, page: Some(3) } if pod == "web-0"
		));
	}

	#[test]
	fn json_flag_is_accepted_after_subcommand() {
		let args = Args::try_parse_from(["kubeportal", "pods", "--json"]).unwrap();
		assert!(args.json);
	}
}
