use std::env;
use std::path::PathBuf;

use log::LevelFilter;

pub const LOG_ENV: &str = "MINISH_LOG";
pub const SUBST_SHELL_ENV: &str = "MINISH_SUBST_SHELL";

const DEFAULT_SUBST_SHELL: &str = "/bin/sh";

/// Settings read from the environment at startup. There are no config files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
	pub log_level: LevelFilter,
	pub substitution_shell: PathBuf,
}

impl Default for Config {
	fn default() -> Config {
		Config {
			log_level: LevelFilter::Warn,
			substitution_shell: PathBuf::from(DEFAULT_SUBST_SHELL),
		}
	}
}

impl Config {
	pub fn from_env() -> Config {
		Config::from_lookup(|key| env::var(key).ok())
	}

	pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Config {
		let mut config = Config::default();
		if let Some(level) = lookup(LOG_ENV).and_then(|l| l.trim().parse().ok()) {
			config.log_level = level;
		}
		if let Some(shell) = lookup(SUBST_SHELL_ENV).filter(|s| !s.is_empty()) {
			config.substitution_shell = PathBuf::from(shell);
		}
		config
	}
}
