use crate::config::Config;
use crate::expand::SystemShell;
use crate::job::SystemFork;

pub struct State {
	pub capture: SystemShell,
	pub forker: SystemFork,
}

impl State {
	pub fn new(config: &Config) -> State {
		let capture = SystemShell::new(config.substitution_shell.clone());
		State { capture: capture, forker: SystemFork }
	}
}
