//! Process-wide signal state.
//!
//! The shell ignores the interactive signals for itself and reaps background
//! children from a SIGCHLD handler. Both are set up exactly once through
//! `SignalPolicy::install`, before the first pipeline runs, and stay in place
//! until exit. Children undo the ignores with `reset_child_dispositions`.

use std::sync::atomic::{AtomicBool, Ordering};

use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, SigmaskHow, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use thiserror::Error;

pub const IGNORED_INTERACTIVE: [Signal; 3] = [Signal::SIGINT, Signal::SIGQUIT, Signal::SIGTSTP];

static INSTALLED: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Error)]
pub enum PolicyError {
	#[error("signal policy is already installed")]
	AlreadyInstalled,
	#[error("sigaction({0:?}): {1}")]
	Sigaction(Signal, #[source] nix::Error),
}

// Runs in signal context: no allocation, no locks, errno preserved.
extern "C" fn reap_children(_: libc::c_int) {
	let saved = errno::errno();
	loop {
		match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
			Ok(WaitStatus::StillAlive) | Err(_) => break,
			Ok(_) => {},
		}
	}
	errno::set_errno(saved);
}

/// Proof that the handlers are in place; only `install` makes one.
#[derive(Debug)]
pub struct SignalPolicy {
	_installed: (),
}

impl SignalPolicy {
	pub fn install() -> Result<SignalPolicy, PolicyError> {
		if INSTALLED.swap(true, Ordering::SeqCst) {
			return Err(PolicyError::AlreadyInstalled);
		}

		let reaper = SigAction::new(
			SigHandler::Handler(reap_children),
			SaFlags::SA_RESTART | SaFlags::SA_NOCLDSTOP,
			SigSet::empty(),
		);
		unsafe { signal::sigaction(Signal::SIGCHLD, &reaper) }
			.map_err(|e| PolicyError::Sigaction(Signal::SIGCHLD, e))?;

		let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
		for &sig in IGNORED_INTERACTIVE.iter() {
			unsafe { signal::sigaction(sig, &ignore) }.map_err(|e| PolicyError::Sigaction(sig, e))?;
		}
		log::debug!("signal policy installed, ignoring {:?}", IGNORED_INTERACTIVE);
		Ok(SignalPolicy { _installed: () })
	}
}

/// Puts back default handling for everything the shell ignores, plus SIGPIPE
/// which the Rust runtime ignores. Async-signal-safe.
pub fn reset_child_dispositions() {
	for &sig in IGNORED_INTERACTIVE.iter().chain([Signal::SIGPIPE].iter()) {
		let _ = unsafe { signal::signal(sig, SigHandler::SigDfl) };
	}
}

/// Keeps SIGCHLD blocked on the calling thread until dropped.
#[derive(Debug)]
pub struct SigchldHold {
	previous: SigSet,
}

impl SigchldHold {
	pub fn previous_mask(&self) -> &SigSet {
		&self.previous
	}
}

impl Drop for SigchldHold {
	fn drop(&mut self) {
		let _ = self.previous.thread_set_mask();
	}
}

pub fn block_sigchld() -> nix::Result<SigchldHold> {
	let mut set = SigSet::empty();
	set.add(Signal::SIGCHLD);
	let previous = set.thread_swap_mask(SigmaskHow::SIG_BLOCK)?;
	Ok(SigchldHold { previous: previous })
}
