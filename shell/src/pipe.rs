use std::os::fd::{AsRawFd, OwnedFd, RawFd};

use nix::fcntl::OFlag;
use nix::unistd;

/// The pipes joining `n` stages: `n - 1` (read, write) pairs, close-on-exec.
/// Dropping the set closes every descriptor it still owns.
#[derive(Debug)]
pub struct PipeSet {
	pipes: Vec<(OwnedFd, OwnedFd)>,
}

impl PipeSet {
	pub fn new(stages: usize) -> nix::Result<PipeSet> {
		let count = stages.saturating_sub(1);
		let mut pipes = Vec::with_capacity(count);
		for _ in 0 .. count {
			// On error the pairs made so far are dropped, which closes them.
			pipes.push(unistd::pipe2(OFlag::O_CLOEXEC)?);
		}
		Ok(PipeSet { pipes: pipes })
	}

	pub fn len(&self) -> usize {
		self.pipes.len() * 2
	}

	pub fn is_empty(&self) -> bool {
		self.pipes.is_empty()
	}

	pub fn stdin_for(&self, stage: usize) -> Option<RawFd> {
		if stage == 0 {
			return None;
		}
		self.pipes.get(stage - 1).map(|p| p.0.as_raw_fd())
	}

	pub fn stdout_for(&self, stage: usize) -> Option<RawFd> {
		self.pipes.get(stage).map(|p| p.1.as_raw_fd())
	}

	pub fn raw_fds(&self) -> impl Iterator<Item = RawFd> + '_ {
		self.pipes.iter().flat_map(|p| [p.0.as_raw_fd(), p.1.as_raw_fd()])
	}

	pub fn close(self) {
		drop(self)
	}
}
