use nix::errno::Errno;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{self, ForkResult, Pid};

pub trait WaitStatusExt {
	fn code(self) -> Option<i32>;
}

impl WaitStatusExt for WaitStatus {
	fn code(self) -> Option<i32> {
		match self {
			WaitStatus::Exited(_, code) => Some(code),
			WaitStatus::Signaled(_, sig, _) => Some(128 + sig as i32),
			_ => None,
		}
	}
}

/// Process creation, swappable so tests can make it fail.
pub trait Fork {
	/// # Safety
	/// Same contract as `nix::unistd::fork`.
	unsafe fn fork(&mut self) -> nix::Result<ForkResult>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemFork;

impl Fork for SystemFork {
	unsafe fn fork(&mut self) -> nix::Result<ForkResult> {
		unistd::fork()
	}
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Process {
	pub pid: Pid,
	pub status: Option<WaitStatus>,
}

#[derive(Debug)]
pub struct Job {
	pub pgid: Pid,
	pub processes: Vec<Process>,
}

impl Job {
	pub fn status(&self) -> Option<i32> {
		self.processes.last().and_then(|pr| pr.status).and_then(|s| s.code())
	}

	pub fn pids(&self) -> Vec<Pid> {
		self.processes.iter().map(|pr| pr.pid).collect()
	}
}

/// Blocks until `pid` is collected. EINTR is retried; a child that was
/// already reaped elsewhere yields `None`.
pub fn wait_for(pid: Pid) -> Option<WaitStatus> {
	loop {
		match waitpid(pid, None) {
			Ok(status) => return Some(status),
			Err(Errno::EINTR) => continue,
			Err(Errno::ECHILD) => {
				log::debug!("pid {} was reaped elsewhere", pid);
				return None;
			},
			Err(e) => {
				log::warn!("waitpid({}): {}", pid, e);
				return None;
			},
		}
	}
}

#[derive(Debug)]
pub struct JobBuilder {
	imp: Job,
}

impl JobBuilder {
	pub fn new(size_hint: usize) -> JobBuilder {
		JobBuilder {
			imp: Job { pgid: Pid::from_raw(0), processes: Vec::with_capacity(size_hint) }
		}
	}

	pub fn pgid(&self) -> Pid {
		self.imp.pgid
	}

	pub fn len(&self) -> usize {
		self.imp.processes.len()
	}

	/// Forks one stage. The parent side records the child and moves it into
	/// the job's group; the child must do the same before it execs.
	pub fn push_fork<F: Fork + ?Sized>(&mut self, forker: &mut F) -> nix::Result<ForkResult> {
		let job = &mut self.imp;

		let r = unsafe { forker.fork() }?;
		if let ForkResult::Parent { child: pid } = r {
			if job.pgid == Pid::from_raw(0) {
				job.pgid = pid;
			}
			// EACCES here just means the child already exec'd after joining.
			if let Err(e) = unistd::setpgid(pid, job.pgid) {
				log::debug!("setpgid({}, {}) in parent: {}", pid, job.pgid, e);
			}
			job.processes.push(Process { pid: pid, status: None });
		}
		Ok(r)
	}

	pub fn wait_all(&mut self) {
		for pr in self.imp.processes.iter_mut() {
			pr.status = wait_for(pr.pid);
			log::debug!("pid {} finished: {:?}", pr.pid, pr.status);
		}
	}

	pub fn build(self) -> Job {
		assert!(!self.imp.processes.is_empty());
		self.imp
	}
}
