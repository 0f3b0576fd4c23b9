use std::fs::{self, File};
use std::io::{Read, Write};
use std::panic;
use std::sync::OnceLock;
use std::thread;
use std::time::{Duration, Instant};

use minish::eval::{read_pipeline, spawn_pipeline, Launched};
use minish::expand::SystemShell;
use minish::job::{Job, SystemFork};
use minish::signal::{PolicyError, SignalPolicy, IGNORED_INTERACTIVE};
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::{self, ForkResult, Pid};
use serial_test::serial;

static POLICY: OnceLock<SignalPolicy> = OnceLock::new();

fn policy() -> &'static SignalPolicy {
	POLICY.get_or_init(|| SignalPolicy::install().unwrap())
}

fn launch(line: &str) -> Launched {
	let sh = SystemShell::new("/bin/sh".into());
	let pipeline = read_pipeline(line, &sh).unwrap().unwrap();
	spawn_pipeline(&pipeline, &mut SystemFork).unwrap()
}

fn gone(pid: Pid) -> bool {
	kill(pid, None) == Err(Errno::ESRCH)
}

fn assert_all_gone(job: &Job) {
	let deadline = Instant::now() + Duration::from_secs(5);
	for pid in job.pids() {
		while !gone(pid) {
			assert!(Instant::now() < deadline, "pid {} was never reaped", pid);
			thread::sleep(Duration::from_millis(20));
		}
	}
}

#[test]
#[serial]
fn background_children_are_reaped() {
	policy();
	let job = match launch("true | sleep 0.1 &") {
		Launched::Background(job) => job,
		Launched::Finished(job) => panic!("waited for {:?}", job),
	};
	assert_eq!(job.processes.len(), 2);
	assert_all_gone(&job);
}

/// Runs `check` in a forked copy of this process, which has only the calling
/// thread, so SIGCHLD cannot land on an idle harness thread.
fn in_single_thread(check: fn() -> bool) -> bool {
	let (r, w) = unistd::pipe().unwrap();
	match unsafe { unistd::fork() }.unwrap() {
		ForkResult::Child => {
			drop(r);
			let ok = panic::catch_unwind(check).unwrap_or(false);
			let _ = File::from(w).write_all(&[ok as u8]);
			unsafe { libc::_exit(0) }
		},
		ForkResult::Parent { .. } => {
			drop(w);
			let mut verdict = [0u8; 1];
			File::from(r).read_exact(&mut verdict).unwrap();
			verdict[0] == 1
		},
	}
}

#[test]
#[serial]
fn foreground_wait_coexists_with_reaper() {
	policy();
	assert!(in_single_thread(|| {
		(0 .. 5).all(|_| match launch("true | sh -c 'exit 3'") {
			Launched::Finished(job) => {
				job.processes.len() == 2 && job.status() == Some(3) && job.pids().into_iter().all(gone)
			},
			Launched::Background(_) => false,
		})
	}));
}

#[cfg(target_os = "linux")]
fn ignored_mask(status: &str) -> u64 {
	let line = status.lines().find(|l| l.starts_with("SigIgn:")).unwrap();
	u64::from_str_radix(line.trim_start_matches("SigIgn:").trim(), 16).unwrap()
}

#[cfg(target_os = "linux")]
fn bit(sig: Signal) -> u64 {
	1 << (sig as u64 - 1)
}

#[test]
#[serial]
#[cfg(target_os = "linux")]
fn children_get_default_dispositions() {
	policy();
	let own = ignored_mask(&fs::read_to_string("/proc/self/status").unwrap());
	for sig in IGNORED_INTERACTIVE {
		assert_ne!(own & bit(sig), 0, "{:?} not ignored by the shell", sig);
	}

	let dir = tempfile::tempdir().unwrap();
	let out = dir.path().join("status");
	launch(&format!("grep SigIgn /proc/self/status > {}", out.display()));

	let mask = ignored_mask(&fs::read_to_string(&out).unwrap());
	for sig in [Signal::SIGINT, Signal::SIGQUIT, Signal::SIGTSTP, Signal::SIGPIPE] {
		assert_eq!(mask & bit(sig), 0, "{:?} still ignored", sig);
	}
}

#[test]
fn policy_installs_once() {
	policy();
	assert!(matches!(SignalPolicy::install(), Err(PolicyError::AlreadyInstalled)));
}
