use std::ffi::NulError;
use std::io::{self, Write};

use nix::unistd::{ForkResult, Pid};
use thiserror::Error;

use crate::builtin::{self, Flow};
use crate::child::{self, ExecRequest, StageIo};
use crate::expand::{self, CaptureOutput};
use crate::global::State;
use crate::job::{Fork, Job, JobBuilder};
use crate::parser::{self, ParseResult};
use crate::pipe::PipeSet;
use crate::signal;
use crate::tokenizer;
use crate::types::Pipeline;

pub const STATUS_LAUNCH_FAILED: i32 = 126;
pub const STATUS_SYNTAX_ERROR: i32 = 2;

#[derive(Debug, Error)]
pub enum ExecError {
	#[error("argument contains a NUL byte: {0}")]
	Nul(#[from] NulError),
	#[error("pipe: {0}")]
	Pipe(#[source] nix::Error),
	#[error("fork: {source} ({reaped} started stage(s) reaped)")]
	Fork { source: nix::Error, reaped: usize },
	#[error("sigprocmask: {0}")]
	Mask(#[source] nix::Error),
}

#[derive(Debug)]
pub enum Launched {
	Finished(Job),
	Background(Job),
}

/// Starts every stage of `pipeline` in one new process group, wired through
/// pipes, and waits for all of them unless the pipeline runs in background.
///
/// No pipe descriptor survives in the shell once this returns. If a fork
/// fails, the stages already started are waited for before the error is
/// returned.
pub fn spawn_pipeline<F: Fork + ?Sized>(pipeline: &Pipeline, forker: &mut F) -> Result<Launched, ExecError> {
	let commands = &pipeline.commands;
	assert!(!commands.is_empty());

	let requests: Result<Vec<ExecRequest>, NulError> = commands.iter().map(ExecRequest::new).collect();
	let requests = requests?;

	// Held until the job is handed off or fully waited for, so the reaper
	// never collects a foreground stage and the group leader stays around
	// while later stages join it.
	let hold = signal::block_sigchld().map_err(ExecError::Mask)?;
	let pipes = PipeSet::new(commands.len()).map_err(ExecError::Pipe)?;
	log::debug!("starting {} stage(s) with {} pipe descriptor(s)", commands.len(), pipes.len());

	let mut job_builder = JobBuilder::new(commands.len());
	for (i, req) in requests.iter().enumerate() {
		let pgid = job_builder.pgid();
		match job_builder.push_fork(forker) {
			Ok(ForkResult::Parent { child }) => {
				log::debug!("stage {} {:?} is pid {}", i, req.program(), child);
			},
			Ok(ForkResult::Child) => {
				let io = StageIo { stdin: pipes.stdin_for(i), stdout: pipes.stdout_for(i) };
				child::run_stage(req, io, &pipes, pgid, hold.previous_mask());
			},
			Err(e) => {
				pipes.close();
				job_builder.wait_all();
				return Err(ExecError::Fork { source: e, reaped: job_builder.len() });
			},
		}
	}
	pipes.close();

	if pipeline.is_background {
		let job = job_builder.build();
		log::debug!("job {} left running in background", job.pgid);
		return Ok(Launched::Background(job));
	}
	job_builder.wait_all();
	Ok(Launched::Finished(job_builder.build()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalResult {
	Done(i32),
	Background(Pid),
	Exit(i32),
}

fn report<E: std::fmt::Display>(e: E) {
	let _ = writeln!(io::stderr(), "minish: {}", e);
}

pub fn read_pipeline<C: CaptureOutput + ?Sized>(line: &str, capture: &C) -> ParseResult<Option<Pipeline>> {
	let tokens = tokenizer::tokenize(line.trim());
	let tokens = expand::expand_tokens(tokens, capture);
	parser::parse(&tokens)
}

pub fn eval(state: &mut State, pipeline: &Pipeline) -> EvalResult {
	let commands = &pipeline.commands;
	if commands.len() == 1 && !commands[0].has_redirects() && !pipeline.is_background {
		if let Some(func) = builtin::match_builtin(commands[0].program()) {
			let stdout = io::stdout();
			let mut out = stdout.lock();
			return match func(&commands[0].args[1 ..], &mut out) {
				Flow::Continue(s) => EvalResult::Done(s),
				Flow::Exit(code) => EvalResult::Exit(code),
			};
		}
	}

	match spawn_pipeline(pipeline, &mut state.forker) {
		Ok(Launched::Background(job)) => EvalResult::Background(job.pgid),
		Ok(Launched::Finished(job)) => EvalResult::Done(job.status().unwrap_or(0)),
		Err(e) => {
			report(&e);
			EvalResult::Done(STATUS_LAUNCH_FAILED)
		},
	}
}

pub fn eval_line(state: &mut State, line: &str) -> EvalResult {
	match read_pipeline(line, &state.capture) {
		Ok(Some(pipeline)) => eval(state, &pipeline),
		Ok(None) => EvalResult::Done(0),
		Err(e) => {
			report(format_args!("syntax error: {}", e));
			EvalResult::Done(STATUS_SYNTAX_ERROR)
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::child::{STATUS_NOT_FOUND, STATUS_SETUP_FAILED};
	use crate::config::Config;
	use crate::expand::SystemShell;
	use crate::job::{self, SystemFork};
	use nix::errno::Errno;
	use nix::sys::signal::{SigSet, Signal};
	use nix::sys::wait::{waitpid, WaitPidFlag};
	use nix::unistd;
	use serial_test::serial;
	use std::fs;
	use std::path::{Path, PathBuf};
	use std::time::{Duration, Instant};

	struct FailAfter(usize);

	impl Fork for FailAfter {
		unsafe fn fork(&mut self) -> nix::Result<ForkResult> {
			if self.0 == 0 {
				return Err(Errno::EAGAIN);
			}
			self.0 -= 1;
			unistd::fork()
		}
	}

	fn pipeline(line: &str) -> Pipeline {
		let sh = SystemShell::new(PathBuf::from("/bin/sh"));
		read_pipeline(line, &sh).unwrap().unwrap()
	}

	fn run(line: &str) -> Job {
		match spawn_pipeline(&pipeline(line), &mut SystemFork).unwrap() {
			Launched::Finished(job) => job,
			Launched::Background(job) => panic!("{} went to background as {:?}", line, job),
		}
	}

	fn p(path: &Path) -> &str {
		path.to_str().unwrap()
	}

	#[cfg(target_os = "linux")]
	fn open_fds() -> usize {
		fs::read_dir("/proc/self/fd").unwrap().count()
	}

	#[test]
	#[serial]
	fn redirect_round_trip() {
		let dir = tempfile::tempdir().unwrap();
		let out = dir.path().join("out.txt");
		let copy = dir.path().join("copy.txt");
		assert_eq!(run(&format!("echo hi > {}", p(&out))).status(), Some(0));
		assert_eq!(run(&format!("cat < {} > {}", p(&out), p(&copy))).status(), Some(0));
		assert_eq!(fs::read_to_string(&copy).unwrap(), "hi\n");
	}

	#[test]
	#[serial]
	fn append_keeps_existing_content() {
		let dir = tempfile::tempdir().unwrap();
		let f = dir.path().join("log");
		run(&format!("echo a > {}", p(&f)));
		run(&format!("echo b >> {}", p(&f)));
		assert_eq!(fs::read_to_string(&f).unwrap(), "a\nb\n");
		run(&format!("echo c > {}", p(&f)));
		assert_eq!(fs::read_to_string(&f).unwrap(), "c\n");
	}

	#[test]
	#[serial]
	fn stages_are_connected_in_order() {
		let dir = tempfile::tempdir().unwrap();
		let out = dir.path().join("sorted");
		let job = run(&format!(r#"printf "b\\na\\nb\\n" | sort | uniq > {}"#, p(&out)));
		assert_eq!(job.processes.len(), 3);
		assert_eq!(fs::read_to_string(&out).unwrap(), "a\nb\n");
	}

	#[test]
	#[serial]
	fn file_redirect_overrides_pipe() {
		let dir = tempfile::tempdir().unwrap();
		let input = dir.path().join("in");
		let out = dir.path().join("out");
		fs::write(&input, "from file\n").unwrap();
		run(&format!("echo from pipe | cat < {} > {}", p(&input), p(&out)));
		assert_eq!(fs::read_to_string(&out).unwrap(), "from file\n");
	}

	#[test]
	#[serial]
	#[cfg(target_os = "linux")]
	fn stages_share_one_process_group() {
		let dir = tempfile::tempdir().unwrap();
		let files: Vec<PathBuf> = (0 .. 3).map(|i| dir.path().join(i.to_string())).collect();
		let line = files.iter()
			.map(|f| format!(r#"cut -d " " -f 5 /proc/self/stat > {}"#, p(f)))
			.collect::<Vec<_>>()
			.join(" | ");

		let before = open_fds();
		let job = run(&line);
		assert_eq!(open_fds(), before);

		assert_eq!(job.processes.len(), 3);
		assert_eq!(job.pgid, job.processes[0].pid);
		for f in &files {
			let pgrp: i32 = fs::read_to_string(f).unwrap().trim().parse().unwrap();
			assert_eq!(pgrp, job.pgid.as_raw());
		}
		assert_ne!(job.pgid, unistd::getpgrp());
	}

	#[test]
	#[serial]
	#[cfg(target_os = "linux")]
	fn fork_failure_leaves_nothing_behind() {
		let before = open_fds();
		match spawn_pipeline(&pipeline("echo x | cat | cat"), &mut FailAfter(1)) {
			Err(ExecError::Fork { source, reaped }) => {
				assert_eq!(source, Errno::EAGAIN);
				assert_eq!(reaped, 1);
			},
			other => panic!("unexpected {:?}", other),
		}
		assert_eq!(open_fds(), before);
		assert_eq!(waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)), Err(Errno::ECHILD));
	}

	#[test]
	#[serial]
	fn first_fork_failure_starts_nothing() {
		match spawn_pipeline(&pipeline("true | true"), &mut FailAfter(0)) {
			Err(ExecError::Fork { reaped, .. }) => assert_eq!(reaped, 0),
			other => panic!("unexpected {:?}", other),
		}
	}

	#[test]
	#[serial]
	#[cfg(target_os = "linux")]
	fn pipe_failure_starts_nothing() {
		let pipeline = pipeline("true | true | true | true | true | true");
		let before = open_fds();
		let mut limit = libc::rlimit { rlim_cur: 0, rlim_max: 0 };
		assert_eq!(unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut limit) }, 0);
		let lowered = libc::rlimit { rlim_cur: (before + 4) as libc::rlim_t, rlim_max: limit.rlim_max };

		assert_eq!(unsafe { libc::setrlimit(libc::RLIMIT_NOFILE, &lowered) }, 0);
		let result = spawn_pipeline(&pipeline, &mut SystemFork);
		assert_eq!(unsafe { libc::setrlimit(libc::RLIMIT_NOFILE, &limit) }, 0);

		match result {
			Err(ExecError::Pipe(e)) => assert_eq!(e, Errno::EMFILE),
			other => panic!("unexpected {:?}", other),
		}
		assert_eq!(open_fds(), before);
		assert_eq!(waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)), Err(Errno::ECHILD));
		assert!(!SigSet::thread_get_mask().unwrap().contains(Signal::SIGCHLD));
	}

	#[test]
	#[serial]
	fn missing_program_exits_127() {
		let job = run("minish-no-such-program --flag");
		assert_eq!(job.status(), Some(STATUS_NOT_FOUND));
	}

	#[test]
	#[serial]
	fn unopenable_redirect_fails_setup_only() {
		let dir = tempfile::tempdir().unwrap();
		let out = dir.path().join("out");
		let job = run(&format!("cat < /no/such/minish/input | echo still > {}", p(&out)));
		assert_eq!(job.processes[0].status.and_then(job::WaitStatusExt::code), Some(STATUS_SETUP_FAILED));
		assert_eq!(job.status(), Some(0));
		assert_eq!(fs::read_to_string(&out).unwrap(), "still\n");
	}

	#[test]
	#[serial]
	fn last_stage_decides_status() {
		assert_eq!(run("true | false").status(), Some(1));
		assert_eq!(run("false | true").status(), Some(0));
	}

	#[test]
	#[serial]
	fn background_returns_immediately() {
		let started = Instant::now();
		let job = match spawn_pipeline(&pipeline("sleep 1 | sleep 1 &"), &mut SystemFork).unwrap() {
			Launched::Background(job) => job,
			Launched::Finished(_) => panic!("waited on a background job"),
		};
		assert!(started.elapsed() < Duration::from_millis(900));
		assert_eq!(job.processes.len(), 2);
		assert!(job.processes.iter().all(|pr| pr.status.is_none()));
		for pid in job.pids() {
			assert!(job::wait_for(pid).is_some());
		}
	}

	#[test]
	#[serial]
	fn eval_line_dispatches() {
		let mut state = State::new(&Config::default());
		assert_eq!(eval_line(&mut state, "   "), EvalResult::Done(0));
		assert_eq!(eval_line(&mut state, "false"), EvalResult::Done(1));
		assert_eq!(eval_line(&mut state, "sh -c 'exit 5'"), EvalResult::Done(5));
		assert_eq!(eval_line(&mut state, "a | | b"), EvalResult::Done(STATUS_SYNTAX_ERROR));
		assert_eq!(eval_line(&mut state, "exit 3"), EvalResult::Exit(3));
		assert_eq!(eval_line(&mut state, "exit $(printf 4)"), EvalResult::Exit(4));
	}

	#[test]
	#[serial]
	fn eval_line_backgrounds() {
		let mut state = State::new(&Config::default());
		match eval_line(&mut state, "true &") {
			EvalResult::Background(pgid) => assert!(job::wait_for(pgid).is_some()),
			other => panic!("unexpected {:?}", other),
		}
	}

	#[test]
	#[serial]
	fn builtins_with_redirects_run_externally() {
		let dir = tempfile::tempdir().unwrap();
		let out = dir.path().join("out");
		let mut state = State::new(&Config::default());
		assert_eq!(eval_line(&mut state, &format!("echo via $(printf file) > {}", p(&out))), EvalResult::Done(0));
		assert_eq!(fs::read_to_string(&out).unwrap(), "via file\n");
	}
}
