// The stuff that happens after fork.
// Everything reachable from `run_stage` must be async-signal safe:
// no allocating, no locking, no panicking. All the owned data it needs is
// prepared in `ExecRequest` before the fork.

use std::env;
use std::ffi::{CStr, CString, NulError, OsString};
use std::os::fd::RawFd;
use std::os::unix::ffi::OsStringExt;
use std::ptr;

use libc::c_char;
use nix::sys::signal::SigSet;
use nix::unistd::{self, Pid};

use crate::pipe::PipeSet;
use crate::search;
use crate::signal;
use crate::types::Command;

pub const STATUS_NOT_FOUND: i32 = 127;
pub const STATUS_SETUP_FAILED: i32 = 1;

const REDIRECT_MODE: libc::c_uint = 0o644;

#[derive(Debug)]
struct NullTerminated {
	strings: Vec<CString>,
	ptrs: Vec<*const c_char>,
}

impl NullTerminated {
	fn new(strings: Vec<CString>) -> NullTerminated {
		let mut ptrs: Vec<*const c_char> = strings.iter().map(|s| s.as_ptr()).collect();
		ptrs.push(ptr::null());
		NullTerminated { strings: strings, ptrs: ptrs }
	}

	fn as_ptr(&self) -> *const *const c_char {
		self.ptrs.as_ptr()
	}

	#[cfg(test)]
	fn len(&self) -> usize {
		self.strings.len()
	}
}

/// Everything one stage needs to exec, built while allocation is still allowed.
#[derive(Debug)]
pub struct ExecRequest {
	program: CString,
	path: Option<CString>,
	argv: NullTerminated,
	envp: NullTerminated,
	input: Option<CString>,
	output: Option<CString>,
	append: bool,
}

impl ExecRequest {
	pub fn new(command: &Command) -> Result<ExecRequest, NulError> {
		let argv: Result<Vec<CString>, NulError> = command.args.iter().map(|a| CString::new(a.as_str())).collect();
		let argv = argv?;
		let envp: Result<Vec<CString>, NulError> = env::vars_os().map(|(mut k, v)| CString::new({ k.push("="); k.push(v); k.into_vec() })).collect();
		let envp = envp?;
		let path = match search::lookup(command.program()) {
			Some(p) => Some(CString::new(OsString::from(p).into_vec())?),
			None => None,
		};
		Ok(ExecRequest {
			program: CString::new(command.program())?,
			path: path,
			argv: NullTerminated::new(argv),
			envp: NullTerminated::new(envp),
			input: command.input_redirect.as_deref().map(CString::new).transpose()?,
			output: command.output_redirect.as_deref().map(CString::new).transpose()?,
			append: command.append,
		})
	}

	pub fn program(&self) -> &CStr {
		&self.program
	}

	#[cfg(test)]
	fn path(&self) -> Option<&CStr> {
		self.path.as_deref()
	}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StageIo {
	pub stdin: Option<RawFd>,
	pub stdout: Option<RawFd>,
}

fn write_stderr(parts: &[&[u8]]) {
	for part in parts {
		unsafe {
			libc::write(libc::STDERR_FILENO, part.as_ptr() as *const libc::c_void, part.len());
		}
	}
}

fn errno_text(err: i32) -> &'static [u8] {
	match err {
		libc::ENOENT => b"No such file or directory",
		libc::EACCES => b"Permission denied",
		libc::EISDIR => b"Is a directory",
		libc::ENOTDIR => b"Not a directory",
		libc::ENOEXEC => b"Exec format error",
		libc::EMFILE => b"Too many open files",
		libc::EPERM => b"Operation not permitted",
		libc::EBADF => b"Bad file descriptor",
		libc::E2BIG => b"Argument list too long",
		libc::ENAMETOOLONG => b"File name too long",
		libc::ELOOP => b"Too many levels of symbolic links",
		libc::ETXTBSY => b"Text file busy",
		libc::EROFS => b"Read-only file system",
		libc::ENOSPC => b"No space left on device",
		libc::EDQUOT => b"Disk quota exceeded",
		libc::ENOMEM => b"Cannot allocate memory",
		libc::ENFILE => b"Too many open files in system",
		libc::EFBIG => b"File too large",
		libc::ENXIO => b"No such device or address",
		libc::EIO => b"Input/output error",
		libc::EINVAL => b"Invalid argument",
		libc::EINTR => b"Interrupted system call",
		_ => b"Unknown error",
	}
}

fn die(what: &[u8], subject: &CStr, err: i32, status: i32) -> ! {
	write_stderr(&[b"minish: ", subject.to_bytes(), b": ", what, errno_text(err), b"\n"]);
	unsafe { libc::_exit(status) }
}

fn dup_onto(fd: RawFd, target: RawFd, req: &ExecRequest) {
	if unsafe { libc::dup2(fd, target) } < 0 {
		die(b"dup2: ", &req.program, errno::errno().0, STATUS_SETUP_FAILED);
	}
}

fn open_onto(path: &CStr, flags: libc::c_int, target: RawFd, req: &ExecRequest) {
	let fd = unsafe { libc::open(path.as_ptr(), flags | libc::O_CLOEXEC, REDIRECT_MODE) };
	if fd < 0 {
		die(b"", path, errno::errno().0, STATUS_SETUP_FAILED);
	}
	// Opened straight onto the target: keep it, but not close-on-exec.
	if fd == target {
		unsafe { libc::fcntl(fd, libc::F_SETFD, 0) };
		return;
	}
	dup_onto(fd, target, req);
	unsafe { libc::close(fd) };
}

pub fn run_stage(req: &ExecRequest, io: StageIo, pipes: &PipeSet, pgid: Pid, mask: &SigSet) -> ! {
	signal::reset_child_dispositions();
	let _ = mask.thread_set_mask();

	if let Err(e) = unistd::setpgid(Pid::from_raw(0), pgid) {
		die(b"setpgid: ", &req.program, e as i32, STATUS_SETUP_FAILED);
	}

	if let Some(fd) = io.stdin {
		dup_onto(fd, libc::STDIN_FILENO, req);
	}
	if let Some(fd) = io.stdout {
		dup_onto(fd, libc::STDOUT_FILENO, req);
	}
	for fd in pipes.raw_fds() {
		unsafe { libc::close(fd) };
	}

	// File redirections win over the pipe wiring.
	if let Some(ref path) = req.input {
		open_onto(path, libc::O_RDONLY, libc::STDIN_FILENO, req);
	}
	if let Some(ref path) = req.output {
		let mode = if req.append { libc::O_APPEND } else { libc::O_TRUNC };
		open_onto(path, libc::O_WRONLY | libc::O_CREAT | mode, libc::STDOUT_FILENO, req);
	}

	let path = match req.path {
		Some(ref path) => path,
		None => {
			write_stderr(&[b"minish: ", req.program.to_bytes(), b": command not found\n"]);
			unsafe { libc::_exit(STATUS_NOT_FOUND) }
		},
	};
	unsafe { libc::execve(path.as_ptr(), req.argv.as_ptr(), req.envp.as_ptr()) };
	die(b"", &req.program, errno::errno().0, STATUS_NOT_FOUND)
}
