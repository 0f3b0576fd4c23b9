use std::io;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{self, Stdio};

use crate::signal;
use crate::types::Token;

/// Runs a command line and hands back everything it wrote to standard output.
pub trait CaptureOutput {
	fn capture_output(&self, command_line: &str) -> io::Result<String>;
}

#[derive(Debug, Clone)]
pub struct SystemShell {
	shell: PathBuf,
}

impl SystemShell {
	pub fn new(shell: PathBuf) -> SystemShell {
		SystemShell { shell: shell }
	}
}

impl CaptureOutput for SystemShell {
	fn capture_output(&self, command_line: &str) -> io::Result<String> {
		let mut cmd = process::Command::new(&self.shell);
		cmd.arg("-c").arg(command_line).stdin(Stdio::inherit()).stderr(Stdio::inherit());
		unsafe {
			cmd.pre_exec(|| {
				signal::reset_child_dispositions();
				Ok(())
			});
		}
		// The reaper must not collect this child before `output` waits on it.
		let _hold = signal::block_sigchld().map_err(io::Error::from)?;
		let output = cmd.output()?;
		log::debug!("substitution {:?} exited with {}", command_line, output.status);
		Ok(String::from_utf8_lossy(&output.stdout).into_owned())
	}
}

fn strip_trailing_newline(mut s: String) -> String {
	if s.ends_with('\n') {
		s.pop();
	}
	s
}

/// Replaces every `$(...)` in `word` with the captured output of its contents.
/// An unbalanced `$(` and the rest of the word are kept literally.
pub fn expand_word<C: CaptureOutput + ?Sized>(word: &str, capture: &C) -> String {
	let mut result = String::with_capacity(word.len());
	let mut rest = word;
	while let Some(start) = rest.find("$(") {
		result.push_str(&rest[.. start]);
		let body = &rest[start + 2 ..];
		let mut depth = 1usize;
		let mut close = None;
		for (i, b) in body.bytes().enumerate() {
			match b {
				b'(' => depth += 1,
				b')' => {
					depth -= 1;
					if depth == 0 {
						close = Some(i);
						break;
					}
				},
				_ => {},
			}
		}
		let close = match close {
			Some(i) => i,
			None => {
				result.push_str(&rest[start ..]);
				return result;
			},
		};
		let command_line = &body[.. close];
		match capture.capture_output(command_line) {
			Ok(out) => result.push_str(&strip_trailing_newline(out)),
			Err(e) => log::warn!("command substitution {:?} failed: {}", command_line, e),
		}
		rest = &body[close + 1 ..];
	}
	result.push_str(rest);
	result
}

pub fn expand_tokens<C: CaptureOutput + ?Sized>(tokens: Vec<Token>, capture: &C) -> Vec<Token> {
	tokens.into_iter().map(|token| match token {
		Token::Word(ref w) if w.contains("$(") => Token::Word(expand_word(w, capture)),
		other => other,
	}).collect()
}
