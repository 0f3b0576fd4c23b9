use std::env;
use std::fmt::Display;
use std::io::{self, Write};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
	Continue(i32),
	Exit(i32),
}

pub type Builtin = fn(&[String], &mut dyn Write) -> Flow;

fn complain<M: Display>(name: &str, msg: M) -> i32 {
	let _ = writeln!(io::stderr(), "minish: {}: {}", name, msg);
	1
}

pub fn builtin_exit(args: &[String], _: &mut dyn Write) -> Flow {
	match args.first() {
		None => Flow::Exit(0),
		Some(code) => match code.parse::<i32>() {
			Ok(n) => Flow::Exit(n),
			Err(_) => {
				complain("exit", format_args!("{}: numeric argument required", code));
				Flow::Exit(2)
			},
		},
	}
}

pub fn builtin_cd(args: &[String], _: &mut dyn Write) -> Flow {
	let target = match args.first() {
		Some(dir) => PathBuf::from(dir),
		None => env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("/")),
	};
	match env::set_current_dir(&target) {
		Ok(()) => Flow::Continue(0),
		Err(e) => Flow::Continue(complain("cd", format_args!("{}: {}", target.display(), e))),
	}
}

pub fn builtin_pwd(_: &[String], out: &mut dyn Write) -> Flow {
	match env::current_dir() {
		Ok(dir) => {
			let _ = writeln!(out, "{}", dir.display());
			Flow::Continue(0)
		},
		Err(e) => Flow::Continue(complain("pwd", e)),
	}
}

pub fn builtin_echo(args: &[String], out: &mut dyn Write) -> Flow {
	let _ = writeln!(out, "{}", args.join(" "));
	Flow::Continue(0)
}

fn is_name(s: &str) -> bool {
	let mut chars = s.chars();
	match chars.next() {
		Some(c) if c == '_' || c.is_ascii_alphabetic() => chars.all(|c| c == '_' || c.is_ascii_alphanumeric()),
		_ => false,
	}
}

pub fn builtin_export(args: &[String], out: &mut dyn Write) -> Flow {
	if args.is_empty() {
		let mut vars: Vec<(String, String)> = env::vars().collect();
		vars.sort();
		for (k, v) in vars {
			let _ = writeln!(out, "export {}={}", k, v);
		}
		return Flow::Continue(0);
	}

	let mut status = 0;
	for arg in args {
		let (name, value) = match arg.split_once('=') {
			Some((name, value)) => (name, Some(value)),
			None => (arg.as_str(), None),
		};
		if !is_name(name) {
			status = complain("export", format_args!("{}: not a valid identifier", arg));
			continue;
		}
		if let Some(value) = value {
			env::set_var(name, value);
		}
	}
	Flow::Continue(status)
}

pub fn match_builtin(name: &str) -> Option<Builtin> {
	match name {
		"exit" => Some(builtin_exit),
		"cd" => Some(builtin_cd),
		"pwd" => Some(builtin_pwd),
		"echo" => Some(builtin_echo),
		"export" => Some(builtin_export),
		_ => None,
	}
}
