use std::io::{self, BufRead, Write};
use std::{env, process};

use minish::config::Config;
use minish::eval::{self, EvalResult};
use minish::global;
use minish::signal::SignalPolicy;
use simplelog::{ColorChoice, TermLogger, TerminalMode};

const FALLBACK_PROMPT: &str = "minish> ";

fn prompt() -> String {
	match env::current_dir() {
		Ok(dir) => format!("{}> ", dir.display()),
		Err(_) => FALLBACK_PROMPT.to_string(),
	}
}

fn main() {
	let config = Config::from_env();
	let _ = TermLogger::init(config.log_level, simplelog::Config::default(), TerminalMode::Stderr, ColorChoice::Never);

	let _policy = match SignalPolicy::install() {
		Ok(policy) => policy,
		Err(e) => {
			let _ = writeln!(io::stderr(), "minish: {}", e);
			process::exit(1);
		},
	};
	let mut state = global::State::new(&config);

	let mut stdout = io::stdout();
	let stdin = io::stdin();
	let mut stdin_locked = stdin.lock();
	loop {
		let _ = stdout.write_all(prompt().as_bytes());
		let _ = stdout.flush();
		let mut line: Vec<u8> = vec![];
		match stdin_locked.read_until(b'\n', &mut line) {
			Ok(0) => {
				let _ = writeln!(stdout);
				break;
			},
			Ok(_) => {},
			Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
			Err(e) => {
				log::error!("reading input: {}", e);
				break;
			},
		}
		match eval::eval_line(&mut state, &String::from_utf8_lossy(&line)) {
			EvalResult::Done(status) => log::debug!("status {}", status),
			EvalResult::Background(pgid) => {
				let _ = writeln!(stdout, "[{}]", pgid);
			},
			EvalResult::Exit(code) => {
				let _ = stdout.flush();
				process::exit(code);
			},
		}
	}
}
