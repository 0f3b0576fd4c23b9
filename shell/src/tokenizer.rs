use std::mem;

use crate::types::Token;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resume {
	Normal,
	SingleQuote,
	DoubleQuote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
	Normal,
	SingleQuote,
	DoubleQuote,
	Escape(Resume),
	Substitution { depth: usize, resume: Resume },
}

impl From<Resume> for State {
	fn from(r: Resume) -> State {
		match r {
			Resume::Normal => State::Normal,
			Resume::SingleQuote => State::SingleQuote,
			Resume::DoubleQuote => State::DoubleQuote,
		}
	}
}

/// Character-at-a-time lexer. Feed it with `push` and collect with `finish`.
#[derive(Debug)]
pub struct Tokenizer {
	state: State,
	current: String,
	quoted: bool,
	prev_dollar: bool,
	prev_gt: bool,
	tokens: Vec<Token>,
}

impl Default for Tokenizer {
	fn default() -> Tokenizer {
		Tokenizer::new()
	}
}

impl Tokenizer {
	pub fn new() -> Tokenizer {
		Tokenizer {
			state: State::Normal,
			current: String::new(),
			quoted: false,
			prev_dollar: false,
			prev_gt: false,
			tokens: vec![],
		}
	}

	pub fn state(&self) -> State {
		self.state
	}

	pub fn tokens(&self) -> &[Token] {
		&self.tokens
	}

	fn flush(&mut self) {
		if !self.current.is_empty() || self.quoted {
			self.tokens.push(Token::Word(mem::take(&mut self.current)));
			self.quoted = false;
		}
	}

	fn operator(&mut self, token: Token) {
		self.flush();
		self.tokens.push(token);
	}

	fn literal(&mut self, c: char) {
		self.current.push(c);
		self.prev_dollar = c == '$';
	}

	pub fn push(&mut self, c: char) {
		let prev_dollar = mem::replace(&mut self.prev_dollar, false);
		let prev_gt = mem::replace(&mut self.prev_gt, false);

		match self.state {
			State::Escape(resume) => {
				self.current.push(c);
				self.state = resume.into();
			},
			State::Substitution { depth, resume } => {
				self.current.push(c);
				self.state = match c {
					'(' => State::Substitution { depth: depth + 1, resume: resume },
					')' if depth == 1 => resume.into(),
					')' => State::Substitution { depth: depth - 1, resume: resume },
					_ => self.state,
				};
			},
			State::SingleQuote => match c {
				'\\' => self.state = State::Escape(Resume::SingleQuote),
				'\'' => self.state = State::Normal,
				_ => self.current.push(c),
			},
			State::DoubleQuote => match c {
				'\\' => self.state = State::Escape(Resume::DoubleQuote),
				'"' => self.state = State::Normal,
				'(' if prev_dollar => {
					self.current.push(c);
					self.state = State::Substitution { depth: 1, resume: Resume::DoubleQuote };
				},
				_ => self.literal(c),
			},
			State::Normal => match c {
				'\\' => self.state = State::Escape(Resume::Normal),
				'\'' => {
					self.quoted = true;
					self.state = State::SingleQuote;
				},
				'"' => {
					self.quoted = true;
					self.state = State::DoubleQuote;
				},
				'|' => self.operator(Token::Pipe),
				'&' => self.operator(Token::Background),
				'<' => self.operator(Token::RedirectIn),
				'>' if prev_gt => {
					if let Some(last) = self.tokens.last_mut() {
						*last = Token::RedirectAppend;
					}
				},
				'>' => {
					self.operator(Token::RedirectOut);
					self.prev_gt = true;
				},
				'(' if prev_dollar => {
					self.current.push(c);
					self.state = State::Substitution { depth: 1, resume: Resume::Normal };
				},
				c if c.is_whitespace() => self.flush(),
				_ => self.literal(c),
			},
		}
	}

	/// An open quote or substitution is closed at end of input; a dangling
	/// backslash is dropped.
	pub fn finish(mut self) -> Vec<Token> {
		self.flush();
		self.tokens
	}
}

pub fn tokenize(line: &str) -> Vec<Token> {
	let mut tokenizer = Tokenizer::new();
	for c in line.chars() {
		tokenizer.push(c);
	}
	tokenizer.finish()
}
