use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
	Word(String),
	Pipe,
	Background,
	RedirectIn,
	RedirectOut,
	RedirectAppend,
}

impl Token {
	pub fn word(s: &str) -> Token {
		Token::Word(s.to_string())
	}
}

impl fmt::Display for Token {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match *self {
			Token::Word(ref w) => write!(f, "{}", w),
			Token::Pipe => write!(f, "|"),
			Token::Background => write!(f, "&"),
			Token::RedirectIn => write!(f, "<"),
			Token::RedirectOut => write!(f, ">"),
			Token::RedirectAppend => write!(f, ">>"),
		}
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Command {
	pub args: Vec<String>,
	pub input_redirect: Option<String>,
	pub output_redirect: Option<String>,
	pub append: bool,
}

impl Command {
	pub fn program(&self) -> &str {
		&self.args[0]
	}

	pub fn has_redirects(&self) -> bool {
		self.input_redirect.is_some() || self.output_redirect.is_some()
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
	pub commands: Vec<Command>,
	pub is_background: bool,
}
