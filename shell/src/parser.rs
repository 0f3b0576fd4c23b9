use thiserror::Error;

use crate::types::*;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
	#[error("missing command before '|'")]
	EmptyStage,
	#[error("missing command after '|'")]
	DanglingPipe,
	#[error("'&' is only allowed at the end of the line")]
	MisplacedBackground,
	#[error("missing file name after '{0}'")]
	MissingRedirectTarget(Token),
	#[error("redirection without a command")]
	MissingProgram,
}

pub type ParseResult<T> = Result<T, ParseError>;

struct Parser<'a> {
	tokens: &'a [Token],
	i: usize,
}

impl<'a> Parser<'a> {
	fn next(&mut self) -> Option<&'a Token> {
		let t = self.tokens.get(self.i);
		if t.is_some() {
			self.i += 1;
		}
		t
	}

	fn is_last(&self) -> bool {
		self.i == self.tokens.len()
	}

	fn read_target(&mut self, op: &Token) -> ParseResult<String> {
		match self.next() {
			Some(Token::Word(w)) => Ok(w.clone()),
			_ => Err(ParseError::MissingRedirectTarget(op.clone())),
		}
	}

	fn finish_command(current: Command, commands: &mut Vec<Command>) -> ParseResult<()> {
		if current.args.is_empty() {
			return Err(ParseError::MissingProgram);
		}
		commands.push(current);
		Ok(())
	}

	fn parse_pipeline(&mut self) -> ParseResult<Option<Pipeline>> {
		let mut commands: Vec<Command> = vec![];
		let mut current = Command::default();
		let mut is_background = false;
		let mut after_pipe = false;

		while let Some(token) = self.next() {
			match *token {
				Token::Pipe => {
					if current.args.is_empty() {
						return Err(ParseError::EmptyStage);
					}
					commands.push(std::mem::take(&mut current));
					after_pipe = true;
					continue;
				},
				Token::Background => {
					if !self.is_last() {
						return Err(ParseError::MisplacedBackground);
					}
					is_background = true;
					continue;
				},
				Token::RedirectIn => {
					current.input_redirect = Some(self.read_target(token)?);
				},
				Token::RedirectOut | Token::RedirectAppend => {
					current.output_redirect = Some(self.read_target(token)?);
					current.append = *token == Token::RedirectAppend;
				},
				Token::Word(ref w) => current.args.push(w.clone()),
			}
			after_pipe = false;
		}

		if !current.args.is_empty() || current.has_redirects() {
			Parser::finish_command(current, &mut commands)?;
		} else if after_pipe {
			return Err(ParseError::DanglingPipe);
		}

		if commands.is_empty() {
			Ok(None)
		} else {
			Ok(Some(Pipeline { commands: commands, is_background: is_background }))
		}
	}
}

/// `Ok(None)` means there was nothing to run.
pub fn parse(tokens: &[Token]) -> ParseResult<Option<Pipeline>> {
	let mut parser = Parser { tokens: tokens, i: 0 };
	parser.parse_pipeline()
}
