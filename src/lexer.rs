use crate::error::ParseError;
use logos::{Logos, SpannedIter};
use thiserror::Error;

#[derive(Default, Error, Debug, Clone, PartialEq)]
pub enum LexicalError {
    #[default]
    #[error("invalid token")]
    InvalidToken,
    #[error("unterminated quote")]
    UnterminatedQuote,
}

#[derive(Clone, Debug, Logos, PartialEq)]
#[logos(skip r"[\s\t\n\f]+", error = LexicalError)]
pub enum Token<'source> {
    #[token("and", ignore(ascii_case))]
    And,
    #[token("or", ignore(ascii_case))]
    Or,
    #[token("(")]
    LeftParenthesis,
    #[token(")")]
    RightParenthesis,
    #[regex(r#""[^"]*""#, |lex| lex.slice().trim_matches('"'))]
    Text(&'source str),
}

impl std::fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::And => write!(f, "AND"),
            Token::Or => write!(f, "OR"),
            Token::LeftParenthesis => write!(f, "("),
            Token::RightParenthesis => write!(f, ")"),
            Token::Text(text) => write!(f, "{text:?}"),
        }
    }
}

pub type Spanned<Tok, Location, Error> = Result<(Location, Tok, Location), Error>;

pub struct Lexer<'input> {
    input: &'input str,
    token_stream: SpannedIter<'input, Token<'input>>,
}

impl<'input> Lexer<'input> {
    pub fn new(input: &'input str) -> Self {
        Self {
            input,
            token_stream: Token::lexer(input).spanned(),
        }
    }
}

impl<'input> Iterator for Lexer<'input> {
    type Item = Spanned<Token<'input>, usize, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.token_stream.next().map(|(token, span)| {
            let token = token.map_err(|error| {
                // A quote that never closes fails the quoted-span regex; report
                // it as its own case rather than a generic invalid token.
                if error == LexicalError::InvalidToken && self.input[span.start..].starts_with('"') {
                    LexicalError::UnterminatedQuote
                } else {
                    error
                }
            });

            Ok((
                span.start,
                token.map_err(|source| ParseError::Lexical {
                    position: span.start,
                    source,
                })?,
                span.end,
            ))
        })
    }
}
