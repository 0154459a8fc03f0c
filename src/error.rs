use crate::lexer::LexicalError;
use thiserror::Error;

/// Errors produced while turning a textual expression into an expression tree.
///
/// Parsing is atomic: any of these means nothing was resolved or persisted.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("failed to lex at byte {position}: {source}")]
    Lexical {
        position: usize,
        source: LexicalError,
    },
    #[error("unexpected {token} at byte {position}")]
    UnexpectedToken { position: usize, token: String },
    #[error("expression ended before it was complete")]
    UnexpectedEnd,
    #[error("unmatched parenthesis at byte {position}")]
    UnmatchedParenthesis { position: usize },
    #[error("trailing input at byte {position} after a complete expression")]
    TrailingTokens { position: usize },
    #[error("no proxy matches the fragment {fragment:?}")]
    UnknownProxy { fragment: String },
    #[error("empty expression")]
    Empty,
}

/// Structural errors in an expression tree.
///
/// These are rejected before persistence; a tree that was persisted anyway
/// (pre-existing data) fails closed at evaluation time instead of crashing
/// the surrounding batch.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("AND/OR node with no children")]
    EmptyChildren,
    #[error("expression depth {depth} exceeds the cap of {max}")]
    DepthExceeded { depth: usize, max: usize },
}
