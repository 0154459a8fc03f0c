use crate::{
    ast::ExpressionNode,
    catalog::{ProxyId, ProxyResolver},
    error::ParseError,
    lexer::{Lexer, Token},
};

/// One quoted fragment's resolution, reported back so the caller can show
/// and confirm what the expression actually refers to.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedProxy {
    pub id: ProxyId,
    /// The fragment as it appeared between the quotes.
    pub fragment: String,
    /// The matched proxy's full search term.
    pub term: String,
    /// Name of the variable owning the proxy.
    pub variable: String,
    /// Other proxies that also matched the fragment and lost the tie-break.
    pub alternatives: Vec<ProxyId>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ParseOutcome {
    pub tree: ExpressionNode,
    pub resolved: Vec<ResolvedProxy>,
}

/// Parse a textual expression such as `"A" OR "B" OR ("C" AND "D")` into an
/// expression tree, resolving each quoted fragment to a proxy through the
/// given resolver.
///
/// Grammar, with `AND` binding tighter than `OR`:
///
/// ```text
/// Expr    := OrExpr
/// OrExpr  := AndExpr ( "OR" AndExpr )*
/// AndExpr := Atom ( "AND" Atom )*
/// Atom    := TEXT | "(" Expr ")"
/// ```
///
/// Runs of the same operator become a single n-ary node, so the output never
/// contains single-child wrappers. Failure is atomic: no partial tree and no
/// partial resolution list escapes.
pub fn parse(input: &str, resolver: &impl ProxyResolver) -> Result<ParseOutcome, ParseError> {
    let tokens = Lexer::new(input).collect::<Result<Vec<_>, _>>()?;
    if tokens.is_empty() {
        return Err(ParseError::Empty);
    }

    let mut parser = Parser {
        tokens,
        position: 0,
        resolver,
        resolved: Vec::new(),
    };
    let tree = parser.or_expression()?;

    if let Some((position, token, _)) = parser.peek() {
        let position = *position;
        return Err(match token {
            Token::RightParenthesis => ParseError::UnmatchedParenthesis { position },
            _ => ParseError::TrailingTokens { position },
        });
    }

    Ok(ParseOutcome {
        tree,
        resolved: parser.resolved,
    })
}

struct Parser<'input, 'state, R> {
    tokens: Vec<(usize, Token<'input>, usize)>,
    position: usize,
    resolver: &'state R,
    resolved: Vec<ResolvedProxy>,
}

impl<'input, R: ProxyResolver> Parser<'input, '_, R> {
    fn or_expression(&mut self) -> Result<ExpressionNode, ParseError> {
        let mut children = vec![self.and_expression()?];
        while self.eat(&Token::Or) {
            children.push(self.and_expression()?);
        }
        Ok(collapse(children, |children| ExpressionNode::Or { children }))
    }

    fn and_expression(&mut self) -> Result<ExpressionNode, ParseError> {
        let mut children = vec![self.atom()?];
        while self.eat(&Token::And) {
            children.push(self.atom()?);
        }
        Ok(collapse(children, |children| ExpressionNode::And { children }))
    }

    fn atom(&mut self) -> Result<ExpressionNode, ParseError> {
        match self.advance() {
            Some((_, Token::Text(fragment), _)) => self.resolve(fragment),
            Some((start, Token::LeftParenthesis, _)) => {
                let node = self.or_expression()?;
                match self.advance() {
                    Some((_, Token::RightParenthesis, _)) => Ok(node),
                    Some((position, token, _)) => Err(ParseError::UnexpectedToken {
                        position,
                        token: token.to_string(),
                    }),
                    None => Err(ParseError::UnmatchedParenthesis { position: start }),
                }
            }
            Some((position, token, _)) => Err(ParseError::UnexpectedToken {
                position,
                token: token.to_string(),
            }),
            None => Err(ParseError::UnexpectedEnd),
        }
    }

    fn resolve(&mut self, fragment: &str) -> Result<ExpressionNode, ParseError> {
        let mut candidates = self.resolver.find_by_text(fragment);
        if candidates.is_empty() {
            return Err(ParseError::UnknownProxy {
                fragment: fragment.to_owned(),
            });
        }

        // Deterministic pick among multiple hits: an exact term wins, then
        // the shortest term, then the lowest id. The losing candidates are
        // reported as alternatives for the caller to confirm.
        let needle = fragment.trim().to_lowercase();
        candidates.sort_by_key(|proxy| {
            (
                proxy.term.to_lowercase() != needle,
                proxy.term.chars().count(),
                proxy.id,
            )
        });

        let chosen = candidates[0];
        let alternatives = candidates[1..].iter().map(|proxy| proxy.id).collect();
        self.resolved.push(ResolvedProxy {
            id: chosen.id,
            fragment: fragment.to_owned(),
            term: chosen.term.clone(),
            variable: self
                .resolver
                .variable_name(chosen.variable)
                .unwrap_or("Unknown")
                .to_owned(),
            alternatives,
        });

        Ok(ExpressionNode::proxy(chosen.id))
    }

    fn eat(&mut self, expected: &Token) -> bool {
        match self.peek() {
            Some((_, token, _)) if token == expected => {
                self.position += 1;
                true
            }
            _ => false,
        }
    }

    fn peek(&self) -> Option<&(usize, Token<'input>, usize)> {
        self.tokens.get(self.position)
    }

    fn advance(&mut self) -> Option<(usize, Token<'input>, usize)> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }
}

fn collapse(
    mut children: Vec<ExpressionNode>,
    rebuild: impl FnOnce(Vec<ExpressionNode>) -> ExpressionNode,
) -> ExpressionNode {
    if children.len() == 1 {
        children.swap_remove(0)
    } else {
        rebuild(children)
    }
}
