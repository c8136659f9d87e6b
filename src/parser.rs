//! # Query Parser
//!
//! Recursive descent over the token stream, precedence low to high:
//!
//! ```text
//! Or         := And ("OR" And)*
//! And        := Not ("AND" Not)*
//! Not        := "NOT" Not | Primary
//! Primary    := "(" Or ")" | Comparison | FunctionCall
//! Comparison := Field Operator Literal
//! Function   := Name "(" Field "," Argument ")"
//! ```
//!
//! Input that shows no structured pattern at all is not an error: the outcome is flagged as a
//! legacy text search and the caller runs the free-text matcher instead. A structured pattern
//! is a known function call, or an operator with a field name opening a clause on its left and
//! a value on its right (`level=error`, `NOT env!=prod`). Free text such as `server down!` or
//! `retry -> failed` never qualifies.
//!
//! `(` and `NOT` may nest at most [`MAX_NESTING`] deep; AND/OR chains of any length are
//! built as flat lists.

use crate::ast::{Argument, CompareOp, FieldRef, FunctionName, Literal, QueryNode};
use crate::error::QueryError;
use crate::lexer::{tokenize, LexError, Token, TokenKind};
use regex::{Regex, RegexBuilder};
use tracing::debug;

/// Deepest `(` / `NOT` nesting the parser accepts.
pub const MAX_NESTING: usize = 64;

/// Result of [`parse_query`].
///
/// A non-empty `errors` list means "do not evaluate"; `ast` is then `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseOutcome {
    pub ast: Option<QueryNode>,
    pub is_legacy_text_search: bool,
    pub errors: Vec<QueryError>,
}

impl ParseOutcome {
    fn legacy() -> Self {
        Self {
            ast: None,
            is_legacy_text_search: true,
            errors: Vec::new(),
        }
    }

    fn failed(error: QueryError) -> Self {
        Self {
            ast: None,
            is_legacy_text_search: false,
            errors: vec![error],
        }
    }

    fn parsed(ast: QueryNode) -> Self {
        Self {
            ast: Some(ast),
            is_legacy_text_search: false,
            errors: Vec::new(),
        }
    }
}

/// Result of [`validate_query`].
#[derive(Debug, Clone, PartialEq)]
pub struct Validation {
    pub valid: bool,
    pub errors: Vec<QueryError>,
}

/// Parses a query string. Never fails: problems are reported in the outcome.
pub fn parse_query(input: &str) -> ParseOutcome {
    if input.trim().is_empty() {
        return ParseOutcome::legacy();
    }

    let tokens = match tokenize(input) {
        Ok(tokens) => tokens,
        Err(LexError { error, tokens }) => {
            if looks_structured(&tokens) {
                return ParseOutcome::failed(error);
            }
            debug!(query = input, "unlexable unstructured input, using text search");
            return ParseOutcome::legacy();
        }
    };

    if !looks_structured(&tokens) {
        debug!(query = input, "no structured pattern, using text search");
        return ParseOutcome::legacy();
    }

    match Parser::new(&tokens, input.len()).parse() {
        Ok(ast) => ParseOutcome::parsed(ast),
        Err(error) => ParseOutcome::failed(error),
    }
}

/// Pure syntax check for live input validation. Free text is valid.
pub fn validate_query(input: &str) -> Validation {
    let outcome = parse_query(input);
    Validation {
        valid: outcome.errors.is_empty(),
        errors: outcome.errors,
    }
}

/// Compiles a `/pattern/flags` literal. JavaScript-only flags (`g`, `u`, `y`, `d`) are
/// accepted and ignored.
pub fn compile_regex(pattern: &str, flags: &str) -> Result<Regex, String> {
    let mut builder = RegexBuilder::new(pattern);
    for flag in flags.chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            'm' => builder.multi_line(true),
            's' => builder.dot_matches_new_line(true),
            'x' => builder.ignore_whitespace(true),
            'g' | 'u' | 'y' | 'd' => &mut builder,
            other => return Err(format!("unknown regex flag '{other}'")),
        };
    }
    builder.build().map_err(|e| e.to_string())
}

/// A query is structured once it calls a known function, or has a comparison operator
/// between a clause-opening field name and a value.
fn looks_structured(tokens: &[Token]) -> bool {
    let kind = |i: usize| tokens.get(i).map(|t| &t.kind);
    tokens.iter().enumerate().any(|(i, token)| match &token.kind {
        TokenKind::Operator(op) => {
            let field_before = i > 0
                && matches!(kind(i - 1), Some(TokenKind::Word(word)) if is_field_like(word))
                && (i == 1
                    || matches!(
                        kind(i - 2),
                        Some(TokenKind::And | TokenKind::Or | TokenKind::Not | TokenKind::LParen)
                    ));
            let value_after = match kind(i + 1) {
                Some(TokenKind::Word(_) | TokenKind::Str(_)) => true,
                None => CompareOp::parse(op).is_some(),
                _ => false,
            };
            field_before && value_after
        }
        TokenKind::Word(word) => {
            FunctionName::parse(word).is_some() && matches!(kind(i + 1), Some(TokenKind::LParen))
        }
        _ => false,
    })
}

/// Starts like an identifier; the full character check happens in [`validate_field`].
fn is_field_like(word: &str) -> bool {
    word.chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || matches!(c, '_' | '@' | '$'))
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '@' | '$' | '.'))
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Word(w) => format!("'{w}'"),
        TokenKind::Str(s) => format!("string \"{s}\""),
        TokenKind::Regex { pattern, flags } => format!("regex /{pattern}/{flags}"),
        TokenKind::Operator(op) => format!("operator '{op}'"),
        TokenKind::And => "'AND'".to_string(),
        TokenKind::Or => "'OR'".to_string(),
        TokenKind::Not => "'NOT'".to_string(),
        TokenKind::LParen => "'('".to_string(),
        TokenKind::RParen => "')'".to_string(),
        TokenKind::Comma => "','".to_string(),
    }
}

fn validate_field(name: &str, position: usize) -> Result<FieldRef, QueryError> {
    let valid_char = |c: char| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '@' | '$');
    let valid = name
        .split('.')
        .all(|segment| !segment.is_empty() && segment.chars().all(valid_char));
    if valid {
        Ok(FieldRef::new(name))
    } else {
        Err(QueryError::at(format!("Invalid field name '{name}'"), position))
    }
}

struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
    /// Position reported for "unexpected end of query".
    end: usize,
    /// Current `(` / `NOT` nesting.
    depth: usize,
}

impl<'t> Parser<'t> {
    fn new(tokens: &'t [Token], end: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            end,
            depth: 0,
        }
    }

    fn parse(&mut self) -> Result<QueryNode, QueryError> {
        let node = self.parse_or()?;
        match self.peek() {
            None => Ok(node),
            Some(token) => Err(QueryError::at(
                format!("Unexpected {}", describe(&token.kind)),
                token.position,
            )),
        }
    }

    #[inline]
    fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.pos)
    }

    #[inline]
    fn peek_kind(&self, offset: usize) -> Option<&'t TokenKind> {
        self.tokens.get(self.pos + offset).map(|t| &t.kind)
    }

    fn advance(&mut self) -> Option<&'t Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn here(&self) -> usize {
        self.peek().map_or(self.end, |t| t.position)
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<(), QueryError> {
        match self.peek() {
            Some(token) if &token.kind == kind => {
                self.pos += 1;
                Ok(())
            }
            _ => Err(QueryError::at(format!("Expected {what}"), self.here())),
        }
    }

    /// Runs `parse` one nesting level deeper, refusing to go past [`MAX_NESTING`].
    fn nested(
        &mut self,
        position: usize,
        parse: impl FnOnce(&mut Self) -> Result<QueryNode, QueryError>,
    ) -> Result<QueryNode, QueryError> {
        if self.depth >= MAX_NESTING {
            return Err(QueryError::at(
                format!("Query nests deeper than {MAX_NESTING} levels"),
                position,
            ));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn parse_or(&mut self) -> Result<QueryNode, QueryError> {
        let mut left = self.parse_and()?;
        while matches!(self.peek_kind(0), Some(TokenKind::Or)) {
            self.pos += 1;
            let right = self.parse_and()?;
            left = QueryNode::or(left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<QueryNode, QueryError> {
        let mut left = self.parse_not()?;
        while matches!(self.peek_kind(0), Some(TokenKind::And)) {
            self.pos += 1;
            let right = self.parse_not()?;
            left = QueryNode::and(left, right);
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<QueryNode, QueryError> {
        if let Some(Token {
            kind: TokenKind::Not,
            position,
        }) = self.peek()
        {
            self.pos += 1;
            return self
                .nested(*position, Self::parse_not)
                .map(QueryNode::negate);
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<QueryNode, QueryError> {
        let Some(token) = self.peek() else {
            return Err(QueryError::at("Unexpected end of query", self.end));
        };

        match &token.kind {
            TokenKind::LParen => {
                self.pos += 1;
                let inner = self.nested(token.position, Self::parse_or)?;
                match self.peek_kind(0) {
                    Some(TokenKind::RParen) => {
                        self.pos += 1;
                        Ok(inner)
                    }
                    _ => Err(QueryError::at(
                        format!("Missing ')' for '(' at position {}", token.position),
                        self.here(),
                    )),
                }
            }
            TokenKind::Word(word) => match self.peek_kind(1) {
                Some(TokenKind::LParen) => self.parse_function(word, token.position),
                Some(TokenKind::Operator(_)) => self.parse_comparison(word, token.position),
                _ => {
                    self.pos += 1;
                    Err(QueryError::at(
                        format!("Expected an operator or '(' after '{word}'"),
                        self.here(),
                    ))
                }
            },
            other => Err(QueryError::at(
                format!("Unexpected {}", describe(other)),
                token.position,
            )),
        }
    }

    fn parse_comparison(&mut self, word: &str, position: usize) -> Result<QueryNode, QueryError> {
        let field = validate_field(word, position)?;
        self.pos += 1;

        let Some(Token {
            kind: TokenKind::Operator(op),
            position: op_position,
        }) = self.advance()
        else {
            return Err(QueryError::at("Expected an operator", self.here()));
        };
        let operator = CompareOp::parse(op)
            .ok_or_else(|| QueryError::at(format!("Unknown operator '{op}'"), *op_position))?;

        let value = match self.peek_kind(0) {
            Some(TokenKind::Str(s)) => Literal::string(s.as_str()),
            Some(TokenKind::Word(w)) => Literal::bare(w),
            _ => {
                return Err(QueryError::at(
                    format!("Expected a value after '{op}'"),
                    self.here(),
                ))
            }
        };
        self.pos += 1;

        Ok(QueryNode::Comparison {
            field,
            operator,
            value,
        })
    }

    fn parse_function(&mut self, name: &str, position: usize) -> Result<QueryNode, QueryError> {
        let function = FunctionName::parse(name)
            .ok_or_else(|| QueryError::at(format!("Unknown function '{name}'"), position))?;
        self.pos += 1;
        self.expect(&TokenKind::LParen, &format!("'(' after {name}"))?;

        let field = match self.advance() {
            Some(Token {
                kind: TokenKind::Word(field),
                position,
            }) => validate_field(field, *position)?,
            _ => {
                return Err(QueryError::at(
                    format!("Expected a field name as the first argument of {name}()"),
                    self.here(),
                ))
            }
        };
        self.expect(&TokenKind::Comma, "',' after the field name")?;

        let arg_position = self.here();
        let argument = match (function, self.peek_kind(0)) {
            (FunctionName::Matches, Some(TokenKind::Regex { pattern, flags })) => Argument::Regex {
                pattern: pattern.clone(),
                flags: flags.clone(),
            },
            (FunctionName::Matches, Some(TokenKind::Str(pattern))) => Argument::Regex {
                pattern: pattern.clone(),
                flags: String::new(),
            },
            (_, Some(TokenKind::Regex { .. })) => {
                return Err(QueryError::at(
                    format!("Regex literals are only valid in matches(), not {name}()"),
                    arg_position,
                ))
            }
            (FunctionName::Matches, _) => {
                return Err(QueryError::at(
                    "Expected a /pattern/flags regex as the second argument of matches()",
                    arg_position,
                ))
            }
            (_, Some(TokenKind::Str(text))) | (_, Some(TokenKind::Word(text))) => {
                Argument::Text(text.clone())
            }
            _ => {
                return Err(QueryError::at(
                    format!("Expected a value as the second argument of {name}()"),
                    arg_position,
                ))
            }
        };
        if let Argument::Regex { pattern, flags } = &argument {
            compile_regex(pattern, flags).map_err(|e| {
                QueryError::at(format!("Invalid regular expression: {e}"), arg_position)
            })?;
        }
        self.pos += 1;
        self.expect(&TokenKind::RParen, &format!("')' to close {name}("))?;

        Ok(QueryNode::Function {
            field,
            function,
            argument,
        })
    }
}
