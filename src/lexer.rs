//! # Tokenizer
//!
//! Turns a query string into [`Token`]s. The lexer is deliberately permissive: free text
//! such as `/api/login failed` lexes into plain words, and it is the parser that decides
//! whether the token stream looks like a structured query at all.

use crate::error::QueryError;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Bare word: field name, function name, unquoted literal or number.
    Word(String),
    /// Quoted string literal, escapes resolved.
    Str(String),
    /// `/pattern/flags`, only recognised in argument position.
    Regex { pattern: String, flags: String },
    /// Maximal run of `= ! < >`; validated by the parser.
    Operator(String),
    And,
    Or,
    Not,
    LParen,
    RParen,
    Comma,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset of the token's first character.
    pub position: usize,
}

/// A lexing failure, with whatever was tokenized before it.
///
/// The parser inspects `tokens` to decide whether the broken input was meant as a
/// structured query or is just free text with a stray quote.
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub error: QueryError,
    pub tokens: Vec<Token>,
}

fn is_operator_char(c: char) -> bool {
    matches!(c, '=' | '!' | '<' | '>')
}

fn is_word_char(c: char) -> bool {
    !c.is_whitespace() && !is_operator_char(c) && !matches!(c, '(' | ')' | ',' | '"' | '\'')
}

pub fn tokenize(input: &str) -> Result<Vec<Token>, LexError> {
    let mut tokens: Vec<Token> = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(pos, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        let kind = match c {
            '(' => {
                chars.next();
                TokenKind::LParen
            }
            ')' => {
                chars.next();
                TokenKind::RParen
            }
            ',' => {
                chars.next();
                TokenKind::Comma
            }
            '"' | '\'' => {
                chars.next();
                let mut value = String::new();
                let mut closed = false;
                while let Some((_, ch)) = chars.next() {
                    match ch {
                        '\\' => match chars.next() {
                            Some((_, escaped)) => value.push(escaped),
                            None => break,
                        },
                        ch if ch == c => {
                            closed = true;
                            break;
                        }
                        ch => value.push(ch),
                    }
                }
                if !closed {
                    return Err(LexError {
                        error: QueryError::at("Unterminated string literal", pos),
                        tokens,
                    });
                }
                TokenKind::Str(value)
            }
            '/' if matches!(tokens.last().map(|t| &t.kind), Some(TokenKind::Comma)) => {
                chars.next();
                let mut pattern = String::new();
                let mut closed = false;
                while let Some((_, ch)) = chars.next() {
                    match ch {
                        '\\' => match chars.next() {
                            // `\/` only protects the delimiter; the regex engine gets a bare slash.
                            Some((_, '/')) => pattern.push('/'),
                            Some((_, escaped)) => {
                                pattern.push('\\');
                                pattern.push(escaped);
                            }
                            None => pattern.push('\\'),
                        },
                        '/' => {
                            closed = true;
                            break;
                        }
                        ch => pattern.push(ch),
                    }
                }
                if !closed {
                    return Err(LexError {
                        error: QueryError::at("Unterminated regex literal", pos),
                        tokens,
                    });
                }
                let mut flags = String::new();
                while let Some(&(_, ch)) = chars.peek() {
                    if !ch.is_ascii_alphabetic() {
                        break;
                    }
                    flags.push(ch);
                    chars.next();
                }
                TokenKind::Regex { pattern, flags }
            }
            c if is_operator_char(c) => {
                let mut op = String::new();
                while let Some(&(_, ch)) = chars.peek() {
                    if !is_operator_char(ch) {
                        break;
                    }
                    op.push(ch);
                    chars.next();
                }
                TokenKind::Operator(op)
            }
            _ => {
                let mut word = String::new();
                while let Some(&(_, ch)) = chars.peek() {
                    if !is_word_char(ch) {
                        break;
                    }
                    word.push(ch);
                    chars.next();
                }
                // Keywords are case-sensitive: `and` stays a plain word.
                match word.as_str() {
                    "AND" => TokenKind::And,
                    "OR" => TokenKind::Or,
                    "NOT" => TokenKind::Not,
                    _ => TokenKind::Word(word),
                }
            }
        };

        tokens.push(Token {
            kind,
            position: pos,
        });
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn comparison_tokens() {
        assert_eq!(
            kinds("level>=warn"),
            vec![
                TokenKind::Word("level".into()),
                TokenKind::Operator(">=".into()),
                TokenKind::Word("warn".into()),
            ]
        );
    }

    #[test]
    fn operator_runs_are_one_token() {
        let tokens = tokenize("level===error").unwrap();
        assert_eq!(tokens[1].kind, TokenKind::Operator("===".into()));
        assert_eq!(tokens[1].position, 5);
    }

    #[test]
    fn keywords_are_case_sensitive() {
        assert_eq!(
            kinds("a=1 AND b=2 and"),
            vec![
                TokenKind::Word("a".into()),
                TokenKind::Operator("=".into()),
                TokenKind::Word("1".into()),
                TokenKind::And,
                TokenKind::Word("b".into()),
                TokenKind::Operator("=".into()),
                TokenKind::Word("2".into()),
                TokenKind::Word("and".into()),
            ]
        );
    }

    #[test]
    fn regex_only_in_argument_position() {
        assert_eq!(
            kinds(r#"matches(message, /time\/out/i)"#),
            vec![
                TokenKind::Word("matches".into()),
                TokenKind::LParen,
                TokenKind::Word("message".into()),
                TokenKind::Comma,
                TokenKind::Regex {
                    pattern: "time/out".into(),
                    flags: "i".into(),
                },
                TokenKind::RParen,
            ]
        );
        assert_eq!(kinds("/api/login"), vec![TokenKind::Word("/api/login".into())]);
    }

    #[test]
    fn quoted_strings_resolve_escapes() {
        assert_eq!(
            kinds(r#"message="say \"hi\"" 'single'"#),
            vec![
                TokenKind::Word("message".into()),
                TokenKind::Operator("=".into()),
                TokenKind::Str(r#"say "hi""#.into()),
                TokenKind::Str("single".into()),
            ]
        );
    }

    #[test]
    fn unterminated_string_keeps_prefix_tokens() {
        let err = tokenize(r#"contains(message, "abc"#).unwrap_err();
        assert_eq!(err.error.position, Some(18));
        assert_eq!(err.tokens.len(), 4);
    }
}
