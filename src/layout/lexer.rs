//! Layout tokenizer using winnow.
//!
//! A single left-to-right pass turning the layout text into [`Token`]s, each
//! carrying the byte offset it started at.

use crate::error::{Error, Result};
use std::fmt;
use winnow::Parser;
use winnow::ascii::multispace0;
use winnow::combinator::{alt, delimited};
use winnow::error::ContextError;
use winnow::token::{one_of, take_till, take_while};

type WResult<T> = std::result::Result<T, ContextError>;

/// Characters with a meaning of their own in the grammar.
const PUNCTUATION: &str = "{}:;!='\"";

/// Token categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `;` between pipelines.
    Semicolon,
    /// `:` between role and type.
    Colon,
    /// `!` linking two cells.
    Bang,
    /// `=` between parameter name and value.
    Equals,
    /// Bare word: role, type, parameter name or unquoted value.
    Word,
    /// Quoted value; the text excludes the quotes.
    Quoted,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TokenKind::LBrace => "'{'",
            TokenKind::RBrace => "'}'",
            TokenKind::Semicolon => "';'",
            TokenKind::Colon => "':'",
            TokenKind::Bang => "'!'",
            TokenKind::Equals => "'='",
            TokenKind::Word => "a name",
            TokenKind::Quoted => "a quoted value",
        };
        f.write_str(s)
    }
}

/// A lexical token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Category.
    pub kind: TokenKind,
    /// Source text (without quotes for [`TokenKind::Quoted`]).
    pub text: String,
    /// Byte offset in the layout string.
    pub position: usize,
}

/// Whether `s` can be written as a bare word.
pub fn is_word(s: &str) -> bool {
    !s.is_empty() && s.chars().all(is_word_char)
}

fn is_word_char(c: char) -> bool {
    !c.is_whitespace() && !PUNCTUATION.contains(c)
}

/// Split a layout string into tokens.
pub fn tokenize(source: &str) -> Result<Vec<Token>> {
    let mut input = source;
    let mut tokens = Vec::new();

    loop {
        let _ = multispace0::<_, ContextError>.parse_next(&mut input);
        if input.is_empty() {
            break;
        }
        let position = source.len() - input.len();

        match token.parse_next(&mut input) {
            Ok((kind, text)) => tokens.push(Token {
                kind,
                text,
                position,
            }),
            Err(_) => return Err(lex_error(input, position)),
        }
    }

    Ok(tokens)
}

fn lex_error(rest: &str, position: usize) -> Error {
    let mut chars = rest.chars();
    let first = chars.next().unwrap_or_default();
    if first == '\'' || first == '"' {
        Error::Parse {
            message: "unterminated quoted value".to_string(),
            position,
            token: rest.chars().take(16).collect(),
        }
    } else {
        Error::Parse {
            message: "unexpected character".to_string(),
            position,
            token: first.to_string(),
        }
    }
}

fn token(input: &mut &str) -> WResult<(TokenKind, String)> {
    alt((
        punctuation.map(|(kind, symbol)| (kind, symbol.to_string())),
        quoted.map(|text| (TokenKind::Quoted, text)),
        word.map(|text: &str| (TokenKind::Word, text.to_string())),
    ))
    .parse_next(input)
}

fn punctuation(input: &mut &str) -> WResult<(TokenKind, char)> {
    one_of(['{', '}', ';', ':', '!', '='])
        .map(|symbol: char| {
            let kind = match symbol {
                '{' => TokenKind::LBrace,
                '}' => TokenKind::RBrace,
                ';' => TokenKind::Semicolon,
                ':' => TokenKind::Colon,
                '!' => TokenKind::Bang,
                _ => TokenKind::Equals,
            };
            (kind, symbol)
        })
        .parse_next(input)
}

fn quoted(input: &mut &str) -> WResult<String> {
    alt((
        delimited('\'', take_till(0.., '\''), '\''),
        delimited('"', take_till(0.., '"'), '"'),
    ))
    .map(|s: &str| s.to_string())
    .parse_next(input)
}

fn word<'a>(input: &mut &'a str) -> WResult<&'a str> {
    take_while(1.., is_word_char).parse_next(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_basic_layout() {
        use TokenKind::*;
        assert_eq!(
            kinds("{ src: TestImage ! dst: TestImageVerify }"),
            vec![LBrace, Word, Colon, Word, Bang, Word, Colon, Word, RBrace]
        );
    }

    #[test]
    fn test_positions() {
        let tokens = tokenize("{src:TestImage}").unwrap();
        let positions: Vec<usize> = tokens.iter().map(|t| t.position).collect();
        assert_eq!(positions, vec![0, 1, 4, 5, 14]);
        assert_eq!(tokens[3].text, "TestImage");
    }

    #[test]
    fn test_quoted_values() {
        let tokens = tokenize(r#"Dimension='640x480' Label="it's""#).unwrap();
        assert_eq!(tokens[2].kind, TokenKind::Quoted);
        assert_eq!(tokens[2].text, "640x480");
        assert_eq!(tokens[5].text, "it's");
    }

    #[test]
    fn test_unquoted_value_is_a_word() {
        let tokens = tokenize("Dimension=1024x512").unwrap();
        assert_eq!(tokens[2].kind, TokenKind::Word);
        assert_eq!(tokens[2].text, "1024x512");
    }

    #[test]
    fn test_unterminated_quote() {
        let err = tokenize("{ src: TestImage Dimension='640 }").unwrap_err();
        match err {
            Error::Parse {
                position, message, ..
            } => {
                assert_eq!(position, 27);
                assert!(message.contains("unterminated"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_is_word() {
        assert!(is_word("640x480"));
        assert!(!is_word("a b"));
        assert!(!is_word(""));
        assert!(!is_word("x=y"));
    }
}
