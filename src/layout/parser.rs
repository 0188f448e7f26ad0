//! Recursive-descent construction of a [`LayoutAst`] from tokens.
//!
//! ```text
//! layout   := '{' pipeline (';' pipeline)* '}'
//! pipeline := cell ('!' cell)*
//! cell     := WORD ':' WORD param*
//! param    := WORD '=' (QUOTED | WORD)
//! ```

use super::ast::{CellAst, LayoutAst, ParamAst, PipelineAst};
use super::lexer::{Token, TokenKind, tokenize};
use crate::error::{Error, Result};

/// Parse a layout string.
///
/// # Example
///
/// ```rust
/// use gridstreamer::layout::parse_layout;
///
/// let layout = parse_layout("{ src: TestImage Dimension='1024x512' ! dst: TestImageVerify }").unwrap();
/// assert_eq!(layout.pipelines.len(), 1);
/// assert_eq!(layout.pipelines[0].cells[0].params[0].value, "1024x512");
/// ```
pub fn parse_layout(source: &str) -> Result<LayoutAst> {
    let tokens = tokenize(source)?;
    let mut parser = TokenParser {
        tokens: &tokens,
        index: 0,
        end: source.len(),
    };
    parser.layout()
}

struct TokenParser<'a> {
    tokens: &'a [Token],
    index: usize,
    end: usize,
}

impl<'a> TokenParser<'a> {
    fn layout(&mut self) -> Result<LayoutAst> {
        self.expect(TokenKind::LBrace, "layout must start with '{'")?;

        let mut pipelines = vec![self.pipeline()?];
        while self.eat(TokenKind::Semicolon).is_some() {
            pipelines.push(self.pipeline()?);
        }

        self.expect(TokenKind::RBrace, "expected '!', ';' or '}'")?;
        if let Some(extra) = self.peek() {
            return Err(error_at(extra, "unexpected input after '}'"));
        }
        Ok(LayoutAst { pipelines })
    }

    fn pipeline(&mut self) -> Result<PipelineAst> {
        let mut cells = vec![self.cell()?];
        while self.eat(TokenKind::Bang).is_some() {
            cells.push(self.cell()?);
        }
        Ok(PipelineAst { cells })
    }

    fn cell(&mut self) -> Result<CellAst> {
        let role = self.expect(TokenKind::Word, "expected a cell role")?;
        self.expect(TokenKind::Colon, "expected ':' after the cell role")?;
        let type_name = self.expect(TokenKind::Word, "expected a cell type")?;

        let mut params = Vec::new();
        while self.at_param() {
            params.push(self.param()?);
        }

        Ok(CellAst {
            role: role.text.clone(),
            type_name: type_name.text.clone(),
            params,
            position: role.position,
            type_position: type_name.position,
        })
    }

    fn param(&mut self) -> Result<ParamAst> {
        let name = self.expect(TokenKind::Word, "expected a parameter name")?;
        self.expect(TokenKind::Equals, "expected '='")?;
        let value = match self.peek() {
            Some(token) if matches!(token.kind, TokenKind::Quoted | TokenKind::Word) => {
                self.index += 1;
                token
            }
            _ => return Err(self.error_here("expected a parameter value")),
        };
        Ok(ParamAst {
            name: name.text.clone(),
            value: value.text.clone(),
            position: value.position,
        })
    }

    /// A parameter starts with `WORD '='`.
    fn at_param(&self) -> bool {
        matches!(
            (self.tokens.get(self.index), self.tokens.get(self.index + 1)),
            (Some(a), Some(b)) if a.kind == TokenKind::Word && b.kind == TokenKind::Equals
        )
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.index)
    }

    fn eat(&mut self, kind: TokenKind) -> Option<&'a Token> {
        let token = self.peek().filter(|t| t.kind == kind)?;
        self.index += 1;
        Some(token)
    }

    fn expect(&mut self, kind: TokenKind, message: &str) -> Result<&'a Token> {
        self.eat(kind).ok_or_else(|| self.error_here(message))
    }

    fn error_here(&self, message: &str) -> Error {
        match self.peek() {
            Some(token) => error_at(token, message),
            None => Error::Parse {
                message: message.to_string(),
                position: self.end,
                token: "end of input".to_string(),
            },
        }
    }
}

fn error_at(token: &Token, message: &str) -> Error {
    let text = match token.kind {
        TokenKind::Quoted => format!("'{}'", token.text),
        _ => token.text.clone(),
    };
    Error::Parse {
        message: message.to_string(),
        position: token.position,
        token: text,
    }
}
