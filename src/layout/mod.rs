//! The layout language.
//!
//! A layout describes the pipelines of a channel:
//!
//! ```text
//! { src: TestImage Dimension='1024x512' ! dst: TestImageVerify ; src: TestImage ! dst: NullSink }
//! ```
//!
//! - Pipelines are separated by `;`
//! - Cells are `role: Type`, linked left to right by `!`
//! - Parameter overrides follow the type as `Name='value'` (quotes optional
//!   when the value is a single word)
//!
//! Parsing yields a [`LayoutAst`]; [`PipelineBuilder`](crate::pipeline::PipelineBuilder)
//! turns it into live pipelines. The AST's `Display` writes the canonical
//! form, which parses back to an equal AST.

mod ast;
mod lexer;
mod parser;

pub use ast::{CellAst, LayoutAst, ParamAst, PipelineAst};
pub use lexer::{Token, TokenKind, is_word, tokenize};
pub use parser::parse_layout;
