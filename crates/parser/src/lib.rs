//! Peggle Parser
//!
//! Parsing expression grammars built in code, compiled to bytecode and run
//! on a backtracking virtual machine.
//!
//! # Overview
//!
//! A grammar is assembled with one of two builders, then handed to
//! [`VMParser`], which compiles it once and can parse any number of inputs:
//!
//! - [`LexerlessGrammarBuilder`] - grammars over characters
//! - [`LexerfulGrammarBuilder`] - grammars over pre-lexed [`Token`]s
//!
//! # Example
//!
//! ```ignore
//! use parser::{GrammarBuilder, LexerlessGrammarBuilder, RuleKey, VMParser};
//!
//! let b = LexerlessGrammarBuilder::new();
//! let greeting = RuleKey::new("greeting");
//! b.rule(&greeting).is(("hello", b.optional(" world"), b.end_of_input()))?;
//! b.set_root_rule(&greeting);
//!
//! let parser = VMParser::new(&b.build()?)?;
//! let result = parser.parse("hello world")?;
//! assert!(result.is_matched());
//! ```
//!
//! # Results
//!
//! A mismatch is not an error: [`VMParser::parse`] returns a
//! [`ParsingResult`] carrying either the parse tree or a [`ParseError`] at
//! the farthest position reached. `Err` is reserved for defects in the
//! grammar itself ([`GrammarError`]), such as an unbounded loop.
//!
//! Debug utilities:
//! - [`VMParser::set_trace`] - Log every executed instruction
//! - [`VMParser::dump`] - Print the compiled program
//! - [`ParseErrorFormatter`] - Render a parse error with a source excerpt

pub mod ast;
pub mod builder;
pub mod error;
pub mod expr;
pub mod format;
pub mod grammar;
mod node;
pub mod parser_vm;
pub mod token;

// Re-export from peggle-common
pub use common::debug;
pub use common::{init_logging, InputBuffer, Position};

// Re-export public types
pub use ast::{AstCreator, AstNode, AstNodeType};
pub use builder::{
    GrammarBuilder, IntoOperands, LexerfulGrammarBuilder, LexerlessGrammarBuilder, Operand,
    RuleBuilder,
};
pub use error::{GrammarError, RecognitionError};
pub use expr::{Expr, ExprId, RuleKey};
pub use format::{
    format_parse_tree, leaves_to_string, parse_tree_to_string, LexerfulParseErrorFormatter,
    ParseErrorFormatter,
};
pub use grammar::{Flavor, Grammar, GrammarRule, SkipPolicy};
pub use node::{NodeKind, ParseError, ParseNode, ParsingResult};
pub use parser_vm::{CompiledGrammar, VMParser};
pub use token::{GenericTokenType, Token, TokenType, Trivia, TriviaKind};
