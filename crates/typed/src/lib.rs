//! Typed parsing on top of the peggle VM.
//!
//! Grammars are written as ordinary Rust functions returning [`Syntax`]
//! handles and recorded with a [`GrammarRecorder`]. Calling an action
//! method such as [`GrammarRecorder::action2`] records both an expression
//! and the function that will build a value from what it matches. After a
//! successful parse, the [`SyntaxTreeCreator`] walks the parse tree and
//! applies those functions bottom-up, so [`ActionParser::parse`] returns
//! the typed tree directly.
//!
//! ```ignore
//! let parser = ActionParser::new(|r| {
//!     let number = r.lexical("NUMBER", r.builder().regexp("[0-9]+"));
//!     r.rule("file", || r.action1(|n: DefaultNode| n.value(), r.token(&number)))
//! })?;
//! assert_eq!(parser.parse("42")?, "42");
//! ```
//!
//! Lexical rules (tokens, whitespace, comments) are defined with
//! [`GrammarRecorder::lexical`] or straight on the underlying builder;
//! their matches reach actions as nodes made by the parser's
//! [`NodeBuilder`].

mod action_parser;
mod creator;
mod recorder;
mod syntax;

pub use action_parser::{ActionParser, InputError};
pub use creator::{
    DefaultNode, DefaultNodeBuilder, GenericNode, Leaf, NodeBuilder, SyntaxTreeCreator, TreeError,
};
pub use encoding_rs;
pub use recorder::{ActionTable, GrammarRecorder, RuleAction};
pub use syntax::{Syntax, Value};
