//! VMParser: compiles a grammar once and runs it over any number of inputs.

use std::sync::Arc;

use common::InputBuffer;
use tracing::debug;

use crate::error::{GrammarError, RecognitionError};
use crate::expr::RuleKey;
use crate::format::LexerfulParseErrorFormatter;
use crate::grammar::Grammar;
use crate::node::{ParseNode, ParsingResult};
use crate::token::Token;

use super::compiler::Compiler;
use super::grammar::CompiledGrammar;
use super::vm::{Input, Outcome, VM};

/// A parser that uses the bytecode VM internally.
///
/// The compiled program is shared and never mutated, so a `VMParser` can be
/// cloned or shared across threads; every call to [`VMParser::parse`] runs a
/// fresh VM with its own stacks and memoization table.
#[derive(Clone)]
pub struct VMParser {
    grammar: Arc<CompiledGrammar>,
    trace_enabled: bool,
}

impl VMParser {
    /// Compile `grammar` with its root rule as entry point.
    pub fn new(grammar: &Grammar) -> Result<Self, GrammarError> {
        let root = grammar.root_rule().ok_or(GrammarError::MissingRoot)?;
        Self::for_rule(grammar, root)
    }

    /// Compile `grammar` with `root` as entry point.
    pub fn for_rule(grammar: &Grammar, root: &RuleKey) -> Result<Self, GrammarError> {
        let compiled = Compiler::compile(grammar, root)?;
        Ok(Self {
            grammar: Arc::new(compiled),
            trace_enabled: false,
        })
    }

    pub fn compiled(&self) -> &CompiledGrammar {
        &self.grammar
    }

    // -------------------------------------------------------------------------
    // Public API: Debugging
    // -------------------------------------------------------------------------

    /// Emit a `parservm` trace event per executed instruction.
    pub fn set_trace(&mut self, enabled: bool) {
        self.trace_enabled = enabled;
    }

    pub fn dump(&self) {
        self.grammar.dump();
    }

    // -------------------------------------------------------------------------
    // Public API: Parsing
    // -------------------------------------------------------------------------

    pub fn parse(&self, text: &str) -> Result<ParsingResult, GrammarError> {
        self.parse_input(InputBuffer::anonymous(text))
    }

    /// Parse characters. A mismatch is a normal result; only grammar defects
    /// found while running are errors.
    pub fn parse_input(&self, input: InputBuffer) -> Result<ParsingResult, GrammarError> {
        let outcome = {
            let mut vm = VM::new(&self.grammar, Input::Chars(input.text()));
            vm.trace_enabled = self.trace_enabled;
            vm.run()?
        };
        Ok(match outcome {
            Outcome::Matched(root) => ParsingResult::success(input, root),
            Outcome::Failed { error_index } => {
                debug!(target: "parservm", "{}: failed at {}", input.id(), error_index);
                ParsingResult::failure(input, error_index)
            }
        })
    }

    /// Parse a token sequence. Leaves of the tree span token indices.
    pub fn parse_tokens(&self, tokens: &[Token]) -> Result<ParseNode, RecognitionError> {
        let mut vm = VM::new(&self.grammar, Input::Tokens(tokens));
        vm.trace_enabled = self.trace_enabled;
        match vm.run()? {
            Outcome::Matched(root) => Ok(root),
            Outcome::Failed { error_index } => {
                let Some(last) = tokens.last() else {
                    return Err(RecognitionError::new(1, "No tokens"));
                };
                let message = LexerfulParseErrorFormatter::new().format(tokens, error_index);
                let line = tokens.get(error_index).unwrap_or(last).line;
                Err(RecognitionError::new(line, message))
            }
        }
    }
}
