//! Parse trees and parse results.

use common::InputBuffer;

use crate::expr::RuleKey;
use crate::token::{TokenType, TriviaKind};

/// What produced a [`ParseNode`].
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Rule(RuleKey),
    Token(TokenType),
    Trivia(TriviaKind),
    /// A literal, pattern or token-level terminal match.
    Terminal,
}

/// A node of the concrete parse tree.
///
/// `start..end` is a byte range for character input and a token index range
/// for token input.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseNode {
    pub start: usize,
    pub end: usize,
    pub kind: NodeKind,
    pub children: Vec<ParseNode>,
}

impl ParseNode {
    pub fn leaf(start: usize, end: usize) -> Self {
        Self {
            start,
            end,
            kind: NodeKind::Terminal,
            children: Vec::new(),
        }
    }

    pub fn branch(kind: NodeKind, start: usize, end: usize, children: Vec<ParseNode>) -> Self {
        Self {
            start,
            end,
            kind,
            children,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self.kind, NodeKind::Rule(_))
    }

    pub fn rule_key(&self) -> Option<&RuleKey> {
        match &self.kind {
            NodeKind::Rule(key) => Some(key),
            _ => None,
        }
    }

    /// Depth-first search for the first node produced by `key`.
    pub fn find(&self, key: &RuleKey) -> Option<&ParseNode> {
        if self.rule_key() == Some(key) {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(key))
    }
}

impl Drop for ParseNode {
    // Nesting depth follows the input, so children are released from a heap
    // worklist instead of recursively.
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.children);
        }
    }
}

/// The deepest position a failed parse reached.
#[derive(Debug, Clone)]
pub struct ParseError {
    input: InputBuffer,
    error_index: usize,
}

impl ParseError {
    pub fn new(input: InputBuffer, error_index: usize) -> Self {
        Self { input, error_index }
    }

    pub fn input(&self) -> &InputBuffer {
        &self.input
    }

    pub fn error_index(&self) -> usize {
        self.error_index
    }
}

/// Outcome of one character-level parse.
#[derive(Debug, Clone)]
pub struct ParsingResult {
    matched: bool,
    input: InputBuffer,
    root: Option<ParseNode>,
    error: Option<ParseError>,
}

impl ParsingResult {
    pub fn success(input: InputBuffer, root: ParseNode) -> Self {
        Self {
            matched: true,
            input,
            root: Some(root),
            error: None,
        }
    }

    pub fn failure(input: InputBuffer, error_index: usize) -> Self {
        let error = ParseError::new(input.clone(), error_index);
        Self {
            matched: false,
            input,
            root: None,
            error: Some(error),
        }
    }

    pub fn is_matched(&self) -> bool {
        self.matched
    }

    pub fn input(&self) -> &InputBuffer {
        &self.input
    }

    pub fn parse_tree_root(&self) -> Option<&ParseNode> {
        self.root.as_ref()
    }

    pub fn parse_error(&self) -> Option<&ParseError> {
        self.error.as_ref()
    }

    pub fn into_root(self) -> Option<ParseNode> {
        self.root
    }
}
