//! Output formatting for parse errors and parse trees.

use std::fmt::Write;

use common::{InputBuffer, Position};

use crate::node::{NodeKind, ParseError, ParseNode};
use crate::token::Token;

/// Lines shown on each side of the failing line.
pub const DEFAULT_SNIPPET_SIZE: usize = 10;

/// Renders a [`ParseError`] as a header plus a numbered snippet with a caret.
///
/// ```text
/// Parse error at line 1 column 5:
///
/// 1: foo(
///        ^
/// ```
///
/// Printed columns are 1-based.
#[derive(Debug, Clone, Copy)]
pub struct ParseErrorFormatter {
    snippet_size: usize,
}

impl Default for ParseErrorFormatter {
    fn default() -> Self {
        Self {
            snippet_size: DEFAULT_SNIPPET_SIZE,
        }
    }
}

impl ParseErrorFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snippet_size(snippet_size: usize) -> Self {
        Self { snippet_size }
    }

    pub fn format(&self, error: &ParseError) -> String {
        let input = error.input();
        let position = input.position(error.error_index());
        let mut out = header(position);
        let start_line = position.line.saturating_sub(self.snippet_size).max(1);
        let end_line = (position.line + self.snippet_size).min(input.line_count());
        append_snippet(&mut out, start_line, end_line, position, |line| {
            input.line_text(line).to_string()
        });
        out
    }
}

/// Like [`ParseErrorFormatter`], for token input.
///
/// Lines are rebuilt from token values placed at their columns.
#[derive(Debug, Clone, Copy)]
pub struct LexerfulParseErrorFormatter {
    snippet_size: usize,
}

impl Default for LexerfulParseErrorFormatter {
    fn default() -> Self {
        Self {
            snippet_size: DEFAULT_SNIPPET_SIZE,
        }
    }
}

impl LexerfulParseErrorFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snippet_size(snippet_size: usize) -> Self {
        Self { snippet_size }
    }

    pub fn format(&self, tokens: &[Token], error_index: usize) -> String {
        let Some(last) = tokens.last() else {
            return "Parse error: no tokens\n".to_string();
        };
        let position = match tokens.get(error_index) {
            Some(t) => Position::new(t.line, t.column),
            None => Position::new(last.line, last.end_column()),
        };
        let mut out = header(position);
        let start_line = position.line.saturating_sub(self.snippet_size).max(1);
        let end_line = position.line + self.snippet_size;
        let end_line = end_line.min(tokens.iter().map(|t| t.line).max().unwrap_or(1));
        append_snippet(&mut out, start_line, end_line, position, |line| {
            let mut text = String::new();
            for t in tokens.iter().filter(|t| t.line == line) {
                let width = text.chars().count();
                if t.column > width {
                    text.push_str(&" ".repeat(t.column - width));
                } else if t.column < width {
                    text.push(' ');
                }
                text.push_str(&t.value);
            }
            text
        });
        out
    }
}

fn header(position: Position) -> String {
    format!(
        "Parse error at line {} column {}:\n\n",
        position.line,
        position.column + 1
    )
}

fn append_snippet(
    out: &mut String,
    start_line: usize,
    end_line: usize,
    position: Position,
    line_text: impl Fn(usize) -> String,
) {
    let padding = end_line.max(position.line).to_string().len();
    for line in start_line..=end_line.max(position.line) {
        writeln!(out, "{:>width$}: {}", line, line_text(line), width = padding).ok();
        if line == position.line {
            writeln!(out, "{}^", " ".repeat(position.column + padding + 2)).ok();
        }
    }
}

/// Format a parse tree node for display (debug format).
pub fn format_parse_tree(node: &ParseNode, input: &InputBuffer) -> String {
    let mut result = String::new();
    format_node(&mut result, node, input, 0);
    result
}

fn format_node(out: &mut String, node: &ParseNode, input: &InputBuffer, indent: usize) {
    let prefix = "  ".repeat(indent);
    let name = match &node.kind {
        NodeKind::Rule(key) => key.name().to_string(),
        NodeKind::Token(t) => format!("token({})", t),
        NodeKind::Trivia(k) => format!("trivia({})", k),
        NodeKind::Terminal => "terminal".to_string(),
    };
    if node.children.is_empty() {
        writeln!(
            out,
            "{}{} ({}, {}): {:?}",
            prefix,
            name,
            node.start,
            node.end,
            input.slice(node.start, node.end)
        )
        .ok();
    } else {
        writeln!(out, "{}{} ({}, {})", prefix, name, node.start, node.end).ok();
        for child in &node.children {
            format_node(out, child, input, indent + 1);
        }
    }
}

/// Concatenate the text of every leaf. For a grammar that keeps all input
/// in the tree this gives back the input.
pub fn leaves_to_string(node: &ParseNode, input: &InputBuffer) -> String {
    let mut result = String::new();
    collect_leaf_text(&mut result, node, input);
    result
}

fn collect_leaf_text(out: &mut String, node: &ParseNode, input: &InputBuffer) {
    if node.children.is_empty() {
        out.push_str(input.slice(node.start, node.end));
    } else {
        for child in &node.children {
            collect_leaf_text(out, child, input);
        }
    }
}

/// Format a parse tree in s-expression format.
///
/// - Rule nodes: `(name child1 child2 ...)`
/// - Token nodes: `[TYPE text]`
/// - Other terminals: `"text"`
/// - Trivia nodes are omitted
pub fn parse_tree_to_string(node: &ParseNode, input: &InputBuffer) -> String {
    match &node.kind {
        NodeKind::Rule(key) => {
            let children: Vec<String> = node
                .children
                .iter()
                .filter(|c| !matches!(c.kind, NodeKind::Trivia(_)))
                .map(|c| parse_tree_to_string(c, input))
                .collect();
            if children.is_empty() {
                format!("({})", key.name())
            } else {
                format!("({} {})", key.name(), children.join(" "))
            }
        }
        NodeKind::Token(t) => format!("[{} {}]", t, input.slice(node.start, node.end)),
        NodeKind::Trivia(_) | NodeKind::Terminal => {
            format!("{:?}", input.slice(node.start, node.end))
        }
    }
}
