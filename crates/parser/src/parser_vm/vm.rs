//! Parsing Virtual Machine execution.
//!
//! All state lives in one explicit frame stack, so neither deep nesting nor
//! long repetitions consume native stack:
//!
//! - a Call frame per active rule (return address, start index, children),
//! - a Wrap frame per active token/trivia wrapper,
//! - a Backtrack frame per pending alternative (saved index, alternative pc).
//!
//! Failing pops frames until the nearest Backtrack frame; only the deepest
//! failure index is kept for diagnostics.

use hashbrown::HashMap;
use tracing::{debug, trace};

use crate::error::GrammarError;
use crate::node::{NodeKind, ParseNode};
use crate::token::Token;

use super::grammar::{CompiledGrammar, MatcherKind};
use super::instruction::{mnemonic, op, opcode, operand, operand_signed};

/// What the VM reads.
#[derive(Debug, Clone, Copy)]
pub enum Input<'i> {
    Chars(&'i str),
    Tokens(&'i [Token]),
}

impl Input<'_> {
    pub fn len(&self) -> usize {
        match self {
            Input::Chars(text) => text.len(),
            Input::Tokens(tokens) => tokens.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of running the program to completion.
#[derive(Debug)]
pub enum Outcome {
    Matched(ParseNode),
    Failed { error_index: usize },
}

enum FrameKind {
    Base,
    Call {
        return_pc: usize,
        matcher: usize,
        prev_call: Option<usize>,
    },
    Wrap {
        matcher: usize,
    },
    Backtrack {
        alt_pc: usize,
    },
}

/// Memoized outcome of one rule call.
enum Memo {
    Matched(ParseNode),
    Failed,
}

struct Frame {
    kind: FrameKind,
    /// Input index when the frame was pushed
    index: usize,
    /// Error suppression in effect when the frame was pushed
    ignore_errors: bool,
    nodes: Vec<ParseNode>,
}

/// Parsing Virtual Machine
pub struct VM<'g, 'i> {
    // Bytecode
    grammar: &'g CompiledGrammar,

    // Input
    input: Input<'i>,
    pub index: usize,
    pc: usize,

    // Frame stack
    frames: Vec<Frame>,

    // Per matcher: index of the innermost active call, for left recursion
    calls: Vec<Option<usize>>,

    // Per run: (matcher, start) -> outcome
    memos: HashMap<(usize, usize), Memo>,

    // Error tracking
    ignore_errors: bool,
    pub furthest_pos: usize,

    // Execution tracing
    pub trace_enabled: bool,
}

impl<'g, 'i> VM<'g, 'i> {
    pub fn new(grammar: &'g CompiledGrammar, input: Input<'i>) -> Self {
        Self {
            grammar,
            input,
            index: 0,
            pc: 0,
            frames: Vec::new(),
            calls: vec![None; grammar.matchers.len()],
            memos: HashMap::new(),
            ignore_errors: false,
            furthest_pos: 0,
            trace_enabled: false,
        }
    }

    // -------------------------------------------------------------------------
    // Frames
    // -------------------------------------------------------------------------

    fn push_frame(&mut self, kind: FrameKind) {
        self.frames.push(Frame {
            kind,
            index: self.index,
            ignore_errors: self.ignore_errors,
            nodes: Vec::new(),
        });
    }

    fn top_nodes(&mut self) -> &mut Vec<ParseNode> {
        match self.frames.last_mut() {
            Some(frame) => &mut frame.nodes,
            None => unreachable!("base frame is never popped while running"),
        }
    }

    fn push_leaf(&mut self, end: usize) {
        let leaf = ParseNode::leaf(self.index, end);
        self.top_nodes().push(leaf);
        self.index = end;
        self.pc += 1;
    }

    fn jump(&mut self, instr: u32) {
        self.pc = (self.pc as i64 + operand_signed(instr) as i64) as usize;
    }

    // -------------------------------------------------------------------------
    // Error Tracking
    // -------------------------------------------------------------------------

    fn record_failure(&mut self, at: usize) {
        if at > self.furthest_pos {
            self.furthest_pos = at;
        }
    }

    /// Record a failure at the current index, then unwind to the nearest
    /// alternative. Returns false when no alternative is left.
    fn fail(&mut self) -> bool {
        if !self.ignore_errors {
            self.record_failure(self.index);
        }
        while let Some(frame) = self.frames.pop() {
            match frame.kind {
                FrameKind::Base => {
                    self.frames.push(frame);
                    return false;
                }
                FrameKind::Call {
                    matcher, prev_call, ..
                } => {
                    self.calls[matcher] = prev_call;
                    if self.grammar.matchers[matcher].memoize() && !frame.ignore_errors {
                        self.memos.insert((matcher, frame.index), Memo::Failed);
                    }
                }
                FrameKind::Wrap { .. } => {
                    // A failed token or trivia reports at its own start
                    if !frame.ignore_errors {
                        self.record_failure(frame.index);
                    }
                }
                FrameKind::Backtrack { alt_pc } => {
                    self.index = frame.index;
                    self.ignore_errors = frame.ignore_errors;
                    self.pc = alt_pc;
                    return true;
                }
            }
        }
        false
    }

    // -------------------------------------------------------------------------
    // Matching
    // -------------------------------------------------------------------------

    fn text(&self) -> &'i str {
        match self.input {
            Input::Chars(text) => text.get(self.index..).unwrap_or(""),
            Input::Tokens(_) => "",
        }
    }

    fn token(&self, offset: isize) -> Option<&'i Token> {
        match self.input {
            Input::Tokens(tokens) => {
                let at = self.index as isize + offset;
                if at < 0 {
                    None
                } else {
                    tokens.get(at as usize)
                }
            }
            Input::Chars(_) => None,
        }
    }

    fn match_literal(&self, str_id: u32) -> Option<usize> {
        let lit = &self.grammar.strings[str_id as usize];
        if matches!(self.input, Input::Chars(_)) && self.text().starts_with(lit.as_str()) {
            Some(self.index + lit.len())
        } else {
            None
        }
    }

    fn match_pattern(&self, pattern_id: u32) -> Option<usize> {
        if !matches!(self.input, Input::Chars(_)) {
            return None;
        }
        let pattern = &self.grammar.patterns[pattern_id as usize];
        pattern.match_len(self.text()).map(|len| self.index + len)
    }

    fn match_token_if(&self, pred: impl Fn(&Token) -> bool) -> Option<usize> {
        self.token(0)
            .filter(|&t| pred(t))
            .map(|_| self.index + 1)
    }

    fn match_bridge(&self, bridge_id: u32) -> Option<usize> {
        let (from, to) = self.grammar.bridges[bridge_id as usize];
        let Input::Tokens(tokens) = self.input else {
            return None;
        };
        if tokens.get(self.index).map(|t| t.token_type) != Some(from) {
            return None;
        }
        let mut depth = 0usize;
        for (i, t) in tokens[self.index..].iter().enumerate() {
            if t.token_type == from {
                depth += 1;
            } else if t.token_type == to {
                depth -= 1;
            }
            if depth == 0 {
                return Some(self.index + i + 1);
            }
        }
        None
    }

    fn match_till_new_line(&self) -> Option<usize> {
        let Input::Tokens(tokens) = self.input else {
            return None;
        };
        let line = self.token(-1).map(|t| t.line).unwrap_or(1);
        let mut end = self.index;
        while let Some(t) = tokens.get(end) {
            if t.token_type == crate::token::GenericTokenType::EOF || t.line != line {
                break;
            }
            end += 1;
        }
        Some(end)
    }

    fn is_adjacent(&self) -> bool {
        match (self.token(-1), self.token(0)) {
            (Some(prev), Some(next)) => prev.line == next.line && prev.end_column() == next.column,
            _ => false,
        }
    }

    // -------------------------------------------------------------------------
    // Public API
    // -------------------------------------------------------------------------

    /// Run the program from its prologue until it matches or fails.
    ///
    /// Grammar defects that only show at run time (an empty loop body, left
    /// recursion) abort with an error instead of looping forever.
    pub fn run(&mut self) -> Result<Outcome, GrammarError> {
        debug!(
            target: "parservm",
            "run {} over {} input units",
            self.grammar.root_matcher().name(),
            self.input.len()
        );
        self.push_frame(FrameKind::Base);
        self.pc = 0;

        // Helper macro to handle failure with backtracking
        macro_rules! handle_failure {
            () => {{
                if self.fail() {
                    continue;
                }
                debug!(target: "parservm", "no match, deepest failure at {}", self.furthest_pos);
                return Ok(Outcome::Failed {
                    error_index: self.furthest_pos,
                });
            }};
        }

        loop {
            let Some(&instr) = self.grammar.code.get(self.pc) else {
                handle_failure!();
            };
            let opc = opcode(instr);
            let oper = operand(instr);

            if self.trace_enabled {
                trace!(
                    target: "parservm",
                    "{:4}: {:<13} index={} frames={}",
                    self.pc,
                    mnemonic(opc),
                    self.index,
                    self.frames.len()
                );
            }

            match opc {
                op::LITERAL => match self.match_literal(oper) {
                    Some(end) => self.push_leaf(end),
                    None => handle_failure!(),
                },

                op::PATTERN => match self.match_pattern(oper) {
                    Some(end) => self.push_leaf(end),
                    None => handle_failure!(),
                },

                op::END_OF_INPUT => {
                    if self.index == self.input.len() {
                        self.pc += 1;
                    } else {
                        handle_failure!();
                    }
                }

                op::TOKEN_TYPE => {
                    let expected = self.grammar.token_types[oper as usize];
                    match self.match_token_if(|t| t.token_type == expected) {
                        Some(end) => self.push_leaf(end),
                        None => handle_failure!(),
                    }
                }

                op::TOKEN_TYPES => {
                    let set = &self.grammar.token_sets[oper as usize];
                    match self.match_token_if(|t| set.contains(&t.token_type)) {
                        Some(end) => self.push_leaf(end),
                        None => handle_failure!(),
                    }
                }

                op::TOKEN_VALUE => {
                    let value = &self.grammar.strings[oper as usize];
                    match self.match_token_if(|t| t.value == *value) {
                        Some(end) => self.push_leaf(end),
                        None => handle_failure!(),
                    }
                }

                op::ANY_TOKEN => match self.match_token_if(|_| true) {
                    Some(end) => self.push_leaf(end),
                    None => handle_failure!(),
                },

                op::BRIDGE => match self.match_bridge(oper) {
                    Some(end) => self.push_leaf(end),
                    None => handle_failure!(),
                },

                op::TILL_NEW_LINE => match self.match_till_new_line() {
                    Some(end) => self.push_leaf(end),
                    None => handle_failure!(),
                },

                op::ADJACENT => {
                    if self.is_adjacent() {
                        self.pc += 1;
                    } else {
                        handle_failure!();
                    }
                }

                op::CALL => {
                    let grammar = self.grammar;
                    let matcher = oper as usize;
                    let m = &grammar.matchers[matcher];
                    if m.memoize() {
                        match self.memos.get(&(matcher, self.index)) {
                            Some(Memo::Matched(node)) => {
                                let node = node.clone();
                                trace!(target: "parservm", "memo hit {} at {}", m.name(), self.index);
                                self.index = node.end;
                                self.top_nodes().push(node);
                                self.pc += 1;
                                continue;
                            }
                            Some(Memo::Failed) => {
                                trace!(target: "parservm", "memo hit {} at {}, failed", m.name(), self.index);
                                handle_failure!();
                            }
                            None => {}
                        }
                    }
                    if self.calls[matcher] == Some(self.index) {
                        return Err(GrammarError::LeftRecursion { rule: m.name() });
                    }
                    let prev_call = self.calls[matcher];
                    self.calls[matcher] = Some(self.index);
                    self.push_frame(FrameKind::Call {
                        return_pc: self.pc + 1,
                        matcher,
                        prev_call,
                    });
                    self.pc = m.entry;
                }

                op::RETURN => {
                    let Some(frame) = self.frames.pop() else {
                        unreachable!("RETURN without a frame");
                    };
                    let FrameKind::Call {
                        return_pc,
                        matcher,
                        prev_call,
                    } = frame.kind
                    else {
                        unreachable!("RETURN must pop a call frame");
                    };
                    self.calls[matcher] = prev_call;
                    self.ignore_errors = frame.ignore_errors;
                    let grammar = self.grammar;
                    let m = &grammar.matchers[matcher];
                    let kind = match &m.kind {
                        MatcherKind::Rule { key, .. } => NodeKind::Rule(key.clone()),
                        MatcherKind::Token(t) => NodeKind::Token(*t),
                        MatcherKind::Trivia(k) => NodeKind::Trivia(*k),
                    };
                    let node = ParseNode::branch(kind, frame.index, self.index, frame.nodes);
                    // Results found while errors were suppressed would hide
                    // failures from a later unsuppressed call
                    if m.memoize() && !frame.ignore_errors {
                        self.memos
                            .insert((matcher, frame.index), Memo::Matched(node.clone()));
                    }
                    self.top_nodes().push(node);
                    self.pc = return_pc;
                }

                op::OPEN => {
                    self.push_frame(FrameKind::Wrap {
                        matcher: oper as usize,
                    });
                    self.ignore_errors = true;
                    self.pc += 1;
                }

                op::CLOSE => {
                    let Some(frame) = self.frames.pop() else {
                        unreachable!("CLOSE without a frame");
                    };
                    let FrameKind::Wrap { matcher } = frame.kind else {
                        unreachable!("CLOSE must pop a wrap frame");
                    };
                    self.ignore_errors = frame.ignore_errors;
                    let kind = match &self.grammar.matchers[matcher].kind {
                        MatcherKind::Token(t) => NodeKind::Token(*t),
                        MatcherKind::Trivia(k) => NodeKind::Trivia(*k),
                        MatcherKind::Rule { key, .. } => NodeKind::Rule(key.clone()),
                    };
                    let node = ParseNode::branch(kind, frame.index, self.index, frame.nodes);
                    self.top_nodes().push(node);
                    self.pc += 1;
                }

                op::CHOICE => {
                    let alt_pc = (self.pc as i64 + operand_signed(instr) as i64) as usize;
                    self.push_frame(FrameKind::Backtrack { alt_pc });
                    self.pc += 1;
                }

                op::PREDICATE_CHOICE => {
                    let alt_pc = (self.pc as i64 + operand_signed(instr) as i64) as usize;
                    self.push_frame(FrameKind::Backtrack { alt_pc });
                    self.ignore_errors = true;
                    self.pc += 1;
                }

                op::COMMIT | op::COMMIT_VERIFY => {
                    let Some(frame) = self.frames.pop() else {
                        unreachable!("COMMIT without a frame");
                    };
                    if opc == op::COMMIT_VERIFY && frame.index == self.index {
                        return Err(GrammarError::EmptyLoop);
                    }
                    // Keep what the alternative matched
                    self.top_nodes().extend(frame.nodes);
                    self.jump(instr);
                }

                op::BACK_COMMIT => {
                    let Some(frame) = self.frames.pop() else {
                        unreachable!("BACK_COMMIT without a frame");
                    };
                    self.index = frame.index;
                    self.ignore_errors = frame.ignore_errors;
                    self.jump(instr);
                }

                op::FAIL_TWICE => {
                    // Drop the predicate's alternative, then fail from where it started
                    let Some(frame) = self.frames.pop() else {
                        unreachable!("FAIL_TWICE without a frame");
                    };
                    self.index = frame.index;
                    self.ignore_errors = frame.ignore_errors;
                    handle_failure!();
                }

                op::FAIL => {
                    handle_failure!();
                }

                op::END => {
                    let root = self.frames.pop().and_then(|mut base| base.nodes.pop());
                    return match root {
                        Some(node) => {
                            debug!(target: "parservm", "matched {}..{}", node.start, node.end);
                            Ok(Outcome::Matched(node))
                        }
                        None => Ok(Outcome::Failed {
                            error_index: self.furthest_pos,
                        }),
                    };
                }

                _ => {
                    self.pc += 1;
                }
            }
        }
    }
}
