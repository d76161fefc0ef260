//! Bytecode compiler for grammars.
//!
//! Every expression is lowered to a position-independent fragment (all jumps
//! are relative), cached by [`ExprId`]. A sub-expression shared by several
//! parents is therefore compiled once and its fragment copied into each use.
//!
//! Rule references are resolved in two passes: every rule first gets a
//! matcher index, so CALL operands can be emitted before the callee's body
//! exists; entry offsets are filled in as bodies are laid out.
//!
//! Lowering recurses over the expression DAG, so its depth is bounded by
//! grammar nesting, never by input size.

use std::rc::Rc;

use hashbrown::HashMap;
use tracing::{debug, trace};

use crate::error::GrammarError;
use crate::expr::{Expr, ExprId, RuleKey};
use crate::grammar::Grammar;

use super::grammar::{CompiledGrammar, MatcherKind};
use super::instruction::{encode, encode_jump, op, opcode};

/// A relocatable run of instructions.
#[derive(Default)]
struct Fragment {
    code: Vec<u32>,
}

impl Fragment {
    fn emit(&mut self, instr: u32) -> usize {
        let offset = self.code.len();
        self.code.push(instr);
        offset
    }

    fn append(&mut self, code: &[u32]) {
        self.code.extend_from_slice(code);
    }

    fn current_offset(&self) -> usize {
        self.code.len()
    }

    fn patch_jump(&mut self, offset: usize, target: usize) -> Result<(), GrammarError> {
        let opc = opcode(self.code[offset]);
        self.code[offset] = relative(opc, target as i64 - offset as i64)?;
        Ok(())
    }

    /// Emit a jump-like instruction targeting an earlier offset.
    fn emit_back(&mut self, opc: u8, target: usize) -> Result<(), GrammarError> {
        let instr = relative(opc, target as i64 - self.code.len() as i64)?;
        self.code.push(instr);
        Ok(())
    }

    fn finish(self) -> Rc<[u32]> {
        self.code.into()
    }
}

fn relative(opc: u8, offset: i64) -> Result<u32, GrammarError> {
    encode_jump(opc, offset).ok_or(GrammarError::OperandOverflow {
        what: "jump offset",
        value: offset,
    })
}

/// Compile grammar rules into bytecode
pub struct Compiler<'g> {
    source: &'g Grammar,
    grammar: CompiledGrammar,
    rule_matchers: HashMap<RuleKey, u32>,
    fragments: HashMap<ExprId, Rc<[u32]>>,
}

impl<'g> Compiler<'g> {
    pub fn new(source: &'g Grammar) -> Self {
        Self {
            source,
            grammar: CompiledGrammar::new(source.flavor()),
            rule_matchers: HashMap::new(),
            fragments: HashMap::new(),
        }
    }

    /// Compile every rule of `source`, with `root` as the entry point.
    pub fn compile(source: &'g Grammar, root: &RuleKey) -> Result<CompiledGrammar, GrammarError> {
        let mut compiler = Self::new(source);

        // Pass 1: a matcher per rule, so calls can be emitted in any order
        for rule in source.rules() {
            let id = compiler.grammar.add_matcher(MatcherKind::Rule {
                key: rule.key.clone(),
                memoize: rule.memoize,
                skip: rule.skip,
            })?;
            compiler.rule_matchers.insert(rule.key.clone(), id);
        }

        let root_id = compiler.matcher_for(root)?;
        compiler.grammar.root = root_id as usize;
        compiler.grammar.emit(encode(op::CALL, root_id));
        compiler.grammar.emit(encode(op::END, 0));

        // Pass 2: lay out rule bodies and record their entries
        for rule in source.rules() {
            compiler.compile_rule(&rule.key, rule.expr)?;
        }

        debug!(
            target: "compiler",
            "compiled {} rules into {} instructions (root {})",
            source.rules().len(),
            compiler.grammar.code.len(),
            root
        );
        Ok(compiler.finish())
    }

    fn matcher_for(&self, key: &RuleKey) -> Result<u32, GrammarError> {
        self.rule_matchers
            .get(key)
            .copied()
            .ok_or_else(|| GrammarError::Undefined {
                rule: key.name().to_string(),
            })
    }

    /// Compile a rule body and add it to the program
    fn compile_rule(&mut self, key: &RuleKey, expr: ExprId) -> Result<(), GrammarError> {
        let matcher = self.matcher_for(key)? as usize;
        let entry = self.grammar.current_offset();
        let body = self.compile_expr(expr)?;
        for &instr in body.iter() {
            self.grammar.emit(instr);
        }
        self.grammar.emit(encode(op::RETURN, 0));
        self.grammar.matchers[matcher].entry = entry;
        trace!(target: "compiler", "rule {} @ {} ({} instructions)", key, entry, body.len() + 1);
        Ok(())
    }

    /// Compile an expression to a fragment, reusing a cached one if present
    fn compile_expr(&mut self, id: ExprId) -> Result<Rc<[u32]>, GrammarError> {
        if let Some(code) = self.fragments.get(&id) {
            return Ok(code.clone());
        }

        let source = self.source;
        let mut frag = Fragment::default();
        match source.expr(id) {
            Expr::Sequence(items) => {
                for &item in items {
                    let code = self.compile_expr(item)?;
                    frag.append(&code);
                }
            }

            Expr::FirstOf(alternatives) => {
                // CHOICE alt2
                // <alt1>
                // COMMIT done
                // alt2:
                // ...
                // altN:
                // <altN>
                // done:
                if alternatives.is_empty() {
                    frag.emit(encode(op::FAIL, 0));
                }
                let mut commit_offsets = Vec::new();
                for (i, alt) in alternatives.iter().enumerate() {
                    let code = self.compile_expr(*alt)?;
                    if i + 1 < alternatives.len() {
                        let choice_offset = frag.emit(encode(op::CHOICE, 0));
                        frag.append(&code);
                        commit_offsets.push(frag.emit(encode(op::COMMIT, 0)));
                        let next_alt_offset = frag.current_offset();
                        frag.patch_jump(choice_offset, next_alt_offset)?;
                    } else {
                        frag.append(&code);
                    }
                }
                let done_offset = frag.current_offset();
                for commit_offset in commit_offsets {
                    frag.patch_jump(commit_offset, done_offset)?;
                }
            }

            Expr::Optional(inner) => {
                // CHOICE skip
                // <inner>
                // COMMIT skip
                // skip:
                let code = self.compile_expr(*inner)?;
                let choice_offset = frag.emit(encode(op::CHOICE, 0));
                frag.append(&code);
                let commit_offset = frag.emit(encode(op::COMMIT, 0));
                let skip_offset = frag.current_offset();
                frag.patch_jump(choice_offset, skip_offset)?;
                frag.patch_jump(commit_offset, skip_offset)?;
            }

            Expr::ZeroOrMore(inner) => {
                let code = self.compile_expr(*inner)?;
                emit_loop(&mut frag, &code)?;
            }

            Expr::OneOrMore(inner) => {
                // <inner>
                // <loop over inner>
                let code = self.compile_expr(*inner)?;
                frag.append(&code);
                emit_loop(&mut frag, &code)?;
            }

            Expr::Next(inner) => {
                // CHOICE fail
                // <inner>
                // BACK_COMMIT done
                // fail:
                //   FAIL
                // done:
                let code = self.compile_expr(*inner)?;
                let choice_offset = frag.emit(encode(op::CHOICE, 0));
                frag.append(&code);
                let back_offset = frag.emit(encode(op::BACK_COMMIT, 0));
                let fail_offset = frag.emit(encode(op::FAIL, 0));
                frag.patch_jump(choice_offset, fail_offset)?;
                let done_offset = frag.current_offset();
                frag.patch_jump(back_offset, done_offset)?;
            }

            Expr::NextNot(inner) => {
                // PRED_CHOICE done
                // <inner>
                // FAIL_TWICE
                // done:
                let code = self.compile_expr(*inner)?;
                let choice_offset = frag.emit(encode(op::PREDICATE_CHOICE, 0));
                frag.append(&code);
                frag.emit(encode(op::FAIL_TWICE, 0));
                let done_offset = frag.current_offset();
                frag.patch_jump(choice_offset, done_offset)?;
            }

            Expr::Literal(text) => {
                let str_id = self.grammar.intern_string(text)?;
                frag.emit(encode(op::LITERAL, str_id));
            }

            Expr::Pattern(pattern) => {
                let pattern_id = self.grammar.add_pattern(pattern)?;
                frag.emit(encode(op::PATTERN, pattern_id));
            }

            Expr::EndOfInput => {
                frag.emit(encode(op::END_OF_INPUT, 0));
            }

            Expr::Nothing => {
                frag.emit(encode(op::FAIL, 0));
            }

            Expr::Rule(key) => {
                let matcher = self.matcher_for(key)?;
                frag.emit(encode(op::CALL, matcher));
            }

            Expr::Token(token_type, inner) => {
                let (token_type, inner) = (*token_type, *inner);
                let matcher = self.grammar.add_matcher(MatcherKind::Token(token_type))?;
                self.emit_wrapped(&mut frag, matcher, inner)?;
            }

            Expr::Trivia(kind, inner) => {
                let (kind, inner) = (*kind, *inner);
                let matcher = self.grammar.add_matcher(MatcherKind::Trivia(kind))?;
                self.emit_wrapped(&mut frag, matcher, inner)?;
            }

            Expr::TokenType(token_type) => {
                let type_id = self.grammar.intern_token_type(*token_type)?;
                frag.emit(encode(op::TOKEN_TYPE, type_id));
            }

            Expr::TokenTypes(types) => {
                let set_id = self.grammar.add_token_set(types)?;
                frag.emit(encode(op::TOKEN_TYPES, set_id));
            }

            Expr::TokenValue(value) => {
                let str_id = self.grammar.intern_string(value)?;
                frag.emit(encode(op::TOKEN_VALUE, str_id));
            }

            Expr::AnyToken => {
                frag.emit(encode(op::ANY_TOKEN, 0));
            }

            Expr::Bridge(from, to) => {
                let bridge_id = self.grammar.add_bridge(*from, *to)?;
                frag.emit(encode(op::BRIDGE, bridge_id));
            }

            Expr::TillNewLine => {
                frag.emit(encode(op::TILL_NEW_LINE, 0));
            }

            Expr::Adjacent => {
                frag.emit(encode(op::ADJACENT, 0));
            }
        }

        let code = frag.finish();
        self.fragments.insert(id, code.clone());
        Ok(code)
    }

    /// OPEN matcher; <inner>; CLOSE
    fn emit_wrapped(&mut self, frag: &mut Fragment, matcher: u32, inner: ExprId) -> Result<(), GrammarError> {
        let code = self.compile_expr(inner)?;
        frag.emit(encode(op::OPEN, matcher));
        frag.append(&code);
        frag.emit(encode(op::CLOSE, 0));
        Ok(())
    }

    /// Finish compilation and return the grammar
    pub fn finish(self) -> CompiledGrammar {
        self.grammar
    }
}

/// loop:
///   CHOICE done
///   <body>
///   COMMIT_VERIFY loop
/// done:
fn emit_loop(frag: &mut Fragment, body: &[u32]) -> Result<(), GrammarError> {
    let loop_offset = frag.current_offset();
    let choice_offset = frag.emit(encode(op::CHOICE, 0));
    frag.append(body);
    frag.emit_back(op::COMMIT_VERIFY, loop_offset)?;
    let done_offset = frag.current_offset();
    frag.patch_jump(choice_offset, done_offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{GrammarBuilder, LexerlessGrammarBuilder};
    use crate::parser_vm::instruction::{operand, operand_signed};

    fn ops(code: &[u32]) -> Vec<u8> {
        code.iter().map(|&i| opcode(i)).collect()
    }

    #[test]
    fn test_prologue_calls_root() {
        let b = LexerlessGrammarBuilder::new();
        let a = RuleKey::new("a");
        b.rule(&a).is("x").unwrap();
        let grammar = b.build().unwrap();
        let compiled = Compiler::compile(&grammar, &a).unwrap();
        assert_eq!(ops(&compiled.code), vec![op::CALL, op::END, op::LITERAL, op::RETURN]);
        assert_eq!(operand(compiled.code[0]), compiled.root as u32);
        assert_eq!(compiled.rule_entry(&a), Some(2));
    }

    #[test]
    fn test_first_of_layout() {
        let b = LexerlessGrammarBuilder::new();
        let a = RuleKey::new("a");
        b.rule(&a).is(b.first_of(("x", "y", "z"))).unwrap();
        let grammar = b.build().unwrap();
        let compiled = Compiler::compile(&grammar, &a).unwrap();
        let body = &compiled.code[2..];
        assert_eq!(
            ops(body),
            vec![
                op::CHOICE,
                op::LITERAL,
                op::COMMIT,
                op::CHOICE,
                op::LITERAL,
                op::COMMIT,
                op::LITERAL,
                op::RETURN
            ]
        );
        // First CHOICE jumps to the second alternative, commits jump past the last one
        assert_eq!(operand_signed(body[0]), 3);
        assert_eq!(operand_signed(body[2]), 5);
        assert_eq!(operand_signed(body[3]), 3);
        assert_eq!(operand_signed(body[5]), 2);
    }

    #[test]
    fn test_loop_layout() {
        let b = LexerlessGrammarBuilder::new();
        let a = RuleKey::new("a");
        b.rule(&a).is(b.one_or_more("x")).unwrap();
        let grammar = b.build().unwrap();
        let compiled = Compiler::compile(&grammar, &a).unwrap();
        let body = &compiled.code[2..];
        assert_eq!(
            ops(body),
            vec![op::LITERAL, op::CHOICE, op::LITERAL, op::COMMIT_VERIFY, op::RETURN]
        );
        assert_eq!(operand_signed(body[1]), 3);
        assert_eq!(operand_signed(body[3]), -2);
    }

    #[test]
    fn test_predicates_layout() {
        let b = LexerlessGrammarBuilder::new();
        let a = RuleKey::new("a");
        b.rule(&a).is((b.next("x"), b.next_not("y"))).unwrap();
        let grammar = b.build().unwrap();
        let compiled = Compiler::compile(&grammar, &a).unwrap();
        assert_eq!(
            ops(&compiled.code[2..]),
            vec![
                op::CHOICE,
                op::LITERAL,
                op::BACK_COMMIT,
                op::FAIL,
                op::PREDICATE_CHOICE,
                op::LITERAL,
                op::FAIL_TWICE,
                op::RETURN
            ]
        );
    }

    #[test]
    fn test_shared_fragment_compiled_once() {
        let b = LexerlessGrammarBuilder::new();
        let a = RuleKey::new("a");
        let c = RuleKey::new("c");
        let shared = b.token(crate::token::GenericTokenType::IDENTIFIER, b.regexp("[a-z]+"));
        b.rule(&a).is(shared).unwrap();
        b.rule(&c).is((shared, shared)).unwrap();
        let grammar = b.build().unwrap();
        let compiled = Compiler::compile(&grammar, &a).unwrap();
        // one wrapper matcher and one pattern despite three uses
        assert_eq!(compiled.matchers.len(), 3);
        assert_eq!(compiled.patterns.len(), 1);
        let opens = compiled.code.iter().filter(|&&i| opcode(i) == op::OPEN).count();
        assert_eq!(opens, 3);
    }

    #[test]
    fn test_forward_and_mutual_references() {
        let b = LexerlessGrammarBuilder::new();
        let a = RuleKey::new("a");
        let c = RuleKey::new("c");
        b.rule(&a).is(("(", b.optional(&c), ")")).unwrap();
        b.rule(&c).is(&a).unwrap();
        let grammar = b.build().unwrap();
        let compiled = Compiler::compile(&grammar, &a).unwrap();
        let mut out = Vec::new();
        compiled.disassemble(&mut out);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("; === c ==="));
        assert!(text.contains("CALL         1 (c)"));
        assert!(text.contains("CALL         0 (a)"));
    }

    #[test]
    fn test_jump_offsets_out_of_range() {
        let mut frag = Fragment::default();
        let choice = frag.emit(encode(op::CHOICE, 0));
        assert!(frag.patch_jump(choice, 0x7F_FFFF).is_ok());
        assert_eq!(
            frag.patch_jump(choice, 0x80_0000),
            Err(GrammarError::OperandOverflow {
                what: "jump offset",
                value: 0x80_0000,
            })
        );

        let mut frag = Fragment::default();
        frag.append(&vec![encode(op::ANY_TOKEN, 0); 0x80_0001]);
        assert!(matches!(
            frag.emit_back(op::COMMIT_VERIFY, 0),
            Err(GrammarError::OperandOverflow { value: -0x80_0001, .. })
        ));
        assert_eq!(frag.code.len(), 0x80_0001);
    }

    #[test]
    fn test_unknown_root() {
        let b = LexerlessGrammarBuilder::new();
        let a = RuleKey::new("a");
        b.rule(&a).is("x").unwrap();
        let grammar = b.build().unwrap();
        let other = RuleKey::new("other");
        assert!(matches!(
            Compiler::compile(&grammar, &other),
            Err(GrammarError::Undefined { .. })
        ));
    }
}
