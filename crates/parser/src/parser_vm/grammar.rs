//! Compiled grammar containing bytecode and matcher tables.

use crate::expr::{Pattern, RuleKey};
use crate::grammar::{Flavor, SkipPolicy};
use crate::token::{TokenType, TriviaKind};

use crate::error::GrammarError;

use super::instruction::{mnemonic, op, opcode, operand, operand_signed, MAX_OPERAND};

/// What a CALL or OPEN instruction enters.
#[derive(Debug, Clone)]
pub enum MatcherKind {
    Rule {
        key: RuleKey,
        memoize: bool,
        skip: SkipPolicy,
    },
    Token(TokenType),
    Trivia(TriviaKind),
}

#[derive(Debug, Clone)]
pub struct Matcher {
    pub kind: MatcherKind,
    /// Bytecode offset of a rule body. Unused for token and trivia wrappers.
    pub entry: usize,
}

impl Matcher {
    pub fn name(&self) -> String {
        match &self.kind {
            MatcherKind::Rule { key, .. } => key.name().to_string(),
            MatcherKind::Token(t) => format!("token({})", t),
            MatcherKind::Trivia(k) => format!("trivia({})", k),
        }
    }

    pub fn rule_key(&self) -> Option<&RuleKey> {
        match &self.kind {
            MatcherKind::Rule { key, .. } => Some(key),
            _ => None,
        }
    }

    pub fn memoize(&self) -> bool {
        matches!(self.kind, MatcherKind::Rule { memoize: true, .. })
    }
}

/// Compiled grammar containing bytecode and matcher tables
///
/// The program starts with `CALL root; END`; every rule body follows,
/// terminated by RETURN. Immutable once compiled, so it can be shared
/// between threads running independent parses.
#[derive(Debug, Clone)]
pub struct CompiledGrammar {
    pub flavor: Flavor,

    /// Bytecode buffer
    pub code: Vec<u32>,

    /// String table for literals and token values
    pub strings: Vec<String>,

    /// Regular expression table
    pub patterns: Vec<Pattern>,

    /// Token type table
    pub token_types: Vec<TokenType>,

    /// Token type sets for `isOneOfThem`
    pub token_sets: Vec<Vec<TokenType>>,

    /// Bridge (open, close) pairs
    pub bridges: Vec<(TokenType, TokenType)>,

    /// Rules and wrappers, indexed by CALL/OPEN operands
    pub matchers: Vec<Matcher>,

    /// Matcher index of the root rule
    pub root: usize,
}

impl CompiledGrammar {
    pub fn new(flavor: Flavor) -> Self {
        Self {
            flavor,
            code: Vec::new(),
            strings: Vec::new(),
            patterns: Vec::new(),
            token_types: Vec::new(),
            token_sets: Vec::new(),
            bridges: Vec::new(),
            matchers: Vec::new(),
            root: 0,
        }
    }

    /// Entry offset of a rule, if the grammar contains it.
    pub fn rule_entry(&self, key: &RuleKey) -> Option<usize> {
        self.matchers
            .iter()
            .find(|m| m.rule_key() == Some(key))
            .map(|m| m.entry)
    }

    pub fn root_matcher(&self) -> &Matcher {
        &self.matchers[self.root]
    }

    /// Dump the compiled grammar to stderr for debugging
    pub fn dump(&self) {
        let stderr = std::io::stderr();
        let mut out = stderr.lock();
        self.dump_to(&mut out);
    }

    pub fn dump_to<W: std::io::Write>(&self, out: &mut W) {
        writeln!(out, "\n{:=^60}", " COMPILED GRAMMAR DUMP ").ok();

        // String table
        writeln!(out, "\n--- String Table ({} entries) ---", self.strings.len()).ok();
        for (i, s) in self.strings.iter().enumerate() {
            writeln!(out, "  [{:3}] {:?}", i, s).ok();
        }

        writeln!(out, "\n--- Pattern Table ({} entries) ---", self.patterns.len()).ok();
        for (i, p) in self.patterns.iter().enumerate() {
            writeln!(out, "  [{:3}] /{}/", i, p.source()).ok();
        }

        if self.flavor == Flavor::Tokens {
            writeln!(out, "\n--- Token Types ({} entries) ---", self.token_types.len()).ok();
            for (i, t) in self.token_types.iter().enumerate() {
                writeln!(out, "  [{:3}] {}", i, t).ok();
            }
        }

        // Matchers
        writeln!(out, "\n--- Matchers ({} entries) ---", self.matchers.len()).ok();
        for (i, m) in self.matchers.iter().enumerate() {
            let root = if i == self.root { " [root]" } else { "" };
            match &m.kind {
                MatcherKind::Rule { memoize, skip, .. } => {
                    let memo = if *memoize { " [memo]" } else { "" };
                    writeln!(
                        out,
                        "  [{:3}] {}{}{} @ offset {} skip={:?}",
                        i,
                        m.name(),
                        root,
                        memo,
                        m.entry,
                        skip
                    )
                    .ok();
                }
                _ => {
                    writeln!(out, "  [{:3}] {}", i, m.name()).ok();
                }
            }
        }

        // Bytecode disassembly
        writeln!(out, "\n--- Bytecode ({} instructions) ---", self.code.len()).ok();
        self.disassemble(out);

        writeln!(out, "\n{:=^60}\n", "").ok();
    }

    /// Disassemble bytecode to a writer
    pub fn disassemble<W: std::io::Write>(&self, out: &mut W) {
        for (pc, &instr) in self.code.iter().enumerate() {
            let opc = opcode(instr);
            let oper = operand(instr);

            for m in &self.matchers {
                if let MatcherKind::Rule { key, .. } = &m.kind {
                    if m.entry == pc && pc > 1 {
                        writeln!(out, "\n  ; === {} ===", key).ok();
                    }
                }
            }

            let name = mnemonic(opc);
            let desc = match opc {
                op::LITERAL | op::TOKEN_VALUE => {
                    let s = self.strings.get(oper as usize).map(String::as_str).unwrap_or("???");
                    format!("{:<13}{} ({:?})", name, oper, s)
                }
                op::PATTERN => {
                    let p = self.patterns.get(oper as usize).map(Pattern::source).unwrap_or("???");
                    format!("{:<13}{} (/{}/)", name, oper, p)
                }
                op::TOKEN_TYPE => {
                    let t = self.token_types.get(oper as usize).map(TokenType::name).unwrap_or("???");
                    format!("{:<13}{} ({})", name, oper, t)
                }
                op::TOKEN_TYPES => {
                    let names: Vec<&str> = self
                        .token_sets
                        .get(oper as usize)
                        .map(|set| set.iter().map(TokenType::name).collect())
                        .unwrap_or_default();
                    format!("{:<13}{} ({})", name, oper, names.join(" | "))
                }
                op::BRIDGE => match self.bridges.get(oper as usize) {
                    Some((from, to)) => format!("{:<13}{} ({} .. {})", name, oper, from, to),
                    None => format!("{:<13}{} (???)", name, oper),
                },
                op::CHOICE
                | op::COMMIT
                | op::PREDICATE_CHOICE
                | op::COMMIT_VERIFY
                | op::BACK_COMMIT => {
                    let offset = operand_signed(instr);
                    let target = pc as i64 + offset as i64;
                    format!("{:<13}{} -> @{}", name, offset, target)
                }
                op::CALL | op::OPEN => {
                    let m = self
                        .matchers
                        .get(oper as usize)
                        .map(Matcher::name)
                        .unwrap_or_else(|| "???".to_string());
                    format!("{:<13}{} ({})", name, oper, m)
                }
                op::END_OF_INPUT
                | op::ANY_TOKEN
                | op::TILL_NEW_LINE
                | op::ADJACENT
                | op::FAIL
                | op::END
                | op::FAIL_TWICE
                | op::RETURN
                | op::CLOSE => name.to_string(),
                _ => format!("??? opcode={:#04x} oper={}", opc, oper),
            };

            writeln!(out, "  {:4}: {}", pc, desc).ok();
        }
    }

    /// Intern a string, returning its ID
    pub fn intern_string(&mut self, s: &str) -> Result<u32, GrammarError> {
        if let Some(i) = self.strings.iter().position(|existing| existing == s) {
            return Ok(i as u32);
        }
        let id = table_id("string id", self.strings.len())?;
        self.strings.push(s.to_string());
        Ok(id)
    }

    pub fn add_pattern(&mut self, pattern: &Pattern) -> Result<u32, GrammarError> {
        if let Some(i) = self.patterns.iter().position(|p| p.source() == pattern.source()) {
            return Ok(i as u32);
        }
        let id = table_id("pattern id", self.patterns.len())?;
        self.patterns.push(pattern.clone());
        Ok(id)
    }

    pub fn intern_token_type(&mut self, t: TokenType) -> Result<u32, GrammarError> {
        if let Some(i) = self.token_types.iter().position(|existing| *existing == t) {
            return Ok(i as u32);
        }
        let id = table_id("token type id", self.token_types.len())?;
        self.token_types.push(t);
        Ok(id)
    }

    pub fn add_token_set(&mut self, types: &[TokenType]) -> Result<u32, GrammarError> {
        let id = table_id("token set id", self.token_sets.len())?;
        self.token_sets.push(types.to_vec());
        Ok(id)
    }

    pub fn add_bridge(&mut self, from: TokenType, to: TokenType) -> Result<u32, GrammarError> {
        let id = table_id("bridge id", self.bridges.len())?;
        self.bridges.push((from, to));
        Ok(id)
    }

    pub fn add_matcher(&mut self, kind: MatcherKind) -> Result<u32, GrammarError> {
        let id = table_id("matcher id", self.matchers.len())?;
        self.matchers.push(Matcher { kind, entry: 0 });
        Ok(id)
    }

    /// Emit an instruction
    pub fn emit(&mut self, instr: u32) -> usize {
        let offset = self.code.len();
        self.code.push(instr);
        offset
    }

    /// Get current code offset
    pub fn current_offset(&self) -> usize {
        self.code.len()
    }
}

/// The id the next entry of a table gets, if an operand can hold it.
pub(crate) fn table_id(what: &'static str, len: usize) -> Result<u32, GrammarError> {
    match u32::try_from(len) {
        Ok(id) if id <= MAX_OPERAND => Ok(id),
        _ => Err(GrammarError::OperandOverflow {
            what,
            value: len as i64,
        }),
    }
}

impl Default for CompiledGrammar {
    fn default() -> Self {
        Self::new(Flavor::Chars)
    }
}
