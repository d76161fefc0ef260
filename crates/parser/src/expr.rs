//! Parsing expression model.
//!
//! Expressions live in an append-only [`ExprArena`] and are addressed by
//! [`ExprId`] handles. A handle may be referenced from any number of parents,
//! so a grammar is a DAG; identity is handle equality. Recursion only ever
//! goes through [`Expr::Rule`] references, never through the arena itself.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use regex::Regex;

use crate::error::GrammarError;
use crate::token::{TokenType, TriviaKind};

static NEXT_RULE_ID: AtomicU64 = AtomicU64::new(0);

/// Identity of a named rule.
///
/// Every call to [`RuleKey::new`] creates a distinct key, even for equal
/// names. Clones share the identity.
#[derive(Clone)]
pub struct RuleKey {
    id: u64,
    name: Arc<str>,
}

impl RuleKey {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            id: NEXT_RULE_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PartialEq for RuleKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for RuleKey {}

impl Hash for RuleKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RuleKey({}#{})", self.name, self.id)
    }
}

impl fmt::Display for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Handle to an expression in an [`ExprArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(pub(crate) u32);

impl ExprId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A compiled regular expression matched at the current position.
#[derive(Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    pub fn new(source: &str) -> Result<Self, GrammarError> {
        let regex = Regex::new(&format!(r"\A(?:{})", source)).map_err(|e| {
            GrammarError::MalformedPattern {
                pattern: source.to_string(),
                message: e.to_string(),
            }
        })?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Length in bytes of the match starting at `text[0]`, if any.
    pub fn match_len(&self, text: &str) -> Option<usize> {
        self.regex.find(text).map(|m| m.end())
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pattern({:?})", self.source)
    }
}

#[derive(Debug, Clone)]
pub enum Expr {
    Sequence(Vec<ExprId>),
    FirstOf(Vec<ExprId>),
    Optional(ExprId),
    OneOrMore(ExprId),
    ZeroOrMore(ExprId),
    /// Positive lookahead.
    Next(ExprId),
    /// Negative lookahead.
    NextNot(ExprId),
    Literal(String),
    Pattern(Pattern),
    EndOfInput,
    Nothing,
    Rule(RuleKey),
    Token(TokenType, ExprId),
    Trivia(TriviaKind, ExprId),

    // Token-level terminals
    TokenType(TokenType),
    TokenTypes(Vec<TokenType>),
    TokenValue(String),
    AnyToken,
    Bridge(TokenType, TokenType),
    TillNewLine,
    Adjacent,
}

/// Append-only expression storage.
#[derive(Debug, Clone, Default)]
pub struct ExprArena {
    exprs: Vec<Expr>,
}

impl ExprArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, expr: Expr) -> ExprId {
        let id = ExprId(self.exprs.len() as u32);
        self.exprs.push(expr);
        id
    }

    pub fn get(&self, id: ExprId) -> &Expr {
        &self.exprs[id.index()]
    }

    pub fn len(&self) -> usize {
        self.exprs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }

    /// Render an expression the way a grammar author would have written it.
    pub fn describe(&self, id: ExprId) -> String {
        let list = |name: &str, ids: &[ExprId]| {
            let parts: Vec<String> = ids.iter().map(|&c| self.describe(c)).collect();
            format!("{}({})", name, parts.join(", "))
        };
        match self.get(id) {
            Expr::Sequence(ids) => list("sequence", ids),
            Expr::FirstOf(ids) => list("firstOf", ids),
            Expr::Optional(e) => format!("optional({})", self.describe(*e)),
            Expr::OneOrMore(e) => format!("oneOrMore({})", self.describe(*e)),
            Expr::ZeroOrMore(e) => format!("zeroOrMore({})", self.describe(*e)),
            Expr::Next(e) => format!("next({})", self.describe(*e)),
            Expr::NextNot(e) => format!("nextNot({})", self.describe(*e)),
            Expr::Literal(s) => format!("{:?}", s),
            Expr::Pattern(p) => format!("regexp({:?})", p.source()),
            Expr::EndOfInput => "endOfInput".to_string(),
            Expr::Nothing => "nothing".to_string(),
            Expr::Rule(key) => key.name().to_string(),
            Expr::Token(t, e) => format!("token({}, {})", t, self.describe(*e)),
            Expr::Trivia(k, e) => format!("trivia({}, {})", k, self.describe(*e)),
            Expr::TokenType(t) => t.name().to_string(),
            Expr::TokenTypes(ts) => {
                let names: Vec<&str> = ts.iter().map(|t| t.name()).collect();
                format!("isOneOfThem({})", names.join(", "))
            }
            Expr::TokenValue(v) => format!("{:?}", v),
            Expr::AnyToken => "anyToken".to_string(),
            Expr::Bridge(from, to) => format!("bridge({}, {})", from, to),
            Expr::TillNewLine => "tillNewLine".to_string(),
            Expr::Adjacent => "adjacent".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_key_identity() {
        let a = RuleKey::new("expr");
        let b = RuleKey::new("expr");
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
        assert_eq!(a.name(), "expr");
    }

    #[test]
    fn test_pattern_anchored() {
        let p = Pattern::new("[0-9]+").unwrap();
        assert_eq!(p.match_len("123abc"), Some(3));
        assert_eq!(p.match_len("abc123"), None);
    }

    #[test]
    fn test_pattern_alternation_in_group() {
        let p = Pattern::new("a|b").unwrap();
        assert_eq!(p.match_len("ba"), Some(1));
        assert_eq!(p.match_len("ca"), None);
    }

    #[test]
    fn test_malformed_pattern() {
        let err = Pattern::new("[0-9").unwrap_err();
        assert!(matches!(err, GrammarError::MalformedPattern { .. }));
    }

    #[test]
    fn test_describe() {
        let mut arena = ExprArena::new();
        let a = arena.push(Expr::Literal("a".to_string()));
        let key = RuleKey::new("b");
        let b = arena.push(Expr::Rule(key));
        let seq = arena.push(Expr::Sequence(vec![a, b]));
        let opt = arena.push(Expr::Optional(seq));
        assert_eq!(arena.describe(opt), "optional(sequence(\"a\", b))");
    }
}
