//! Grammar builders.
//!
//! Two flavors share the [`GrammarBuilder`] combinators:
//!
//! - [`LexerlessGrammarBuilder`] matches raw characters; text operands become
//!   literals and tokens/trivia are wrapped explicitly.
//! - [`LexerfulGrammarBuilder`] matches a pre-lexed token sequence; text
//!   operands match token values and [`TokenType`] operands match types.
//!
//! Combinators take `&self` and return an [`ExprId`], so nested calls read
//! like the grammar they build:
//!
//! ```ignore
//! let b = LexerlessGrammarBuilder::new();
//! b.rule(&expr).is((&term, b.zero_or_more((b.first_of(("+", "-")), &term))))?;
//! ```
//!
//! Operand errors (a malformed regexp, a token type in a character grammar)
//! do not interrupt construction; the first one is returned by `build()`.

use std::cell::RefCell;

use hashbrown::{HashMap, HashSet};
use tracing::debug;

use crate::error::GrammarError;
use crate::expr::{Expr, ExprArena, ExprId, Pattern, RuleKey};
use crate::grammar::{Flavor, Grammar, GrammarRule, SkipPolicy};
use crate::token::{TokenType, TriviaKind};

// ============================================================================
// Operands
// ============================================================================

/// Anything a combinator accepts as a sub-expression.
#[derive(Debug, Clone)]
pub enum Operand {
    Expr(ExprId),
    Rule(RuleKey),
    Text(String),
    Type(TokenType),
}

impl From<ExprId> for Operand {
    fn from(id: ExprId) -> Self {
        Operand::Expr(id)
    }
}

impl From<RuleKey> for Operand {
    fn from(key: RuleKey) -> Self {
        Operand::Rule(key)
    }
}

impl From<&RuleKey> for Operand {
    fn from(key: &RuleKey) -> Self {
        Operand::Rule(key.clone())
    }
}

impl From<&str> for Operand {
    fn from(text: &str) -> Self {
        Operand::Text(text.to_string())
    }
}

impl From<String> for Operand {
    fn from(text: String) -> Self {
        Operand::Text(text)
    }
}

impl From<char> for Operand {
    fn from(c: char) -> Self {
        Operand::Text(c.to_string())
    }
}

impl From<TokenType> for Operand {
    fn from(t: TokenType) -> Self {
        Operand::Type(t)
    }
}

/// One or more operands. More than one is an implicit `sequence`.
pub trait IntoOperands {
    fn into_operands(self) -> Vec<Operand>;
}

macro_rules! single_operand {
    ($($ty:ty),*) => {
        $(
            impl IntoOperands for $ty {
                fn into_operands(self) -> Vec<Operand> {
                    vec![self.into()]
                }
            }
        )*
    };
}

single_operand!(Operand, ExprId, RuleKey, &RuleKey, &str, String, char, TokenType);

impl<T: Into<Operand>, const N: usize> IntoOperands for [T; N] {
    fn into_operands(self) -> Vec<Operand> {
        self.into_iter().map(Into::into).collect()
    }
}

impl<T: Into<Operand>> IntoOperands for Vec<T> {
    fn into_operands(self) -> Vec<Operand> {
        self.into_iter().map(Into::into).collect()
    }
}

macro_rules! tuple_operands {
    ($($name:ident),+) => {
        impl<$($name: Into<Operand>),+> IntoOperands for ($($name,)+) {
            #[allow(non_snake_case)]
            fn into_operands(self) -> Vec<Operand> {
                let ($($name,)+) = self;
                vec![$($name.into()),+]
            }
        }
    };
}

tuple_operands!(A);
tuple_operands!(A, B);
tuple_operands!(A, B, C);
tuple_operands!(A, B, C, D);
tuple_operands!(A, B, C, D, E);
tuple_operands!(A, B, C, D, E, F);
tuple_operands!(A, B, C, D, E, F, G);
tuple_operands!(A, B, C, D, E, F, G, H);
tuple_operands!(A, B, C, D, E, F, G, H, I);
tuple_operands!(A, B, C, D, E, F, G, H, I, J);
tuple_operands!(A, B, C, D, E, F, G, H, I, J, K);
tuple_operands!(A, B, C, D, E, F, G, H, I, J, K, L);

// ============================================================================
// Shared state
// ============================================================================

struct RuleSlot {
    key: RuleKey,
    expr: Option<ExprId>,
    memoize: bool,
    skip: SkipPolicy,
}

struct State {
    arena: ExprArena,
    slots: Vec<RuleSlot>,
    index: HashMap<RuleKey, usize>,
    referenced: Vec<RuleKey>,
    root: Option<RuleKey>,
    pending: Option<GrammarError>,
}

/// Construction state shared by both builder flavors.
#[doc(hidden)]
pub struct BuilderCore {
    flavor: Flavor,
    state: RefCell<State>,
}

impl BuilderCore {
    fn new(flavor: Flavor) -> Self {
        Self {
            flavor,
            state: RefCell::new(State {
                arena: ExprArena::new(),
                slots: Vec::new(),
                index: HashMap::new(),
                referenced: Vec::new(),
                root: None,
                pending: None,
            }),
        }
    }

    pub(crate) fn push(&self, expr: Expr) -> ExprId {
        self.state.borrow_mut().arena.push(expr)
    }

    fn record_error(&self, err: GrammarError) {
        let mut state = self.state.borrow_mut();
        if state.pending.is_none() {
            state.pending = Some(err);
        }
    }

    fn slot_index(&self, key: &RuleKey) -> usize {
        let mut state = self.state.borrow_mut();
        if let Some(&i) = state.index.get(key) {
            return i;
        }
        let i = state.slots.len();
        state.slots.push(RuleSlot {
            key: key.clone(),
            expr: None,
            memoize: false,
            skip: SkipPolicy::Never,
        });
        state.index.insert(key.clone(), i);
        i
    }

    fn convert(&self, operand: Operand) -> ExprId {
        match operand {
            Operand::Expr(id) => id,
            Operand::Rule(key) => {
                self.state.borrow_mut().referenced.push(key.clone());
                self.push(Expr::Rule(key))
            }
            Operand::Text(text) => match self.flavor {
                Flavor::Chars => self.push(Expr::Literal(text)),
                Flavor::Tokens => self.push(Expr::TokenValue(text)),
            },
            Operand::Type(t) => match self.flavor {
                Flavor::Tokens => self.push(Expr::TokenType(t)),
                Flavor::Chars => {
                    self.record_error(GrammarError::WrongFlavor {
                        operand: t.name().to_string(),
                    });
                    self.push(Expr::Nothing)
                }
            },
        }
    }

    fn convert_all(&self, operands: impl IntoOperands) -> ExprId {
        let mut ids: Vec<ExprId> = operands
            .into_operands()
            .into_iter()
            .map(|op| self.convert(op))
            .collect();
        match ids.len() {
            0 => self.push(Expr::Sequence(Vec::new())),
            1 => ids.remove(0),
            _ => self.push(Expr::Sequence(ids)),
        }
    }

    fn convert_each(&self, operands: impl IntoOperands) -> Vec<ExprId> {
        operands
            .into_operands()
            .into_iter()
            .map(|op| self.convert(op))
            .collect()
    }

    fn build(self, memoize_all: bool) -> Result<Grammar, GrammarError> {
        let state = self.state.into_inner();
        if let Some(err) = state.pending {
            return Err(err);
        }

        let mut required: Vec<&RuleKey> = state.slots.iter().map(|s| &s.key).collect();
        required.extend(state.referenced.iter());
        required.extend(state.root.iter());
        let mut seen = HashSet::new();
        for key in required {
            if !seen.insert(key.clone()) {
                continue;
            }
            let defined = state
                .index
                .get(key)
                .is_some_and(|&i| state.slots[i].expr.is_some());
            if !defined {
                return Err(GrammarError::Undefined {
                    rule: key.name().to_string(),
                });
            }
        }

        let rules: Vec<GrammarRule> = state
            .slots
            .into_iter()
            .filter_map(|slot| {
                slot.expr.map(|expr| GrammarRule {
                    key: slot.key,
                    expr,
                    memoize: slot.memoize || memoize_all,
                    skip: slot.skip,
                })
            })
            .collect();

        debug!(
            target: "builder",
            "built {:?} grammar: {} rules, {} expressions",
            self.flavor,
            rules.len(),
            state.arena.len()
        );
        Ok(Grammar::new(self.flavor, state.arena, rules, state.root))
    }
}

// ============================================================================
// Rule handles
// ============================================================================

/// Handle returned by [`GrammarBuilder::rule`].
pub struct RuleBuilder<'b> {
    core: &'b BuilderCore,
    index: usize,
}

impl<'b> RuleBuilder<'b> {
    pub fn key(&self) -> RuleKey {
        self.core.state.borrow().slots[self.index].key.clone()
    }

    /// Bind the rule's expression. Fails if the rule already has one.
    pub fn is(self, operands: impl IntoOperands) -> Result<Self, GrammarError> {
        if self.core.state.borrow().slots[self.index].expr.is_some() {
            return Err(GrammarError::Duplicate {
                rule: self.key().name().to_string(),
            });
        }
        let expr = self.core.convert_all(operands);
        self.core.state.borrow_mut().slots[self.index].expr = Some(expr);
        Ok(self)
    }

    /// Bind the rule's expression, replacing any previous one.
    pub fn override_with(self, operands: impl IntoOperands) -> Self {
        let expr = self.core.convert_all(operands);
        self.core.state.borrow_mut().slots[self.index].expr = Some(expr);
        self
    }

    /// Splice this rule's children into its parent when building an AST.
    pub fn skip(self) -> Self {
        self.core.state.borrow_mut().slots[self.index].skip = SkipPolicy::Always;
        self
    }

    /// Splice this rule into its parent when it has exactly one child.
    pub fn skip_if_one_child(self) -> Self {
        self.core.state.borrow_mut().slots[self.index].skip = SkipPolicy::IfOneChild;
        self
    }

    /// Cache (rule, position) results for the duration of a parse.
    pub fn memoize(self) -> Self {
        self.core.state.borrow_mut().slots[self.index].memoize = true;
        self
    }
}

// ============================================================================
// Combinators
// ============================================================================

/// Combinators common to both grammar flavors.
pub trait GrammarBuilder {
    #[doc(hidden)]
    fn core(&self) -> &BuilderCore;

    /// Get the handle for a rule, declaring it if needed.
    fn rule(&self, key: &RuleKey) -> RuleBuilder<'_> {
        let core = self.core();
        let index = core.slot_index(key);
        RuleBuilder { core, index }
    }

    /// Expression that invokes a rule.
    fn reference(&self, key: &RuleKey) -> ExprId {
        self.core().convert(Operand::Rule(key.clone()))
    }

    fn set_root_rule(&self, key: &RuleKey) {
        let core = self.core();
        core.slot_index(key);
        core.state.borrow_mut().root = Some(key.clone());
    }

    fn sequence(&self, operands: impl IntoOperands) -> ExprId {
        let core = self.core();
        let ids = core.convert_each(operands);
        core.push(Expr::Sequence(ids))
    }

    /// Ordered choice: the first alternative that matches wins.
    fn first_of(&self, operands: impl IntoOperands) -> ExprId {
        let core = self.core();
        let mut ids = core.convert_each(operands);
        if ids.len() == 1 {
            return ids.remove(0);
        }
        core.push(Expr::FirstOf(ids))
    }

    fn optional(&self, operands: impl IntoOperands) -> ExprId {
        let core = self.core();
        let e = core.convert_all(operands);
        core.push(Expr::Optional(e))
    }

    fn one_or_more(&self, operands: impl IntoOperands) -> ExprId {
        let core = self.core();
        let e = core.convert_all(operands);
        core.push(Expr::OneOrMore(e))
    }

    fn zero_or_more(&self, operands: impl IntoOperands) -> ExprId {
        let core = self.core();
        let e = core.convert_all(operands);
        core.push(Expr::ZeroOrMore(e))
    }

    /// Positive lookahead; consumes nothing.
    fn next(&self, operands: impl IntoOperands) -> ExprId {
        let core = self.core();
        let e = core.convert_all(operands);
        core.push(Expr::Next(e))
    }

    /// Negative lookahead; consumes nothing.
    fn next_not(&self, operands: impl IntoOperands) -> ExprId {
        let core = self.core();
        let e = core.convert_all(operands);
        core.push(Expr::NextNot(e))
    }

    /// Expression that never matches.
    fn nothing(&self) -> ExprId {
        self.core().push(Expr::Nothing)
    }

    /// Render an expression for diagnostics.
    fn describe(&self, id: ExprId) -> String {
        self.core().state.borrow().arena.describe(id)
    }
}

// ============================================================================
// Character-level flavor
// ============================================================================

pub struct LexerlessGrammarBuilder {
    core: BuilderCore,
}

impl Default for LexerlessGrammarBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GrammarBuilder for LexerlessGrammarBuilder {
    fn core(&self) -> &BuilderCore {
        &self.core
    }
}

impl LexerlessGrammarBuilder {
    pub fn new() -> Self {
        Self {
            core: BuilderCore::new(Flavor::Chars),
        }
    }

    pub fn literal(&self, text: &str) -> ExprId {
        self.core.push(Expr::Literal(text.to_string()))
    }

    /// Match a regular expression anchored at the current position.
    pub fn regexp(&self, pattern: &str) -> ExprId {
        match Pattern::new(pattern) {
            Ok(p) => self.core.push(Expr::Pattern(p)),
            Err(err) => {
                self.core.record_error(err);
                self.core.push(Expr::Nothing)
            }
        }
    }

    pub fn end_of_input(&self) -> ExprId {
        self.core.push(Expr::EndOfInput)
    }

    /// Mark the match of `operands` as a single token of type `token_type`.
    pub fn token(&self, token_type: TokenType, operands: impl IntoOperands) -> ExprId {
        let e = self.core.convert_all(operands);
        self.core.push(Expr::Token(token_type, e))
    }

    pub fn trivia(&self, kind: TriviaKind, operands: impl IntoOperands) -> ExprId {
        let e = self.core.convert_all(operands);
        self.core.push(Expr::Trivia(kind, e))
    }

    pub fn comment_trivia(&self, operands: impl IntoOperands) -> ExprId {
        self.trivia(TriviaKind::Comment, operands)
    }

    pub fn skipped_trivia(&self, operands: impl IntoOperands) -> ExprId {
        self.trivia(TriviaKind::SkippedText, operands)
    }

    pub fn build(self) -> Result<Grammar, GrammarError> {
        self.core.build(false)
    }
}

// ============================================================================
// Token-level flavor
// ============================================================================

pub struct LexerfulGrammarBuilder {
    core: BuilderCore,
}

impl Default for LexerfulGrammarBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GrammarBuilder for LexerfulGrammarBuilder {
    fn core(&self) -> &BuilderCore {
        &self.core
    }
}

impl LexerfulGrammarBuilder {
    pub fn new() -> Self {
        Self {
            core: BuilderCore::new(Flavor::Tokens),
        }
    }

    pub fn any_token(&self) -> ExprId {
        self.core.push(Expr::AnyToken)
    }

    pub fn is_one_of_them(&self, types: &[TokenType]) -> ExprId {
        self.core.push(Expr::TokenTypes(types.to_vec()))
    }

    /// Match `from`, then everything up to the balancing `to`.
    pub fn bridge(&self, from: TokenType, to: TokenType) -> ExprId {
        self.core.push(Expr::Bridge(from, to))
    }

    /// Match every remaining token on the current line.
    pub fn till_new_line(&self) -> ExprId {
        self.core.push(Expr::TillNewLine)
    }

    /// Match `operands` only if the next token touches the previous one.
    pub fn adjacent(&self, operands: impl IntoOperands) -> ExprId {
        let check = self.core.push(Expr::Adjacent);
        let e = self.core.convert_all(operands);
        self.core.push(Expr::Sequence(vec![check, e]))
    }

    pub fn any_token_but_not(&self, operands: impl IntoOperands) -> ExprId {
        let not = self.next_not(operands);
        let any = self.any_token();
        self.core.push(Expr::Sequence(vec![not, any]))
    }

    /// Skip tokens until `operands` matches, then match it.
    pub fn till(&self, operands: impl IntoOperands) -> ExprId {
        let e = self.core.convert_all(operands);
        let not = self.core.push(Expr::NextNot(e));
        let any = self.any_token();
        let step = self.core.push(Expr::Sequence(vec![not, any]));
        let skip = self.core.push(Expr::ZeroOrMore(step));
        self.core.push(Expr::Sequence(vec![skip, e]))
    }

    /// Skip tokens until one of `operands` would match, without matching it.
    pub fn exclusive_till(&self, operands: impl IntoOperands) -> ExprId {
        let stop = self.first_of(operands);
        let not = self.core.push(Expr::NextNot(stop));
        let any = self.any_token();
        let step = self.core.push(Expr::Sequence(vec![not, any]));
        self.core.push(Expr::ZeroOrMore(step))
    }

    pub fn build(self) -> Result<Grammar, GrammarError> {
        self.core.build(false)
    }

    pub fn build_with_memoization_of_matches_for_all_rules(self) -> Result<Grammar, GrammarError> {
        self.core.build(true)
    }
}
