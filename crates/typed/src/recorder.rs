//! Action grammars: rules written as plain Rust functions.
//!
//! A typed grammar is a set of functions returning [`Syntax`] handles. Each
//! one wraps its body in [`GrammarRecorder::rule`]:
//!
//! ```ignore
//! fn expression(&self) -> Syntax<Expr> {
//!     self.r.rule("expression", || {
//!         self.r.action2(Expr::fold, self.term(), self.r.zero_or_more(self.tail()))
//!     })
//! }
//! ```
//!
//! The first call records the body and binds it to a rule; every later
//! call, including a recursive one made while the body is still being
//! recorded, only returns a reference to that rule. Recording a grammar
//! therefore runs each body exactly once, however the rules recurse.
//!
//! Alongside the grammar, the recorder fills an [`ActionTable`] telling the
//! [`SyntaxTreeCreator`](crate::SyntaxTreeCreator) how to turn each rule's
//! parse node into a value.

use std::any::type_name;
use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;

use hashbrown::{HashMap, HashSet};
use parser::{
    ExprId, Grammar, GrammarBuilder, GrammarError, IntoOperands, LexerlessGrammarBuilder, RuleKey,
};
use tracing::debug;

use crate::creator::TreeError;
use crate::syntax::{take, Syntax, Value};

pub(crate) type Assemble = Box<dyn Fn(Vec<Value>) -> Result<Value, TreeError> + Send + Sync>;
pub(crate) type WrapOptional = Box<dyn Fn(Option<Value>) -> Result<Value, TreeError> + Send + Sync>;

/// How the tree creator converts the node of one rule.
pub enum RuleAction {
    /// A recorded rule: the value of its only child.
    Passthrough,
    /// `optional(e)`: `Option<T>`.
    Optional(WrapOptional),
    /// `one_or_more(e)`: `Vec<T>`.
    OneOrMore(Assemble),
    /// `zero_or_more(e)`: `Option<Vec<T>>`, `None` when nothing matched.
    ZeroOrMore(Assemble),
    /// An action call: the children, in order, fed to the action.
    Assemble { arity: usize, assemble: Assemble },
}

impl fmt::Debug for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleAction::Passthrough => f.write_str("Passthrough"),
            RuleAction::Optional(_) => f.write_str("Optional"),
            RuleAction::OneOrMore(_) => f.write_str("OneOrMore"),
            RuleAction::ZeroOrMore(_) => f.write_str("ZeroOrMore"),
            RuleAction::Assemble { arity, .. } => write!(f, "Assemble({})", arity),
        }
    }
}

/// Per-rule tree actions, read-only once recording is finished.
#[derive(Debug, Default)]
pub struct ActionTable {
    actions: HashMap<RuleKey, RuleAction>,
}

impl ActionTable {
    pub fn get(&self, key: &RuleKey) -> Option<&RuleAction> {
        self.actions.get(key)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn is_passthrough(&self, key: &RuleKey) -> bool {
        matches!(self.get(key), Some(RuleAction::Passthrough))
    }

    pub fn is_optional(&self, key: &RuleKey) -> bool {
        matches!(self.get(key), Some(RuleAction::Optional(_)))
    }

    pub fn is_one_or_more(&self, key: &RuleKey) -> bool {
        matches!(self.get(key), Some(RuleAction::OneOrMore(_)))
    }

    pub fn is_zero_or_more(&self, key: &RuleKey) -> bool {
        matches!(self.get(key), Some(RuleAction::ZeroOrMore(_)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Combinator {
    Optional,
    OneOrMore,
    ZeroOrMore,
}

impl Combinator {
    fn name(self) -> &'static str {
        match self {
            Combinator::Optional => "optional",
            Combinator::OneOrMore => "oneOrMore",
            Combinator::ZeroOrMore => "zeroOrMore",
        }
    }
}

/// What a synthetic rule wraps: a rule, or an anonymous expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Wrapped {
    Rule(RuleKey),
    Expr(ExprId),
}

#[derive(Default)]
struct RecorderState {
    /// Rules by name, typed and lexical alike
    keys: HashMap<String, RuleKey>,
    recorded: HashSet<RuleKey>,
    synthetic: HashMap<(Combinator, Wrapped), RuleKey>,
    actions: HashMap<RuleKey, RuleAction>,
    action_names: HashMap<String, usize>,
    pending: Option<GrammarError>,
}

/// Records typed rules into a character-level grammar.
///
/// `N` is the node type produced for terminals and for rules defined
/// directly on [`GrammarRecorder::builder`] (the lexical rules).
pub struct GrammarRecorder<N> {
    builder: LexerlessGrammarBuilder,
    state: RefCell<RecorderState>,
    _node: PhantomData<fn() -> N>,
}

impl<N: 'static> Default for GrammarRecorder<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Generates `action1` .. `action6`.
macro_rules! action_methods {
    ($($method:ident($($arg:ident: $ty:ident),+);)+) => {
        $(
            /// Build a node from the values of the arguments with `f`.
            pub fn $method<$($ty: 'static,)+ R: 'static, F>(
                &self,
                f: F,
                $($arg: Syntax<$ty>),+
            ) -> Syntax<R>
            where
                F: Fn($($ty),+) -> R + Send + Sync + 'static,
            {
                let name = self.unique_action_name(action_name::<F>());
                let rule = name.clone();
                let assemble: Assemble = Box::new(move |children: Vec<Value>| {
                    let mut children = children.into_iter();
                    $(
                        let $arg = match children.next() {
                            Some(value) => take::<$ty>(&rule, value)?,
                            None => return Err(TreeError::MissingValue { rule: rule.clone() }),
                        };
                    )+
                    Ok(Box::new(f($($arg),+)) as Value)
                });
                self.add_action(name, vec![$($arg.expr),+], assemble)
            }
        )+
    };
}

impl<N: 'static> GrammarRecorder<N> {
    pub fn new() -> Self {
        Self {
            builder: LexerlessGrammarBuilder::new(),
            state: RefCell::new(RecorderState::default()),
            _node: PhantomData,
        }
    }

    /// The underlying builder, for lexical rules, tokens and trivia.
    pub fn builder(&self) -> &LexerlessGrammarBuilder {
        &self.builder
    }

    /// Key of a rule recorded under `name`.
    pub fn key(&self, name: &str) -> Option<RuleKey> {
        self.state.borrow().keys.get(name).cloned()
    }

    // -------------------------------------------------------------------------
    // Rules
    // -------------------------------------------------------------------------

    /// Record `body` as the rule `name` on first use; afterwards, and while
    /// the body is still running, return a reference to that rule.
    pub fn rule<T: 'static>(&self, name: &str, body: impl FnOnce() -> Syntax<T>) -> Syntax<T> {
        let key = self.named_key(name);
        let first_call = self.state.borrow_mut().recorded.insert(key.clone());
        if first_call {
            debug!(target: "recorder", "recording rule {}", name);
            let syntax = body();
            self.bind(&key, syntax.expr);
            self.state
                .borrow_mut()
                .actions
                .insert(key.clone(), RuleAction::Passthrough);
        }
        self.reference(key)
    }

    /// Define the lexical rule `name` on the builder and return its key.
    /// A second definition under the same name is reported by `finish`.
    pub fn lexical(&self, name: &str, operands: impl IntoOperands) -> RuleKey {
        let key = self.named_key(name);
        if let Err(err) = self.builder.rule(&key).is(operands) {
            self.record_error(err);
        }
        key
    }

    /// Reference a lexical rule defined on the builder.
    pub fn token(&self, key: &RuleKey) -> Syntax<N> {
        self.reference(key.clone())
    }

    /// Reference any rule defined on the builder; its node is built by the
    /// [`NodeBuilder`](crate::NodeBuilder).
    pub fn invoke_rule(&self, key: &RuleKey) -> Syntax<N> {
        self.reference(key.clone())
    }

    // -------------------------------------------------------------------------
    // Combinators
    // -------------------------------------------------------------------------

    /// Ordered choice between alternatives producing the same type.
    pub fn first_of<T>(&self, alternatives: impl IntoIterator<Item = Syntax<T>>) -> Syntax<T> {
        let mut alternatives: Vec<Syntax<T>> = alternatives.into_iter().collect();
        match alternatives.len() {
            0 => {
                self.record_error(GrammarError::Recording {
                    message: "firstOf requires at least one alternative".to_string(),
                });
                Syntax::new(self.builder.nothing(), None)
            }
            1 => alternatives.remove(0),
            _ => {
                let exprs: Vec<ExprId> = alternatives.iter().map(|s| s.expr).collect();
                Syntax::new(self.builder.first_of(exprs), None)
            }
        }
    }

    pub fn optional<T: 'static>(&self, syntax: Syntax<T>) -> Syntax<Option<T>> {
        self.synthetic(Combinator::Optional, &syntax, |name| {
            RuleAction::Optional(Box::new(move |value: Option<Value>| {
                let value = value.map(|v| take::<T>(&name, v)).transpose()?;
                Ok(Box::new(value) as Value)
            }))
        })
    }

    pub fn one_or_more<T: 'static>(&self, syntax: Syntax<T>) -> Syntax<Vec<T>> {
        self.synthetic(Combinator::OneOrMore, &syntax, |name| {
            RuleAction::OneOrMore(Box::new(move |values: Vec<Value>| {
                let items = take_all::<T>(&name, values)?;
                Ok(Box::new(items) as Value)
            }))
        })
    }

    pub fn zero_or_more<T: 'static>(&self, syntax: Syntax<T>) -> Syntax<Option<Vec<T>>> {
        self.synthetic(Combinator::ZeroOrMore, &syntax, |name| {
            RuleAction::ZeroOrMore(Box::new(move |values: Vec<Value>| {
                let items = take_all::<T>(&name, values)?;
                let items = if items.is_empty() { None } else { Some(items) };
                Ok(Box::new(items) as Value)
            }))
        })
    }

    // -------------------------------------------------------------------------
    // Actions
    // -------------------------------------------------------------------------

    action_methods! {
        action1(a: A);
        action2(a: A, b: B);
        action3(a: A, b: B, c: C);
        action4(a: A, b: B, c: C, d: D);
        action5(a: A, b: B, c: C, d: D, e: E);
        action6(a: A, b: B, c: C, d: D, e: E, g: G);
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    /// The key for `name`, created on first use.
    fn named_key(&self, name: &str) -> RuleKey {
        self.state
            .borrow_mut()
            .keys
            .entry(name.to_string())
            .or_insert_with(|| RuleKey::new(name))
            .clone()
    }

    fn reference<T>(&self, key: RuleKey) -> Syntax<T> {
        Syntax::new(self.builder.reference(&key), Some(key))
    }

    fn bind(&self, key: &RuleKey, expr: ExprId) {
        if let Err(err) = self.builder.rule(key).is(expr) {
            self.record_error(err);
        }
    }

    fn record_error(&self, err: GrammarError) {
        let mut state = self.state.borrow_mut();
        if state.pending.is_none() {
            state.pending = Some(err);
        }
    }

    /// A rule wrapping `inner` in `combinator`, shared by every use of the
    /// same combinator on the same rule or expression.
    fn synthetic<T, U>(
        &self,
        combinator: Combinator,
        inner: &Syntax<U>,
        action: impl FnOnce(String) -> RuleAction,
    ) -> Syntax<T> {
        let wrapped = match &inner.rule {
            Some(key) => Wrapped::Rule(key.clone()),
            None => Wrapped::Expr(inner.expr),
        };
        let cached = self
            .state
            .borrow()
            .synthetic
            .get(&(combinator, wrapped.clone()))
            .cloned();
        if let Some(key) = cached {
            return self.reference(key);
        }
        let name = format!("{}({})", combinator.name(), self.builder.describe(inner.expr));
        let expr = match combinator {
            Combinator::Optional => self.builder.optional(inner.expr),
            Combinator::OneOrMore => self.builder.one_or_more(inner.expr),
            Combinator::ZeroOrMore => self.builder.zero_or_more(inner.expr),
        };
        let key = RuleKey::new(name.as_str());
        self.bind(&key, expr);
        {
            let mut state = self.state.borrow_mut();
            state.synthetic.insert((combinator, wrapped), key.clone());
            state.actions.insert(key.clone(), action(name));
        }
        self.reference(key)
    }

    fn add_action<R>(&self, name: String, exprs: Vec<ExprId>, assemble: Assemble) -> Syntax<R> {
        let arity = exprs.len();
        let expr = match arity {
            1 => exprs[0],
            _ => self.builder.sequence(exprs),
        };
        let key = RuleKey::new(name.as_str());
        self.bind(&key, expr);
        self.state
            .borrow_mut()
            .actions
            .insert(key.clone(), RuleAction::Assemble { arity, assemble });
        self.reference(key)
    }

    /// Every action call gets its own rule; a function used more than once
    /// gets `#2`, `#3`, ... appended.
    fn unique_action_name(&self, name: String) -> String {
        let mut state = self.state.borrow_mut();
        let uses = state.action_names.entry(name.clone()).or_insert(0);
        *uses += 1;
        match *uses {
            1 => name,
            n => format!("{}#{}", name, n),
        }
    }

    /// Seal the recording with `root` as the entry rule.
    pub(crate) fn finish<T>(self, root: &Syntax<T>) -> Result<(Grammar, ActionTable, RuleKey), GrammarError> {
        let state = self.state.into_inner();
        if let Some(err) = state.pending {
            return Err(err);
        }
        let root = root.rule.clone().ok_or_else(|| GrammarError::Recording {
            message: "The root expression must be a rule".to_string(),
        })?;
        self.builder.set_root_rule(&root);
        let grammar = self.builder.build()?;
        debug!(
            target: "recorder",
            "recorded {} rules, {} with tree actions",
            grammar.rules().len(),
            state.actions.len()
        );
        Ok((grammar, ActionTable { actions: state.actions }, root))
    }
}

fn take_all<T: 'static>(rule: &str, values: Vec<Value>) -> Result<Vec<T>, TreeError> {
    values.into_iter().map(|v| take::<T>(rule, v)).collect()
}

/// `f.<function>` for a tree factory function.
fn action_name<F>() -> String {
    let full = type_name::<F>();
    let short = full.rsplit("::").next().unwrap_or(full);
    format!("f.{}", short)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn number(text: String) -> i64 {
        text.len() as i64
    }

    struct Fixture<'r> {
        r: &'r GrammarRecorder<String>,
        calls: std::cell::Cell<usize>,
    }

    impl Fixture<'_> {
        fn list(&self) -> Syntax<Vec<i64>> {
            self.r.rule("list", || {
                self.calls.set(self.calls.get() + 1);
                self.r.one_or_more(self.item())
            })
        }

        fn item(&self) -> Syntax<i64> {
            self.r.rule("item", || {
                self.calls.set(self.calls.get() + 1);
                self.r.first_of([self.nested(), self.atom()])
            })
        }

        fn nested(&self) -> Syntax<i64> {
            self.r.rule("nested", || {
                self.calls.set(self.calls.get() + 1);
                self.r.action1(|items: Vec<i64>| -> i64 { items.iter().sum() }, self.list())
            })
        }

        fn atom(&self) -> Syntax<i64> {
            let key = RuleKey::new("ATOM");
            self.r.builder().rule(&key).is("a").unwrap();
            self.r.action1(number, self.r.token(&key))
        }
    }

    #[test]
    fn test_recursive_rules_are_recorded_once() {
        let r = GrammarRecorder::<String>::new();
        let fixture = Fixture {
            r: &r,
            calls: std::cell::Cell::new(0),
        };
        let root = fixture.list();
        let again = fixture.list();
        assert_eq!(fixture.calls.get(), 3);
        assert_eq!(root.rule(), again.rule());

        let list = r.key("list").unwrap();
        let (grammar, actions, root_key) = r.finish(&root).unwrap();
        assert_eq!(root_key, list);
        assert!(actions.is_passthrough(&list));
        assert!(grammar.rule(&list).is_some());
    }

    #[test]
    fn test_synthetic_rules() {
        let r = GrammarRecorder::<String>::new();
        let fixture = Fixture {
            r: &r,
            calls: std::cell::Cell::new(0),
        };
        let root = fixture.list();
        let (grammar, actions, _) = r.finish(&root).unwrap();

        let names: Vec<&str> = grammar.rules().iter().map(|rule| rule.key.name()).collect();
        assert!(names.contains(&"oneOrMore(item)"), "{names:?}");
        assert!(names.contains(&"f.number"), "{names:?}");
        let one_or_more = grammar
            .rules()
            .iter()
            .find(|rule| rule.key.name() == "oneOrMore(item)")
            .unwrap();
        assert!(actions.is_one_or_more(&one_or_more.key));
    }

    #[test]
    fn test_combinators_are_shared_per_expression() {
        let r = GrammarRecorder::<String>::new();
        let key = RuleKey::new("A");
        r.builder().rule(&key).is("a").unwrap();
        let first = r.optional(r.token(&key));
        let second = r.optional(r.token(&key));
        assert_eq!(first.rule(), second.rule());
        assert_eq!(first.rule().unwrap().name(), "optional(A)");
    }

    #[test]
    fn test_combinators_follow_rule_identity() {
        let r = GrammarRecorder::<String>::new();
        let first = RuleKey::new("X");
        let second = RuleKey::new("X");
        r.builder().rule(&first).is("a").unwrap();
        r.builder().rule(&second).is("b").unwrap();
        let a = r.optional(r.token(&first));
        let b = r.optional(r.token(&second));
        assert_ne!(a.rule(), b.rule());
        assert_eq!(a.rule().unwrap().name(), "optional(X)");
        assert_eq!(b.rule().unwrap().name(), "optional(X)");
    }

    #[test]
    fn test_lexical_names_are_shared_with_rules() {
        let r = GrammarRecorder::<String>::new();
        let a = r.lexical("A", "a");
        assert_eq!(r.key("A"), Some(a.clone()));
        assert_eq!(r.lexical("A", "b"), a);
        let root = r.token(&a);
        let err = r.finish(&root).err().unwrap();
        assert_eq!(err, GrammarError::Duplicate { rule: "A".to_string() });
    }

    #[test]
    fn test_repeated_actions_get_their_own_rules() {
        let r = GrammarRecorder::<String>::new();
        let key = RuleKey::new("ATOM");
        r.builder().rule(&key).is("a").unwrap();
        let first = r.action1(number, r.token(&key));
        let second = r.action1(number, r.token(&key));
        assert_eq!(first.rule().unwrap().name(), "f.number");
        assert_eq!(second.rule().unwrap().name(), "f.number#2");
    }

    #[test]
    fn test_root_must_be_a_rule() {
        let r = GrammarRecorder::<String>::new();
        let a = RuleKey::new("A");
        let b = RuleKey::new("B");
        r.builder().rule(&a).is("a").unwrap();
        r.builder().rule(&b).is("b").unwrap();
        let choice = r.first_of([r.token(&a), r.token(&b)]);
        assert!(matches!(r.finish(&choice), Err(GrammarError::Recording { .. })));
    }

    #[test]
    fn test_empty_first_of() {
        let r = GrammarRecorder::<String>::new();
        let root = r.rule("root", || r.first_of(Vec::<Syntax<String>>::new()));
        let err = r.finish(&root).err().unwrap();
        assert_eq!(err.to_string(), "firstOf requires at least one alternative");
    }
}
