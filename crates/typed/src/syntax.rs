//! Typed handles to recorded expressions.

use std::any::{type_name, Any};
use std::fmt;
use std::marker::PhantomData;

use parser::{ExprId, RuleKey};

use crate::creator::TreeError;

/// A tree value while it travels from the parse tree to its action.
pub type Value = Box<dyn Any>;

/// A recorded expression that produces a `T` when the tree is created.
///
/// Every handle invokes exactly one rule (or picks one of several with
/// [`first_of`](crate::GrammarRecorder::first_of)), so its match is always a
/// single node of the parse tree.
pub struct Syntax<T> {
    pub(crate) expr: ExprId,
    pub(crate) rule: Option<RuleKey>,
    _value: PhantomData<fn() -> T>,
}

impl<T> Syntax<T> {
    pub(crate) fn new(expr: ExprId, rule: Option<RuleKey>) -> Self {
        Self {
            expr,
            rule,
            _value: PhantomData,
        }
    }

    pub fn expr(&self) -> ExprId {
        self.expr
    }

    /// The rule this handle invokes, if it is a single rule reference.
    pub fn rule(&self) -> Option<&RuleKey> {
        self.rule.as_ref()
    }
}

impl<T> Clone for Syntax<T> {
    fn clone(&self) -> Self {
        Self::new(self.expr, self.rule.clone())
    }
}

impl<T> fmt::Debug for Syntax<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Syntax")
            .field("expr", &self.expr)
            .field("rule", &self.rule)
            .field("type", &type_name::<T>())
            .finish()
    }
}

/// Unbox a value produced for `rule`.
pub(crate) fn take<T: 'static>(rule: &str, value: Value) -> Result<T, TreeError> {
    value
        .downcast::<T>()
        .map(|v| *v)
        .map_err(|_| TreeError::UnexpectedType {
            rule: rule.to_string(),
            expected: type_name::<T>(),
        })
}
