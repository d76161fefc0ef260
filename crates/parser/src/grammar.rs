//! Built, immutable grammars.

use hashbrown::HashMap;

use crate::expr::{Expr, ExprArena, ExprId, RuleKey};

/// Which input a grammar consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    Chars,
    Tokens,
}

/// How the AST creator treats a rule's node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SkipPolicy {
    #[default]
    Never,
    Always,
    IfOneChild,
}

impl SkipPolicy {
    pub fn has_to_be_skipped(self, child_count: usize) -> bool {
        match self {
            SkipPolicy::Never => false,
            SkipPolicy::Always => true,
            SkipPolicy::IfOneChild => child_count == 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GrammarRule {
    pub key: RuleKey,
    pub expr: ExprId,
    pub memoize: bool,
    pub skip: SkipPolicy,
}

/// A validated set of rules. Every rule reference resolves.
#[derive(Debug, Clone)]
pub struct Grammar {
    flavor: Flavor,
    arena: ExprArena,
    rules: Vec<GrammarRule>,
    index: HashMap<RuleKey, usize>,
    root: Option<RuleKey>,
}

impl Grammar {
    pub(crate) fn new(
        flavor: Flavor,
        arena: ExprArena,
        rules: Vec<GrammarRule>,
        root: Option<RuleKey>,
    ) -> Self {
        let index = rules
            .iter()
            .enumerate()
            .map(|(i, r)| (r.key.clone(), i))
            .collect();
        Self {
            flavor,
            arena,
            rules,
            index,
            root,
        }
    }

    pub fn flavor(&self) -> Flavor {
        self.flavor
    }

    pub fn rules(&self) -> &[GrammarRule] {
        &self.rules
    }

    pub fn rule(&self, key: &RuleKey) -> Option<&GrammarRule> {
        self.index.get(key).map(|&i| &self.rules[i])
    }

    pub fn rule_index(&self, key: &RuleKey) -> Option<usize> {
        self.index.get(key).copied()
    }

    pub fn root_rule(&self) -> Option<&RuleKey> {
        self.root.as_ref()
    }

    pub fn expr(&self, id: ExprId) -> &Expr {
        self.arena.get(id)
    }

    pub fn describe(&self, id: ExprId) -> String {
        self.arena.describe(id)
    }
}
