//! Syntax tree creation: parse trees to typed values.

use common::InputBuffer;
use parser::{GenericTokenType, NodeKind, ParseNode, RuleKey, Token, TokenType, Trivia, TriviaKind};
use thiserror::Error;
use tracing::trace;

use crate::recorder::{ActionTable, RuleAction};
use crate::syntax::{take, Value};

/// A tree that could not be assembled from a successful parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("Rule '{rule}' must match exactly one node, found {found}")]
    Passthrough { rule: String, found: usize },

    #[error("Optional rule '{rule}' matched {found} nodes")]
    Optional { rule: String, found: usize },

    #[error("Action '{rule}' takes {expected} values, found {found}")]
    Arity {
        rule: String,
        expected: usize,
        found: usize,
    },

    #[error("Rule '{rule}' has no value where one is required")]
    MissingValue { rule: String },

    #[error("Rule '{rule}' expected a value of type {expected}")]
    UnexpectedType { rule: String, expected: &'static str },
}

// ============================================================================
// Node builders
// ============================================================================

/// Builds the nodes for terminals and for rules without a tree action.
pub trait NodeBuilder {
    type Node: 'static;

    /// `trivia` are the comments seen since the previous terminal.
    fn create_terminal(
        &self,
        input: &InputBuffer,
        start: usize,
        end: usize,
        trivia: Vec<Trivia>,
        token_type: Option<TokenType>,
    ) -> Self::Node;

    fn create_non_terminal(
        &self,
        key: &RuleKey,
        children: Vec<Self::Node>,
        start: usize,
        end: usize,
    ) -> Self::Node;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Leaf {
    pub token: Token,
    pub from_index: usize,
    pub to_index: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenericNode {
    pub key: RuleKey,
    pub children: Vec<DefaultNode>,
    pub from_index: usize,
    pub to_index: usize,
}

/// Node produced by [`DefaultNodeBuilder`].
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultNode {
    Leaf(Leaf),
    Generic(GenericNode),
}

impl DefaultNode {
    /// Tokens below this node, in input order.
    pub fn tokens(&self) -> Vec<&Token> {
        match self {
            DefaultNode::Leaf(leaf) => vec![&leaf.token],
            DefaultNode::Generic(node) => node.children.iter().flat_map(|c| c.tokens()).collect(),
        }
    }

    pub fn first_token(&self) -> Option<&Token> {
        match self {
            DefaultNode::Leaf(leaf) => Some(&leaf.token),
            DefaultNode::Generic(node) => node.children.iter().find_map(|c| c.first_token()),
        }
    }

    /// Concatenated token values, without trivia.
    pub fn value(&self) -> String {
        self.tokens().iter().map(|t| t.value.as_str()).collect()
    }
}

/// Leaves become tokens (untyped terminals get [`TokenType::UNDEFINED`]);
/// other rules keep their children.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultNodeBuilder;

impl NodeBuilder for DefaultNodeBuilder {
    type Node = DefaultNode;

    fn create_terminal(
        &self,
        input: &InputBuffer,
        start: usize,
        end: usize,
        trivia: Vec<Trivia>,
        token_type: Option<TokenType>,
    ) -> DefaultNode {
        let position = input.position(start);
        let mut token = Token::new(
            token_type.unwrap_or(TokenType::UNDEFINED),
            input.slice(start, end),
            position.line,
            position.column,
        );
        token.trivia = trivia;
        DefaultNode::Leaf(Leaf {
            token,
            from_index: start,
            to_index: end,
        })
    }

    fn create_non_terminal(
        &self,
        key: &RuleKey,
        children: Vec<DefaultNode>,
        start: usize,
        end: usize,
    ) -> DefaultNode {
        DefaultNode::Generic(GenericNode {
            key: key.clone(),
            children,
            from_index: start,
            to_index: end,
        })
    }
}

// ============================================================================
// Creator
// ============================================================================

/// Walks a successful parse tree depth first and builds the typed tree.
///
/// Comment trivia are collected as they are passed and handed to the next
/// terminal; skipped text is dropped.
pub struct SyntaxTreeCreator<'a, B: NodeBuilder> {
    actions: &'a ActionTable,
    node_builder: &'a B,
    input: &'a InputBuffer,
    trivia: Vec<Trivia>,
}

impl<'a, B: NodeBuilder> SyntaxTreeCreator<'a, B> {
    pub fn new(actions: &'a ActionTable, node_builder: &'a B, input: &'a InputBuffer) -> Self {
        Self {
            actions,
            node_builder,
            input,
            trivia: Vec::new(),
        }
    }

    pub fn create(&mut self, root: &ParseNode) -> Result<Value, TreeError> {
        self.trivia.clear();
        let rule = root.rule_key().map(|k| k.name().to_string()).unwrap_or_default();
        self.visit(root)?.ok_or(TreeError::MissingValue { rule })
    }

    fn visit(&mut self, node: &ParseNode) -> Result<Option<Value>, TreeError> {
        match &node.kind {
            NodeKind::Rule(key) => self.visit_non_terminal(key, node).map(Some),
            NodeKind::Trivia(TriviaKind::SkippedText) => Ok(None),
            NodeKind::Trivia(TriviaKind::Comment) => {
                self.add_comment(node);
                Ok(None)
            }
            NodeKind::Token(t) if *t == GenericTokenType::COMMENT => {
                self.add_comment(node);
                Ok(None)
            }
            NodeKind::Token(t) => Ok(Some(self.terminal(node, Some(*t)))),
            NodeKind::Terminal => Ok(Some(self.terminal(node, None))),
        }
    }

    fn visit_non_terminal(&mut self, key: &RuleKey, node: &ParseNode) -> Result<Value, TreeError> {
        let actions = self.actions;
        match actions.get(key) {
            Some(RuleAction::Passthrough) => match node.children.as_slice() {
                [child] => self.required(key, child),
                children => Err(TreeError::Passthrough {
                    rule: key.name().to_string(),
                    found: children.len(),
                }),
            },
            Some(RuleAction::Optional(wrap)) => match node.children.as_slice() {
                [] => wrap(None),
                [child] => {
                    let value = self.required(key, child)?;
                    wrap(Some(value))
                }
                children => Err(TreeError::Optional {
                    rule: key.name().to_string(),
                    found: children.len(),
                }),
            },
            Some(RuleAction::OneOrMore(wrap)) | Some(RuleAction::ZeroOrMore(wrap)) => {
                let values = self.visit_children(node)?;
                wrap(values)
            }
            Some(RuleAction::Assemble { arity, assemble }) => {
                let values = self.visit_children(node)?;
                if values.len() != *arity {
                    return Err(TreeError::Arity {
                        rule: key.name().to_string(),
                        expected: *arity,
                        found: values.len(),
                    });
                }
                trace!(target: "creator", "assemble {} at {}", key.name(), node.start);
                assemble(values)
            }
            None => {
                let children = self
                    .visit_children(node)?
                    .into_iter()
                    .map(|v| take::<B::Node>(key.name(), v))
                    .collect::<Result<Vec<_>, _>>()?;
                let built = self
                    .node_builder
                    .create_non_terminal(key, children, node.start, node.end);
                Ok(Box::new(built))
            }
        }
    }

    fn visit_children(&mut self, node: &ParseNode) -> Result<Vec<Value>, TreeError> {
        let mut values = Vec::with_capacity(node.children.len());
        for child in &node.children {
            if let Some(value) = self.visit(child)? {
                values.push(value);
            }
        }
        Ok(values)
    }

    fn required(&mut self, key: &RuleKey, child: &ParseNode) -> Result<Value, TreeError> {
        self.visit(child)?.ok_or_else(|| TreeError::MissingValue {
            rule: key.name().to_string(),
        })
    }

    fn terminal(&mut self, node: &ParseNode, token_type: Option<TokenType>) -> Value {
        let trivia = std::mem::take(&mut self.trivia);
        let built = self
            .node_builder
            .create_terminal(self.input, node.start, node.end, trivia, token_type);
        Box::new(built)
    }

    fn add_comment(&mut self, node: &ParseNode) {
        let position = self.input.position(node.start);
        let token = Token::new(
            GenericTokenType::COMMENT,
            self.input.slice(node.start, node.end),
            position.line,
            position.column,
        );
        self.trivia.push(Trivia::comment(token));
    }
}
