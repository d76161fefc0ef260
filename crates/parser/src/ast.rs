//! Untyped abstract syntax trees built from parse trees.

use common::InputBuffer;

use crate::expr::RuleKey;
use crate::grammar::Grammar;
use crate::node::{NodeKind, ParseNode, ParsingResult};
use crate::token::{GenericTokenType, Token, TokenType, Trivia, TriviaKind};

/// What an [`AstNode`] stands for.
#[derive(Debug, Clone, PartialEq)]
pub enum AstNodeType {
    Rule(RuleKey),
    Token(TokenType),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AstNode {
    pub name: String,
    pub node_type: AstNodeType,
    /// The node's own token for leaves, the first child's token otherwise.
    pub token: Option<Token>,
    pub children: Vec<AstNode>,
    pub from_index: usize,
    pub to_index: usize,
}

impl AstNode {
    fn for_token(token: Token, from_index: usize, to_index: usize) -> Self {
        Self {
            name: token.token_type.name().to_string(),
            node_type: AstNodeType::Token(token.token_type),
            token: Some(token),
            children: Vec::new(),
            from_index,
            to_index,
        }
    }

    pub fn is(&self, key: &RuleKey) -> bool {
        matches!(&self.node_type, AstNodeType::Rule(k) if k == key)
    }

    pub fn is_token(&self, token_type: TokenType) -> bool {
        matches!(self.node_type, AstNodeType::Token(t) if t == token_type)
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn token_value(&self) -> Option<&str> {
        self.token.as_ref().map(|t| t.value.as_str())
    }

    pub fn token_line(&self) -> Option<usize> {
        self.token.as_ref().map(|t| t.line)
    }

    pub fn first_child(&self, key: &RuleKey) -> Option<&AstNode> {
        self.children.iter().find(|c| c.is(key))
    }

    /// Depth-first search below this node, excluding the node itself.
    pub fn first_descendant(&self, key: &RuleKey) -> Option<&AstNode> {
        self.children
            .iter()
            .find_map(|c| if c.is(key) { Some(c) } else { c.first_descendant(key) })
    }

    /// Tokens of all leaves, in input order.
    pub fn tokens(&self) -> Vec<&Token> {
        let mut out = Vec::new();
        self.collect_tokens(&mut out);
        out
    }

    fn collect_tokens<'a>(&'a self, out: &mut Vec<&'a Token>) {
        if self.children.is_empty() {
            out.extend(self.token.as_ref());
        }
        for child in &self.children {
            child.collect_tokens(out);
        }
    }

    pub fn last_token(&self) -> Option<&Token> {
        self.tokens().pop()
    }
}

/// Converts parse trees into [`AstNode`] trees, applying each rule's skip
/// policy and attaching comments to the token that follows them.
pub struct AstCreator<'g> {
    grammar: &'g Grammar,
    trivia: Vec<Trivia>,
}

impl<'g> AstCreator<'g> {
    pub fn new(grammar: &'g Grammar) -> Self {
        Self {
            grammar,
            trivia: Vec::new(),
        }
    }

    /// Build the AST of a successful character-level parse.
    pub fn create(grammar: &'g Grammar, result: &ParsingResult) -> Option<AstNode> {
        let root = result.parse_tree_root()?;
        let mut creator = Self::new(grammar);
        let mut nodes = creator.visit_chars(root, result.input());
        match nodes.len() {
            1 => nodes.pop(),
            _ => None,
        }
    }

    /// Build the AST of a token-level parse tree over `tokens`.
    pub fn create_from_tokens(grammar: &'g Grammar, root: &ParseNode, tokens: &[Token]) -> Option<AstNode> {
        let mut creator = Self::new(grammar);
        let mut nodes = creator.visit_tokens(root, tokens);
        match nodes.len() {
            1 => nodes.pop(),
            _ => None,
        }
    }

    fn skip_policy_applies(&self, key: &RuleKey, child_count: usize) -> bool {
        self.grammar
            .rule(key)
            .is_some_and(|r| r.skip.has_to_be_skipped(child_count))
    }

    // -------------------------------------------------------------------------
    // Character input
    // -------------------------------------------------------------------------

    fn visit_chars(&mut self, node: &ParseNode, input: &InputBuffer) -> Vec<AstNode> {
        match &node.kind {
            NodeKind::Rule(key) => {
                let mut children = Vec::new();
                for child in &node.children {
                    children.extend(self.visit_chars(child, input));
                }
                self.non_terminal(key, node, children)
            }
            NodeKind::Trivia(TriviaKind::SkippedText) => Vec::new(),
            NodeKind::Trivia(TriviaKind::Comment) => {
                let token = self.char_token(GenericTokenType::COMMENT, node, input);
                self.trivia.push(Trivia::comment(token));
                Vec::new()
            }
            NodeKind::Token(t) if *t == GenericTokenType::COMMENT => {
                let token = self.char_token(*t, node, input);
                self.trivia.push(Trivia::comment(token));
                Vec::new()
            }
            NodeKind::Token(t) => vec![self.terminal(*t, node, input)],
            NodeKind::Terminal => vec![self.terminal(TokenType::UNDEFINED, node, input)],
        }
    }

    fn char_token(&self, token_type: TokenType, node: &ParseNode, input: &InputBuffer) -> Token {
        let pos = input.position(node.start);
        Token::new(token_type, input.slice(node.start, node.end), pos.line, pos.column)
    }

    fn terminal(&mut self, token_type: TokenType, node: &ParseNode, input: &InputBuffer) -> AstNode {
        let mut token = self.char_token(token_type, node, input);
        token.trivia = std::mem::take(&mut self.trivia);
        AstNode::for_token(token, node.start, node.end)
    }

    fn non_terminal(&self, key: &RuleKey, node: &ParseNode, children: Vec<AstNode>) -> Vec<AstNode> {
        if self.skip_policy_applies(key, children.len()) {
            return children;
        }
        let token = children.iter().find_map(|c| c.token.clone());
        vec![AstNode {
            name: key.name().to_string(),
            node_type: AstNodeType::Rule(key.clone()),
            token,
            children,
            from_index: node.start,
            to_index: node.end,
        }]
    }

    // -------------------------------------------------------------------------
    // Token input
    // -------------------------------------------------------------------------

    fn visit_tokens(&mut self, node: &ParseNode, tokens: &[Token]) -> Vec<AstNode> {
        match &node.kind {
            NodeKind::Rule(key) => {
                let mut children = Vec::new();
                for child in &node.children {
                    children.extend(self.visit_tokens(child, tokens));
                }
                self.non_terminal(key, node, children)
            }
            _ => tokens
                .get(node.start..node.end)
                .unwrap_or_default()
                .iter()
                .enumerate()
                .map(|(i, t)| AstNode::for_token(t.clone(), node.start + i, node.start + i + 1))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{GrammarBuilder, LexerfulGrammarBuilder, LexerlessGrammarBuilder};
    use crate::VMParser;

    const WORD: TokenType = TokenType::new("WORD", "word");
    const NUM: TokenType = TokenType::new("NUM", "num");
    const PLUS: TokenType = TokenType::new("PLUS", "+");

    #[test]
    fn test_comment_attaches_to_next_token() {
        let b = LexerlessGrammarBuilder::new();
        let root = RuleKey::new("root");
        let comment = b.comment_trivia(b.regexp("#[^\\n]*\\n"));
        let word = b.token(WORD, b.regexp("[a-z]+"));
        b.rule(&root).is((comment, word, b.end_of_input())).unwrap();
        b.set_root_rule(&root);
        let g = b.build().unwrap();
        let result = VMParser::new(&g).unwrap().parse("# hi\nabc").unwrap();

        let ast = AstCreator::create(&g, &result).unwrap();
        assert_eq!(ast.name, "root");
        assert_eq!(ast.children.len(), 1);
        let token = ast.children[0].token.as_ref().unwrap();
        assert_eq!(token.value, "abc");
        assert_eq!((token.line, token.column), (2, 0));
        assert_eq!(token.trivia.len(), 1);
        assert!(token.trivia[0].is_comment());
        assert_eq!(token.trivia[0].token.value, "# hi\n");
    }

    #[test]
    fn test_skipped_text_is_dropped() {
        let b = LexerlessGrammarBuilder::new();
        let root = RuleKey::new("root");
        b.rule(&root).is((b.skipped_trivia(b.regexp(" *")), "x")).unwrap();
        b.set_root_rule(&root);
        let g = b.build().unwrap();
        let result = VMParser::new(&g).unwrap().parse("   x").unwrap();

        let ast = AstCreator::create(&g, &result).unwrap();
        let tokens = ast.tokens();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].token_type, TokenType::UNDEFINED);
        assert_eq!(tokens[0].column, 3);
        assert!(!tokens[0].has_trivia());
    }

    #[test]
    fn test_skip_policies() {
        let b = LexerlessGrammarBuilder::new();
        let root = RuleKey::new("root");
        let wrapper = RuleKey::new("wrapper");
        let item = RuleKey::new("item");
        b.rule(&root).is(b.one_or_more(&wrapper)).unwrap();
        b.rule(&wrapper).is(&item).unwrap().skip();
        b.rule(&item)
            .is(b.first_of(("a", b.sequence(("b", "c")))))
            .unwrap()
            .skip_if_one_child();
        b.set_root_rule(&root);
        let g = b.build().unwrap();
        let result = VMParser::new(&g).unwrap().parse("abc").unwrap();

        let ast = AstCreator::create(&g, &result).unwrap();
        assert_eq!(ast.children.len(), 2);
        assert_eq!(ast.children[0].name, "TOKEN");
        assert_eq!(ast.children[0].token_value(), Some("a"));
        assert!(ast.children[1].is(&item));
        assert_eq!(ast.children[1].children.len(), 2);
        assert_eq!(ast.token_value(), Some("a"));
        assert_eq!((ast.from_index, ast.to_index), (0, 3));
    }

    #[test]
    fn test_token_input_leaves_are_input_tokens() {
        let b = LexerfulGrammarBuilder::new();
        let root = RuleKey::new("root");
        let sum = RuleKey::new("sum");
        b.rule(&root).is(&sum).unwrap();
        b.rule(&sum).is((NUM, b.zero_or_more((PLUS, NUM)))).unwrap();
        b.set_root_rule(&root);
        let g = b.build().unwrap();
        let tokens = vec![
            Token::new(NUM, "1", 1, 0),
            Token::new(PLUS, "+", 1, 2),
            Token::new(NUM, "2", 1, 4),
        ];
        let tree = VMParser::new(&g).unwrap().parse_tokens(&tokens).unwrap();

        let ast = AstCreator::create_from_tokens(&g, &tree, &tokens).unwrap();
        let sum_node = ast.first_descendant(&sum).unwrap();
        assert_eq!(sum_node.children.len(), 3);
        assert!(sum_node.children[1].is_token(PLUS));
        assert_eq!(sum_node.children[2].from_index, 2);
        let values: Vec<_> = ast.tokens().iter().map(|t| t.value.as_str()).collect();
        assert_eq!(values, ["1", "+", "2"]);
        assert_eq!(ast.last_token().map(|t| t.column), Some(4));
    }
}
