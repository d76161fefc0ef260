//! Tokens and trivia.
//!
//! Token-level grammars consume a pre-built `&[Token]`; the AST creator
//! produces tokens from character-level parse trees.

use std::fmt;
use std::hash::{Hash, Hasher};

/// The type of a token. Two types are equal when their names are.
#[derive(Debug, Clone, Copy, Eq)]
pub struct TokenType {
    name: &'static str,
    value: &'static str,
}

impl TokenType {
    pub const fn new(name: &'static str, value: &'static str) -> Self {
        Self { name, value }
    }

    /// Type given to terminals that carry no explicit token type.
    pub const UNDEFINED: TokenType = TokenType::new("TOKEN", "TOKEN");

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The canonical text of the type (e.g. `"+"` for a punctuator).
    pub fn value(&self) -> &'static str {
        self.value
    }
}

impl PartialEq for TokenType {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Hash for TokenType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Token types every language shares.
pub struct GenericTokenType;

impl GenericTokenType {
    pub const IDENTIFIER: TokenType = TokenType::new("IDENTIFIER", "IDENTIFIER");
    pub const LITERAL: TokenType = TokenType::new("LITERAL", "LITERAL");
    pub const CONSTANT: TokenType = TokenType::new("CONSTANT", "CONSTANT");
    pub const COMMENT: TokenType = TokenType::new("COMMENT", "COMMENT");
    pub const EOF: TokenType = TokenType::new("EOF", "EOF");
    pub const UNKNOWN_CHAR: TokenType = TokenType::new("UNKNOWN_CHAR", "UNKNOWN_CHAR");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriviaKind {
    Comment,
    SkippedText,
}

impl fmt::Display for TriviaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriviaKind::Comment => f.write_str("COMMENT"),
            TriviaKind::SkippedText => f.write_str("SKIPPED_TEXT"),
        }
    }
}

/// Non-structural text attached to the token that follows it.
#[derive(Debug, Clone, PartialEq)]
pub struct Trivia {
    pub kind: TriviaKind,
    pub token: Token,
}

impl Trivia {
    pub fn comment(token: Token) -> Self {
        Self {
            kind: TriviaKind::Comment,
            token,
        }
    }

    pub fn skipped_text(token: Token) -> Self {
        Self {
            kind: TriviaKind::SkippedText,
            token,
        }
    }

    pub fn is_comment(&self) -> bool {
        self.kind == TriviaKind::Comment
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub token_type: TokenType,
    pub value: String,
    /// Line number (1-based).
    pub line: usize,
    /// Column number (0-based).
    pub column: usize,
    pub trivia: Vec<Trivia>,
    /// Set for tokens synthesized by a preprocessor rather than read from input.
    pub generated: bool,
}

impl Token {
    pub fn new(token_type: TokenType, value: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            token_type,
            value: value.into(),
            line,
            column,
            trivia: Vec::new(),
            generated: false,
        }
    }

    pub fn with_trivia(mut self, trivia: Trivia) -> Self {
        self.trivia.push(trivia);
        self
    }

    pub fn has_trivia(&self) -> bool {
        !self.trivia.is_empty()
    }

    /// Column just past the last character, assuming a single-line value.
    pub fn end_column(&self) -> usize {
        self.column + self.value.chars().count()
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLUS: TokenType = TokenType::new("PLUS", "+");

    #[test]
    fn test_token_type_equality_by_name() {
        assert_eq!(PLUS, TokenType::new("PLUS", "add"));
        assert_ne!(PLUS, GenericTokenType::IDENTIFIER);
        assert_eq!(PLUS.value(), "+");
    }

    #[test]
    fn test_token_trivia() {
        let comment = Token::new(GenericTokenType::COMMENT, "// hi", 1, 0);
        let token = Token::new(PLUS, "+", 2, 4).with_trivia(Trivia::comment(comment));
        assert!(token.has_trivia());
        assert!(token.trivia[0].is_comment());
        assert_eq!(token.end_column(), 5);
        assert_eq!(token.to_string(), "+");
    }
}
