//! A small arithmetic grammar shared by the integration tests.

#![allow(dead_code)]

use parser::{Grammar, GrammarBuilder, LexerlessGrammarBuilder, RuleKey};

pub struct ExpressionGrammar {
    pub grammar: Grammar,
    pub root: RuleKey,
    pub expression: RuleKey,
    pub term: RuleKey,
    pub factor: RuleKey,
    pub parens: RuleKey,
    pub number: RuleKey,
    pub variable: RuleKey,
    pub plus: RuleKey,
    pub minus: RuleKey,
    pub mul: RuleKey,
    pub div: RuleKey,
    pub lpar: RuleKey,
    pub rpar: RuleKey,
    pub whitespace: RuleKey,
}

impl ExpressionGrammar {
    pub fn new() -> Self {
        Self::with_memoization(false)
    }

    pub fn with_memoization(memoize: bool) -> Self {
        let root = RuleKey::new("root");
        let expression = RuleKey::new("expression");
        let term = RuleKey::new("term");
        let factor = RuleKey::new("factor");
        let parens = RuleKey::new("parens");
        let number = RuleKey::new("number");
        let variable = RuleKey::new("variable");
        let plus = RuleKey::new("plus");
        let minus = RuleKey::new("minus");
        let mul = RuleKey::new("mul");
        let div = RuleKey::new("div");
        let lpar = RuleKey::new("lpar");
        let rpar = RuleKey::new("rpar");
        let whitespace = RuleKey::new("whitespace");

        let b = LexerlessGrammarBuilder::new();
        b.rule(&whitespace)
            .is(b.comment_trivia(b.regexp("\\s*")))
            .unwrap();
        for (key, text) in [
            (&plus, "+"),
            (&minus, "-"),
            (&mul, "*"),
            (&div, "/"),
            (&lpar, "("),
            (&rpar, ")"),
        ] {
            b.rule(key).is((text, &whitespace)).unwrap();
        }
        b.rule(&number)
            .is((b.regexp("[0-9]+"), &whitespace))
            .unwrap();
        b.rule(&variable)
            .is((b.regexp("[a-zA-Z_][a-zA-Z_0-9]*"), &whitespace))
            .unwrap();

        b.rule(&root)
            .is((&whitespace, &expression, b.end_of_input()))
            .unwrap();
        b.rule(&expression)
            .is((&term, b.zero_or_more((b.first_of((&plus, &minus)), &term))))
            .unwrap();
        let term_rule = b
            .rule(&term)
            .is((&factor, b.zero_or_more((b.first_of((&div, &mul)), &factor))))
            .unwrap();
        if memoize {
            term_rule.memoize();
        }
        b.rule(&factor)
            .is(b.first_of((&number, &parens, &variable)))
            .unwrap();
        b.rule(&parens).is((&lpar, &expression, &rpar)).unwrap();
        b.set_root_rule(&root);

        Self {
            grammar: b.build().unwrap(),
            root,
            expression,
            term,
            factor,
            parens,
            number,
            variable,
            plus,
            minus,
            mul,
            div,
            lpar,
            rpar,
            whitespace,
        }
    }
}
