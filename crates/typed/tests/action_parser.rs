use std::io::Write;

use indoc::indoc;
use parser::{GenericTokenType, GrammarBuilder, GrammarError, RuleKey, TokenType};
use rstest::rstest;
use typed::encoding_rs::{UTF_8, WINDOWS_1252};
use typed::{ActionParser, DefaultNode, GrammarRecorder, InputError, Syntax};

const PLUS: TokenType = TokenType::new("PLUS", "+");
const MINUS: TokenType = TokenType::new("MINUS", "-");
const STAR: TokenType = TokenType::new("STAR", "*");
const SLASH: TokenType = TokenType::new("SLASH", "/");
const LPAR: TokenType = TokenType::new("LPAR", "(");
const RPAR: TokenType = TokenType::new("RPAR", ")");
const COMMA: TokenType = TokenType::new("COMMA", ",");

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Num(i64),
    Neg(Box<Expr>),
    Binary(Box<Expr>, char, Box<Expr>),
    Call(String, Vec<Expr>),
}

impl Expr {
    fn eval(&self) -> i64 {
        match self {
            Expr::Num(n) => *n,
            Expr::Neg(e) => -e.eval(),
            Expr::Binary(l, op, r) => match op {
                '+' => l.eval() + r.eval(),
                '-' => l.eval() - r.eval(),
                '*' => l.eval() * r.eval(),
                _ => l.eval() / r.eval(),
            },
            Expr::Call(name, args) => match name.as_str() {
                "sum" => args.iter().map(Expr::eval).sum(),
                "max" => args.iter().map(Expr::eval).max().unwrap_or(0),
                "answer" => 42,
                _ => 0,
            },
        }
    }
}

fn number(token: DefaultNode) -> Expr {
    Expr::Num(token.value().parse().unwrap())
}

fn negate(_minus: DefaultNode, operand: Expr) -> Expr {
    Expr::Neg(Box::new(operand))
}

fn operand(op: DefaultNode, rhs: Expr) -> (char, Expr) {
    (op.value().chars().next().unwrap(), rhs)
}

fn fold(first: Expr, rest: Option<Vec<(char, Expr)>>) -> Expr {
    rest.into_iter()
        .flatten()
        .fold(first, |lhs, (op, rhs)| Expr::Binary(Box::new(lhs), op, Box::new(rhs)))
}

fn call(name: DefaultNode, _l: DefaultNode, args: Option<Vec<Expr>>, _r: DefaultNode) -> Expr {
    Expr::Call(name.value(), args.unwrap_or_default())
}

fn arguments(first: Expr, rest: Option<Vec<Expr>>) -> Vec<Expr> {
    std::iter::once(first).chain(rest.into_iter().flatten()).collect()
}

struct Lexical {
    spacing: RuleKey,
    number: RuleKey,
    ident: RuleKey,
    plus: RuleKey,
    minus: RuleKey,
    star: RuleKey,
    slash: RuleKey,
    lpar: RuleKey,
    rpar: RuleKey,
    comma: RuleKey,
    eof: RuleKey,
}

struct Calc<'r> {
    r: &'r GrammarRecorder<DefaultNode>,
    lex: Lexical,
}

impl<'r> Calc<'r> {
    fn new(r: &'r GrammarRecorder<DefaultNode>) -> Self {
        let b = r.builder();
        let spacing = r.lexical(
            "spacing",
            b.zero_or_more(b.first_of((
                b.skipped_trivia(b.regexp("[ \\t\\r\\n]+")),
                b.comment_trivia(b.regexp("//[^\\n]*")),
            ))),
        );
        let punctuator = |name: &str, token_type: TokenType| {
            r.lexical(name, (b.token(token_type, token_type.value()), &spacing))
        };
        let lex = Lexical {
            number: r.lexical(
                "NUMBER",
                (b.token(GenericTokenType::CONSTANT, b.regexp("[0-9]+")), &spacing),
            ),
            ident: r.lexical(
                "IDENT",
                (b.token(GenericTokenType::IDENTIFIER, b.regexp("[a-z]+")), &spacing),
            ),
            plus: punctuator("PLUS", PLUS),
            minus: punctuator("MINUS", MINUS),
            star: punctuator("STAR", STAR),
            slash: punctuator("SLASH", SLASH),
            lpar: punctuator("LPAR", LPAR),
            rpar: punctuator("RPAR", RPAR),
            comma: punctuator("COMMA", COMMA),
            eof: r.lexical("EOF", b.end_of_input()),
            spacing,
        };
        Self { r, lex }
    }

    fn file(&self) -> Syntax<Expr> {
        self.r.rule("file", || {
            self.r.action3(
                |_spacing: DefaultNode, e: Expr, _eof: DefaultNode| e,
                self.r.token(&self.lex.spacing),
                self.expression(),
                self.r.token(&self.lex.eof),
            )
        })
    }

    fn expression(&self) -> Syntax<Expr> {
        self.r.rule("expression", || {
            self.r.action2(fold, self.term(), self.r.zero_or_more(self.additive()))
        })
    }

    fn additive(&self) -> Syntax<(char, Expr)> {
        self.r.rule("additive", || {
            let op = self
                .r
                .first_of([self.r.token(&self.lex.plus), self.r.token(&self.lex.minus)]);
            self.r.action2(operand, op, self.term())
        })
    }

    fn term(&self) -> Syntax<Expr> {
        self.r.rule("term", || {
            self.r.action2(fold, self.unary(), self.r.zero_or_more(self.multiplicative()))
        })
    }

    fn multiplicative(&self) -> Syntax<(char, Expr)> {
        self.r.rule("multiplicative", || {
            let op = self
                .r
                .first_of([self.r.token(&self.lex.star), self.r.token(&self.lex.slash)]);
            self.r.action2(operand, op, self.unary())
        })
    }

    fn unary(&self) -> Syntax<Expr> {
        self.r.rule("unary", || {
            self.r.first_of([
                self.r.action2(negate, self.r.token(&self.lex.minus), self.unary()),
                self.primary(),
            ])
        })
    }

    fn primary(&self) -> Syntax<Expr> {
        self.r.rule("primary", || {
            self.r.first_of([self.parens(), self.call(), self.number()])
        })
    }

    fn number(&self) -> Syntax<Expr> {
        self.r.rule("number", || self.r.action1(number, self.r.token(&self.lex.number)))
    }

    fn call(&self) -> Syntax<Expr> {
        self.r.rule("call", || {
            self.r.action4(
                call,
                self.r.token(&self.lex.ident),
                self.r.token(&self.lex.lpar),
                self.r.optional(self.arguments()),
                self.r.token(&self.lex.rpar),
            )
        })
    }

    fn arguments(&self) -> Syntax<Vec<Expr>> {
        self.r.rule("arguments", || {
            let next = self.r.action2(
                |_comma: DefaultNode, e: Expr| e,
                self.r.token(&self.lex.comma),
                self.expression(),
            );
            self.r.action2(arguments, self.expression(), self.r.zero_or_more(next))
        })
    }

    fn parens(&self) -> Syntax<Expr> {
        self.r.rule("parens", || {
            self.r.action3(
                |_l: DefaultNode, e: Expr, _r: DefaultNode| e,
                self.r.token(&self.lex.lpar),
                self.expression(),
                self.r.token(&self.lex.rpar),
            )
        })
    }
}

fn calc() -> ActionParser<Expr> {
    ActionParser::new(|r| Calc::new(r).file()).unwrap()
}

fn num(n: i64) -> Expr {
    Expr::Num(n)
}

// =============================================================================
// Parsing to values
// =============================================================================

#[rstest]
#[case("1 + 2 * 3", 7)]
#[case("-(4 - 1) * 2", -6)]
#[case("10 / 2 - 3", 2)]
#[case("8 - 2 - 1", 5)]
#[case("sum(1, 2, 3) * max(4, 9)", 54)]
#[case("answer() + 1", 43)]
#[case("  1 // one\n+ 2 // two\n", 3)]
fn test_eval(#[case] source: &str, #[case] expected: i64) {
    let tree = calc().parse(source).unwrap();
    assert_eq!(tree.eval(), expected, "{tree:?}");
}

#[test]
fn test_tree_shape() {
    let parser = calc();
    assert_eq!(
        parser.parse("f(1, -2)").unwrap(),
        Expr::Call("f".to_string(), vec![num(1), Expr::Neg(Box::new(num(2)))])
    );
    assert_eq!(parser.parse("g()").unwrap(), Expr::Call("g".to_string(), vec![]));
    assert_eq!(
        parser.parse("1 - 2 * 3").unwrap(),
        Expr::Binary(
            Box::new(num(1)),
            '-',
            Box::new(Expr::Binary(Box::new(num(2)), '*', Box::new(num(3))))
        )
    );
}

#[test]
fn test_parser_is_reusable() {
    let parser = calc();
    for _ in 0..3 {
        assert_eq!(parser.parse("2 * 21").unwrap().eval(), 42);
    }
    assert!(parser.parse("2 *").is_err());
    assert_eq!(parser.parse("(2)").unwrap(), num(2));
}

#[test]
fn test_root_rule() {
    assert_eq!(calc().root_rule().name(), "file");
}

// =============================================================================
// Errors
// =============================================================================

#[test]
fn test_syntax_error_reports_line() {
    let err = calc().parse("1 +\n* 2").unwrap_err();
    assert_eq!(err.line, 2);
    assert_eq!(
        err.message,
        indoc! {"
            Parse error at line 2 column 1:

            1: 1 +
            2: * 2
               ^
        "}
    );
}

#[rstest]
#[case("1 2", 1)]
#[case("(1 + 2", 1)]
#[case("1\n\n+", 3)]
fn test_syntax_error_lines(#[case] source: &str, #[case] line: usize) {
    let err = calc().parse(source).unwrap_err();
    assert_eq!(err.line, line, "{}", err.message);
    assert!(err.message.starts_with(&format!("Parse error at line {line} ")));
}

#[test]
fn test_undefined_token_rule() {
    let result = ActionParser::<DefaultNode>::new(|r| r.token(&RuleKey::new("NOPE")));
    assert!(matches!(result, Err(GrammarError::Undefined { rule }) if rule == "NOPE"));
}

#[test]
fn test_root_must_be_a_rule() {
    let result = ActionParser::<DefaultNode>::new(|r| {
        let a = r.lexical("A", "a");
        let b = r.lexical("B", "b");
        r.first_of([r.token(&a), r.token(&b)])
    });
    assert!(matches!(result, Err(GrammarError::Recording { .. })));
}

#[test]
fn test_duplicate_lexical_rule() {
    let result = ActionParser::<DefaultNode>::new(|r| {
        let a = r.lexical("A", "a");
        r.lexical("A", "b");
        r.rule("root", || r.token(&a))
    });
    assert!(matches!(result, Err(GrammarError::Duplicate { rule }) if rule == "A"));
}

#[test]
fn test_optional_rules_with_equal_names_stay_distinct() {
    let parser = ActionParser::new(|r| {
        let first = RuleKey::new("X");
        let second = RuleKey::new("X");
        r.builder().rule(&first).is("a").unwrap();
        r.builder().rule(&second).is("b").unwrap();
        r.rule("root", || {
            r.action2(
                |a: Option<DefaultNode>, b: Option<DefaultNode>| {
                    format!("{:?}|{:?}", a.map(|n| n.value()), b.map(|n| n.value()))
                },
                r.optional(r.token(&first)),
                r.optional(r.token(&second)),
            )
        })
    })
    .unwrap();
    assert_eq!(parser.parse("ab").unwrap(), r#"Some("a")|Some("b")"#);
    assert_eq!(parser.parse("b").unwrap(), r#"None|Some("b")"#);
}

// =============================================================================
// Files
// =============================================================================

#[test]
fn test_parse_file_utf8() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "sum(1, 2) // résumé").unwrap();
    let tree = calc().parse_file(file.path(), UTF_8).unwrap();
    assert_eq!(tree.eval(), 3);
}

#[test]
fn test_parse_file_windows_1252() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"max(1, 2) // caf\xe9\n").unwrap();
    let parser = calc();

    assert_eq!(parser.parse_file(file.path(), WINDOWS_1252).unwrap().eval(), 2);

    let err = parser.parse_file(file.path(), UTF_8).unwrap_err();
    assert!(err.message.ends_with("is not valid UTF-8"), "{}", err.message);
    let cause = std::error::Error::source(&err).unwrap();
    assert!(matches!(
        cause.downcast_ref::<InputError>(),
        Some(InputError::Decode { encoding: "UTF-8", .. })
    ));
}

#[test]
fn test_parse_file_errors_name_the_line() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"1 +\n2 +\n").unwrap();
    let err = calc().parse_file(file.path(), UTF_8).unwrap_err();
    assert_eq!(err.line, 3);
}

#[test]
fn test_parse_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = calc().parse_file(dir.path().join("missing.calc"), UTF_8).unwrap_err();
    assert!(err.message.starts_with("Unable to read"), "{}", err.message);
    let cause = std::error::Error::source(&err).unwrap();
    assert!(matches!(cause.downcast_ref::<InputError>(), Some(InputError::Read { .. })));
}
