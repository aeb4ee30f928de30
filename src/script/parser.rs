//! Recursive-descent parser for the evaluation-context script subset.

use super::lexer::{lex, Tok, TokKind};
use super::{ScriptError, ScriptResult};

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    VarDecl { pattern: Pattern, init: Expr },
    FuncDecl { name: String, params: Vec<String>, body: Vec<Stmt> },
    Return(Option<Expr>),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    Ident(String),
    /// `{a, b: c, default: d}` as (property key, binding name) pairs.
    Object(Vec<(String, String)>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArrowBody {
    Expr(Box<Expr>),
    Block(Vec<Stmt>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Undefined,
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    Template { quasis: Vec<String>, exprs: Vec<Expr> },
    Tagged { tag: Box<Expr>, quasis: Vec<String>, exprs: Vec<Expr> },
    Ident(String),
    Member { obj: Box<Expr>, prop: String },
    Call { callee: Box<Expr>, args: Vec<Expr> },
    Await(Box<Expr>),
    Arrow { params: Vec<String>, body: ArrowBody, is_async: bool },
    Object(Vec<(String, Expr)>),
    Array(Vec<Expr>),
    Binary { op: BinOp, left: Box<Expr>, right: Box<Expr> },
    Neg(Box<Expr>),
    Assign { target: Box<Expr>, value: Box<Expr> },
}

pub fn parse_program(src: &str) -> ScriptResult<Vec<Stmt>> {
    let toks = lex(src)?;
    let mut parser = Parser { toks, pos: 0 };
    let mut stmts = Vec::new();
    while !parser.at_end() {
        stmts.push(parser.parse_stmt()?);
    }
    Ok(stmts)
}

fn parse_expr_source(src: &str) -> ScriptResult<Expr> {
    let toks = lex(src)?;
    let mut parser = Parser { toks, pos: 0 };
    let expr = parser.parse_expr()?;
    if !parser.at_end() {
        return Err(parser.error_here("unexpected trailing tokens in expression"));
    }
    Ok(expr)
}

/// Keywords outside the supported subset. Meeting one in expression
/// position is a parse error, not a lookup of an identifier named `class`.
const RESERVED_KEYWORDS: &[&str] = &[
    "class", "extends", "super", "this", "new", "if", "else", "switch", "case", "for", "while",
    "do", "try", "catch", "finally", "throw", "typeof", "instanceof", "in", "delete", "void",
    "yield", "import", "export", "function",
];

struct Parser {
    toks: Vec<Tok>,
    pos: usize,
}

impl Parser {
    fn at_end(&self) -> bool {
        self.pos >= self.toks.len()
    }

    fn peek(&self) -> Option<&TokKind> {
        self.toks.get(self.pos).map(|t| &t.kind)
    }

    fn peek_at(&self, n: usize) -> Option<&TokKind> {
        self.toks.get(self.pos + n).map(|t| &t.kind)
    }

    fn here(&self) -> usize {
        self.toks
            .get(self.pos)
            .or_else(|| self.toks.last())
            .map(|t| t.pos)
            .unwrap_or(0)
    }

    fn error_here(&self, message: impl Into<String>) -> ScriptError {
        ScriptError::parse(message, self.here())
    }

    fn advance(&mut self) -> Option<TokKind> {
        let tok = self.toks.get(self.pos).map(|t| t.kind.clone());
        self.pos += 1;
        tok
    }

    fn is_punct(&self, p: &str) -> bool {
        matches!(self.peek(), Some(TokKind::Punct(q)) if *q == p)
    }

    fn is_ident(&self, name: &str) -> bool {
        matches!(self.peek(), Some(TokKind::Ident(n)) if n == name)
    }

    fn eat_punct(&mut self, p: &str) -> bool {
        if self.is_punct(p) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, p: &str) -> ScriptResult<()> {
        if self.eat_punct(p) {
            Ok(())
        } else {
            Err(self.error_here(format!("expected `{}`", p)))
        }
    }

    fn expect_ident(&mut self) -> ScriptResult<String> {
        match self.advance() {
            Some(TokKind::Ident(name)) => Ok(name),
            _ => {
                self.pos -= 1;
                Err(self.error_here("expected identifier"))
            }
        }
    }

    fn parse_stmt(&mut self) -> ScriptResult<Stmt> {
        if self.is_ident("const") || self.is_ident("let") || self.is_ident("var") {
            self.pos += 1;
            let pattern = self.parse_pattern()?;
            self.expect_punct("=")?;
            let init = self.parse_expr()?;
            self.eat_punct(";");
            return Ok(Stmt::VarDecl { pattern, init });
        }
        if self.is_ident("function") {
            self.pos += 1;
            let name = self.expect_ident()?;
            let params = self.parse_param_list()?;
            let body = self.parse_block()?;
            return Ok(Stmt::FuncDecl { name, params, body });
        }
        if self.is_ident("return") {
            self.pos += 1;
            let value = if self.at_end() || self.is_punct(";") || self.is_punct("}") {
                None
            } else {
                Some(self.parse_expr()?)
            };
            self.eat_punct(";");
            return Ok(Stmt::Return(value));
        }
        let expr = self.parse_expr()?;
        self.eat_punct(";");
        Ok(Stmt::Expr(expr))
    }

    fn parse_pattern(&mut self) -> ScriptResult<Pattern> {
        if self.eat_punct("{") {
            let mut entries = Vec::new();
            while !self.is_punct("}") {
                let key = self.expect_ident()?;
                let binding = if self.eat_punct(":") {
                    self.expect_ident()?
                } else {
                    key.clone()
                };
                entries.push((key, binding));
                if !self.eat_punct(",") {
                    break;
                }
            }
            self.expect_punct("}")?;
            return Ok(Pattern::Object(entries));
        }
        Ok(Pattern::Ident(self.expect_ident()?))
    }

    fn parse_param_list(&mut self) -> ScriptResult<Vec<String>> {
        self.expect_punct("(")?;
        let mut params = Vec::new();
        while !self.is_punct(")") {
            params.push(self.expect_ident()?);
            if !self.eat_punct(",") {
                break;
            }
        }
        self.expect_punct(")")?;
        Ok(params)
    }

    fn parse_block(&mut self) -> ScriptResult<Vec<Stmt>> {
        self.expect_punct("{")?;
        let mut stmts = Vec::new();
        while !self.is_punct("}") {
            if self.at_end() {
                return Err(self.error_here("unterminated block"));
            }
            stmts.push(self.parse_stmt()?);
        }
        self.expect_punct("}")?;
        Ok(stmts)
    }

    fn parse_expr(&mut self) -> ScriptResult<Expr> {
        let left = self.parse_additive()?;
        if self.is_punct("=") {
            match left {
                Expr::Ident(_) | Expr::Member { .. } => {}
                _ => return Err(self.error_here("invalid assignment target")),
            }
            self.pos += 1;
            let value = self.parse_expr()?;
            return Ok(Expr::Assign {
                target: Box::new(left),
                value: Box::new(value),
            });
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> ScriptResult<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = if self.is_punct("+") {
                BinOp::Add
            } else if self.is_punct("-") {
                BinOp::Sub
            } else {
                return Ok(left);
            };
            self.pos += 1;
            let right = self.parse_multiplicative()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn parse_multiplicative(&mut self) -> ScriptResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = if self.is_punct("*") {
                BinOp::Mul
            } else if self.is_punct("/") {
                BinOp::Div
            } else {
                return Ok(left);
            };
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn parse_unary(&mut self) -> ScriptResult<Expr> {
        if self.eat_punct("-") {
            return Ok(Expr::Neg(Box::new(self.parse_unary()?)));
        }
        if self.is_ident("await") {
            self.pos += 1;
            return Ok(Expr::Await(Box::new(self.parse_unary()?)));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> ScriptResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat_punct(".") {
                let prop = self.expect_ident()?;
                expr = Expr::Member {
                    obj: Box::new(expr),
                    prop,
                };
                continue;
            }
            if self.is_punct("(") {
                let args = self.parse_args()?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                };
                continue;
            }
            if let Some(TokKind::Template { .. }) = self.peek() {
                let Some(TokKind::Template { quasis, exprs }) = self.advance() else {
                    unreachable!()
                };
                expr = Expr::Tagged {
                    tag: Box::new(expr),
                    quasis,
                    exprs: parse_interpolations(&exprs)?,
                };
                continue;
            }
            return Ok(expr);
        }
    }

    fn parse_args(&mut self) -> ScriptResult<Vec<Expr>> {
        self.expect_punct("(")?;
        let mut args = Vec::new();
        while !self.is_punct(")") {
            args.push(self.parse_expr()?);
            if !self.eat_punct(",") {
                break;
            }
        }
        self.expect_punct(")")?;
        Ok(args)
    }

    /// True when the tokens from the current `(` form an arrow parameter
    /// list, i.e. the matching `)` is directly followed by `=>`.
    fn paren_starts_arrow(&self) -> bool {
        let mut depth = 0usize;
        let mut i = self.pos;
        while let Some(tok) = self.toks.get(i) {
            match tok.kind {
                TokKind::Punct("(") => depth += 1,
                TokKind::Punct(")") => {
                    depth -= 1;
                    if depth == 0 {
                        return matches!(
                            self.toks.get(i + 1).map(|t| &t.kind),
                            Some(TokKind::Punct("=>"))
                        );
                    }
                }
                _ => {}
            }
            i += 1;
        }
        false
    }

    fn parse_arrow(&mut self, is_async: bool) -> ScriptResult<Expr> {
        let params = if self.is_punct("(") {
            self.parse_param_list()?
        } else {
            vec![self.expect_ident()?]
        };
        self.expect_punct("=>")?;
        let body = if self.is_punct("{") {
            ArrowBody::Block(self.parse_block()?)
        } else {
            ArrowBody::Expr(Box::new(self.parse_expr()?))
        };
        Ok(Expr::Arrow {
            params,
            body,
            is_async,
        })
    }

    fn parse_primary(&mut self) -> ScriptResult<Expr> {
        match self.peek() {
            Some(TokKind::Num(_)) => {
                let Some(TokKind::Num(n)) = self.advance() else {
                    unreachable!()
                };
                Ok(Expr::Num(n))
            }
            Some(TokKind::Str(_)) => {
                let Some(TokKind::Str(s)) = self.advance() else {
                    unreachable!()
                };
                Ok(Expr::Str(s))
            }
            Some(TokKind::Template { .. }) => {
                let Some(TokKind::Template { quasis, exprs }) = self.advance() else {
                    unreachable!()
                };
                Ok(Expr::Template {
                    quasis,
                    exprs: parse_interpolations(&exprs)?,
                })
            }
            Some(TokKind::Punct("(")) => {
                if self.paren_starts_arrow() {
                    return self.parse_arrow(false);
                }
                self.pos += 1;
                let expr = self.parse_expr()?;
                self.expect_punct(")")?;
                Ok(expr)
            }
            Some(TokKind::Punct("{")) => {
                self.pos += 1;
                let mut entries = Vec::new();
                while !self.is_punct("}") {
                    let key = match self.advance() {
                        Some(TokKind::Ident(name)) => name,
                        Some(TokKind::Str(s)) => s,
                        _ => {
                            self.pos -= 1;
                            return Err(self.error_here("expected object key"));
                        }
                    };
                    let value = if self.eat_punct(":") {
                        self.parse_expr()?
                    } else {
                        Expr::Ident(key.clone())
                    };
                    entries.push((key, value));
                    if !self.eat_punct(",") {
                        break;
                    }
                }
                self.expect_punct("}")?;
                Ok(Expr::Object(entries))
            }
            Some(TokKind::Punct("[")) => {
                self.pos += 1;
                let mut items = Vec::new();
                while !self.is_punct("]") {
                    items.push(self.parse_expr()?);
                    if !self.eat_punct(",") {
                        break;
                    }
                }
                self.expect_punct("]")?;
                Ok(Expr::Array(items))
            }
            Some(TokKind::Ident(name)) => {
                let name = name.clone();
                match name.as_str() {
                    "true" => {
                        self.pos += 1;
                        return Ok(Expr::Bool(true));
                    }
                    "false" => {
                        self.pos += 1;
                        return Ok(Expr::Bool(false));
                    }
                    "null" => {
                        self.pos += 1;
                        return Ok(Expr::Null);
                    }
                    "undefined" => {
                        self.pos += 1;
                        return Ok(Expr::Undefined);
                    }
                    "async" => {
                        if matches!(self.peek_at(1), Some(TokKind::Punct("(")))
                            || matches!(
                                (self.peek_at(1), self.peek_at(2)),
                                (Some(TokKind::Ident(_)), Some(TokKind::Punct("=>")))
                            )
                        {
                            self.pos += 1;
                            return self.parse_arrow(true);
                        }
                    }
                    _ => {
                        if RESERVED_KEYWORDS.contains(&name.as_str()) {
                            return Err(
                                self.error_here(format!("unsupported keyword `{}`", name))
                            );
                        }
                    }
                }
                self.pos += 1;
                if self.is_punct("=>") {
                    // Single-parameter arrow: `x => ...`
                    self.pos -= 1;
                    return self.parse_arrow(false);
                }
                Ok(Expr::Ident(name))
            }
            _ => Err(self.error_here("unsupported syntax in evaluated module")),
        }
    }
}

fn parse_interpolations(sources: &[String]) -> ScriptResult<Vec<Expr>> {
    sources.iter().map(|s| parse_expr_source(s)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program(src: &str) -> Vec<Stmt> {
        parse_program(src).unwrap()
    }

    #[test]
    fn parses_var_decl_with_destructuring() {
        let stmts = program("const {a, b: c, default: d} = await _importNamed(\"m\");");
        match &stmts[0] {
            Stmt::VarDecl {
                pattern: Pattern::Object(entries),
                init: Expr::Await(_),
            } => {
                assert_eq!(
                    entries,
                    &[
                        ("a".to_string(), "a".to_string()),
                        ("b".to_string(), "c".to_string()),
                        ("default".to_string(), "d".to_string()),
                    ]
                );
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn parses_main_wrapper_shape() {
        let stmts = program(
            "main = async () => {\nconst _exports = {};\n_exports.foo = 1;\nreturn _exports\n}",
        );
        match &stmts[0] {
            Stmt::Expr(Expr::Assign { target, value }) => {
                assert_eq!(**target, Expr::Ident("main".to_string()));
                match &**value {
                    Expr::Arrow { is_async, body: ArrowBody::Block(body), .. } => {
                        assert!(*is_async);
                        assert_eq!(body.len(), 3);
                        assert!(matches!(body[2], Stmt::Return(Some(_))));
                    }
                    other => panic!("unexpected: {:?}", other),
                }
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn parses_tagged_template() {
        let stmts = program("const a = css`color: ${color};`");
        match &stmts[0] {
            Stmt::VarDecl {
                init: Expr::Tagged { tag, quasis, exprs },
                ..
            } => {
                assert_eq!(**tag, Expr::Ident("css".to_string()));
                assert_eq!(quasis, &["color: ".to_string(), ";".to_string()]);
                assert_eq!(exprs, &[Expr::Ident("color".to_string())]);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn parses_member_chains_and_calls() {
        let stmts = program("window.addEventListener('x', () => {})");
        match &stmts[0] {
            Stmt::Expr(Expr::Call { callee, args }) => {
                assert!(matches!(**callee, Expr::Member { .. }));
                assert_eq!(args.len(), 2);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn parses_function_declarations() {
        let stmts = program("function add (a, b) { return a + b }");
        match &stmts[0] {
            Stmt::FuncDecl { name, params, body } => {
                assert_eq!(name, "add");
                assert_eq!(params, &["a".to_string(), "b".to_string()]);
                assert_eq!(body.len(), 1);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn parses_single_param_arrow() {
        let stmts = program("const f = x => x + 1");
        assert!(matches!(
            &stmts[0],
            Stmt::VarDecl {
                init: Expr::Arrow { .. },
                ..
            }
        ));
    }

    #[test]
    fn rejects_unsupported_syntax() {
        assert!(parse_program("class Foo {}").is_err());
        assert!(parse_program("if (x) { y }").is_err());
        assert!(parse_program("for (;;) {}").is_err());
        assert!(parse_program("const a = new Foo()").is_err());
        assert!(parse_program("const f = function () {}").is_err());
        assert!(parse_program("throw x").is_err());
    }

    #[test]
    fn reserved_keyword_errors_carry_the_offset() {
        let err = parse_program("const a = 1;\nclass Foo {}").unwrap_err();
        match err {
            crate::script::ScriptError::Parse { message, offset } => {
                assert!(message.contains("class"));
                assert_eq!(offset, 13);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}
