use crate::ast::*;
use crate::error::EngineError;
use crate::lexer::{Keyword, Lexer, Token, TokenKind};
use std::collections::VecDeque;

/// Parse a component's source text into its root body.
pub(crate) fn parse(source: &str) -> Result<Body, EngineError> {
    Parser::new(source).parse_component()
}

fn syntax(message: impl Into<String>, line: usize) -> EngineError {
    EngineError::Syntax {
        message: message.into(),
        line,
    }
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Text(_) => "literal text".to_string(),
        TokenKind::Statement(kw) => format!("'{}'", kw.as_str()),
        TokenKind::ShortPrint => "'$('".to_string(),
        TokenKind::Ident(name) => format!("identifier '{}'", name),
        TokenKind::Str(_) => "string literal".to_string(),
        TokenKind::Number(_) => "number literal".to_string(),
        TokenKind::EqEqEq => "'==='".to_string(),
        TokenKind::EqEq => "'=='".to_string(),
        TokenKind::NotEqEq => "'!=='".to_string(),
        TokenKind::NotEq => "'!='".to_string(),
        TokenKind::Lt => "'<'".to_string(),
        TokenKind::Le => "'<='".to_string(),
        TokenKind::Gt => "'>'".to_string(),
        TokenKind::Ge => "'>='".to_string(),
        TokenKind::AndAnd => "'&&'".to_string(),
        TokenKind::OrOr => "'||'".to_string(),
        TokenKind::Bang => "'!'".to_string(),
        TokenKind::LParen => "'('".to_string(),
        TokenKind::RParen => "')'".to_string(),
        TokenKind::LBracket => "'['".to_string(),
        TokenKind::RBracket => "']'".to_string(),
        TokenKind::Comma => "','".to_string(),
        TokenKind::Dot => "'.'".to_string(),
        TokenKind::Assign => "'='".to_string(),
    }
}

fn is_terminator(kw: Keyword) -> bool {
    matches!(
        kw,
        Keyword::ElseIf
            | Keyword::Else
            | Keyword::EndIf
            | Keyword::EndForeach
            | Keyword::EndRender
            | Keyword::EndReplace
    )
}

struct Parser<'a> {
    lexer: Lexer<'a>,
    buffer: VecDeque<Token>,
    last_line: usize,
    /// Set while parsing a `$replace` body; `$place` is illegal there.
    in_replace: bool,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            lexer: Lexer::new(input),
            buffer: VecDeque::new(),
            last_line: 1,
            in_replace: false,
        }
    }

    fn peek(&mut self, n: usize) -> Result<Option<&Token>, EngineError> {
        while self.buffer.len() <= n {
            match self.lexer.next_token()? {
                Some(token) => self.buffer.push_back(token),
                None => return Ok(None),
            }
        }
        Ok(self.buffer.get(n))
    }

    fn peek_token(&mut self, n: usize) -> Result<Option<Token>, EngineError> {
        Ok(self.peek(n)?.cloned())
    }

    fn peek_kind(&mut self, n: usize) -> Result<Option<TokenKind>, EngineError> {
        Ok(self.peek(n)?.map(|t| t.kind.clone()))
    }

    fn consume(&mut self) -> Result<Option<Token>, EngineError> {
        let token = match self.buffer.pop_front() {
            Some(token) => Some(token),
            None => self.lexer.next_token()?,
        };
        if let Some(ref t) = token {
            self.last_line = t.line;
        }
        Ok(token)
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token, EngineError> {
        match self.consume()? {
            Some(t) if t.kind == kind => Ok(t),
            Some(t) => Err(syntax(
                format!("expected {}, found {}", what, describe(&t.kind)),
                t.line,
            )),
            None => Err(syntax(
                format!("expected {}, found end of input", what),
                self.last_line,
            )),
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<String, EngineError> {
        match self.consume()? {
            Some(Token {
                kind: TokenKind::Ident(name),
                ..
            }) => Ok(name),
            Some(t) => Err(syntax(
                format!("expected {}, found {}", what, describe(&t.kind)),
                t.line,
            )),
            None => Err(syntax(
                format!("expected {}, found end of input", what),
                self.last_line,
            )),
        }
    }

    fn expect_str(&mut self, what: &str) -> Result<(String, usize), EngineError> {
        match self.consume()? {
            Some(Token {
                kind: TokenKind::Str(value),
                line,
            }) => Ok((value, line)),
            Some(t) => Err(syntax(
                format!("expected {}, found {}", what, describe(&t.kind)),
                t.line,
            )),
            None => Err(syntax(
                format!("expected {}, found end of input", what),
                self.last_line,
            )),
        }
    }

    fn expect_statement(&mut self, kw: Keyword, open_line: usize) -> Result<(), EngineError> {
        match self.consume()? {
            Some(Token {
                kind: TokenKind::Statement(found),
                ..
            }) if found == kw => Ok(()),
            Some(t) => Err(syntax(
                format!("expected {}, found {}", kw.as_str(), describe(&t.kind)),
                t.line,
            )),
            None => Err(syntax(
                format!("unterminated block: expected {}", kw.as_str()),
                open_line,
            )),
        }
    }

    fn open_args(&mut self, stmt: &str) -> Result<(), EngineError> {
        self.expect(TokenKind::LParen, &format!("'(' after {}", stmt))
            .map(|_| ())
    }

    fn close_args(&mut self) -> Result<(), EngineError> {
        self.expect(TokenKind::RParen, "')'").map(|_| ())
    }

    fn parse_component(mut self) -> Result<Body, EngineError> {
        let body = self.parse_body()?;
        // A leftover token here is a terminator with no matching opener.
        match self.peek_token(0)? {
            None => Ok(body),
            Some(t) => Err(syntax(
                format!("unexpected {} without a matching opener", describe(&t.kind)),
                t.line,
            )),
        }
    }

    fn parse_body(&mut self) -> Result<Body, EngineError> {
        let mut nodes = Vec::new();
        loop {
            let token = match self.peek_token(0)? {
                Some(token) => token,
                None => break,
            };
            match token.kind {
                TokenKind::Statement(kw) if is_terminator(kw) => break,
                TokenKind::Text(_) => {
                    if let Some(Token {
                        kind: TokenKind::Text(text),
                        ..
                    }) = self.consume()?
                    {
                        nodes.push(Node::Text(text));
                    }
                }
                TokenKind::ShortPrint => {
                    self.consume()?;
                    self.open_args("$(")?;
                    let expr = self.parse_expr()?;
                    self.close_args()?;
                    nodes.push(Node::Print { expr });
                }
                TokenKind::Statement(Keyword::Print) => {
                    self.consume()?;
                    self.open_args("$print")?;
                    let expr = self.parse_expr()?;
                    self.close_args()?;
                    nodes.push(Node::Print { expr });
                }
                TokenKind::Statement(Keyword::Log) => {
                    self.consume()?;
                    self.open_args("$log")?;
                    let expr = self.parse_expr()?;
                    if let Some(TokenKind::Comma) = self.peek_kind(0)? {
                        return Err(syntax("$log takes exactly one argument", token.line));
                    }
                    self.close_args()?;
                    nodes.push(Node::Log { expr });
                }
                TokenKind::Statement(Keyword::If) => {
                    self.consume()?;
                    nodes.push(self.parse_if(token.line)?);
                }
                TokenKind::Statement(Keyword::Foreach) => {
                    self.consume()?;
                    nodes.push(self.parse_foreach(token.line)?);
                }
                TokenKind::Statement(Keyword::Render) => {
                    self.consume()?;
                    nodes.push(self.parse_render(token.line)?);
                }
                TokenKind::Statement(Keyword::Include) => {
                    self.consume()?;
                    self.open_args("$include")?;
                    let (component, _) = self.expect_str("component name")?;
                    self.close_args()?;
                    nodes.push(Node::Include { component });
                }
                TokenKind::Statement(Keyword::Place) => {
                    self.consume()?;
                    self.open_args("$place")?;
                    let (name, line) = self.expect_str("placeholder name")?;
                    self.close_args()?;
                    if self.in_replace {
                        return Err(EngineError::PlaceInReplacement { name, line });
                    }
                    nodes.push(Node::Place { name });
                }
                TokenKind::Statement(Keyword::Replace) => {
                    return Err(syntax(
                        "$replace is only valid between $render and $endrender",
                        token.line,
                    ));
                }
                other => {
                    return Err(syntax(format!("unexpected {}", describe(&other)), token.line));
                }
            }
        }
        Ok(nodes)
    }

    fn parse_if(&mut self, open_line: usize) -> Result<Node, EngineError> {
        self.open_args("$if")?;
        let condition = self.parse_expr()?;
        self.close_args()?;
        let body = self.parse_body()?;

        let mut branches = vec![(condition, body)];
        let mut else_body = None;

        loop {
            match self.consume()? {
                Some(Token {
                    kind: TokenKind::Statement(Keyword::ElseIf),
                    ..
                }) => {
                    self.open_args("$elseif")?;
                    let cond = self.parse_expr()?;
                    self.close_args()?;
                    branches.push((cond, self.parse_body()?));
                }
                Some(Token {
                    kind: TokenKind::Statement(Keyword::Else),
                    ..
                }) => {
                    else_body = Some(self.parse_body()?);
                    // Nothing but $endif may follow an $else body.
                    match self.consume()? {
                        Some(Token {
                            kind: TokenKind::Statement(Keyword::EndIf),
                            ..
                        }) => break,
                        Some(t) => {
                            return Err(syntax(
                                format!("expected $endif after $else, found {}", describe(&t.kind)),
                                t.line,
                            ))
                        }
                        None => {
                            return Err(syntax("unterminated $if: expected $endif", open_line))
                        }
                    }
                }
                Some(Token {
                    kind: TokenKind::Statement(Keyword::EndIf),
                    ..
                }) => break,
                Some(t) => {
                    return Err(syntax(
                        format!(
                            "expected $elseif, $else, or $endif, found {}",
                            describe(&t.kind)
                        ),
                        t.line,
                    ))
                }
                None => return Err(syntax("unterminated $if: expected $endif", open_line)),
            }
        }

        Ok(Node::If {
            branches,
            else_body,
        })
    }

    fn parse_foreach(&mut self, open_line: usize) -> Result<Node, EngineError> {
        self.open_args("$foreach")?;
        let item = self.expect_ident("loop variable name")?;
        self.expect(TokenKind::Comma, "','")?;
        let second = self.parse_expr()?;

        // Three arguments means the second names the index binding.
        let (index, collection) = match self.peek_kind(0)? {
            Some(TokenKind::Comma) => {
                self.consume()?;
                let index_name = match second {
                    Expr::Local(name) => name,
                    _ => {
                        return Err(syntax(
                            "$foreach index must be a plain identifier",
                            open_line,
                        ))
                    }
                };
                (Some(index_name), self.parse_expr()?)
            }
            _ => (None, second),
        };
        self.close_args()?;

        let body = self.parse_body()?;
        self.expect_statement(Keyword::EndForeach, open_line)?;

        Ok(Node::Foreach {
            item,
            index,
            collection,
            body,
        })
    }

    fn parse_render(&mut self, open_line: usize) -> Result<Node, EngineError> {
        self.open_args("$render")?;
        let component = self.parse_expr()?;
        let mut bindings = Vec::new();
        while let Some(TokenKind::Comma) = self.peek_kind(0)? {
            self.consume()?;
            let name = self.expect_ident("binding name")?;
            self.expect(TokenKind::Assign, "'='")?;
            let expr = self.parse_expr()?;
            bindings.push((name, expr));
        }
        self.close_args()?;

        let mut replacements: Vec<(String, Body)> = Vec::new();
        loop {
            match self.consume()? {
                // Literal text between replace blocks carries no output.
                Some(Token {
                    kind: TokenKind::Text(_),
                    ..
                }) => continue,
                Some(Token {
                    kind: TokenKind::Statement(Keyword::Replace),
                    line: replace_line,
                }) => {
                    self.open_args("$replace")?;
                    let (name, _) = self.expect_str("placeholder name")?;
                    self.close_args()?;
                    if replacements.iter().any(|(existing, _)| *existing == name) {
                        return Err(syntax(
                            format!("duplicate $replace for placeholder '{}'", name),
                            replace_line,
                        ));
                    }
                    let was_in_replace = self.in_replace;
                    self.in_replace = true;
                    let body = self.parse_body()?;
                    self.in_replace = was_in_replace;
                    self.expect_statement(Keyword::EndReplace, replace_line)?;
                    replacements.push((name, body));
                }
                Some(Token {
                    kind: TokenKind::Statement(Keyword::EndRender),
                    ..
                }) => break,
                Some(t) => {
                    return Err(syntax(
                        format!(
                            "only $replace blocks may appear between $render and $endrender, found {}",
                            describe(&t.kind)
                        ),
                        t.line,
                    ))
                }
                None => return Err(syntax("unterminated $render: expected $endrender", open_line)),
            }
        }

        Ok(Node::Render {
            component,
            bindings,
            replacements,
        })
    }

    fn parse_expr(&mut self) -> Result<Expr, EngineError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, EngineError> {
        let mut lhs = self.parse_and()?;
        while let Some(TokenKind::OrOr) = self.peek_kind(0)? {
            self.consume()?;
            let rhs = self.parse_and()?;
            lhs = Expr::Binary(Box::new(lhs), BinOp::Or, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, EngineError> {
        let mut lhs = self.parse_equality()?;
        while let Some(TokenKind::AndAnd) = self.peek_kind(0)? {
            self.consume()?;
            let rhs = self.parse_equality()?;
            lhs = Expr::Binary(Box::new(lhs), BinOp::And, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<Expr, EngineError> {
        let mut lhs = self.parse_relational()?;
        loop {
            let op = match self.peek_kind(0)? {
                Some(TokenKind::EqEqEq) => BinOp::StrictEq,
                Some(TokenKind::NotEqEq) => BinOp::StrictNe,
                Some(TokenKind::EqEq) => BinOp::Eq,
                Some(TokenKind::NotEq) => BinOp::Ne,
                _ => break,
            };
            self.consume()?;
            let rhs = self.parse_relational()?;
            lhs = Expr::Binary(Box::new(lhs), op, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_relational(&mut self) -> Result<Expr, EngineError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek_kind(0)? {
                Some(TokenKind::Lt) => BinOp::Lt,
                Some(TokenKind::Le) => BinOp::Le,
                Some(TokenKind::Gt) => BinOp::Gt,
                Some(TokenKind::Ge) => BinOp::Ge,
                _ => break,
            };
            self.consume()?;
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary(Box::new(lhs), op, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, EngineError> {
        if let Some(TokenKind::Bang) = self.peek_kind(0)? {
            self.consume()?;
            let operand = self.parse_unary()?;
            return Ok(Expr::Not(Box::new(operand)));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, EngineError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek_kind(0)? {
                Some(TokenKind::Dot) => {
                    self.consume()?;
                    let field = self.expect_ident("field name after '.'")?;
                    expr = Expr::Member(Box::new(expr), field);
                }
                Some(TokenKind::LBracket) => {
                    self.consume()?;
                    let index = self.parse_expr()?;
                    self.expect(TokenKind::RBracket, "']'")?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, EngineError> {
        match self.consume()? {
            Some(Token {
                kind: TokenKind::Str(value),
                ..
            }) => Ok(Expr::Str(value)),
            Some(Token {
                kind: TokenKind::Number(value),
                ..
            }) => Ok(Expr::Number(value)),
            Some(Token {
                kind: TokenKind::Ident(name),
                line,
            }) => {
                if name == "true" {
                    return Ok(Expr::Bool(true));
                }
                if name == "false" {
                    return Ok(Expr::Bool(false));
                }
                if name == "null" {
                    return Ok(Expr::Null);
                }
                if name == "global"
                    && matches!(self.peek_kind(0)?, Some(TokenKind::Dot))
                    && matches!(self.peek_kind(1)?, Some(TokenKind::Ident(_)))
                {
                    self.consume()?;
                    let key = self.expect_ident("global name")?;
                    return Ok(Expr::Global(key));
                }
                if let Some(TokenKind::LParen) = self.peek_kind(0)? {
                    self.consume()?;
                    let mut args = Vec::new();
                    if !matches!(self.peek_kind(0)?, Some(TokenKind::RParen)) {
                        loop {
                            args.push(self.parse_expr()?);
                            match self.peek_kind(0)? {
                                Some(TokenKind::Comma) => {
                                    self.consume()?;
                                }
                                _ => break,
                            }
                        }
                    }
                    self.expect(TokenKind::RParen, "')'")?;
                    return Ok(Expr::ToolCall { name, args, line });
                }
                Ok(Expr::Local(name))
            }
            Some(Token {
                kind: TokenKind::LParen,
                ..
            }) => {
                let inner = self.parse_expr()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            Some(t) => Err(syntax(
                format!("expected expression, found {}", describe(&t.kind)),
                t.line,
            )),
            None => Err(syntax(
                "expected expression, found end of input",
                self.last_line,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_only_template_is_a_single_text_node() {
        let body = parse("no statements here, just $ text\n").unwrap();
        assert_eq!(
            body,
            vec![Node::Text("no statements here, just $ text\n".to_string())]
        );
    }

    #[test]
    fn short_print_parses_to_print_node() {
        let body = parse("<b>$(title)</b>").unwrap();
        assert_eq!(body.len(), 3);
        assert_eq!(
            body[1],
            Node::Print {
                expr: Expr::Local("title".to_string())
            }
        );
    }

    #[test]
    fn if_chain_order_is_enforced() {
        parse("$if(a) x $elseif(b) y $else z $endif").unwrap();
        let err = parse("$if(a) x $else y $elseif(b) z $endif").unwrap_err();
        assert!(matches!(err, EngineError::Syntax { .. }));
    }

    #[test]
    fn mismatched_terminator_is_fatal() {
        let err = parse("$foreach(item, items) body $endif").unwrap_err();
        match err {
            EngineError::Syntax { message, .. } => {
                assert!(message.contains("$endforeach"), "message: {}", message)
            }
            other => panic!("expected syntax error, got {:?}", other),
        }
    }

    #[test]
    fn stray_terminator_is_fatal() {
        let err = parse("text $endif").unwrap_err();
        assert!(matches!(err, EngineError::Syntax { .. }));
    }

    #[test]
    fn foreach_disambiguates_by_argument_count() {
        let two = parse("$foreach(item, items)x$endforeach").unwrap();
        match &two[0] {
            Node::Foreach { item, index, .. } => {
                assert_eq!(item, "item");
                assert!(index.is_none());
            }
            other => panic!("unexpected node {:?}", other),
        }

        let three = parse("$foreach(item, i, items)x$endforeach").unwrap();
        match &three[0] {
            Node::Foreach { item, index, .. } => {
                assert_eq!(item, "item");
                assert_eq!(index.as_deref(), Some("i"));
            }
            other => panic!("unexpected node {:?}", other),
        }
    }

    #[test]
    fn render_collects_bindings_and_replacements() {
        let body =
            parse("$render('blog.post', title=t, n=3) $replace('main') X $endreplace $endrender")
                .unwrap();
        match &body[0] {
            Node::Render {
                component,
                bindings,
                replacements,
                ..
            } => {
                assert_eq!(component, &Expr::Str("blog.post".to_string()));
                assert_eq!(bindings.len(), 2);
                assert_eq!(bindings[0].0, "title");
                assert_eq!(replacements.len(), 1);
                assert_eq!(replacements[0].0, "main");
                assert_eq!(replacements[0].1, vec![Node::Text(" X ".to_string())]);
            }
            other => panic!("unexpected node {:?}", other),
        }
    }

    #[test]
    fn statements_other_than_replace_inside_render_are_fatal() {
        let err = parse("$render('a') $print(x) $endrender").unwrap_err();
        assert!(matches!(err, EngineError::Syntax { .. }));
    }

    #[test]
    fn duplicate_replacement_names_are_fatal() {
        let err =
            parse("$render('a') $replace('m') x $endreplace $replace('m') y $endreplace $endrender")
                .unwrap_err();
        assert!(matches!(err, EngineError::Syntax { .. }));
    }

    #[test]
    fn place_inside_replace_is_a_composition_error() {
        let err = parse("$render('a') $replace('m') $place('x') $endreplace $endrender")
            .unwrap_err();
        match err {
            EngineError::PlaceInReplacement { name, .. } => assert_eq!(name, "x"),
            other => panic!("expected composition error, got {:?}", other),
        }
    }

    #[test]
    fn place_inside_nested_render_replace_is_still_fatal() {
        let err = parse(
            "$render('a') $replace('m') $render('b') $replace('n') $place('x') $endreplace $endrender $endreplace $endrender",
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::PlaceInReplacement { .. }));
    }

    #[test]
    fn log_takes_exactly_one_argument() {
        parse("$log(x)").unwrap();
        let err = parse("$log(x, y)").unwrap_err();
        match err {
            EngineError::Syntax { message, .. } => {
                assert!(message.contains("exactly one"), "message: {}", message)
            }
            other => panic!("expected syntax error, got {:?}", other),
        }
    }

    #[test]
    fn expression_precedence_groups_and_over_or() {
        let body = parse("$if(a || b && c)x$endif").unwrap();
        match &body[0] {
            Node::If { branches, .. } => match &branches[0].0 {
                Expr::Binary(_, BinOp::Or, rhs) => {
                    assert!(matches!(**rhs, Expr::Binary(_, BinOp::And, _)))
                }
                other => panic!("unexpected expr {:?}", other),
            },
            other => panic!("unexpected node {:?}", other),
        }
    }

    #[test]
    fn global_paths_and_tool_calls_parse() {
        let body = parse("$print(global.site)$print(upper(name, 2))").unwrap();
        assert_eq!(
            body[0],
            Node::Print {
                expr: Expr::Global("site".to_string())
            }
        );
        match &body[1] {
            Node::Print {
                expr: Expr::ToolCall { name, args, .. },
            } => {
                assert_eq!(name, "upper");
                assert_eq!(args.len(), 2);
            }
            other => panic!("unexpected node {:?}", other),
        }
    }

    #[test]
    fn member_and_index_chains_parse() {
        let body = parse("$(post.categories[0].name)").unwrap();
        match &body[0] {
            Node::Print { expr } => match expr {
                Expr::Member(inner, field) => {
                    assert_eq!(field, "name");
                    assert!(matches!(**inner, Expr::Index(_, _)));
                }
                other => panic!("unexpected expr {:?}", other),
            },
            other => panic!("unexpected node {:?}", other),
        }
    }

    #[test]
    fn missing_paren_after_keyword_is_fatal() {
        let err = parse("$if x $endif").unwrap_err();
        match err {
            EngineError::Syntax { message, .. } => {
                assert!(message.contains("after $if"), "message: {}", message)
            }
            other => panic!("expected syntax error, got {:?}", other),
        }
    }
}
