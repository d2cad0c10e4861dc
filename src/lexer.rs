use crate::error::EngineError;

/// Statement keywords recognized after a `$`. Any other `$word` run is
/// literal text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Keyword {
    Print,
    Log,
    If,
    ElseIf,
    Else,
    EndIf,
    Foreach,
    EndForeach,
    Render,
    EndRender,
    Replace,
    EndReplace,
    Place,
    Include,
}

impl Keyword {
    fn from_ident(word: &str) -> Option<Keyword> {
        match word {
            "print" => Some(Keyword::Print),
            "log" => Some(Keyword::Log),
            "if" => Some(Keyword::If),
            "elseif" => Some(Keyword::ElseIf),
            "else" => Some(Keyword::Else),
            "endif" => Some(Keyword::EndIf),
            "foreach" => Some(Keyword::Foreach),
            "endforeach" => Some(Keyword::EndForeach),
            "render" => Some(Keyword::Render),
            "endrender" => Some(Keyword::EndRender),
            "replace" => Some(Keyword::Replace),
            "endreplace" => Some(Keyword::EndReplace),
            "place" => Some(Keyword::Place),
            "include" => Some(Keyword::Include),
            _ => None,
        }
    }

    pub(crate) fn takes_args(self) -> bool {
        !matches!(
            self,
            Keyword::Else
                | Keyword::EndIf
                | Keyword::EndForeach
                | Keyword::EndRender
                | Keyword::EndReplace
        )
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Keyword::Print => "$print",
            Keyword::Log => "$log",
            Keyword::If => "$if",
            Keyword::ElseIf => "$elseif",
            Keyword::Else => "$else",
            Keyword::EndIf => "$endif",
            Keyword::Foreach => "$foreach",
            Keyword::EndForeach => "$endforeach",
            Keyword::Render => "$render",
            Keyword::EndRender => "$endrender",
            Keyword::Replace => "$replace",
            Keyword::EndReplace => "$endreplace",
            Keyword::Place => "$place",
            Keyword::Include => "$include",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Text(String),
    Statement(Keyword),
    /// The `$` of a `$(...)` short print.
    ShortPrint,

    Ident(String),
    Str(String),
    Number(f64),

    EqEqEq,
    EqEq,
    NotEqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Bang,

    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Assign,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub line: usize,
}

enum Opener {
    Short,
    Stmt(Keyword, usize),
}

/// Two-mode tokenizer: literal text until a recognized `$` opener, then
/// expression tokens until the statement's argument list closes at paren
/// depth zero. Lines are 1-based and counted across both modes.
pub(crate) struct Lexer<'a> {
    input: &'a str,
    cursor: usize,
    line: usize,
    /// Paren depth while inside a statement argument list, `None` in
    /// text mode.
    depth: Option<usize>,
    /// Line where the current statement opened, for unterminated
    /// argument list diagnostics.
    stmt_line: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            cursor: 0,
            line: 1,
            depth: None,
            stmt_line: 1,
        }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.cursor..]
    }

    pub fn next_token(&mut self) -> Result<Option<Token>, EngineError> {
        if self.depth.is_some() {
            self.next_expr_token()
        } else if self.cursor >= self.input.len() {
            Ok(None)
        } else {
            self.next_text_token()
        }
    }

    fn next_text_token(&mut self) -> Result<Option<Token>, EngineError> {
        let start = self.cursor;
        let start_line = self.line;
        let mut search = self.cursor;

        loop {
            match self.input[search..].find('$') {
                Some(off) => {
                    let pos = search + off;
                    match self.opener_at(pos) {
                        Some(_) if pos > start => {
                            let text = self.input[start..pos].to_string();
                            self.line += text.matches('\n').count();
                            self.cursor = pos;
                            return Ok(Some(Token {
                                kind: TokenKind::Text(text),
                                line: start_line,
                            }));
                        }
                        Some(opener) => return Ok(Some(self.begin_statement(opener))),
                        None => search = pos + 1,
                    }
                }
                None => {
                    let text = self.input[start..].to_string();
                    self.cursor = self.input.len();
                    if text.is_empty() {
                        return Ok(None);
                    }
                    self.line += text.matches('\n').count();
                    return Ok(Some(Token {
                        kind: TokenKind::Text(text),
                        line: start_line,
                    }));
                }
            }
        }
    }

    /// Classify the `$` at `pos`: short print, statement keyword, or
    /// plain text.
    fn opener_at(&self, pos: usize) -> Option<Opener> {
        let rest = &self.input[pos + 1..];
        let first = rest.chars().next()?;
        if first == '(' {
            return Some(Opener::Short);
        }
        if !first.is_ascii_alphabetic() {
            return None;
        }
        let word: String = rest
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
            .collect();
        Keyword::from_ident(&word).map(|kw| Opener::Stmt(kw, word.len()))
    }

    fn begin_statement(&mut self, opener: Opener) -> Token {
        let line = self.line;
        match opener {
            Opener::Short => {
                self.cursor += 1;
                self.depth = Some(0);
                self.stmt_line = line;
                Token {
                    kind: TokenKind::ShortPrint,
                    line,
                }
            }
            Opener::Stmt(kw, word_len) => {
                self.cursor += 1 + word_len;
                if kw.takes_args() && self.remaining().starts_with('(') {
                    self.depth = Some(0);
                    self.stmt_line = line;
                }
                Token {
                    kind: TokenKind::Statement(kw),
                    line,
                }
            }
        }
    }

    fn next_expr_token(&mut self) -> Result<Option<Token>, EngineError> {
        // Skip whitespace between argument tokens, keeping line counts.
        while let Some(c) = self.remaining().chars().next() {
            if !c.is_whitespace() {
                break;
            }
            if c == '\n' {
                self.line += 1;
            }
            self.cursor += c.len_utf8();
        }

        let rest = self.remaining();
        if rest.is_empty() {
            return Err(EngineError::Syntax {
                message: "unterminated statement argument list".to_string(),
                line: self.stmt_line,
            });
        }

        let line = self.line;
        let multi = [
            ("===", TokenKind::EqEqEq),
            ("!==", TokenKind::NotEqEq),
            ("==", TokenKind::EqEq),
            ("!=", TokenKind::NotEq),
            ("<=", TokenKind::Le),
            (">=", TokenKind::Ge),
            ("&&", TokenKind::AndAnd),
            ("||", TokenKind::OrOr),
        ];
        for (pat, kind) in multi {
            if rest.starts_with(pat) {
                self.cursor += pat.len();
                return Ok(Some(Token { kind, line }));
            }
        }

        let first = match rest.chars().next() {
            Some(c) => c,
            None => return Ok(None),
        };

        let single = match first {
            '(' => {
                self.depth = self.depth.map(|d| d + 1);
                Some(TokenKind::LParen)
            }
            ')' => {
                match self.depth.map(|d| d.saturating_sub(1)) {
                    Some(0) | None => self.depth = None,
                    Some(d) => self.depth = Some(d),
                }
                Some(TokenKind::RParen)
            }
            '[' => Some(TokenKind::LBracket),
            ']' => Some(TokenKind::RBracket),
            ',' => Some(TokenKind::Comma),
            '.' => Some(TokenKind::Dot),
            '<' => Some(TokenKind::Lt),
            '>' => Some(TokenKind::Gt),
            '!' => Some(TokenKind::Bang),
            '=' => Some(TokenKind::Assign),
            _ => None,
        };
        if let Some(kind) = single {
            self.cursor += 1;
            return Ok(Some(Token { kind, line }));
        }

        if first == '\'' || first == '"' {
            return self.lex_string(first).map(Some);
        }

        if first.is_ascii_digit() {
            let lit: String = rest
                .chars()
                .take_while(|c| c.is_ascii_digit() || *c == '.')
                .collect();
            let number = lit.parse::<f64>().map_err(|_| EngineError::Syntax {
                message: format!("invalid number literal '{}'", lit),
                line,
            })?;
            self.cursor += lit.len();
            return Ok(Some(Token {
                kind: TokenKind::Number(number),
                line,
            }));
        }

        if first.is_ascii_alphabetic() || first == '_' {
            let ident: String = rest
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
                .collect();
            self.cursor += ident.len();
            return Ok(Some(Token {
                kind: TokenKind::Ident(ident),
                line,
            }));
        }

        Err(EngineError::Syntax {
            message: format!("unexpected character '{}' in statement arguments", first),
            line,
        })
    }

    fn lex_string(&mut self, quote: char) -> Result<Token, EngineError> {
        let line = self.line;
        let mut value = String::new();
        let mut consumed = 1;
        let mut chars = self.remaining()[1..].chars();

        while let Some(c) = chars.next() {
            if c == quote {
                self.cursor += consumed + 1;
                return Ok(Token {
                    kind: TokenKind::Str(value),
                    line,
                });
            }
            if c == '\\' {
                consumed += 1;
                if let Some(esc) = chars.next() {
                    consumed += esc.len_utf8();
                    match esc {
                        'n' => value.push('\n'),
                        't' => value.push('\t'),
                        _ => value.push(esc),
                    }
                }
            } else {
                if c == '\n' {
                    self.line += 1;
                }
                consumed += c.len_utf8();
                value.push(c);
            }
        }

        Err(EngineError::Syntax {
            message: "unterminated string literal".to_string(),
            line,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(input);
        let mut out = Vec::new();
        while let Some(token) = lexer.next_token().expect("lex failure") {
            out.push(token.kind);
        }
        out
    }

    #[test]
    fn plain_text_is_a_single_token() {
        assert_eq!(
            tokens("hello $world\n"),
            vec![TokenKind::Text("hello $world\n".to_string())]
        );
    }

    #[test]
    fn short_print_tokenizes_expression() {
        assert_eq!(
            tokens("<b>$(title)</b>"),
            vec![
                TokenKind::Text("<b>".to_string()),
                TokenKind::ShortPrint,
                TokenKind::LParen,
                TokenKind::Ident("title".to_string()),
                TokenKind::RParen,
                TokenKind::Text("</b>".to_string()),
            ]
        );
    }

    #[test]
    fn unknown_dollar_word_stays_literal() {
        assert_eq!(
            tokens("$printer is fine"),
            vec![TokenKind::Text("$printer is fine".to_string())]
        );
    }

    #[test]
    fn statement_keywords_are_recognized() {
        let toks = tokens("$if(x)$else$endif");
        assert_eq!(toks[0], TokenKind::Statement(Keyword::If));
        assert!(toks.contains(&TokenKind::Statement(Keyword::Else)));
        assert!(toks.contains(&TokenKind::Statement(Keyword::EndIf)));
    }

    #[test]
    fn nested_parens_stay_in_argument_mode() {
        let toks = tokens("$print((a))x");
        assert_eq!(
            toks,
            vec![
                TokenKind::Statement(Keyword::Print),
                TokenKind::LParen,
                TokenKind::LParen,
                TokenKind::Ident("a".to_string()),
                TokenKind::RParen,
                TokenKind::RParen,
                TokenKind::Text("x".to_string()),
            ]
        );
    }

    #[test]
    fn unterminated_arguments_report_opening_line() {
        let mut lexer = Lexer::new("line one\n$print(title");
        let mut err = None;
        loop {
            match lexer.next_token() {
                Ok(Some(_)) => continue,
                Ok(None) => break,
                Err(e) => {
                    err = Some(e);
                    break;
                }
            }
        }
        match err {
            Some(EngineError::Syntax { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected syntax error, got {:?}", other),
        }
    }

    #[test]
    fn operators_lex_longest_first() {
        let toks = tokens("$if(a === b && c != d)$endif");
        assert!(toks.contains(&TokenKind::EqEqEq));
        assert!(toks.contains(&TokenKind::AndAnd));
        assert!(toks.contains(&TokenKind::NotEq));
    }

    #[test]
    fn string_escapes() {
        let toks = tokens("$print('a\\nb')");
        assert!(toks.contains(&TokenKind::Str("a\nb".to_string())));
    }

    #[test]
    fn line_numbers_count_across_text_runs() {
        let mut lexer = Lexer::new("a\nb\n$print(x)");
        let first = lexer.next_token().unwrap().unwrap();
        assert_eq!(first.line, 1);
        let stmt = lexer.next_token().unwrap().unwrap();
        assert_eq!(stmt.kind, TokenKind::Statement(Keyword::Print));
        assert_eq!(stmt.line, 3);
    }
}
