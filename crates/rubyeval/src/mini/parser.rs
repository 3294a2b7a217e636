//! Recursive-descent parser for the MiniRuby subset.
//!
//! Like Ruby itself, the parser needs to know which names are local variables to
//! tell `x -1` (subtraction) from `puts -1` (a command call with a negative
//! argument). Callers pass the locals already defined by earlier statements, and
//! assignments add to the set as parsing proceeds.

use std::rc::Rc;

use ahash::AHashSet;

use super::{
    ast::{BinOp, Block, Expr, ExprLoc, MethodDef, Program, Rescue, StrPart, Target},
    lexer::{Keyword, Punct, StrSegment, Token, TokenKind, tokenize},
};
use crate::parse::ParseError;

/// Parses a whole document or snippet.
pub(crate) fn parse_program(source: &str, locals: impl IntoIterator<Item = String>) -> Result<Program, ParseError> {
    let tokens = tokenize(source, 0)?;
    Parser::new(source, 0, tokens, locals.into_iter().collect()).program()
}

/// How deeply expressions may nest before parsing gives up.
///
/// Each level costs a chain of recursive calls, and unoptimized builds use much
/// larger stack frames.
#[cfg(not(debug_assertions))]
const MAX_NESTING_DEPTH: u16 = 200;
#[cfg(debug_assertions)]
const MAX_NESTING_DEPTH: u16 = 35;

#[derive(Clone, Copy)]
enum AssignKind {
    Plain,
    Op(BinOp),
    OrElse,
}

struct Parser<'s> {
    source: &'s str,
    /// Offset of `source` within the document, non-zero for interpolation fragments.
    base: usize,
    tokens: Vec<Token>,
    pos: usize,
    /// End of the last consumed token, newlines excluded.
    last_end: usize,
    locals: AHashSet<String>,
    /// Set while parsing a loop condition or command arguments, where `do` belongs
    /// to the enclosing construct.
    no_do_block: bool,
    depth_remaining: u16,
}

impl<'s> Parser<'s> {
    fn new(source: &'s str, base: usize, tokens: Vec<Token>, locals: AHashSet<String>) -> Self {
        Self {
            source,
            base,
            tokens,
            pos: 0,
            last_end: base,
            locals,
            no_do_block: false,
            depth_remaining: MAX_NESTING_DEPTH,
        }
    }

    fn program(&mut self) -> Result<Program, ParseError> {
        let mut statements = Vec::new();
        loop {
            self.skip_newlines();
            if self.at_eof() {
                break;
            }
            if self.eat_punct(Punct::Semi) {
                statements.push(None);
                continue;
            }
            statements.push(Some(self.statement()?));
            if matches!(self.peek().kind, TokenKind::Newline | TokenKind::Punct(Punct::Semi)) {
                self.advance();
            } else if !self.at_eof() {
                return Err(self.unexpected());
            }
        }
        Ok(Program { statements })
    }

    // -------------------------------------------------------------------------
    // token helpers
    // -------------------------------------------------------------------------

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn peek_at(&self, ahead: usize) -> &Token {
        let index = (self.pos + ahead).min(self.tokens.len() - 1);
        &self.tokens[index]
    }

    /// Consumes the current token. The trailing `Eof` token is never consumed.
    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].clone();
        if !matches!(token.kind, TokenKind::Eof) {
            self.pos += 1;
            if !matches!(token.kind, TokenKind::Newline) {
                self.last_end = token.end;
            }
        }
        token
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    fn at_punct(&self, punct: Punct) -> bool {
        self.peek().kind == TokenKind::Punct(punct)
    }

    fn at_keyword(&self, keyword: Keyword) -> bool {
        self.peek().kind == TokenKind::Keyword(keyword)
    }

    fn eat_punct(&mut self, punct: Punct) -> bool {
        let found = self.at_punct(punct);
        if found {
            self.advance();
        }
        found
    }

    fn eat_keyword(&mut self, keyword: Keyword) -> bool {
        let found = self.at_keyword(keyword);
        if found {
            self.advance();
        }
        found
    }

    fn expect_punct(&mut self, punct: Punct, expected: &str) -> Result<(), ParseError> {
        if self.eat_punct(punct) {
            Ok(())
        } else {
            Err(self.expected(expected))
        }
    }

    fn expect_keyword(&mut self, keyword: Keyword, expected: &str) -> Result<(), ParseError> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.expected(expected))
        }
    }

    fn skip_newlines(&mut self) {
        while matches!(self.peek().kind, TokenKind::Newline) {
            self.advance();
        }
    }

    fn skip_terms(&mut self) {
        while matches!(self.peek().kind, TokenKind::Newline | TokenKind::Punct(Punct::Semi)) {
            self.advance();
        }
    }

    fn text(&self, token: &Token) -> &str {
        &self.source[token.start - self.base..token.end - self.base]
    }

    fn describe(&self, token: &Token) -> String {
        match token.kind {
            TokenKind::Eof => "end-of-input".to_owned(),
            TokenKind::Newline => "end of line".to_owned(),
            _ => format!("'{}'", self.text(token)),
        }
    }

    fn unexpected(&self) -> ParseError {
        let token = self.peek();
        self.error_at(token, format!("unexpected {}", self.describe(token)))
    }

    fn expected(&self, expected: &str) -> ParseError {
        let token = self.peek();
        self.error_at(token, format!("unexpected {}; expected {expected}", self.describe(token)))
    }

    fn error_at(&self, token: &Token, message: String) -> ParseError {
        let error = ParseError::new(message, Some(token.start));
        if matches!(token.kind, TokenKind::Eof) {
            error.at_end_of_input()
        } else {
            error
        }
    }

    /// Runs `parse` one nesting level deeper, failing once the budget is spent.
    fn descend<T>(&mut self, parse: impl FnOnce(&mut Self) -> Result<T, ParseError>) -> Result<T, ParseError> {
        let Some(remaining) = self.depth_remaining.checked_sub(1) else {
            return Err(ParseError::new("nesting too deep", Some(self.peek().start)));
        };
        self.depth_remaining = remaining;
        let result = parse(self);
        self.depth_remaining += 1;
        result
    }

    /// Runs `parse` with `do` blocks re-enabled, as inside brackets.
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> Result<T, ParseError>) -> Result<T, ParseError> {
        let outer = std::mem::replace(&mut self.no_do_block, false);
        let result = parse(self);
        self.no_do_block = outer;
        result
    }

    // -------------------------------------------------------------------------
    // statements
    // -------------------------------------------------------------------------

    /// A statement: an expression followed by any number of `if`/`unless`/`while`/`until`
    /// modifiers.
    fn statement(&mut self) -> Result<ExprLoc, ParseError> {
        let start = self.peek().start;
        let mut expr = self.and_or()?;
        loop {
            let modifier = match self.peek().kind {
                TokenKind::Keyword(keyword @ (Keyword::If | Keyword::Unless | Keyword::While | Keyword::Until)) => {
                    keyword
                }
                _ => break,
            };
            self.advance();
            let cond = Box::new(self.and_or()?);
            let body = vec![expr];
            let node = match modifier {
                Keyword::If => Expr::If {
                    cond,
                    then_body: body,
                    else_body: Vec::new(),
                },
                Keyword::Unless => Expr::If {
                    cond,
                    then_body: Vec::new(),
                    else_body: body,
                },
                Keyword::While => Expr::While {
                    cond,
                    body,
                    until: false,
                },
                _ => Expr::While { cond, body, until: true },
            };
            expr = ExprLoc::new(node, start, self.last_end);
        }
        Ok(expr)
    }

    /// Statements up to (not including) a token accepted by `is_end`.
    fn body_until(&mut self, is_end: impl Fn(&TokenKind) -> bool, expected: &str) -> Result<Vec<ExprLoc>, ParseError> {
        let mut body = Vec::new();
        loop {
            self.skip_terms();
            if is_end(&self.peek().kind) {
                return Ok(body);
            }
            if self.at_eof() {
                return Err(self.expected(expected));
            }
            body.push(self.statement()?);
            let terminated = matches!(self.peek().kind, TokenKind::Newline | TokenKind::Punct(Punct::Semi));
            if !terminated && !is_end(&self.peek().kind) {
                return Err(self.unexpected());
            }
        }
    }

    fn body(&mut self, terminators: &[Keyword]) -> Result<Vec<ExprLoc>, ParseError> {
        self.body_until(
            |kind| matches!(kind, TokenKind::Keyword(keyword) if terminators.contains(keyword)),
            "`end`",
        )
    }

    // -------------------------------------------------------------------------
    // expressions, lowest precedence first
    // -------------------------------------------------------------------------

    fn and_or(&mut self) -> Result<ExprLoc, ParseError> {
        let start = self.peek().start;
        let mut left = self.not_expr()?;
        loop {
            let is_and = if self.eat_keyword(Keyword::And) {
                true
            } else if self.eat_keyword(Keyword::Or) {
                false
            } else {
                break;
            };
            self.skip_newlines();
            let right = Box::new(self.not_expr()?);
            let left_box = Box::new(left);
            let node = if is_and {
                Expr::And(left_box, right)
            } else {
                Expr::Or(left_box, right)
            };
            left = ExprLoc::new(node, start, self.last_end);
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<ExprLoc, ParseError> {
        let start = self.peek().start;
        if self.eat_keyword(Keyword::Not) {
            let inner = self.descend(Self::not_expr)?;
            return Ok(ExprLoc::new(Expr::Not(Box::new(inner)), start, self.last_end));
        }
        self.expr()
    }

    /// Assignment level: `target = value`, `target op= value`, or a plain expression.
    fn expr(&mut self) -> Result<ExprLoc, ParseError> {
        let start = self.peek().start;
        let left = self.ternary()?;
        let kind = match self.peek().kind {
            TokenKind::Punct(Punct::Assign) => AssignKind::Plain,
            TokenKind::Punct(Punct::PlusAssign) => AssignKind::Op(BinOp::Add),
            TokenKind::Punct(Punct::MinusAssign) => AssignKind::Op(BinOp::Sub),
            TokenKind::Punct(Punct::StarAssign) => AssignKind::Op(BinOp::Mul),
            TokenKind::Punct(Punct::SlashAssign) => AssignKind::Op(BinOp::Div),
            TokenKind::Punct(Punct::OrAssign) => AssignKind::OrElse,
            _ => return Ok(left),
        };
        let target = self.target(left)?;
        self.advance();
        self.skip_newlines();
        if let Target::Local(name) = &target {
            self.locals.insert(name.clone());
        }
        let value = Box::new(self.descend(Self::expr)?);
        let node = match kind {
            AssignKind::Plain => Expr::Assign { target, value },
            AssignKind::Op(op) => Expr::OpAssign {
                target,
                op: Some(op),
                value,
            },
            AssignKind::OrElse => Expr::OpAssign { target, op: None, value },
        };
        Ok(ExprLoc::new(node, start, self.last_end))
    }

    fn target(&self, left: ExprLoc) -> Result<Target, ParseError> {
        match left.expr {
            Expr::LocalVar(name) => Ok(Target::Local(name)),
            Expr::Call {
                receiver: None,
                name,
                args,
                block: None,
            } if args.is_empty() && !name.ends_with(['?', '!']) => Ok(Target::Local(name)),
            Expr::GlobalVar(name) => Ok(Target::Global(name)),
            Expr::Const(name) => Ok(Target::Const(name)),
            Expr::Index { receiver, index } => Ok(Target::Index { receiver, index }),
            _ => Err(self.error_at(
                self.peek(),
                format!("unexpected {}; the left-hand side cannot be assigned", self.describe(self.peek())),
            )),
        }
    }

    fn ternary(&mut self) -> Result<ExprLoc, ParseError> {
        let start = self.peek().start;
        let cond = self.or_expr()?;
        if !self.eat_punct(Punct::Question) {
            return Ok(cond);
        }
        self.skip_newlines();
        let then = self.descend(Self::ternary)?;
        self.skip_newlines();
        self.expect_punct(Punct::Colon, "':' in conditional expression")?;
        self.skip_newlines();
        let otherwise = self.descend(Self::ternary)?;
        let node = Expr::If {
            cond: Box::new(cond),
            then_body: vec![then],
            else_body: vec![otherwise],
        };
        Ok(ExprLoc::new(node, start, self.last_end))
    }

    fn or_expr(&mut self) -> Result<ExprLoc, ParseError> {
        let start = self.peek().start;
        let mut left = self.and_expr()?;
        while self.eat_punct(Punct::OrOr) {
            self.skip_newlines();
            let right = self.and_expr()?;
            left = ExprLoc::new(Expr::Or(Box::new(left), Box::new(right)), start, self.last_end);
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<ExprLoc, ParseError> {
        let start = self.peek().start;
        let mut left = self.equality()?;
        while self.eat_punct(Punct::AndAnd) {
            self.skip_newlines();
            let right = self.equality()?;
            left = ExprLoc::new(Expr::And(Box::new(left), Box::new(right)), start, self.last_end);
        }
        Ok(left)
    }

    fn binary_level(
        &mut self,
        ops: &[(Punct, BinOp)],
        next: fn(&mut Self) -> Result<ExprLoc, ParseError>,
    ) -> Result<ExprLoc, ParseError> {
        let start = self.peek().start;
        let mut left = next(self)?;
        while let Some(op) = ops.iter().find(|(punct, _)| self.at_punct(*punct)).map(|(_, op)| *op) {
            self.advance();
            self.skip_newlines();
            let right = next(self)?;
            let node = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
            left = ExprLoc::new(node, start, self.last_end);
        }
        Ok(left)
    }

    fn equality(&mut self) -> Result<ExprLoc, ParseError> {
        self.binary_level(&[(Punct::Eq, BinOp::Eq), (Punct::NotEq, BinOp::NotEq)], Self::comparison)
    }

    fn comparison(&mut self) -> Result<ExprLoc, ParseError> {
        self.binary_level(
            &[
                (Punct::Lt, BinOp::Lt),
                (Punct::Gt, BinOp::Gt),
                (Punct::Le, BinOp::Le),
                (Punct::Ge, BinOp::Ge),
            ],
            Self::shift,
        )
    }

    fn shift(&mut self) -> Result<ExprLoc, ParseError> {
        self.binary_level(&[(Punct::Shovel, BinOp::Shovel)], Self::additive)
    }

    fn additive(&mut self) -> Result<ExprLoc, ParseError> {
        self.binary_level(&[(Punct::Plus, BinOp::Add), (Punct::Minus, BinOp::Sub)], Self::multiplicative)
    }

    fn multiplicative(&mut self) -> Result<ExprLoc, ParseError> {
        self.binary_level(
            &[
                (Punct::Star, BinOp::Mul),
                (Punct::Slash, BinOp::Div),
                (Punct::Percent, BinOp::Mod),
            ],
            Self::unary_minus,
        )
    }

    fn unary_minus(&mut self) -> Result<ExprLoc, ParseError> {
        let start = self.peek().start;
        if !self.eat_punct(Punct::Minus) {
            return self.pow();
        }
        let operand = self.descend(Self::unary_minus)?;
        let node = match operand.expr {
            Expr::Int(value) => Expr::Int(-value),
            Expr::Float(value) => Expr::Float(-value),
            _ => Expr::Neg(Box::new(operand)),
        };
        Ok(ExprLoc::new(node, start, self.last_end))
    }

    /// `**` binds tighter than unary minus and is right-associative: `-2 ** 2 == -4`.
    fn pow(&mut self) -> Result<ExprLoc, ParseError> {
        let start = self.peek().start;
        let base = self.bang()?;
        if !self.eat_punct(Punct::Pow) {
            return Ok(base);
        }
        self.skip_newlines();
        let exponent = self.descend(Self::unary_minus)?;
        let node = Expr::Binary {
            op: BinOp::Pow,
            left: Box::new(base),
            right: Box::new(exponent),
        };
        Ok(ExprLoc::new(node, start, self.last_end))
    }

    fn bang(&mut self) -> Result<ExprLoc, ParseError> {
        let start = self.peek().start;
        if self.eat_punct(Punct::Bang) {
            let inner = self.descend(Self::bang)?;
            return Ok(ExprLoc::new(Expr::Not(Box::new(inner)), start, self.last_end));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<ExprLoc, ParseError> {
        let start = self.peek().start;
        let mut expr = self.descend(Self::primary)?;
        loop {
            if self.eat_punct(Punct::Dot) {
                self.skip_newlines();
                let name = self.method_name()?;
                let args = self.call_args()?;
                let block = self.block()?;
                let node = Expr::Call {
                    receiver: Some(Box::new(expr)),
                    name,
                    args,
                    block,
                };
                expr = ExprLoc::new(node, start, self.last_end);
            } else if self.at_punct(Punct::LBracket) && !self.peek().space_before {
                self.advance();
                let index = self.nested(|parser| {
                    parser.skip_newlines();
                    let index = parser.expr()?;
                    parser.skip_newlines();
                    parser.expect_punct(Punct::RBracket, "']'")?;
                    Ok(index)
                })?;
                let node = Expr::Index {
                    receiver: Box::new(expr),
                    index: Box::new(index),
                };
                expr = ExprLoc::new(node, start, self.last_end);
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn method_name(&mut self) -> Result<String, ParseError> {
        let token = self.advance();
        match token.kind {
            TokenKind::Ident(name) | TokenKind::Const(name) => Ok(name),
            TokenKind::Keyword(keyword) => Ok(<&'static str>::from(keyword).to_owned()),
            _ => Err(self.error_at(
                &token,
                format!("unexpected {}; expected a method name", self.describe(&token)),
            )),
        }
    }

    // -------------------------------------------------------------------------
    // calls and blocks
    // -------------------------------------------------------------------------

    /// Arguments after a method name: parenthesized, command style, or none.
    fn call_args(&mut self) -> Result<Vec<ExprLoc>, ParseError> {
        if self.at_punct(Punct::LParen) && !self.peek().space_before {
            self.paren_args()
        } else if self.at_command_arg_start() {
            self.command_args()
        } else {
            Ok(Vec::new())
        }
    }

    fn paren_args(&mut self) -> Result<Vec<ExprLoc>, ParseError> {
        self.advance();
        self.nested(|parser| {
            parser.skip_newlines();
            let mut args = Vec::new();
            while !parser.at_punct(Punct::RParen) {
                args.push(parser.expr()?);
                parser.skip_newlines();
                if !parser.eat_punct(Punct::Comma) {
                    break;
                }
                parser.skip_newlines();
            }
            parser.expect_punct(Punct::RParen, "')'")?;
            Ok(args)
        })
    }

    /// Arguments of a call written without parentheses, e.g. `puts a, b`.
    fn command_args(&mut self) -> Result<Vec<ExprLoc>, ParseError> {
        let outer = std::mem::replace(&mut self.no_do_block, true);
        let result = self.comma_list();
        self.no_do_block = outer;
        result
    }

    fn comma_list(&mut self) -> Result<Vec<ExprLoc>, ParseError> {
        let mut args = vec![self.expr()?];
        while self.eat_punct(Punct::Comma) {
            self.skip_newlines();
            args.push(self.expr()?);
        }
        Ok(args)
    }

    /// Whether the current token starts the first argument of a parenthesis-less call.
    ///
    /// Only tokens separated from the method name by whitespace count, and `-`/`!`
    /// only when they hug their operand (`puts -x`, not `x - y`).
    fn at_command_arg_start(&self) -> bool {
        let token = self.peek();
        if !token.space_before {
            return false;
        }
        let operand_hugs = !self.peek_at(1).space_before;
        match token.kind {
            TokenKind::Int(_)
            | TokenKind::Float(_)
            | TokenKind::Str(_)
            | TokenKind::Symbol(_)
            | TokenKind::Ident(_)
            | TokenKind::Const(_)
            | TokenKind::Global(_) => true,
            TokenKind::Keyword(Keyword::Nil | Keyword::True | Keyword::False | Keyword::SelfKw) => true,
            TokenKind::Punct(Punct::LBracket | Punct::LParen) => true,
            TokenKind::Punct(Punct::Minus | Punct::Bang) => operand_hugs,
            _ => false,
        }
    }

    fn block(&mut self) -> Result<Option<Rc<Block>>, ParseError> {
        let brace = if self.at_punct(Punct::LBrace) {
            true
        } else if self.at_keyword(Keyword::Do) && !self.no_do_block {
            false
        } else {
            return Ok(None);
        };
        self.advance();
        // block parameters and variables first assigned in the block are block-local
        let outer_locals = self.locals.clone();
        let result = self.nested(|parser| parser.block_rest(brace));
        self.locals = outer_locals;
        result.map(|block| Some(Rc::new(block)))
    }

    fn block_rest(&mut self, brace: bool) -> Result<Block, ParseError> {
        let mut params = Vec::new();
        self.skip_newlines();
        if self.eat_punct(Punct::Pipe) {
            while !self.at_punct(Punct::Pipe) {
                let name = self.param_name()?;
                self.locals.insert(name.clone());
                params.push(name);
                if !self.eat_punct(Punct::Comma) {
                    break;
                }
            }
            self.expect_punct(Punct::Pipe, "'|'")?;
        }
        let body = if brace {
            let body = self.body_until(|kind| *kind == TokenKind::Punct(Punct::RBrace), "'}'")?;
            self.expect_punct(Punct::RBrace, "'}'")?;
            body
        } else {
            let body = self.body(&[Keyword::End])?;
            self.expect_keyword(Keyword::End, "`end`")?;
            body
        };
        Ok(Block { params, body })
    }

    fn param_name(&mut self) -> Result<String, ParseError> {
        let token = self.advance();
        match token.kind {
            TokenKind::Ident(name) => Ok(name),
            _ => Err(self.error_at(
                &token,
                format!("unexpected {}; expected a parameter name", self.describe(&token)),
            )),
        }
    }

    // -------------------------------------------------------------------------
    // primaries
    // -------------------------------------------------------------------------

    fn primary(&mut self) -> Result<ExprLoc, ParseError> {
        let start = self.peek().start;
        let token = self.advance();
        let expr = match token.kind {
            TokenKind::Int(value) => Expr::Int(value),
            TokenKind::Float(value) => Expr::Float(value),
            TokenKind::Str(segments) => Expr::Str(self.string_parts(segments)?),
            TokenKind::Symbol(name) => Expr::Symbol(name),
            TokenKind::Global(name) => Expr::GlobalVar(name),
            TokenKind::Const(name) => {
                if self.at_punct(Punct::LParen) && !self.peek().space_before {
                    let args = self.paren_args()?;
                    Expr::Call {
                        receiver: None,
                        name,
                        args,
                        block: None,
                    }
                } else {
                    Expr::Const(name)
                }
            }
            TokenKind::Ident(name) => self.identifier(name)?,
            TokenKind::Keyword(keyword) => self.keyword(keyword, &token)?,
            TokenKind::Punct(Punct::LParen) => self.nested(|parser| {
                let body = parser.body_until(|kind| *kind == TokenKind::Punct(Punct::RParen), "')'")?;
                parser.expect_punct(Punct::RParen, "')'")?;
                Ok(if body.is_empty() {
                    Expr::Nil
                } else {
                    Expr::Begin { body, rescue: None }
                })
            })?,
            TokenKind::Punct(Punct::LBracket) => Expr::Array(self.nested(Self::array_items)?),
            TokenKind::Punct(Punct::LBrace) => {
                return Err(ParseError::new("hash literals are not supported", Some(start)));
            }
            _ => {
                return Err(self.error_at(
                    &token,
                    format!("unexpected {}; expected an expression", self.describe(&token)),
                ));
            }
        };
        Ok(ExprLoc::new(expr, start, self.last_end))
    }

    fn identifier(&mut self, name: String) -> Result<Expr, ParseError> {
        if self.at_punct(Punct::LParen) && !self.peek().space_before {
            let args = self.paren_args()?;
            let block = self.block()?;
            return Ok(Expr::Call {
                receiver: None,
                name,
                args,
                block,
            });
        }
        if self.locals.contains(&name) {
            return Ok(Expr::LocalVar(name));
        }
        let args = if self.at_command_arg_start() {
            self.command_args()?
        } else {
            Vec::new()
        };
        let block = self.block()?;
        Ok(Expr::Call {
            receiver: None,
            name,
            args,
            block,
        })
    }

    fn array_items(&mut self) -> Result<Vec<ExprLoc>, ParseError> {
        let mut items = Vec::new();
        self.skip_newlines();
        while !self.at_punct(Punct::RBracket) {
            items.push(self.expr()?);
            self.skip_newlines();
            if !self.eat_punct(Punct::Comma) {
                break;
            }
            self.skip_newlines();
        }
        self.expect_punct(Punct::RBracket, "']'")?;
        Ok(items)
    }

    fn string_parts(&self, segments: Vec<StrSegment>) -> Result<Vec<StrPart>, ParseError> {
        segments
            .into_iter()
            .map(|segment| -> Result<StrPart, ParseError> {
                match segment {
                    StrSegment::Lit(text) => Ok(StrPart::Lit(text)),
                    StrSegment::Code { source, offset } => tokenize(&source, offset)
                        .and_then(|tokens| {
                            let mut fragment = Parser::new(&source, offset, tokens, self.locals.clone());
                            fragment.depth_remaining = self.depth_remaining;
                            fragment.body_until(|kind| *kind == TokenKind::Eof, "'}'")
                        })
                        .map(StrPart::Interp)
                        .map_err(|mut err| {
                            // The fragment's end is a closed `}`, not the end of the document.
                            err.incomplete = false;
                            err
                        }),
                }
            })
            .collect()
    }

    fn keyword(&mut self, keyword: Keyword, token: &Token) -> Result<Expr, ParseError> {
        match keyword {
            Keyword::Nil => Ok(Expr::Nil),
            Keyword::True => Ok(Expr::True),
            Keyword::False => Ok(Expr::False),
            Keyword::SelfKw => Ok(Expr::SelfRef),
            Keyword::If => self.if_rest(false),
            Keyword::Unless => self.if_rest(true),
            Keyword::While => self.while_rest(false),
            Keyword::Until => self.while_rest(true),
            Keyword::Def => self.def_rest(),
            Keyword::Begin => self.begin_rest(),
            Keyword::Return => {
                if self.at_value_end() {
                    Ok(Expr::Return(None))
                } else {
                    Ok(Expr::Return(Some(Box::new(self.expr()?))))
                }
            }
            _ => Err(self.error_at(
                token,
                format!("unexpected {}; expected an expression", self.describe(token)),
            )),
        }
    }

    /// Whether nothing follows on this statement, e.g. after a bare `return`.
    fn at_value_end(&self) -> bool {
        matches!(
            self.peek().kind,
            TokenKind::Newline
                | TokenKind::Eof
                | TokenKind::Punct(Punct::Semi | Punct::RParen | Punct::RBrace)
                | TokenKind::Keyword(
                    Keyword::End
                        | Keyword::If
                        | Keyword::Unless
                        | Keyword::While
                        | Keyword::Until
                        | Keyword::Else
                        | Keyword::Elsif
                        | Keyword::Rescue
                )
        )
    }

    fn if_rest(&mut self, negate: bool) -> Result<Expr, ParseError> {
        let cond_start = self.peek().start;
        let mut cond = self.expr()?;
        if negate {
            cond = ExprLoc::new(Expr::Not(Box::new(cond)), cond_start, self.last_end);
        }
        self.eat_keyword(Keyword::Then);
        let then_body = self.body(&[Keyword::Elsif, Keyword::Else, Keyword::End])?;
        let else_body = if self.at_keyword(Keyword::Elsif) {
            let start = self.advance().start;
            let nested = self.if_rest(false)?;
            vec![ExprLoc::new(nested, start, self.last_end)]
        } else if self.eat_keyword(Keyword::Else) {
            let body = self.body(&[Keyword::End])?;
            self.expect_keyword(Keyword::End, "`end`")?;
            body
        } else {
            self.expect_keyword(Keyword::End, "`end`")?;
            Vec::new()
        };
        Ok(Expr::If {
            cond: Box::new(cond),
            then_body,
            else_body,
        })
    }

    fn while_rest(&mut self, until: bool) -> Result<Expr, ParseError> {
        let outer = std::mem::replace(&mut self.no_do_block, true);
        let cond = self.expr();
        self.no_do_block = outer;
        let cond = cond?;
        self.eat_keyword(Keyword::Do);
        let body = self.body(&[Keyword::End])?;
        self.expect_keyword(Keyword::End, "`end`")?;
        Ok(Expr::While {
            cond: Box::new(cond),
            body,
            until,
        })
    }

    fn def_rest(&mut self) -> Result<Expr, ParseError> {
        let token = self.advance();
        let name = match token.kind {
            TokenKind::Ident(name) | TokenKind::Const(name) => name,
            _ => {
                return Err(self.error_at(
                    &token,
                    format!("unexpected {}; expected a method name", self.describe(&token)),
                ));
            }
        };

        let mut params = Vec::new();
        if self.at_punct(Punct::LParen) {
            self.advance();
            self.skip_newlines();
            while !self.at_punct(Punct::RParen) {
                params.push(self.param_name()?);
                self.skip_newlines();
                if !self.eat_punct(Punct::Comma) {
                    break;
                }
                self.skip_newlines();
            }
            self.expect_punct(Punct::RParen, "')'")?;
        } else {
            while matches!(self.peek().kind, TokenKind::Ident(_)) {
                params.push(self.param_name()?);
                if !self.eat_punct(Punct::Comma) {
                    break;
                }
            }
        }

        // a method body only sees its parameters
        let outer_locals = std::mem::replace(&mut self.locals, params.iter().cloned().collect());
        let body = self.nested(|parser| parser.body(&[Keyword::End]));
        self.locals = outer_locals;
        let body = body?;
        self.expect_keyword(Keyword::End, "`end`")?;
        Ok(Expr::Def(Rc::new(MethodDef { name, params, body })))
    }

    fn begin_rest(&mut self) -> Result<Expr, ParseError> {
        let body = self.body(&[Keyword::Rescue, Keyword::End])?;
        let rescue = if self.eat_keyword(Keyword::Rescue) {
            // exception class lists are accepted, every StandardError is rescued
            while matches!(self.peek().kind, TokenKind::Const(_)) {
                self.advance();
                if !self.eat_punct(Punct::Comma) {
                    break;
                }
            }
            let binding = if self.eat_punct(Punct::FatArrow) {
                let name = self.param_name()?;
                self.locals.insert(name.clone());
                Some(name)
            } else {
                None
            };
            let body = self.body(&[Keyword::End])?;
            Some(Rescue { binding, body })
        } else {
            None
        };
        self.expect_keyword(Keyword::End, "`end`")?;
        Ok(Expr::Begin { body, rescue })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn statements(source: &str) -> Vec<Option<ExprLoc>> {
        parse_program(source, Vec::new()).unwrap().statements
    }

    fn spans(source: &str) -> Vec<&str> {
        statements(source)
            .iter()
            .flatten()
            .map(|stmt| &source[stmt.start..stmt.end])
            .collect()
    }

    #[test]
    fn statement_ranges_exclude_comments_and_blank_lines() {
        let source = "x = 1 # one\n\n\ny = x +\n  2\n";
        assert_eq!(spans(source), vec!["x = 1", "y = x +\n  2"]);
    }

    #[test]
    fn multi_line_constructs_are_single_statements() {
        let source = "def add(a, b)\n  a + b\nend\n3.times do |i|\n  puts i\nend\nadd(1, 2)";
        assert_eq!(
            spans(source),
            vec!["def add(a, b)\n  a + b\nend", "3.times do |i|\n  puts i\nend", "add(1, 2)"]
        );
    }

    #[test]
    fn empty_statements_between_semicolons_are_kept_as_none() {
        let parsed = statements("a = 1;;b = 2");
        assert_eq!(parsed.len(), 3);
        assert!(parsed[1].is_none());
    }

    #[test]
    fn command_call_with_negative_argument() {
        let parsed = statements("puts -1");
        let Some(Some(ExprLoc {
            expr: Expr::Call { name, args, .. },
            ..
        })) = parsed.first()
        else {
            panic!("expected a call, got {parsed:?}");
        };
        assert_eq!(name, "puts");
        assert_eq!(args[0].expr, Expr::Int(-1));
    }

    #[test]
    fn local_followed_by_minus_is_subtraction() {
        let parsed = parse_program("x -1", vec!["x".to_owned()]).unwrap().statements;
        assert!(matches!(
            parsed[0].as_ref().map(|stmt| &stmt.expr),
            Some(Expr::Binary { op: BinOp::Sub, .. })
        ));
    }

    #[test]
    fn modifier_if_wraps_the_statement() {
        let parsed = statements("puts 1 if true");
        assert!(matches!(parsed[0].as_ref().map(|stmt| &stmt.expr), Some(Expr::If { .. })));
    }

    #[test]
    fn unterminated_def_is_an_error() {
        let err = parse_program("def foo\n  1\n", Vec::new()).unwrap_err();
        assert_eq!(err.message, "unexpected end-of-input; expected `end`");
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let err = parse_program("x = \"abc", Vec::new()).unwrap_err();
        assert_eq!(err.offset, Some(4));
        assert!(err.incomplete);
    }

    #[test]
    fn errors_before_the_end_are_not_incomplete() {
        assert!(parse_program("def foo\n", Vec::new()).unwrap_err().incomplete);
        assert!(!parse_program("end", Vec::new()).unwrap_err().incomplete);
        assert!(!parse_program("x = (1 + )", Vec::new()).unwrap_err().incomplete);
    }

    #[test]
    fn broken_interpolation_is_not_incomplete() {
        let err = parse_program("\"#{1 +}\"", Vec::new()).unwrap_err();
        assert!(!err.incomplete);
    }

    #[test]
    fn nesting_within_budget_parses() {
        let depth = usize::from(MAX_NESTING_DEPTH) - 5;
        let source = format!("{}1{}", "[".repeat(depth), "]".repeat(depth));
        assert_eq!(spans(&source), vec![source.as_str()]);
    }

    #[test]
    fn nesting_past_budget_is_an_error() {
        let depth = usize::from(MAX_NESTING_DEPTH) + 1;
        let sources = [
            format!("x = {}1{}", "[".repeat(depth), "]".repeat(depth)),
            format!("x = {}1{}", "(".repeat(depth), ")".repeat(depth)),
            format!("x = {}1", "-".repeat(depth)),
            format!("x = {}1", "!".repeat(depth)),
            format!("{}1", "not ".repeat(depth)),
            format!("{}1", "x = ".repeat(depth)),
            format!("{}1{}", "if true\n".repeat(depth), "\nend".repeat(depth)),
        ];
        for source in sources {
            let err = parse_program(&source, Vec::new()).unwrap_err();
            assert_eq!(err.message, "nesting too deep", "{source}");
        }
    }

    #[test]
    fn interpolation_shares_the_nesting_budget() {
        let depth = usize::from(MAX_NESTING_DEPTH) / 2 + 1;
        let inner = format!("{}1{}", "[".repeat(depth), "]".repeat(depth));
        let source = format!("{}\"#{{{inner}}}\"{}", "[".repeat(depth), "]".repeat(depth));
        let err = parse_program(&source, Vec::new()).unwrap_err();
        assert_eq!(err.message, "nesting too deep");
    }

    #[test]
    fn end_marker_stops_the_program() {
        assert_eq!(spans("a = 1\n__END__\nfoo bar baz"), vec!["a = 1"]);
        assert_eq!(spans("__END__\r\n)))"), Vec::<&str>::new());
        assert_eq!(spans("__END__x = 1"), vec!["__END__x = 1"]);
        assert_eq!(spans("  __END__\n"), vec!["__END__"]);
    }
}
