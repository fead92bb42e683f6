//! Formula parser
//!
//! A recursive descent parser for spreadsheet formulas with proper operator
//! precedence. Syntax errors never fail the call: they produce a
//! [`FormulaBody::Malformed`] marker so one bad formula cannot block a batch.
//! Only pathological nesting is fatal. Tree height is tracked while parsing,
//! so an overly deep tree is refused before it is built.

use std::str::FromStr;
use std::sync::Arc;

use gridcalc_core::{CalculationSettings, CellAddress, CellError, CellRange, CellValue, MAX_ROWS};
use rust_decimal::Decimal;

use crate::ast::{BinaryOperator, Expr, SheetTarget, UnaryOperator};
use crate::error::{FormulaError, FormulaResult};
use crate::reference::{extract_references, Reference};

/// Resource limits applied while parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseLimits {
    /// Maximum nesting of parentheses, function calls and prefix operators
    pub max_nesting_depth: usize,
    /// Maximum height of the resulting tree, bounding long operator chains
    pub max_expression_depth: usize,
}

impl Default for ParseLimits {
    fn default() -> Self {
        Self::from(&CalculationSettings::default())
    }
}

impl From<&CalculationSettings> for ParseLimits {
    fn from(settings: &CalculationSettings) -> Self {
        Self {
            max_nesting_depth: settings.max_nesting_depth,
            max_expression_depth: 1024,
        }
    }
}

/// A formula after parsing
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFormula {
    /// Text as entered
    pub text: Arc<str>,
    pub body: FormulaBody,
    /// References read by the formula, deduplicated in first-seen order
    pub references: Vec<Reference>,
}

impl ParsedFormula {
    pub fn expr(&self) -> Option<&Expr> {
        match &self.body {
            FormulaBody::Expr(expr) => Some(expr),
            FormulaBody::Malformed(_) => None,
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self.body, FormulaBody::Malformed(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FormulaBody {
    Expr(Expr),
    /// Permanent parse-error marker; evaluates to `#ERROR!`
    Malformed(ParseFailure),
}

/// Why a formula could not be parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFailure {
    pub message: String,
    /// Byte offset into the formula text
    pub offset: usize,
}

/// Parse a formula; the leading `=` is optional
///
/// # Example
/// ```rust
/// use gridcalc_formula::{parse, ParseLimits};
///
/// let parsed = parse("=SUM(A1:A10)*2", &ParseLimits::default()).unwrap();
/// assert!(!parsed.is_malformed());
/// assert_eq!(parsed.references.len(), 1);
///
/// let broken = parse("=SUM(A1", &ParseLimits::default()).unwrap();
/// assert!(broken.is_malformed());
/// ```
pub fn parse(text: &str, limits: &ParseLimits) -> FormulaResult<ParsedFormula> {
    let trimmed = text.trim_start();
    let (body_text, base) = match trimmed.strip_prefix('=') {
        Some(rest) => (rest, text.len() - rest.len()),
        None => (trimmed, text.len() - trimmed.len()),
    };

    let body = match FormulaParser::new(body_text, base, limits).parse_formula() {
        Ok(node) => FormulaBody::Expr(node.expr),
        Err(Failure::Syntax(failure)) => {
            tracing::debug!(formula = text, offset = failure.offset, "malformed formula: {}", failure.message);
            FormulaBody::Malformed(failure)
        }
        Err(Failure::Fatal(err)) => return Err(err),
    };

    let references = match &body {
        FormulaBody::Expr(expr) => extract_references(expr),
        FormulaBody::Malformed(_) => Vec::new(),
    };

    Ok(ParsedFormula {
        text: Arc::from(text),
        body,
        references,
    })
}

/// A parsed subtree and its height
struct Node {
    expr: Expr,
    height: usize,
}

impl Node {
    fn leaf(expr: Expr) -> Self {
        Self { expr, height: 1 }
    }
}

enum Failure {
    Syntax(ParseFailure),
    Fatal(FormulaError),
}

type ParseResult<T> = std::result::Result<T, Failure>;

/// Token types
#[derive(Debug, Clone, PartialEq)]
enum Token {
    // Literals
    Number(Decimal),
    Text(String),
    Boolean(bool),
    Error(CellError),

    // Identifiers and references
    Identifier(String), // Function name, defined name or column letters
    CellRef(String),    // A1, $A$1
    SheetRef(String),   // Sheet1! or 'Sheet Name'!

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    Percent,
    Ampersand,
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
    Colon,
    Comma,

    // Delimiters
    LeftParen,
    RightParen,

    /// Unscannable input, with a description
    Invalid(String),

    Eof,
}

struct FormulaParser<'a> {
    input: &'a str,
    /// Offset of `input` within the original text
    base: usize,
    pos: usize,
    current: Token,
    token_start: usize,
    depth: usize,
    limits: &'a ParseLimits,
}

impl<'a> FormulaParser<'a> {
    fn new(input: &'a str, base: usize, limits: &'a ParseLimits) -> Self {
        let mut parser = Self {
            input,
            base,
            pos: 0,
            current: Token::Eof,
            token_start: 0,
            depth: 0,
            limits,
        };
        parser.advance_token();
        parser
    }

    fn parse_formula(&mut self) -> ParseResult<Node> {
        if self.current == Token::Eof {
            return Err(self.syntax("empty formula"));
        }
        let node = self.parse_expression()?;
        if self.current != Token::Eof {
            return Err(self.syntax(format!("unexpected {}", describe(&self.current))));
        }
        Ok(node)
    }

    // === Token scanning ===

    fn advance_token(&mut self) {
        self.skip_whitespace();
        self.token_start = self.pos;
        self.current = self.scan_token();
    }

    fn scan_token(&mut self) -> Token {
        let Some(c) = self.peek_char() else {
            return Token::Eof;
        };

        let single = match c {
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '*' => Some(Token::Star),
            '/' => Some(Token::Slash),
            '^' => Some(Token::Caret),
            '%' => Some(Token::Percent),
            '&' => Some(Token::Ampersand),
            ':' => Some(Token::Colon),
            ',' => Some(Token::Comma),
            '(' => Some(Token::LeftParen),
            ')' => Some(Token::RightParen),
            '=' => Some(Token::Equal),
            _ => None,
        };
        if let Some(token) = single {
            self.advance();
            return token;
        }

        match c {
            '<' => {
                self.advance();
                match self.peek_char() {
                    Some('=') => {
                        self.advance();
                        Token::LessEqual
                    }
                    Some('>') => {
                        self.advance();
                        Token::NotEqual
                    }
                    _ => Token::LessThan,
                }
            }
            '>' => {
                self.advance();
                if self.peek_char() == Some('=') {
                    self.advance();
                    Token::GreaterEqual
                } else {
                    Token::GreaterThan
                }
            }
            '"' => self.scan_string(),
            '\'' => self.scan_quoted_sheet(),
            '#' => self.scan_error(),
            c if c.is_ascii_digit()
                || (c == '.' && self.peek_char_at(1).is_some_and(|c| c.is_ascii_digit())) =>
            {
                self.scan_number()
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => self.scan_identifier_or_ref(),
            other => {
                self.advance();
                Token::Invalid(format!("unexpected character '{other}'"))
            }
        }
    }

    fn scan_string(&mut self) -> Token {
        self.advance(); // opening quote

        let mut s = String::new();
        loop {
            match self.peek_char() {
                Some('"') if self.peek_char_at(1) == Some('"') => {
                    s.push('"');
                    self.advance();
                    self.advance();
                }
                Some('"') => {
                    self.advance();
                    return Token::Text(s);
                }
                Some(c) => {
                    s.push(c);
                    self.advance();
                }
                None => return Token::Invalid("unterminated string".into()),
            }
        }
    }

    fn scan_quoted_sheet(&mut self) -> Token {
        self.advance(); // opening quote

        let mut name = String::new();
        loop {
            match self.peek_char() {
                Some('\'') if self.peek_char_at(1) == Some('\'') => {
                    name.push('\'');
                    self.advance();
                    self.advance();
                }
                Some('\'') => {
                    self.advance();
                    break;
                }
                Some(c) => {
                    name.push(c);
                    self.advance();
                }
                None => return Token::Invalid("unterminated sheet name".into()),
            }
        }

        if self.peek_char() == Some('!') {
            self.advance();
            Token::SheetRef(name)
        } else {
            Token::Invalid(format!("expected '!' after sheet name '{name}'"))
        }
    }

    fn scan_error(&mut self) -> Token {
        let start = self.pos;
        self.advance(); // '#'
        while self
            .peek_char()
            .is_some_and(|c| c.is_ascii_alphanumeric() || matches!(c, '!' | '/' | '?'))
        {
            self.advance();
        }
        let text = &self.input[start..self.pos];
        match CellError::parse(text) {
            Some(err) => Token::Error(err),
            None => Token::Invalid(format!("unknown error literal '{text}'")),
        }
    }

    fn scan_number(&mut self) -> Token {
        let start = self.pos;

        while self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        if self.peek_char() == Some('.') {
            self.advance();
            while self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }

        let mut scientific = false;
        if self.peek_char().is_some_and(|c| c == 'e' || c == 'E') {
            let sign = self.peek_char_at(1).is_some_and(|c| c == '+' || c == '-');
            let digit_at = if sign { 2 } else { 1 };
            if self.peek_char_at(digit_at).is_some_and(|c| c.is_ascii_digit()) {
                scientific = true;
                for _ in 0..digit_at {
                    self.advance();
                }
                while self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
                    self.advance();
                }
            }
        }

        let text = &self.input[start..self.pos];
        let parsed = if scientific {
            Decimal::from_scientific(text)
        } else {
            Decimal::from_str(text)
        };
        match parsed {
            Ok(n) => Token::Number(n),
            Err(_) => Token::Invalid(format!("number '{text}' out of range")),
        }
    }

    fn scan_identifier_or_ref(&mut self) -> Token {
        let start = self.pos;
        while self
            .peek_char()
            .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '$' || c == '.')
        {
            self.advance();
        }
        let text = &self.input[start..self.pos];

        if self.peek_char() == Some('!') {
            self.advance();
            return Token::SheetRef(text.to_string());
        }

        // `$` only appears in references
        if text.contains('$') && !is_cell_reference(text) && column_letters(text).is_none() {
            return Token::Invalid(format!("invalid reference '{text}'"));
        }

        // TRUE( and FALSE( are function calls
        let next_is_paren = self.next_non_space() == Some('(');
        if !next_is_paren {
            if text.eq_ignore_ascii_case("TRUE") {
                return Token::Boolean(true);
            }
            if text.eq_ignore_ascii_case("FALSE") {
                return Token::Boolean(false);
            }
            // LOG10( is a function, LOG10 alone is a cell
            if is_cell_reference(text) {
                return Token::CellRef(text.to_string());
            }
        }

        Token::Identifier(text.to_string())
    }

    // === Helper methods ===

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_char_at(&self, offset: usize) -> Option<char> {
        self.input[self.pos..].chars().nth(offset)
    }

    fn next_non_space(&self) -> Option<char> {
        self.input[self.pos..].chars().find(|c| !c.is_whitespace())
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek_char() {
            self.pos += c.len_utf8();
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek_char().is_some_and(char::is_whitespace) {
            self.advance();
        }
    }

    fn consume(&mut self) -> Token {
        let token = std::mem::replace(&mut self.current, Token::Eof);
        self.advance_token();
        token
    }

    fn expect(&mut self, expected: Token) -> ParseResult<()> {
        if self.current == expected {
            self.consume();
            Ok(())
        } else {
            Err(self.syntax(format!(
                "expected {}, found {}",
                describe(&expected),
                describe(&self.current)
            )))
        }
    }

    fn syntax(&self, message: impl Into<String>) -> Failure {
        let message = match &self.current {
            Token::Invalid(why) => why.clone(),
            _ => message.into(),
        };
        Failure::Syntax(ParseFailure {
            message,
            offset: self.base + self.token_start,
        })
    }

    fn enter(&mut self, levels: usize) -> ParseResult<()> {
        self.depth += levels;
        if self.depth > self.limits.max_nesting_depth {
            return Err(Failure::Fatal(FormulaError::NestingTooDeep {
                limit: self.limits.max_nesting_depth,
                offset: self.base + self.token_start,
            }));
        }
        Ok(())
    }

    fn leave(&mut self, levels: usize) {
        self.depth -= levels;
    }

    /// Height of a new parent node, refused past `max_expression_depth`
    fn grow(&self, height: usize) -> ParseResult<usize> {
        if height > self.limits.max_expression_depth {
            return Err(Failure::Fatal(FormulaError::NestingTooDeep {
                limit: self.limits.max_expression_depth,
                offset: self.base + self.token_start,
            }));
        }
        Ok(height)
    }

    fn binary(&self, op: BinaryOperator, left: Node, right: Node) -> ParseResult<Node> {
        let height = self.grow(1 + left.height.max(right.height))?;
        Ok(Node {
            expr: binary(op, left.expr, right.expr),
            height,
        })
    }

    fn unary(&self, op: UnaryOperator, operand: Node) -> ParseResult<Node> {
        let height = self.grow(1 + operand.height)?;
        Ok(Node {
            expr: Expr::UnaryOp {
                op,
                operand: Box::new(operand.expr),
            },
            height,
        })
    }

    // === Expression parsing with precedence ===
    // Precedence (lowest to highest):
    // 1. Comparison: =, <>, <, <=, >, >=
    // 2. Concatenation: &
    // 3. Addition/Subtraction: +, -
    // 4. Multiplication/Division: *, /
    // 5. Exponentiation: ^ (right associative)
    // 6. Percent (postfix)
    // 7. Prefix sign: -, +
    // 8. Primary: literals, references, function calls, parentheses

    fn parse_expression(&mut self) -> ParseResult<Node> {
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> ParseResult<Node> {
        let mut left = self.parse_concatenation()?;

        loop {
            let op = match self.current {
                Token::Equal => BinaryOperator::Equal,
                Token::NotEqual => BinaryOperator::NotEqual,
                Token::LessThan => BinaryOperator::LessThan,
                Token::LessEqual => BinaryOperator::LessEqual,
                Token::GreaterThan => BinaryOperator::GreaterThan,
                Token::GreaterEqual => BinaryOperator::GreaterEqual,
                _ => break,
            };
            self.consume();
            let right = self.parse_concatenation()?;
            left = self.binary(op, left, right)?;
        }

        Ok(left)
    }

    fn parse_concatenation(&mut self) -> ParseResult<Node> {
        let mut left = self.parse_additive()?;

        while self.current == Token::Ampersand {
            self.consume();
            let right = self.parse_additive()?;
            left = self.binary(BinaryOperator::Concat, left, right)?;
        }

        Ok(left)
    }

    fn parse_additive(&mut self) -> ParseResult<Node> {
        let mut left = self.parse_multiplicative()?;

        loop {
            let op = match self.current {
                Token::Plus => BinaryOperator::Add,
                Token::Minus => BinaryOperator::Subtract,
                _ => break,
            };
            self.consume();
            let right = self.parse_multiplicative()?;
            left = self.binary(op, left, right)?;
        }

        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> ParseResult<Node> {
        let mut left = self.parse_exponent()?;

        loop {
            let op = match self.current {
                Token::Star => BinaryOperator::Multiply,
                Token::Slash => BinaryOperator::Divide,
                _ => break,
            };
            self.consume();
            let right = self.parse_exponent()?;
            left = self.binary(op, left, right)?;
        }

        Ok(left)
    }

    fn parse_exponent(&mut self) -> ParseResult<Node> {
        let mut operands = vec![self.parse_percent()?];
        while self.current == Token::Caret {
            self.consume();
            operands.push(self.parse_percent()?);
        }

        // Fold from the right: 2^3^2 = 2^(3^2)
        let mut node = operands.pop().ok_or_else(|| self.syntax("expected operand"))?;
        while let Some(base) = operands.pop() {
            node = self.binary(BinaryOperator::Power, base, node)?;
        }
        Ok(node)
    }

    fn parse_percent(&mut self) -> ParseResult<Node> {
        let mut node = self.parse_unary()?;
        while self.current == Token::Percent {
            self.consume();
            node = self.unary(UnaryOperator::Percent, node)?;
        }
        Ok(node)
    }

    fn parse_unary(&mut self) -> ParseResult<Node> {
        let mut prefix = Vec::new();
        loop {
            match self.current {
                Token::Minus => prefix.push(UnaryOperator::Negate),
                Token::Plus => prefix.push(UnaryOperator::Plus),
                _ => break,
            }
            self.consume();
        }

        self.enter(prefix.len())?;
        let mut node = self.parse_primary()?;
        self.leave(prefix.len());

        while let Some(op) = prefix.pop() {
            node = self.unary(op, node)?;
        }
        Ok(node)
    }

    fn parse_primary(&mut self) -> ParseResult<Node> {
        let expr = match self.current.clone() {
            Token::Number(n) => {
                self.consume();
                Expr::Literal(CellValue::Number(n))
            }
            Token::Text(s) => {
                self.consume();
                Expr::Literal(CellValue::text(s))
            }
            Token::Boolean(b) => {
                self.consume();
                Expr::Literal(CellValue::Boolean(b))
            }
            Token::Error(e) => {
                self.consume();
                Expr::Literal(CellValue::Error(e))
            }
            Token::LeftParen => {
                self.consume();
                self.enter(1)?;
                let node = self.parse_expression()?;
                self.leave(1);
                self.expect(Token::RightParen)?;
                return Ok(node);
            }
            Token::SheetRef(sheet) => {
                self.consume();
                match self.parse_reference()? {
                    Some(Expr::CellRef(address)) => Expr::SheetQualifiedRef {
                        sheet,
                        target: SheetTarget::Cell(address),
                    },
                    Some(Expr::RangeRef(range)) => Expr::SheetQualifiedRef {
                        sheet,
                        target: SheetTarget::Range(range),
                    },
                    // #REF! from an out-of-bounds address
                    Some(other) => other,
                    None => return Err(self.syntax(format!("expected a reference after '{sheet}!'"))),
                }
            }
            Token::CellRef(_) => self
                .parse_reference()?
                .ok_or_else(|| self.syntax("expected a reference"))?,
            Token::Identifier(name) => {
                if self.next_non_space() == Some('(') {
                    self.consume();
                    return self.parse_function_call(name);
                }
                match self.parse_reference()? {
                    Some(range) => range,
                    None => {
                        self.consume();
                        Expr::Name(name)
                    }
                }
            }
            ref other => return Err(self.syntax(format!("unexpected {}", describe(other)))),
        };
        Ok(Node::leaf(expr))
    }

    /// Parse `A1`, `A1:B2` or `A:C` at the current token
    ///
    /// Returns `None` without consuming anything when the current token does
    /// not start a reference.
    fn parse_reference(&mut self) -> ParseResult<Option<Expr>> {
        match self.current.clone() {
            Token::CellRef(start) => {
                self.consume();
                let Ok(start) = CellAddress::parse(&start) else {
                    return Ok(Some(Expr::Literal(CellValue::Error(CellError::Ref))));
                };
                if self.current != Token::Colon {
                    return Ok(Some(Expr::CellRef(start)));
                }
                self.consume();
                let end = match self.consume() {
                    Token::CellRef(end) => end,
                    _ => return Err(self.syntax("expected a cell after ':'")),
                };
                let Ok(end) = CellAddress::parse(&end) else {
                    return Ok(Some(Expr::Literal(CellValue::Error(CellError::Ref))));
                };
                Ok(Some(Expr::RangeRef(CellRange::new(start, end))))
            }
            Token::Identifier(first) => {
                let Some((first_col, first_abs)) = column_letters(&first) else {
                    return Ok(None);
                };
                if self.next_non_space() != Some(':') {
                    return Ok(None);
                }
                self.consume();
                self.consume(); // ':'
                let last = match self.consume() {
                    Token::Identifier(last) => column_letters(&last),
                    _ => None,
                };
                let Some((last_col, last_abs)) = last else {
                    return Err(self.syntax("expected column letters after ':'"));
                };
                let range = CellRange::new(
                    CellAddress::with_absolute(0, first_col, false, first_abs),
                    CellAddress::with_absolute(MAX_ROWS - 1, last_col, false, last_abs),
                );
                Ok(Some(Expr::RangeRef(range)))
            }
            _ => Ok(None),
        }
    }

    fn parse_function_call(&mut self, name: String) -> ParseResult<Node> {
        self.expect(Token::LeftParen)?;
        self.enter(1)?;

        let mut args = Vec::new();
        if self.current != Token::RightParen {
            args.push(self.parse_argument()?);
            while self.current == Token::Comma {
                self.consume();
                args.push(self.parse_argument()?);
            }
        }

        self.leave(1);
        self.expect(Token::RightParen)?;

        let height = self.grow(1 + args.iter().map(|arg: &Node| arg.height).max().unwrap_or(0))?;
        Ok(Node {
            expr: Expr::FunctionCall {
                name: name.to_uppercase(),
                args: args.into_iter().map(|arg| arg.expr).collect(),
            },
            height,
        })
    }

    /// A function argument; an omitted one (`f(1,,2)`) reads as blank
    fn parse_argument(&mut self) -> ParseResult<Node> {
        if matches!(self.current, Token::Comma | Token::RightParen) {
            return Ok(Node::leaf(Expr::Literal(CellValue::Empty)));
        }
        self.parse_expression()
    }
}

fn binary(op: BinaryOperator, left: Expr, right: Expr) -> Expr {
    Expr::BinaryOp {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

/// `[$]letters[$]digits` with at most three letters
fn is_cell_reference(text: &str) -> bool {
    let rest = text.strip_prefix('$').unwrap_or(text);
    let letters = rest.bytes().take_while(u8::is_ascii_alphabetic).count();
    if letters == 0 || letters > 3 {
        return false;
    }
    let rest = &rest[letters..];
    let rest = rest.strip_prefix('$').unwrap_or(rest);
    !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit())
}

/// Column letters of a whole-column reference such as `C` or `$AB`
fn column_letters(text: &str) -> Option<(u16, bool)> {
    let (absolute, letters) = match text.strip_prefix('$') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    if letters.is_empty() || letters.len() > 3 || !letters.bytes().all(|b| b.is_ascii_alphabetic()) {
        return None;
    }
    CellAddress::letters_to_column(letters)
        .ok()
        .map(|col| (col, absolute))
}

fn describe(token: &Token) -> String {
    match token {
        Token::Number(n) => format!("number {n}"),
        Token::Text(_) => "text".into(),
        Token::Boolean(b) => format!("{}", if *b { "TRUE" } else { "FALSE" }),
        Token::Error(e) => e.to_string(),
        Token::Identifier(s) | Token::CellRef(s) => format!("'{s}'"),
        Token::SheetRef(s) => format!("'{s}!'"),
        Token::Invalid(why) => why.clone(),
        Token::Eof => "end of formula".into(),
        Token::LeftParen => "'('".into(),
        Token::RightParen => "')'".into(),
        Token::Comma => "','".into(),
        Token::Colon => "':'".into(),
        other => format!("operator {other:?}"),
    }
}
