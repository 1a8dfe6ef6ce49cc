//! Expression parsing using recursive descent.

use std::f64::consts::{E, PI};

use spicefront_core::units::suffix_multiplier;

use super::ast::{BinaryOp, Expr, UnaryOp};
use crate::error::{Error, Result};

/// Parse a mathematical expression from a string.
///
/// Numbers accept SPICE scale suffixes (`1k`, `10meg`, `4.7u`), identifiers
/// become [`Expr::Variable`] unless they are `pi` or `e`, and `V(..)`/`I(..)`
/// become signal references.
pub fn parse_expression(input: &str) -> Result<Expr> {
    let mut parser = ExprParser::new(input);
    parser.parse()
}

/// Expression parser using recursive descent.
struct ExprParser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> ExprParser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::Syntax {
            expression: self.input.to_string(),
            position: self.pos,
            message: message.into(),
        }
    }

    fn parse(&mut self) -> Result<Expr> {
        self.skip_whitespace();
        let expr = self.parse_ternary()?;
        self.skip_whitespace();
        if self.pos < self.input.len() {
            Err(self.error("unexpected trailing input"))
        } else {
            Ok(expr)
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn peek(&self) -> Option<char> {
        self.input.as_bytes().get(self.pos).map(|&b| b as char)
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.input.as_bytes().get(self.pos + offset).map(|&b| b as char)
    }

    fn advance(&mut self) {
        if self.pos < self.input.len() {
            self.pos += 1;
        }
    }

    fn check_str(&self, s: &str) -> bool {
        self.input[self.pos..].starts_with(s)
    }

    /// Consume `s` if the input continues with it.
    fn eat(&mut self, s: &str) -> bool {
        self.skip_whitespace();
        if self.check_str(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> Result<()> {
        self.skip_whitespace();
        if self.peek() == Some(c) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!("expected '{c}'")))
        }
    }

    fn parse_ternary(&mut self) -> Result<Expr> {
        let condition = self.parse_or()?;
        if !self.eat("?") {
            return Ok(condition);
        }
        let then_branch = self.parse_ternary()?;
        self.expect(':')?;
        let else_branch = self.parse_ternary()?;
        Ok(Expr::Conditional {
            condition: Box::new(condition),
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
        })
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.eat("||") {
            let right = self.parse_and()?;
            left = Expr::binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_equality()?;
        while self.eat("&&") {
            let right = self.parse_equality()?;
            left = Expr::binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr> {
        let mut left = self.parse_relational()?;
        loop {
            let op = if self.eat("==") {
                BinaryOp::Eq
            } else if self.eat("!=") {
                BinaryOp::Ne
            } else {
                break;
            };
            let right = self.parse_relational()?;
            left = Expr::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_relational(&mut self) -> Result<Expr> {
        let mut left = self.parse_additive()?;
        loop {
            let op = if self.eat("<=") {
                BinaryOp::Le
            } else if self.eat(">=") {
                BinaryOp::Ge
            } else if self.eat("<") {
                BinaryOp::Lt
            } else if self.eat(">") {
                BinaryOp::Gt
            } else {
                break;
            };
            let right = self.parse_additive()?;
            left = Expr::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let mut left = self.parse_multiplicative()?;

        loop {
            self.skip_whitespace();
            match self.peek() {
                Some('+') => {
                    self.advance();
                    let right = self.parse_multiplicative()?;
                    left = Expr::binary(BinaryOp::Add, left, right);
                }
                Some('-') => {
                    self.advance();
                    let right = self.parse_multiplicative()?;
                    left = Expr::binary(BinaryOp::Sub, left, right);
                }
                _ => break,
            }
        }

        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        let mut left = self.parse_power()?;

        loop {
            self.skip_whitespace();
            match self.peek() {
                Some('*') => {
                    self.advance();
                    let right = self.parse_power()?;
                    left = Expr::binary(BinaryOp::Mul, left, right);
                }
                Some('/') => {
                    self.advance();
                    let right = self.parse_power()?;
                    left = Expr::binary(BinaryOp::Div, left, right);
                }
                _ => break,
            }
        }

        Ok(left)
    }

    fn parse_power(&mut self) -> Result<Expr> {
        let base = self.parse_unary()?;

        self.skip_whitespace();
        if self.peek() == Some('^') || self.check_str("**") {
            if self.peek() == Some('*') {
                self.advance(); // consume first *
            }
            self.advance(); // consume ^ or second *
            let exp = self.parse_power()?; // Right associative
            Ok(Expr::binary(BinaryOp::Pow, base, exp))
        } else {
            Ok(base)
        }
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        self.skip_whitespace();
        match self.peek() {
            Some('-') => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Expr::unary(UnaryOp::Neg, operand))
            }
            Some('+') => {
                self.advance();
                self.parse_unary()
            }
            Some('!') => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Expr::unary(UnaryOp::Not, operand))
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        self.skip_whitespace();

        match self.peek() {
            Some('(') => {
                self.advance();
                let expr = self.parse_ternary()?;
                self.expect(')')?;
                Ok(expr)
            }
            Some(c) if c.is_ascii_digit() || c == '.' => self.parse_number(),
            Some(c) if c.is_ascii_alphabetic() || c == '_' => self.parse_identifier(),
            Some(c) => Err(self.error(format!("unexpected character '{c}'"))),
            None => Err(self.error("unexpected end of expression")),
        }
    }

    fn parse_number(&mut self) -> Result<Expr> {
        let start = self.pos;
        let mut has_dot = false;
        let mut has_exp = false;

        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.advance();
            } else if c == '.' && !has_dot && !has_exp {
                has_dot = true;
                self.advance();
            } else if (c == 'e' || c == 'E') && !has_exp && self.exponent_follows() {
                has_exp = true;
                self.advance();
                if self.peek() == Some('+') || self.peek() == Some('-') {
                    self.advance();
                }
            } else {
                break;
            }
        }

        let num_str = &self.input[start..self.pos];
        let value: f64 = num_str
            .parse()
            .map_err(|_| self.error(format!("invalid number {num_str:?}")))?;

        // SPICE suffix, with any trailing unit letters
        let suffix_start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphabetic() {
                self.advance();
            } else {
                break;
            }
        }
        let suffix = &self.input[suffix_start..self.pos];
        let multiplier = suffix_multiplier(suffix)
            .ok_or_else(|| self.error(format!("invalid suffix {suffix:?}")))?;

        Ok(Expr::Constant(value * multiplier))
    }

    /// An `e` after digits is an exponent only when digits follow it.
    fn exponent_follows(&self) -> bool {
        match self.peek_at(1) {
            Some(c) if c.is_ascii_digit() => true,
            Some('+') | Some('-') => self.peek_at(2).is_some_and(|c| c.is_ascii_digit()),
            _ => false,
        }
    }

    fn parse_identifier(&mut self) -> Result<Expr> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                self.advance();
            } else {
                break;
            }
        }

        let ident = &self.input[start..self.pos];
        let ident_lower = ident.to_ascii_lowercase();

        self.skip_whitespace();

        // Check for function call or special forms
        if self.peek() == Some('(') {
            self.advance();

            if ident_lower == "v" {
                return self.parse_voltage_reference();
            }
            if ident_lower == "i" {
                return self.parse_current_reference();
            }

            let args = self.parse_function_args()?;
            return Ok(Expr::Function {
                name: ident.to_string(),
                args,
            });
        }

        match ident_lower.as_str() {
            "pi" => Ok(Expr::Constant(PI)),
            "e" => Ok(Expr::Constant(E)),
            _ => Ok(Expr::Variable(ident.to_string())),
        }
    }

    fn parse_voltage_reference(&mut self) -> Result<Expr> {
        self.skip_whitespace();
        let node_pos = self.parse_node_name()?;

        self.skip_whitespace();
        let node_neg = if self.peek() == Some(',') {
            self.advance();
            self.skip_whitespace();
            Some(self.parse_node_name()?)
        } else {
            None
        };

        self.expect(')')?;
        Ok(Expr::Voltage { node_pos, node_neg })
    }

    fn parse_current_reference(&mut self) -> Result<Expr> {
        self.skip_whitespace();
        let source_name = self.parse_node_name()?;
        self.expect(')')?;
        Ok(Expr::Current { source_name })
    }

    /// Node and device names may be instance-qualified (`x1.out`).
    fn parse_node_name(&mut self) -> Result<String> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':' | '#' | '$') {
                self.advance();
            } else {
                break;
            }
        }

        if self.pos == start {
            return Err(self.error("expected node name"));
        }

        Ok(self.input[start..self.pos].to_string())
    }

    fn parse_function_args(&mut self) -> Result<Vec<Expr>> {
        let mut args = Vec::new();

        self.skip_whitespace();
        if self.peek() == Some(')') {
            self.advance();
            return Ok(args);
        }

        loop {
            args.push(self.parse_ternary()?);

            self.skip_whitespace();
            match self.peek() {
                Some(',') => self.advance(),
                Some(')') => {
                    self.advance();
                    break;
                }
                _ => return Err(self.error("expected ',' or ')' in function arguments")),
            }
        }

        Ok(args)
    }
}
