//! Basic floating point arithmetic evaluation for `{{#expr}}`.
//!
//! The accepted grammar is deliberately tiny:
//!
//! ```text
//! sum     = product (('+' | '-') product)*
//! product = unary (('*' | '/') unary)*
//! unary   = ('+' | '-') unary | primary
//! primary = number | '(' sum ')'
//! number  = digit+ ('.' digit*)? | '.' digit+
//! ```
//!
//! Anything else is an error. Nothing is ever handed to a general-purpose
//! evaluator.

use std::num::ParseFloatError;

/// Maximum nesting of brackets and unary operators.
const MAX_DEPTH: usize = 64;

/// An expression evaluation error.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// Someone nested too many brackets.
    #[error("expression too deeply nested at {0}")]
    TooDeep(usize),
    /// Encountered a character outside of the grammar.
    #[error("unknown token '{1}' at {0}")]
    UnknownToken(usize, char),
    /// Encountered a valid token where it shouldn’t’ve been.
    #[error("unexpected '{1}' at {0}")]
    UnexpectedToken(usize, char),
    /// Encountered a close bracket where it shouldn’t’ve been.
    #[error("unexpected closing bracket at {0}")]
    UnexpectedCloseBracket(usize),
    /// Never encountered a close bracket where it should’ve been.
    #[error("unclosed bracket at {0}")]
    MissingCloseBracket(usize),
    /// The expression ended in the middle of an operation.
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    /// Someone tried to do that thing you’re not supposed to do with numbers.
    #[error("division by zero at {0}")]
    DivisionByZero(usize),
    /// The result was too large to represent.
    #[error("result is not a finite number")]
    NotANumber,
    /// A number that should have been a float turned out to not be a float.
    #[error("could not parse number at {0}: {1}")]
    ParseFloat(usize, ParseFloatError),
}

/// Evaluates an arithmetic expression. Returns `None` if the expression is
/// empty.
pub fn do_expression(expr: &str) -> Result<Option<f64>, Error> {
    let expr = expr.replace("&minus;", "-").replace('\u{2212}', "-");
    let mut parser = Parser {
        src: &expr,
        pos: 0,
        depth: 0,
    };

    parser.skip_whitespace();
    if parser.peek().is_none() {
        return Ok(None);
    }

    let value = parser.sum()?;
    parser.skip_whitespace();
    match parser.peek() {
        None if value.is_finite() => Ok(Some(value)),
        None => Err(Error::NotANumber),
        Some(b')') => Err(Error::UnexpectedCloseBracket(parser.pos)),
        Some(_) => Err(parser.unexpected()),
    }
}

/// Formats an expression result the way a reader expects: integers without
/// a fraction, everything else to 14 significant digits.
pub fn format_result(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        #[allow(clippy::cast_possible_truncation)]
        let n = n as i64;
        return n.to_string();
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let precision = (13 - n.abs().log10().floor() as i32).clamp(0, 17) as usize;
    let out = format!("{n:.precision$}");
    if out.contains('.') {
        out.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        out
    }
}

/// A recursive descent expression evaluator.
struct Parser<'a> {
    /// The expression source.
    src: &'a str,
    /// The current byte position in `src`.
    pos: usize,
    /// The current nesting depth.
    depth: usize,
}

impl Parser<'_> {
    /// `sum = product (('+' | '-') product)*`
    fn sum(&mut self) -> Result<f64, Error> {
        let mut lhs = self.product()?;
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(b'+') => {
                    self.pos += 1;
                    lhs += self.product()?;
                }
                Some(b'-') => {
                    self.pos += 1;
                    lhs -= self.product()?;
                }
                _ => return Ok(lhs),
            }
        }
    }

    /// `product = unary (('*' | '/') unary)*`
    fn product(&mut self) -> Result<f64, Error> {
        let mut lhs = self.unary()?;
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(b'*') => {
                    self.pos += 1;
                    lhs *= self.unary()?;
                }
                Some(b'/') => {
                    let pos = self.pos;
                    self.pos += 1;
                    let rhs = self.unary()?;
                    if rhs == 0.0 {
                        return Err(Error::DivisionByZero(pos));
                    }
                    lhs /= rhs;
                }
                _ => return Ok(lhs),
            }
        }
    }

    /// `unary = ('+' | '-') unary | primary`
    fn unary(&mut self) -> Result<f64, Error> {
        self.skip_whitespace();
        match self.peek() {
            Some(b'-') => {
                self.pos += 1;
                self.nested(Self::unary).map(|value| -value)
            }
            Some(b'+') => {
                self.pos += 1;
                self.nested(Self::unary)
            }
            _ => self.primary(),
        }
    }

    /// `primary = number | '(' sum ')'`
    fn primary(&mut self) -> Result<f64, Error> {
        self.skip_whitespace();
        let start = self.pos;
        match self.peek() {
            Some(b'(') => {
                self.pos += 1;
                let value = self.nested(Self::sum)?;
                self.skip_whitespace();
                match self.peek() {
                    Some(b')') => {
                        self.pos += 1;
                        Ok(value)
                    }
                    None => Err(Error::MissingCloseBracket(start)),
                    Some(_) => Err(self.unexpected()),
                }
            }
            Some(b'0'..=b'9' | b'.') => self.number(),
            Some(b')') => Err(Error::UnexpectedCloseBracket(start)),
            Some(_) => Err(self.unexpected()),
            None => Err(Error::UnexpectedEnd),
        }
    }

    /// `number = digit+ ('.' digit*)? | '.' digit+`
    fn number(&mut self) -> Result<f64, Error> {
        let start = self.pos;
        self.skip_digits();
        if self.peek() == Some(b'.') {
            self.pos += 1;
            self.skip_digits();
        }
        self.src[start..self.pos]
            .parse::<f64>()
            .map_err(|err| Error::ParseFloat(start, err))
    }

    /// Runs `f` one nesting level deeper.
    fn nested(&mut self, f: fn(&mut Self) -> Result<f64, Error>) -> Result<f64, Error> {
        if self.depth == MAX_DEPTH {
            return Err(Error::TooDeep(self.pos));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    /// Creates an error for the character at the current position.
    fn unexpected(&self) -> Error {
        let c = self.src[self.pos..].chars().next().unwrap_or('\0');
        if c.is_ascii_digit() || matches!(c, '.' | '+' | '-' | '*' | '/' | '(' | ')') {
            Error::UnexpectedToken(self.pos, c)
        } else {
            Error::UnknownToken(self.pos, c)
        }
    }

    /// Returns the byte at the current position.
    fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    /// Advances past ASCII digits.
    fn skip_digits(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
    }

    /// Advances past whitespace.
    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence() {
        assert_eq!(do_expression("1 + 2 * 3"), Ok(Some(7.0)));
        assert_eq!(do_expression("(1 + 2) * 3"), Ok(Some(9.0)));
        assert_eq!(do_expression("10 - 4 - 3"), Ok(Some(3.0)), "left associative");
        assert_eq!(do_expression("10 / 4"), Ok(Some(2.5)));
        assert_eq!(do_expression(" .5 + 1. "), Ok(Some(1.5)));
    }

    #[test]
    fn unary() {
        assert_eq!(do_expression("-3 + 5"), Ok(Some(2.0)));
        assert_eq!(do_expression("2 * -3"), Ok(Some(-6.0)));
        assert_eq!(do_expression("--2"), Ok(Some(2.0)));
        assert_eq!(do_expression("&minus;2"), Ok(Some(-2.0)));
    }

    #[test]
    fn empty() {
        assert_eq!(do_expression(""), Ok(None));
        assert_eq!(do_expression("   "), Ok(None));
    }

    #[test]
    fn errors() {
        assert_eq!(do_expression("1 / 0"), Err(Error::DivisionByZero(2)));
        assert_eq!(do_expression("2 +"), Err(Error::UnexpectedEnd));
        assert_eq!(do_expression("abs(1)"), Err(Error::UnknownToken(0, 'a')));
        assert_eq!(do_expression("(1"), Err(Error::MissingCloseBracket(0)));
        assert_eq!(do_expression("1)"), Err(Error::UnexpectedCloseBracket(1)));
        assert_eq!(do_expression("2 3"), Err(Error::UnexpectedToken(2, '3')));
        assert_eq!(
            do_expression("alert(1)"),
            Err(Error::UnknownToken(0, 'a')),
            "identifiers must never evaluate"
        );

        let deep = format!("{}1{}", "(".repeat(100), ")".repeat(100));
        assert!(matches!(do_expression(&deep), Err(Error::TooDeep(_))));
    }

    #[test]
    fn format() {
        assert_eq!(format_result(7.0), "7");
        assert_eq!(format_result(-0.0), "0");
        assert_eq!(format_result(2.5), "2.5");
        assert_eq!(format_result(0.1 + 0.2), "0.3");
        assert_eq!(format_result(1.0 / 3.0), "0.33333333333333");
    }
}
