//! Formula evaluation for animated attribute values.
//!
//! Timeline formulas use a small math language: `$` stands for the keyframe
//! input, `#ppt_x` style tokens reference geometry variables, and the usual
//! arithmetic operators, `^`, parentheses, `PI`, `E` and a handful of math
//! functions are available.
//!
//! Evaluation is a two step process: [`preprocess`] rewrites the authoring
//! shorthand into the canonical syntax, then a recursive descent parser builds
//! an AST which is evaluated against a [`Variables`] map.

use std::f64::consts;

use hashbrown::HashMap;

/// Named numeric variables visible to a formula.
pub type Variables = HashMap<String, f64>;

/// Errors produced while parsing or evaluating a formula.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum FormulaError {
    #[error("empty expression")]
    Empty,
    #[error("unexpected character '{ch}' at {pos}")]
    UnexpectedChar { ch: char, pos: usize },
    #[error("invalid number literal '{0}'")]
    InvalidNumber(String),
    #[error("unexpected token {0}")]
    UnexpectedToken(String),
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("unknown variable '{0}'")]
    UnknownVariable(String),
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("function '{name}' expects {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: &'static str,
        got: usize,
    },
}

/// Parse and evaluate `expression` against `vars`.
///
/// The shorthand rewrites of [`preprocess`] are applied first, so `"$*2"` with
/// `input = 3` yields `6` and `".5"` reads as `0.5`.
pub fn parse_formula(expression: &str, vars: &Variables) -> Result<f64, FormulaError> {
    let canonical = preprocess(expression);
    let expr = parse_expression(&canonical)?;
    expr.eval(vars)
}

/// Rewrite authoring shorthand into canonical formula syntax.
///
/// Applied in order of precedence while scanning once:
/// - `$` becomes `[input]`;
/// - the identifiers `pi` and `e` (any case) become `PI` and `E`;
/// - `#name` becomes `[name]`;
/// - a decimal point that starts a number (`.5`) gains a leading zero.
///
/// Bracketed references are copied verbatim.
pub fn preprocess(expression: &str) -> String {
    let chars: Vec<char> = expression.chars().collect();
    let mut out = String::with_capacity(expression.len() + 8);
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        match ch {
            '$' => {
                out.push_str("[input]");
                i += 1;
            }
            '#' if chars.get(i + 1).is_some_and(|c| is_name_char(*c)) => {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && is_name_char(chars[end]) {
                    end += 1;
                }
                out.push('[');
                out.extend(&chars[start..end]);
                out.push(']');
                i = end;
            }
            '[' => {
                let end = chars[i..]
                    .iter()
                    .position(|c| *c == ']')
                    .map_or(chars.len(), |p| i + p + 1);
                out.extend(&chars[i..end]);
                i = end;
            }
            '.' if chars.get(i + 1).is_some_and(char::is_ascii_digit)
                && !(i > 0 && chars[i - 1].is_ascii_digit()) =>
            {
                out.push_str("0.");
                i += 1;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let ident: String = chars[start..i].iter().collect();
                if ident.eq_ignore_ascii_case("pi") || ident.eq_ignore_ascii_case("e") {
                    out.push_str(&ident.to_ascii_uppercase());
                } else {
                    out.push_str(&ident);
                }
            }
            _ => {
                out.push(ch);
                i += 1;
            }
        }
    }

    out
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Var(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    Comma,
    LParen,
    RParen,
}

#[derive(Debug, Clone, Copy)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
}

#[derive(Debug, Clone)]
enum Expr {
    Number(f64),
    Var(String),
    Neg(Box<Expr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
}

fn parse_expression(input: &str) -> Result<Expr, FormulaError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(FormulaError::Empty);
    }

    let mut parser = ExprParser { tokens, pos: 0 };
    let expr = parser.parse_expr()?;

    // All tokens must be consumed for a valid expression.
    if let Some(tok) = parser.peek() {
        return Err(FormulaError::UnexpectedToken(format!("{tok:?}")));
    }

    Ok(expr)
}

fn tokenize(input: &str) -> Result<Vec<Token>, FormulaError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some((pos, ch)) = chars.peek().copied() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }

        let single = match ch {
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '*' => Some(Token::Star),
            '/' => Some(Token::Slash),
            '%' => Some(Token::Percent),
            '^' => Some(Token::Caret),
            ',' => Some(Token::Comma),
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            _ => None,
        };
        if let Some(tok) = single {
            tokens.push(tok);
            chars.next();
            continue;
        }

        if ch == '[' {
            chars.next();
            let mut name = String::new();
            let mut closed = false;
            for (_, c) in chars.by_ref() {
                if c == ']' {
                    closed = true;
                    break;
                }
                name.push(c);
            }
            if !closed {
                return Err(FormulaError::UnexpectedEnd);
            }
            tokens.push(Token::Var(name.trim().to_string()));
            continue;
        }

        if ch.is_ascii_digit() || ch == '.' {
            let mut buf = String::new();
            while let Some((_, c)) = chars.peek().copied() {
                if !(c.is_ascii_digit() || c == '.') {
                    break;
                }
                buf.push(c);
                chars.next();
            }
            let value = buf
                .parse::<f64>()
                .map_err(|_| FormulaError::InvalidNumber(buf.clone()))?;
            tokens.push(Token::Number(value));
            continue;
        }

        if ch.is_ascii_alphabetic() || ch == '_' {
            let mut buf = String::new();
            while let Some((_, c)) = chars.peek().copied() {
                if !(c.is_ascii_alphanumeric() || c == '_') {
                    break;
                }
                buf.push(c);
                chars.next();
            }
            tokens.push(Token::Ident(buf));
            continue;
        }

        return Err(FormulaError::UnexpectedChar { ch, pos });
    }

    Ok(tokens)
}

struct ExprParser {
    tokens: Vec<Token>,
    pos: usize,
}

impl ExprParser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, want: Token) -> Result<(), FormulaError> {
        match self.next() {
            Some(tok) if tok == want => Ok(()),
            Some(tok) => Err(FormulaError::UnexpectedToken(format!("{tok:?}"))),
            None => Err(FormulaError::UnexpectedEnd),
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, FormulaError> {
        let mut node = self.parse_term()?;

        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.next();
            let rhs = self.parse_term()?;
            node = Expr::Binary {
                op,
                left: Box::new(node),
                right: Box::new(rhs),
            };
        }

        Ok(node)
    }

    fn parse_term(&mut self) -> Result<Expr, FormulaError> {
        let mut node = self.parse_unary()?;

        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Rem,
                _ => break,
            };
            self.next();
            let rhs = self.parse_unary()?;
            node = Expr::Binary {
                op,
                left: Box::new(node),
                right: Box::new(rhs),
            };
        }

        Ok(node)
    }

    fn parse_unary(&mut self) -> Result<Expr, FormulaError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.next();
                let inner = self.parse_unary()?;
                Ok(Expr::Neg(Box::new(inner)))
            }
            Some(Token::Plus) => {
                self.next();
                self.parse_unary()
            }
            _ => self.parse_power(),
        }
    }

    fn parse_power(&mut self) -> Result<Expr, FormulaError> {
        let base = self.parse_primary()?;
        if matches!(self.peek(), Some(Token::Caret)) {
            self.next();
            // Right associative: 2^3^2 == 2^(3^2)
            let exponent = self.parse_unary()?;
            return Ok(Expr::Binary {
                op: BinaryOp::Pow,
                left: Box::new(base),
                right: Box::new(exponent),
            });
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr, FormulaError> {
        match self.next() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Var(name)) => Ok(Expr::Var(name)),
            Some(Token::LParen) => {
                let expr = self.parse_expr()?;
                self.expect(Token::RParen)?;
                Ok(expr)
            }
            Some(Token::Ident(name)) => {
                if matches!(self.peek(), Some(Token::LParen)) {
                    self.next();
                    let args = self.parse_args()?;
                    return Ok(Expr::Call { name, args });
                }
                match name.as_str() {
                    "PI" => Ok(Expr::Number(consts::PI)),
                    "E" => Ok(Expr::Number(consts::E)),
                    _ => Ok(Expr::Var(name)),
                }
            }
            Some(tok) => Err(FormulaError::UnexpectedToken(format!("{tok:?}"))),
            None => Err(FormulaError::UnexpectedEnd),
        }
    }

    /// Arguments after the opening parenthesis, consuming the closing one.
    fn parse_args(&mut self) -> Result<Vec<Expr>, FormulaError> {
        let mut args = Vec::new();
        if matches!(self.peek(), Some(Token::RParen)) {
            self.next();
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            match self.next() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => break,
                Some(tok) => return Err(FormulaError::UnexpectedToken(format!("{tok:?}"))),
                None => return Err(FormulaError::UnexpectedEnd),
            }
        }
        Ok(args)
    }
}

impl Expr {
    fn eval(&self, vars: &Variables) -> Result<f64, FormulaError> {
        match self {
            Expr::Number(n) => Ok(*n),
            Expr::Var(name) => vars
                .get(name)
                .copied()
                .ok_or_else(|| FormulaError::UnknownVariable(name.clone())),
            Expr::Neg(inner) => Ok(-inner.eval(vars)?),
            Expr::Binary { op, left, right } => {
                let l = left.eval(vars)?;
                let r = right.eval(vars)?;
                Ok(match op {
                    BinaryOp::Add => l + r,
                    BinaryOp::Sub => l - r,
                    BinaryOp::Mul => l * r,
                    BinaryOp::Div => l / r,
                    BinaryOp::Rem => l % r,
                    BinaryOp::Pow => l.powf(r),
                })
            }
            Expr::Call { name, args } => {
                let values = args
                    .iter()
                    .map(|a| a.eval(vars))
                    .collect::<Result<Vec<_>, _>>()?;
                call_function(name, &values)
            }
        }
    }
}

fn call_function(name: &str, args: &[f64]) -> Result<f64, FormulaError> {
    let lower = name.to_ascii_lowercase();
    let unary: Option<fn(f64) -> f64> = match lower.as_str() {
        "abs" => Some(f64::abs),
        "acos" => Some(f64::acos),
        "asin" => Some(f64::asin),
        "atan" => Some(f64::atan),
        "ceil" => Some(f64::ceil),
        "cos" => Some(f64::cos),
        "cosh" => Some(f64::cosh),
        "deg" => Some(f64::to_degrees),
        "exp" => Some(f64::exp),
        "floor" => Some(f64::floor),
        "ln" | "log" => Some(f64::ln),
        "rad" => Some(f64::to_radians),
        // Half-way values round towards positive infinity.
        "round" => Some(|x: f64| (x + 0.5).floor()),
        "sin" => Some(f64::sin),
        "sinh" => Some(f64::sinh),
        "sqrt" => Some(f64::sqrt),
        "tan" => Some(f64::tan),
        "tanh" => Some(f64::tanh),
        _ => None,
    };

    if let Some(f) = unary {
        return match args {
            [x] => Ok(f(*x)),
            _ => Err(arity(name, "1", args.len())),
        };
    }

    match lower.as_str() {
        "pow" => match args {
            [b, e] => Ok(b.powf(*e)),
            _ => Err(arity(name, "2", args.len())),
        },
        "min" | "max" => {
            if args.is_empty() {
                return Err(arity(name, "at least 1", 0));
            }
            let pick: fn(f64, f64) -> f64 = if lower == "min" { f64::min } else { f64::max };
            Ok(args[1..].iter().fold(args[0], |acc, x| pick(acc, *x)))
        }
        _ => Err(FormulaError::UnknownFunction(name.to_string())),
    }
}

fn arity(name: &str, expected: &'static str, got: usize) -> FormulaError {
    FormulaError::Arity {
        name: name.to_string(),
        expected,
        got,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, f64)]) -> Variables {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn approx(a: f64, b: f64) {
        assert!((a - b).abs() <= 1e-9, "left={a} right={b}");
    }

    #[test]
    fn dollar_reads_input() {
        let v = vars(&[("input", 3.0)]);
        assert_eq!(parse_formula("$*2", &v).unwrap(), 6.0);
    }

    #[test]
    fn leading_decimal_point_is_normalized() {
        let v = Variables::new();
        assert_eq!(preprocess(".5"), "0.5");
        assert_eq!(preprocess("1-.25"), "1-0.25");
        assert_eq!(preprocess("1.5"), "1.5");
        assert_eq!(
            parse_formula(".5", &v).unwrap(),
            parse_formula("0.5", &v).unwrap()
        );
    }

    #[test]
    fn hash_names_become_bracketed_variables() {
        assert_eq!(preprocess("#ppt_x+#ppt_w/2"), "[ppt_x]+[ppt_w]/2");
        let v = vars(&[("ppt_x", 0.25), ("ppt_w", 0.5)]);
        approx(parse_formula("#ppt_x+#ppt_w/2", &v).unwrap(), 0.5);
    }

    #[test]
    fn pi_and_e_are_case_insensitive_constants() {
        assert_eq!(preprocess("2*pi+e"), "2*PI+E");
        assert_eq!(preprocess("Pi*sec"), "PI*sec");
        let v = Variables::new();
        approx(parse_formula("pi", &v).unwrap(), consts::PI);
        approx(parse_formula("E^1", &v).unwrap(), consts::E);
    }

    #[test]
    fn precedence_and_functions() {
        let v = vars(&[("input", 0.5)]);
        approx(parse_formula("1+2*3", &v).unwrap(), 7.0);
        approx(parse_formula("(1+2)*3", &v).unwrap(), 9.0);
        approx(parse_formula("-2^2", &v).unwrap(), -4.0);
        approx(parse_formula("2^3^2", &v).unwrap(), 512.0);
        approx(parse_formula("sin(pi*$)", &v).unwrap(), 1.0);
        approx(parse_formula("max(1, $, 3)", &v).unwrap(), 3.0);
        approx(parse_formula("SQRT(16)", &v).unwrap(), 4.0);
    }

    #[test]
    fn typical_motion_path_formula() {
        let v = vars(&[("input", 0.0), ("ppt_x", 0.4), ("ppt_y", 0.3)]);
        let out = parse_formula(
            "#ppt_x+(cos(-2*pi*(1-$))*-#ppt_x-sin(-2*pi*(1-$))*(1-#ppt_y))*(1-$)",
            &v,
        )
        .unwrap();
        approx(out, 0.0);
    }

    #[test]
    fn malformed_expressions_fail() {
        let v = Variables::new();
        assert_eq!(parse_formula("", &v), Err(FormulaError::Empty));
        assert_eq!(parse_formula("1+", &v), Err(FormulaError::UnexpectedEnd));
        assert!(matches!(
            parse_formula("1 2", &v),
            Err(FormulaError::UnexpectedToken(_))
        ));
        assert!(matches!(
            parse_formula("3 & 4", &v),
            Err(FormulaError::UnexpectedChar { ch: '&', .. })
        ));
        assert_eq!(
            parse_formula("1.2.3", &v),
            Err(FormulaError::InvalidNumber("1.2.3".into()))
        );
        assert_eq!(
            parse_formula("[input", &v),
            Err(FormulaError::UnexpectedEnd)
        );
    }

    #[test]
    fn unresolved_identifiers_fail() {
        let v = Variables::new();
        assert_eq!(
            parse_formula("#ppt_x", &v),
            Err(FormulaError::UnknownVariable("ppt_x".into()))
        );
        assert_eq!(
            parse_formula("foo(1)", &v),
            Err(FormulaError::UnknownFunction("foo".into()))
        );
        assert!(matches!(
            parse_formula("cos(1, 2)", &v),
            Err(FormulaError::Arity { got: 2, .. })
        ));
    }
}
