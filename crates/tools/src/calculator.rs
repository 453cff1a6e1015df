//! `Calculator.evaluate`: arithmetic for in-character bookkeeping.
//!
//! Operators: `+ - * / %`, `^` (right-associative), unary sign and
//! parentheses. Evaluated by precedence climbing over a token list.

use async_trait::async_trait;
use roleplayer_core::{Action, ActionError, ResultItem};
use serde_json::Value;

pub const NAME: &str = "Calculator.evaluate";

pub struct Calculator;

#[async_trait]
impl Action for Calculator {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Evaluate an arithmetic expression. Supports + - * / % ^, parentheses and decimal numbers."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!([{
            "name": "expression",
            "type": "STRING",
            "description": "The expression to evaluate, e.g. '(2 + 3) * 4'"
        }])
    }

    fn required(&self) -> Vec<String> {
        vec!["expression".into()]
    }

    async fn run(&self, parameters: Value) -> Result<Vec<ResultItem>, ActionError> {
        let expression = parameters
            .get("expression")
            .and_then(Value::as_str)
            .ok_or_else(|| ActionError::InvalidArguments("missing 'expression'".into()))?;

        let value = evaluate(expression).map_err(|e| match e {
            EvalError::Syntax(reason) => ActionError::InvalidArguments(reason),
            EvalError::Math(reason) => ActionError::ExecutionFailed {
                action: NAME.into(),
                reason,
            },
        })?;

        Ok(vec![ResultItem::text(format_number(value))])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EvalError {
    /// The expression is malformed
    Syntax(String),
    /// The expression is well formed but has no finite value
    Math(String),
}

/// Evaluate `expression` to a finite number.
pub fn evaluate(expression: &str) -> Result<f64, EvalError> {
    let tokens = lex(expression)?;
    let mut cursor = Cursor {
        tokens: &tokens,
        at: 0,
        depth: 0,
    };
    let value = cursor.expression(0)?;
    if let Some(extra) = cursor.peek() {
        return Err(EvalError::Syntax(format!("unexpected {extra:?} after expression")));
    }
    if !value.is_finite() {
        return Err(EvalError::Math("result is not a finite number".into()));
    }
    Ok(value)
}

/// Integers without a trailing `.0`.
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Tok {
    Num(f64),
    Op(char),
    Open,
    Close,
}

fn lex(input: &str) -> Result<Vec<Tok>, EvalError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        match c {
            c if c.is_whitespace() => {}
            '+' | '-' | '*' | '/' | '%' | '^' => tokens.push(Tok::Op(c)),
            '(' => tokens.push(Tok::Open),
            ')' => tokens.push(Tok::Close),
            c if c.is_ascii_digit() || c == '.' => {
                let mut end = start + c.len_utf8();
                while let Some(&(i, d)) = chars.peek() {
                    if !(d.is_ascii_digit() || d == '.') {
                        break;
                    }
                    end = i + d.len_utf8();
                    chars.next();
                }
                let literal = &input[start..end];
                let number = literal
                    .parse()
                    .map_err(|_| EvalError::Syntax(format!("bad number '{literal}'")))?;
                tokens.push(Tok::Num(number));
            }
            other => return Err(EvalError::Syntax(format!("unexpected character '{other}'"))),
        }
    }

    if tokens.is_empty() {
        return Err(EvalError::Syntax("empty expression".into()));
    }
    Ok(tokens)
}

/// Binding power and right-associativity of a binary operator.
fn binding(op: char) -> Option<(u8, bool)> {
    match op {
        '+' | '-' => Some((1, false)),
        '*' | '/' | '%' => Some((2, false)),
        '^' => Some((4, true)),
        _ => None,
    }
}

const UNARY_POWER: u8 = 3;

/// Nesting limit for parentheses, unary signs and `^` chains.
const MAX_DEPTH: usize = 256;

struct Cursor<'a> {
    tokens: &'a [Tok],
    at: usize,
    depth: usize,
}

impl Cursor<'_> {
    fn peek(&self) -> Option<Tok> {
        self.tokens.get(self.at).copied()
    }

    fn bump(&mut self) -> Option<Tok> {
        let tok = self.peek();
        self.at += 1;
        tok
    }

    fn expression(&mut self, min_power: u8) -> Result<f64, EvalError> {
        if self.depth >= MAX_DEPTH {
            return Err(EvalError::Syntax(format!(
                "expression nested deeper than {MAX_DEPTH} levels"
            )));
        }
        self.depth += 1;
        let value = self.climb(min_power);
        self.depth -= 1;
        value
    }

    fn climb(&mut self, min_power: u8) -> Result<f64, EvalError> {
        let mut lhs = self.operand()?;

        while let Some(Tok::Op(op)) = self.peek() {
            let Some((power, right_assoc)) = binding(op) else {
                break;
            };
            if power < min_power {
                break;
            }
            self.bump();
            let rhs = self.expression(if right_assoc { power } else { power + 1 })?;
            lhs = apply(op, lhs, rhs)?;
        }

        Ok(lhs)
    }

    fn operand(&mut self) -> Result<f64, EvalError> {
        match self.bump() {
            Some(Tok::Num(n)) => Ok(n),
            Some(Tok::Op('-')) => Ok(-self.expression(UNARY_POWER)?),
            Some(Tok::Op('+')) => self.expression(UNARY_POWER),
            Some(Tok::Open) => {
                let inner = self.expression(0)?;
                match self.bump() {
                    Some(Tok::Close) => Ok(inner),
                    _ => Err(EvalError::Syntax("missing ')'".into())),
                }
            }
            Some(tok) => Err(EvalError::Syntax(format!("unexpected {tok:?}"))),
            None => Err(EvalError::Syntax("unexpected end of expression".into())),
        }
    }
}

fn apply(op: char, lhs: f64, rhs: f64) -> Result<f64, EvalError> {
    match op {
        '+' => Ok(lhs + rhs),
        '-' => Ok(lhs - rhs),
        '*' => Ok(lhs * rhs),
        '/' | '%' if rhs == 0.0 => Err(EvalError::Math("division by zero".into())),
        '/' => Ok(lhs / rhs),
        '%' => Ok(lhs % rhs),
        '^' => Ok(lhs.powf(rhs)),
        other => Err(EvalError::Syntax(format!("unknown operator '{other}'"))),
    }
}
