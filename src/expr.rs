//! Floating point expression evaluation for the `expr` family of parser
//! functions.
//!
//! Implements a shunting-yard evaluator over a small arithmetic grammar:
//! numbers, `+ - * / % ^`, parentheses, the comparisons `= != < > <= >=`,
//! the words `and`, `or`, `not`, `mod`, `round`, the unary words `abs`,
//! `floor`, `ceil`, and the constants `pi` and `e`.

use arrayvec::ArrayVec;
use std::{
    borrow::Cow,
    f64::consts::{E, PI},
    num::ParseFloatError,
};

/// Most operators or operands an expression can have in flight at once.
const MAX_STACK_SIZE: usize = 100;

/// An expression evaluation error.
#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    /// Too many nested operations.
    #[error("expression stack exhausted at offset {0}")]
    StackExhausted(usize),
    /// Encountered a token the grammar does not know.
    #[error("unknown token '{1}' at offset {0}")]
    UnknownToken(usize, String),
    /// A number appeared where an operator was expected.
    #[error("unexpected number at offset {0}")]
    UnexpectedNumber(usize),
    /// An operator appeared where an operand was expected.
    #[error("unexpected operator '{1}' at offset {0}")]
    UnexpectedOperator(usize, Cow<'static, str>),
    /// A closing bracket with no matching opener.
    #[error("unexpected closing bracket at offset {0}")]
    UnexpectedCloseBracket(usize),
    /// An opening bracket with no matching closer.
    #[error("unclosed bracket")]
    MissingCloseBracket,
    /// An operator is missing one of its operands.
    #[error("missing operand for '{0}'")]
    MissingOperand(Cow<'static, str>),
    /// Division (or modulo) by zero.
    #[error("division by zero in operator '{0}'")]
    DivisionByZero(Cow<'static, str>),
    /// A number could not be parsed.
    #[error("could not parse number at offset {0}: {1}")]
    ParseFloat(usize, ParseFloatError),
}

/// The operators of the grammar.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Op {
    Open,
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Round,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Neg,
    Pos,
    Not,
    Abs,
    Floor,
    Ceil,
}

impl Op {
    /// Binding strength; higher binds tighter.
    fn precedence(self) -> u8 {
        match self {
            Op::Open => 0,
            Op::Or => 2,
            Op::And => 3,
            Op::Eq | Op::Ne | Op::Lt | Op::Gt | Op::Le | Op::Ge => 4,
            Op::Round => 5,
            Op::Add | Op::Sub => 6,
            Op::Mul | Op::Div | Op::Mod => 7,
            Op::Pow => 8,
            Op::Neg | Op::Pos | Op::Not | Op::Abs | Op::Floor | Op::Ceil => 10,
        }
    }

    /// Whether the operator takes a single operand.
    fn is_unary(self) -> bool {
        matches!(self, Op::Neg | Op::Pos | Op::Not | Op::Abs | Op::Floor | Op::Ceil)
    }

    /// The operator’s display name for error messages.
    fn name(self) -> Cow<'static, str> {
        Cow::Borrowed(match self {
            Op::Open => "(",
            Op::Or => "or",
            Op::And => "and",
            Op::Eq => "=",
            Op::Ne => "!=",
            Op::Lt => "<",
            Op::Gt => ">",
            Op::Le => "<=",
            Op::Ge => ">=",
            Op::Round => "round",
            Op::Add => "+",
            Op::Sub => "-",
            Op::Mul => "*",
            Op::Div => "/",
            Op::Mod => "mod",
            Op::Pow => "^",
            Op::Neg | Op::Pos => "-",
            Op::Not => "not",
            Op::Abs => "abs",
            Op::Floor => "floor",
            Op::Ceil => "ceil",
        })
    }

    /// Pops this operator’s operands and pushes its result.
    fn apply(self, operands: &mut ArrayVec<f64, MAX_STACK_SIZE>) -> Result<(), Error> {
        let pop = |operands: &mut ArrayVec<f64, MAX_STACK_SIZE>| {
            operands.pop().ok_or_else(|| Error::MissingOperand(self.name()))
        };

        if self.is_unary() {
            let value = pop(operands)?;
            operands.push(match self {
                Op::Neg => -value,
                Op::Pos => value,
                Op::Not => f64::from(value == 0.0),
                Op::Abs => value.abs(),
                Op::Floor => value.floor(),
                Op::Ceil => value.ceil(),
                _ => unreachable!(),
            });
            return Ok(());
        }

        let rhs = pop(operands)?;
        let lhs = pop(operands)?;
        let result = match self {
            Op::Or => f64::from(lhs != 0.0 || rhs != 0.0),
            Op::And => f64::from(lhs != 0.0 && rhs != 0.0),
            Op::Eq => f64::from(lhs == rhs),
            Op::Ne => f64::from(lhs != rhs),
            Op::Lt => f64::from(lhs < rhs),
            Op::Gt => f64::from(lhs > rhs),
            Op::Le => f64::from(lhs <= rhs),
            Op::Ge => f64::from(lhs >= rhs),
            Op::Add => lhs + rhs,
            Op::Sub => lhs - rhs,
            Op::Mul => lhs * rhs,
            Op::Div => {
                if rhs == 0.0 {
                    return Err(Error::DivisionByZero(self.name()));
                }
                lhs / rhs
            }
            Op::Mod => {
                // Truncating integer modulo, which is what wiki content
                // written against comparable engines expects.
                #[allow(clippy::cast_possible_truncation)]
                let (lhs, rhs) = (lhs as i64, rhs as i64);
                if rhs == 0 {
                    return Err(Error::DivisionByZero(self.name()));
                }
                #[allow(clippy::cast_precision_loss)]
                {
                    (lhs % rhs) as f64
                }
            }
            Op::Pow => lhs.powf(rhs),
            Op::Round => {
                #[allow(clippy::cast_possible_truncation)]
                let digits = (rhs as i32).clamp(-30, 30);
                let scale = 10f64.powi(digits);
                (lhs * scale).round() / scale
            }
            Op::Open | Op::Neg | Op::Pos | Op::Not | Op::Abs | Op::Floor | Op::Ceil => {
                unreachable!()
            }
        };
        operands.push(result);
        Ok(())
    }
}

/// What the scanner expects to see next.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Kind {
    Operand,
    Operator,
}

/// Resolves an alphabetic word into an operator or constant.
fn word(text: &str, expecting: Kind) -> Option<Result<f64, Op>> {
    Some(match text {
        "pi" => Ok(PI),
        "e" => Ok(E),
        "and" => Err(Op::And),
        "or" => Err(Op::Or),
        "mod" => Err(Op::Mod),
        "round" => Err(Op::Round),
        "not" => Err(Op::Not),
        "abs" => Err(Op::Abs),
        "floor" => Err(Op::Floor),
        "ceil" => Err(Op::Ceil),
        _ => return None,
    })
    .filter(|resolved| {
        // Unary words and constants are only valid in operand position.
        match resolved {
            Ok(_) => expecting == Kind::Operand,
            Err(op) => op.is_unary() == (expecting == Kind::Operand),
        }
    })
}

/// Evaluates an expression. An all-whitespace expression yields `None`.
pub fn evaluate(expr: &str) -> Result<Option<f64>, Error> {
    let mut operands = ArrayVec::<f64, MAX_STACK_SIZE>::new_const();
    let mut operators = ArrayVec::<Op, MAX_STACK_SIZE>::new_const();
    let mut expecting = Kind::Operand;

    let mut iter = expr.char_indices().peekable();
    while let Some((pos, c)) = iter.next() {
        if operands.len() == MAX_STACK_SIZE || operators.len() == MAX_STACK_SIZE {
            return Err(Error::StackExhausted(pos));
        }

        if c.is_whitespace() {
            continue;
        }

        if c.is_ascii_digit() || c == '.' {
            let mut end = pos;
            while let Some((next, _)) =
                iter.next_if(|(_, c)| c.is_ascii_digit() || *c == '.')
            {
                end = next;
            }
            let number = expr[pos..=end]
                .parse::<f64>()
                .map_err(|err| Error::ParseFloat(pos, err))?;
            if expecting != Kind::Operand {
                return Err(Error::UnexpectedNumber(pos));
            }
            operands.push(number);
            expecting = Kind::Operator;
            continue;
        }

        if c.is_ascii_alphabetic() {
            let mut end = pos;
            while let Some((next, _)) = iter.next_if(|(_, c)| c.is_ascii_alphabetic()) {
                end = next;
            }
            let text = expr[pos..=end].to_ascii_lowercase();
            match word(&text, expecting) {
                Some(Ok(constant)) => {
                    operands.push(constant);
                    expecting = Kind::Operator;
                }
                Some(Err(op)) => {
                    push_operator(op, &mut operands, &mut operators)?;
                    expecting = Kind::Operand;
                }
                None => return Err(Error::UnknownToken(pos, text)),
            }
            continue;
        }

        let op = match c {
            '(' => {
                if expecting != Kind::Operand {
                    return Err(Error::UnexpectedOperator(pos, "(".into()));
                }
                operators.push(Op::Open);
                continue;
            }
            ')' => {
                loop {
                    match operators.pop() {
                        Some(Op::Open) => break,
                        Some(op) => op.apply(&mut operands)?,
                        None => return Err(Error::UnexpectedCloseBracket(pos)),
                    }
                }
                expecting = Kind::Operator;
                continue;
            }
            '+' if expecting == Kind::Operand => Op::Pos,
            '-' if expecting == Kind::Operand => Op::Neg,
            '+' => Op::Add,
            '-' => Op::Sub,
            '*' => Op::Mul,
            '/' => Op::Div,
            '%' => Op::Mod,
            '^' => Op::Pow,
            '=' => Op::Eq,
            '!' if iter.next_if(|(_, c)| *c == '=').is_some() => Op::Ne,
            '<' if iter.next_if(|(_, c)| *c == '=').is_some() => Op::Le,
            '<' if iter.next_if(|(_, c)| *c == '>').is_some() => Op::Ne,
            '<' => Op::Lt,
            '>' if iter.next_if(|(_, c)| *c == '=').is_some() => Op::Ge,
            '>' => Op::Gt,
            _ => return Err(Error::UnknownToken(pos, c.to_string())),
        };

        if !op.is_unary() && expecting == Kind::Operand {
            return Err(Error::UnexpectedOperator(pos, op.name()));
        }
        push_operator(op, &mut operands, &mut operators)?;
        expecting = Kind::Operand;
    }

    while let Some(op) = operators.pop() {
        if op == Op::Open {
            return Err(Error::MissingCloseBracket);
        }
        op.apply(&mut operands)?;
    }

    match operands.len() {
        0 => Ok(None),
        1 => Ok(operands.first().copied()),
        // Adjacent operands with no operator between them.
        _ => Err(Error::UnexpectedNumber(expr.len())),
    }
}

/// Pushes an operator, first applying every stacked operator that binds at
/// least as tightly. Unary operators stack without reducing.
fn push_operator(
    op: Op,
    operands: &mut ArrayVec<f64, MAX_STACK_SIZE>,
    operators: &mut ArrayVec<Op, MAX_STACK_SIZE>,
) -> Result<(), Error> {
    if !op.is_unary() {
        while let Some(top) = operators.last().copied() {
            if top != Op::Open && top.precedence() >= op.precedence() {
                operators.pop();
                top.apply(operands)?;
            } else {
                break;
            }
        }
    }
    operators.push(op);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[track_caller]
    fn eval(expr: &str) -> f64 {
        evaluate(expr).unwrap().unwrap()
    }

    #[test]
    fn arithmetic() {
        assert_eq!(eval("1 + 2 * 3"), 7.0);
        assert_eq!(eval("(1 + 2) * 3"), 9.0);
        assert_eq!(eval("10 / 4"), 2.5);
        assert_eq!(eval("7 mod 3"), 1.0);
        assert_eq!(eval("7 % 3"), 1.0);
        assert_eq!(eval("2 ^ 10"), 1024.0);
        assert_eq!(eval("-3 + 1"), -2.0);
        assert_eq!(eval("2.5 round 0"), 3.0);
        assert_eq!(eval("1.2345 round 2"), 1.23);
    }

    #[test]
    fn comparisons_and_logic() {
        assert_eq!(eval("1 = 1"), 1.0);
        assert_eq!(eval("1 != 2"), 1.0);
        assert_eq!(eval("1 <> 2"), 1.0);
        assert_eq!(eval("2 <= 2"), 1.0);
        assert_eq!(eval("3 > 4"), 0.0);
        assert_eq!(eval("1 and 0"), 0.0);
        assert_eq!(eval("1 or 0"), 1.0);
        assert_eq!(eval("not 0"), 1.0);
        assert_eq!(eval("not 5"), 0.0);
        assert_eq!(eval("1 + 1 = 2 and 3 > 2"), 1.0);
    }

    #[test]
    fn words_and_constants() {
        assert_eq!(eval("abs -5"), 5.0);
        assert_eq!(eval("floor 2.7"), 2.0);
        assert_eq!(eval("ceil 2.1"), 3.0);
        assert!((eval("pi") - PI).abs() < f64::EPSILON);
        assert!((eval("e") - E).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_is_none() {
        assert_eq!(evaluate(""), Ok(None));
        assert_eq!(evaluate("   "), Ok(None));
    }

    #[test]
    fn errors() {
        assert_eq!(
            evaluate("1 / 0"),
            Err(Error::DivisionByZero(Cow::Borrowed("/")))
        );
        assert_eq!(evaluate("(1 + 2"), Err(Error::MissingCloseBracket));
        assert_eq!(evaluate("1 + 2)"), Err(Error::UnexpectedCloseBracket(5)));
        assert!(matches!(evaluate("1 frob 2"), Err(Error::UnknownToken(2, _))));
        assert!(matches!(evaluate("* 2"), Err(Error::UnexpectedOperator(0, _))));
        assert!(matches!(evaluate("1 2"), Err(Error::UnexpectedNumber(2))));
    }
}
