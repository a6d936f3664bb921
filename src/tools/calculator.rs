//! Calculator 工具：受限算术表达式求值
//!
//! 只接受数字、`+ - * / ( ) .` 与空白；任何其它字符在求值前即被拒绝（白名单，而非黑名单）。
//! 求值使用固定文法的递归下降解析器，不存在通用代码执行路径：
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/') unary)*
//! unary   := ('+' | '-') unary | primary
//! primary := number | '(' expr ')'
//! ```

use async_trait::async_trait;

use crate::core::ToolError;
use crate::tools::Tool;

/// 括号与一元运算符的最大嵌套深度
const MAX_DEPTH: usize = 64;
/// 表达式最大长度（字符）
const MAX_EXPRESSION_CHARS: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

fn is_allowed(c: char) -> bool {
    c.is_ascii_digit() || matches!(c, '+' | '-' | '*' | '/' | '(' | ')' | '.' | ' ' | '\t' | '\n' | '\r')
}

fn tokenize(expr: &str) -> Result<Vec<Token>, ToolError> {
    if let Some((pos, c)) = expr.chars().enumerate().find(|(_, c)| !is_allowed(*c)) {
        return Err(ToolError::invalid_expression(format!(
            "disallowed character {:?} at position {}",
            c, pos
        )));
    }

    let chars: Vec<char> = expr.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let token = match c {
            ' ' | '\t' | '\n' | '\r' => {
                i += 1;
                continue;
            }
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '(' => Token::LParen,
            ')' => Token::RParen,
            _ => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                tokens.push(parse_number(&literal)?);
                continue;
            }
        };
        tokens.push(token);
        i += 1;
    }
    Ok(tokens)
}

fn parse_number(literal: &str) -> Result<Token, ToolError> {
    if literal.matches('.').count() > 1 || !literal.chars().any(|c| c.is_ascii_digit()) {
        return Err(ToolError::invalid_expression(format!(
            "malformed number {:?}",
            literal
        )));
    }
    let value: f64 = literal
        .parse()
        .map_err(|_| ToolError::invalid_expression(format!("malformed number {:?}", literal)))?;
    if !value.is_finite() {
        return Err(ToolError::evaluation(format!("number too large: {}", literal)));
    }
    Ok(Token::Number(value))
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.peek();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn enter(&mut self) -> Result<(), ToolError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ToolError::invalid_expression("expression nested too deeply"));
        }
        Ok(())
    }

    fn expr(&mut self) -> Result<f64, ToolError> {
        let mut acc = self.term()?;
        while let Some(op @ (Token::Plus | Token::Minus)) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            acc = if op == Token::Plus { acc + rhs } else { acc - rhs };
            check_finite(acc)?;
        }
        Ok(acc)
    }

    fn term(&mut self) -> Result<f64, ToolError> {
        let mut acc = self.unary()?;
        while let Some(op @ (Token::Star | Token::Slash)) = self.peek() {
            self.pos += 1;
            let rhs = self.unary()?;
            acc = if op == Token::Star {
                acc * rhs
            } else {
                if rhs == 0.0 {
                    return Err(ToolError::evaluation("division by zero"));
                }
                acc / rhs
            };
            check_finite(acc)?;
        }
        Ok(acc)
    }

    fn unary(&mut self) -> Result<f64, ToolError> {
        match self.peek() {
            Some(Token::Plus) => {
                self.pos += 1;
                self.enter()?;
                let v = self.unary();
                self.depth -= 1;
                v
            }
            Some(Token::Minus) => {
                self.pos += 1;
                self.enter()?;
                let v = self.unary().map(|v| -v);
                self.depth -= 1;
                v
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<f64, ToolError> {
        match self.next() {
            Some(Token::Number(v)) => Ok(v),
            Some(Token::LParen) => {
                self.enter()?;
                let v = self.expr()?;
                self.depth -= 1;
                match self.next() {
                    Some(Token::RParen) => Ok(v),
                    _ => Err(ToolError::invalid_expression("missing closing parenthesis")),
                }
            }
            Some(t) => Err(ToolError::invalid_expression(format!("unexpected token {:?}", t))),
            None => Err(ToolError::invalid_expression("unexpected end of expression")),
        }
    }
}

fn check_finite(v: f64) -> Result<(), ToolError> {
    if v.is_finite() {
        Ok(())
    } else {
        Err(ToolError::evaluation("arithmetic overflow"))
    }
}

/// 对表达式求值；非法输入返回 InvalidExpression，除零或溢出返回 EvaluationError
pub fn evaluate(expr: &str) -> Result<f64, ToolError> {
    if expr.chars().count() > MAX_EXPRESSION_CHARS {
        return Err(ToolError::invalid_expression("expression too long"));
    }
    let tokens = tokenize(expr)?;
    if tokens.is_empty() {
        return Err(ToolError::invalid_expression("empty expression"));
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;
    if let Some(t) = parser.peek() {
        return Err(ToolError::invalid_expression(format!("unexpected token {:?}", t)));
    }
    Ok(value)
}

/// 整数结果不带小数点（5781 而不是 5781.0）
pub fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{}", v)
    }
}

/// Calculator 工具
#[derive(Debug, Default, Clone, Copy)]
pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Evaluate an arithmetic expression. Only digits, + - * / ( ) . and spaces are allowed. Example: calculator: (12.5 + 3) * 4"
    }

    async fn execute(&self, argument: &str) -> Result<String, ToolError> {
        let value = evaluate(argument.trim())?;
        Ok(format_number(value))
    }
}
