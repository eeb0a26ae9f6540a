use crate::autodiff::{Dual, HyperDual};
use crate::traits::{lit, OdeSystem, Residual, Scalar, UnivariateFunction};
use std::cell::RefCell;
use std::collections::HashMap;
use thiserror::Error;

/// Errors raised while tokenizing, parsing or compiling an expression.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExprError {
    #[error("unexpected character '{0}' at position {1}")]
    UnexpectedChar(char, usize),
    #[error("invalid number literal '{0}'")]
    InvalidNumber(String),
    #[error("unexpected token {0}")]
    UnexpectedToken(String),
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("unknown variable or parameter: {0}")]
    UnknownIdentifier(String),
    #[error("unknown function: {0}")]
    UnknownFunction(String),
    #[error("duplicate name: {0}")]
    DuplicateName(String),
    #[error("function {0} takes a single argument")]
    TooManyArguments(String),
    #[error("expected {expected} values, got {got}")]
    ArityMismatch { expected: usize, got: usize },
}

/// Elementary functions understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sinh,
    Cosh,
    Tanh,
    Exp,
    Ln,
    Log10,
    Sqrt,
    Abs,
}

impl Function {
    pub fn from_name(name: &str) -> Option<Self> {
        let f = match name {
            "sin" => Self::Sin,
            "cos" => Self::Cos,
            "tan" => Self::Tan,
            "asin" => Self::Asin,
            "acos" => Self::Acos,
            "atan" => Self::Atan,
            "sinh" => Self::Sinh,
            "cosh" => Self::Cosh,
            "tanh" => Self::Tanh,
            "exp" => Self::Exp,
            "ln" | "log" => Self::Ln,
            "log10" => Self::Log10,
            "sqrt" => Self::Sqrt,
            "abs" => Self::Abs,
            _ => return None,
        };
        Some(f)
    }

    fn apply<T: Scalar>(self, a: T) -> T {
        match self {
            Self::Sin => a.sin(),
            Self::Cos => a.cos(),
            Self::Tan => a.tan(),
            Self::Asin => a.asin(),
            Self::Acos => a.acos(),
            Self::Atan => a.atan(),
            Self::Sinh => a.sinh(),
            Self::Cosh => a.cosh(),
            Self::Tanh => a.tanh(),
            Self::Exp => a.exp(),
            Self::Ln => a.ln(),
            Self::Log10 => a.log10(),
            Self::Sqrt => a.sqrt(),
            Self::Abs => a.abs(),
        }
    }
}

/// OpCodes for the Stack-based Virtual Machine.
/// The VM operates on a stack of `Scalar` values (f64, Dual or HyperDual).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpCode {
    /// Pushes a constant `f64` value onto the stack.
    LoadConst(f64),
    /// Pushes the value of a variable (by index) onto the stack.
    LoadVar(usize),
    /// Pushes the value of a parameter (by index) onto the stack.
    LoadParam(usize),
    /// Pushes the control (independent) variable onto the stack.
    LoadControl,
    /// Pops top two values (b, a), pushes (a + b).
    Add,
    /// Pops top two values (b, a), pushes (a - b).
    Sub,
    /// Pops top two values (b, a), pushes (a * b).
    Mul,
    /// Pops top two values (b, a), pushes (a / b).
    Div,
    /// Pops top two values (b, a), pushes (a ^ b).
    Pow,
    /// Pops top value (a), pushes a^n for a literal integer exponent.
    Powi(i32),
    /// Pops top value (a), pushes -a.
    Neg,
    /// Pops top value (a), pushes f(a).
    Call(Function),
}

/// Represents a compiled sequence of operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bytecode {
    pub ops: Vec<OpCode>,
}

impl Bytecode {
    pub fn new() -> Self {
        Self { ops: Vec::new() }
    }

    /// Upper bound on the stack depth reached while executing.
    pub fn max_depth(&self) -> usize {
        let mut depth = 0usize;
        let mut max = 0usize;
        for op in &self.ops {
            match op {
                OpCode::LoadConst(_)
                | OpCode::LoadVar(_)
                | OpCode::LoadParam(_)
                | OpCode::LoadControl => depth += 1,
                OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div | OpCode::Pow => {
                    depth = depth.saturating_sub(1)
                }
                OpCode::Powi(_) | OpCode::Neg | OpCode::Call(_) => {}
            }
            max = max.max(depth);
        }
        max
    }
}

/// Stack-based Virtual Machine for evaluating expressions.
///
/// The VM is stateless; `execute` takes all necessary context:
/// - `bytecode`: Instructions to run.
/// - `vars`: Current variable values (read-only).
/// - `params`: Parameter values (read-only), lifted into `T` on load.
/// - `stack`: A mutable buffer for intermediate computations.
///
/// Returns the result of the evaluation (the value left on the stack).
/// Missing variables and stack underflow evaluate to NaN.
pub struct VM;

impl VM {
    pub fn execute<T: Scalar>(
        bytecode: &Bytecode,
        vars: &[T],
        params: &[f64],
        stack: &mut Vec<T>,
    ) -> T {
        Self::execute_with_control(bytecode, T::nan(), vars, params, stack)
    }

    /// Like `execute`, with `control` bound to `LoadControl`.
    pub fn execute_with_control<T: Scalar>(
        bytecode: &Bytecode,
        control: T,
        vars: &[T],
        params: &[f64],
        stack: &mut Vec<T>,
    ) -> T {
        stack.clear();

        for op in &bytecode.ops {
            match *op {
                OpCode::LoadConst(val) => stack.push(lit(val)),
                OpCode::LoadVar(idx) => stack.push(vars.get(idx).copied().unwrap_or_else(T::nan)),
                OpCode::LoadParam(idx) => {
                    stack.push(params.get(idx).map(|&p| lit(p)).unwrap_or_else(T::nan))
                }
                OpCode::LoadControl => stack.push(control),
                OpCode::Add => {
                    let (a, b) = pop2(stack);
                    stack.push(a + b);
                }
                OpCode::Sub => {
                    let (a, b) = pop2(stack);
                    stack.push(a - b);
                }
                OpCode::Mul => {
                    let (a, b) = pop2(stack);
                    stack.push(a * b);
                }
                OpCode::Div => {
                    let (a, b) = pop2(stack);
                    stack.push(a / b);
                }
                OpCode::Pow => {
                    let (a, b) = pop2(stack);
                    stack.push(a.powf(b));
                }
                OpCode::Powi(n) => {
                    let a = pop(stack);
                    stack.push(a.powi(n));
                }
                OpCode::Neg => {
                    let a = pop(stack);
                    stack.push(-a);
                }
                OpCode::Call(f) => {
                    let a = pop(stack);
                    stack.push(f.apply(a));
                }
            }
        }

        pop(stack)
    }
}

/// Per-scalar evaluation stacks, sized once and reused by every call.
#[derive(Debug, Clone, Default)]
pub struct Scratch {
    real: RefCell<Vec<f64>>,
    dual: RefCell<Vec<Dual>>,
    hyper: RefCell<Vec<HyperDual>>,
}

impl Scratch {
    pub fn new(depth: usize) -> Self {
        Self {
            real: RefCell::new(Vec::with_capacity(depth)),
            dual: RefCell::new(Vec::with_capacity(depth)),
            hyper: RefCell::new(Vec::with_capacity(depth)),
        }
    }
}

/// Scalars with a dedicated stack in `Scratch`.
pub trait ScratchScalar: Scalar {
    fn stack(scratch: &Scratch) -> &RefCell<Vec<Self>>;
}

impl ScratchScalar for f64 {
    fn stack(scratch: &Scratch) -> &RefCell<Vec<Self>> {
        &scratch.real
    }
}

impl ScratchScalar for Dual {
    fn stack(scratch: &Scratch) -> &RefCell<Vec<Self>> {
        &scratch.dual
    }
}

impl ScratchScalar for HyperDual {
    fn stack(scratch: &Scratch) -> &RefCell<Vec<Self>> {
        &scratch.hyper
    }
}

fn pop<T: Scalar>(stack: &mut Vec<T>) -> T {
    stack.pop().unwrap_or_else(T::nan)
}

fn pop2<T: Scalar>(stack: &mut Vec<T>) -> (T, T) {
    let b = pop(stack);
    let a = pop(stack);
    (a, b)
}

// --- AST & Parser ---

/// Abstract Syntax Tree nodes for expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Variable(String),
    Binary(Box<Expr>, char, Box<Expr>), // char is operator +, -, *, /, ^
    Neg(Box<Expr>),
    Call(String, Box<Expr>), // functions like sin(x)
}

/// Compiles an AST (`Expr`) into `Bytecode`.
/// Resolves variable and parameter names to indices.
pub struct Compiler {
    pub var_map: HashMap<String, usize>,
    pub param_map: HashMap<String, usize>,
    pub control: Option<String>,
}

impl Compiler {
    pub fn new<S: AsRef<str>>(var_names: &[S], param_names: &[S]) -> Result<Self, ExprError> {
        let mut var_map = HashMap::new();
        for (i, name) in var_names.iter().enumerate() {
            let name = name.as_ref();
            if var_map.insert(name.to_string(), i).is_some() {
                return Err(ExprError::DuplicateName(name.to_string()));
            }
        }

        let mut param_map = HashMap::new();
        for (i, name) in param_names.iter().enumerate() {
            let name = name.as_ref();
            if var_map.contains_key(name) || param_map.insert(name.to_string(), i).is_some() {
                return Err(ExprError::DuplicateName(name.to_string()));
            }
        }

        Ok(Self {
            var_map,
            param_map,
            control: None,
        })
    }

    /// Binds `name` to the control variable, loaded with `LoadControl`.
    pub fn with_control(mut self, name: &str) -> Result<Self, ExprError> {
        if self.var_map.contains_key(name) || self.param_map.contains_key(name) {
            return Err(ExprError::DuplicateName(name.to_string()));
        }
        self.control = Some(name.to_string());
        Ok(self)
    }

    pub fn compile(&self, expr: &Expr) -> Result<Bytecode, ExprError> {
        let mut ops = Vec::new();
        self.compile_recursive(expr, &mut ops)?;
        Ok(Bytecode { ops })
    }

    fn compile_recursive(&self, expr: &Expr, ops: &mut Vec<OpCode>) -> Result<(), ExprError> {
        match expr {
            Expr::Number(n) => ops.push(OpCode::LoadConst(*n)),
            Expr::Variable(name) => {
                if self.control.as_deref() == Some(name.as_str()) {
                    ops.push(OpCode::LoadControl);
                } else if let Some(&idx) = self.var_map.get(name) {
                    ops.push(OpCode::LoadVar(idx));
                } else if let Some(&idx) = self.param_map.get(name) {
                    ops.push(OpCode::LoadParam(idx));
                } else {
                    match name.as_str() {
                        "pi" => ops.push(OpCode::LoadConst(std::f64::consts::PI)),
                        "e" => ops.push(OpCode::LoadConst(std::f64::consts::E)),
                        _ => return Err(ExprError::UnknownIdentifier(name.clone())),
                    }
                }
            }
            Expr::Binary(left, '^', right) => {
                self.compile_recursive(left, ops)?;
                match integer_exponent(right) {
                    Some(n) => ops.push(OpCode::Powi(n)),
                    None => {
                        self.compile_recursive(right, ops)?;
                        ops.push(OpCode::Pow);
                    }
                }
            }
            Expr::Binary(left, op, right) => {
                self.compile_recursive(left, ops)?;
                self.compile_recursive(right, ops)?;
                match op {
                    '+' => ops.push(OpCode::Add),
                    '-' => ops.push(OpCode::Sub),
                    '*' => ops.push(OpCode::Mul),
                    '/' => ops.push(OpCode::Div),
                    other => return Err(ExprError::UnexpectedToken(other.to_string())),
                }
            }
            Expr::Neg(operand) => {
                self.compile_recursive(operand, ops)?;
                ops.push(OpCode::Neg);
            }
            Expr::Call(func, arg) => {
                let function = Function::from_name(func)
                    .ok_or_else(|| ExprError::UnknownFunction(func.clone()))?;
                self.compile_recursive(arg, ops)?;
                ops.push(OpCode::Call(function));
            }
        }
        Ok(())
    }
}

fn integer_exponent(expr: &Expr) -> Option<i32> {
    let value = match expr {
        Expr::Number(n) => *n,
        Expr::Neg(inner) => match inner.as_ref() {
            Expr::Number(n) => -*n,
            _ => return None,
        },
        _ => return None,
    };
    if value.fract() == 0.0 && value.abs() <= i32::MAX as f64 {
        Some(value as i32)
    } else {
        None
    }
}

// --- Simple Parser ---

/// Parses a string expression into an AST.
pub fn parse(input: &str) -> Result<Expr, ExprError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expression()?;
    match parser.peek() {
        None => Ok(expr),
        Some(token) => Err(ExprError::UnexpectedToken(format!("{token:?}"))),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Identifier(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
    Comma,
}

fn tokenize(input: &str) -> Result<Vec<Token>, ExprError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_digit() || c == '.' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            // Exponent only when digits follow, so `2*e` keeps meaning Euler's number.
            if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                let mut j = i + 1;
                if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                    j += 1;
                }
                if j < chars.len() && chars[j].is_ascii_digit() {
                    i = j;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            let literal: String = chars[start..i].iter().collect();
            let value = literal
                .parse()
                .map_err(|_| ExprError::InvalidNumber(literal.clone()))?;
            tokens.push(Token::Number(value));
        } else if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token::Identifier(chars[start..i].iter().collect()));
        } else {
            let token = match c {
                '+' => Token::Plus,
                '-' => Token::Minus,
                '*' if chars.get(i + 1) == Some(&'*') => {
                    i += 1;
                    Token::Caret
                }
                '*' => Token::Star,
                '/' => Token::Slash,
                '^' => Token::Caret,
                '(' => Token::LParen,
                ',' => Token::Comma,
                ')' => Token::RParen,
                other => return Err(ExprError::UnexpectedChar(other, i)),
            };
            tokens.push(token);
            i += 1;
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn consume(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect_rparen(&mut self) -> Result<(), ExprError> {
        match self.consume() {
            Some(Token::RParen) => Ok(()),
            Some(other) => Err(ExprError::UnexpectedToken(format!("{other:?}, expected ')'"))),
            None => Err(ExprError::UnexpectedEnd),
        }
    }

    fn parse_expression(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_term()?;

        loop {
            let op = match self.peek() {
                Some(Token::Plus) => '+',
                Some(Token::Minus) => '-',
                _ => break,
            };
            self.consume();
            let right = self.parse_term()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_unary()?;

        loop {
            let op = match self.peek() {
                Some(Token::Star) => '*',
                Some(Token::Slash) => '/',
                _ => break,
            };
            self.consume();
            let right = self.parse_unary()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.consume();
                let expr = self.parse_unary()?;
                Ok(Expr::Neg(Box::new(expr)))
            }
            Some(Token::Plus) => {
                self.consume();
                self.parse_unary()
            }
            _ => self.parse_power(),
        }
    }

    // Right-associative; the exponent may carry its own sign (x^-2).
    fn parse_power(&mut self) -> Result<Expr, ExprError> {
        let base = self.parse_primary()?;
        if let Some(Token::Caret) = self.peek() {
            self.consume();
            let exponent = self.parse_unary()?;
            return Ok(Expr::Binary(Box::new(base), '^', Box::new(exponent)));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        match self.consume() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Identifier(name)) => {
                if let Some(Token::LParen) = self.peek() {
                    self.consume(); // eat '('
                    let arg = self.parse_expression()?;
                    if let Some(Token::Comma) = self.peek() {
                        return Err(ExprError::TooManyArguments(name));
                    }
                    self.expect_rparen()?;
                    Ok(Expr::Call(name, Box::new(arg)))
                } else {
                    Ok(Expr::Variable(name))
                }
            }
            Some(Token::LParen) => {
                let expr = self.parse_expression()?;
                self.expect_rparen()?;
                Ok(expr)
            }
            Some(other) => Err(ExprError::UnexpectedToken(format!("{other:?}"))),
            None => Err(ExprError::UnexpectedEnd),
        }
    }
}

// --- Expression ---

/// A single compiled expression over named variables.
#[derive(Debug, Clone)]
pub struct Expression {
    source: String,
    bytecode: Bytecode,
    variables: Vec<String>,
    params: Vec<f64>,
    scratch: Scratch,
}

impl Expression {
    pub fn parse<S: AsRef<str>>(source: &str, variables: &[S]) -> Result<Self, ExprError> {
        Self::with_parameters(source, variables, &[])
    }

    /// Compiles `source`, resolving names against `variables` first and then
    /// against the fixed `(name, value)` parameters.
    pub fn with_parameters<S: AsRef<str>>(
        source: &str,
        variables: &[S],
        params: &[(&str, f64)],
    ) -> Result<Self, ExprError> {
        let param_names: Vec<&str> = params.iter().map(|(name, _)| *name).collect();
        let var_names: Vec<&str> = variables.iter().map(|v| v.as_ref()).collect();
        let compiler = Compiler::new(&var_names, &param_names)?;
        let bytecode = compiler.compile(&parse(source)?)?;
        let scratch = Scratch::new(bytecode.max_depth());
        Ok(Self {
            source: source.to_string(),
            bytecode,
            variables: var_names.iter().map(|s| s.to_string()).collect(),
            params: params.iter().map(|(_, v)| *v).collect(),
            scratch,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Evaluates over any scalar type; `vars` follows the variable order.
    pub fn eval<T: ScratchScalar>(&self, vars: &[T]) -> T {
        let mut stack = T::stack(&self.scratch).borrow_mut();
        VM::execute(&self.bytecode, vars, &self.params, &mut stack)
    }

    /// Checked `f64` evaluation.
    pub fn evaluate(&self, vars: &[f64]) -> Result<f64, ExprError> {
        if vars.len() != self.variables.len() {
            return Err(ExprError::ArityMismatch {
                expected: self.variables.len(),
                got: vars.len(),
            });
        }
        Ok(self.eval(vars))
    }

    /// Partial derivative with respect to variable `index`, by forward-mode AD.
    pub fn partial(&self, vars: &[f64], index: usize) -> f64 {
        let duals: Vec<Dual> = vars
            .iter()
            .enumerate()
            .map(|(i, &v)| Dual::new(v, if i == index { 1.0 } else { 0.0 }))
            .collect();
        self.eval(&duals).eps
    }
}

/// Single-variable expressions act as functions with exact derivatives.
impl UnivariateFunction for Expression {
    fn value(&self, x: f64) -> f64 {
        self.eval(&[x])
    }

    fn derivative(&self, x: f64) -> f64 {
        self.eval(&[Dual::variable(x)]).eps
    }

    fn second_derivative(&self, x: f64) -> f64 {
        self.eval(&[HyperDual::seeded(x, 1.0)]).e12
    }
}

// --- EquationSystem ---

/// Several compiled equations sharing one variable layout.
///
/// Variables index the state. In ODE form the control name compiles to
/// `LoadControl` and equation `i` is `d(state_i)/d(control)`; in algebraic
/// form the equations are residuals.
#[derive(Debug, Clone)]
pub struct EquationSystem {
    pub equations: Vec<Bytecode>,
    pub params: Vec<f64>,
    state_names: Vec<String>,
    control: Option<String>,
    scratch: Scratch,
}

impl EquationSystem {
    pub fn ode<S: AsRef<str>>(
        control: &str,
        states: &[S],
        equations: &[S],
        params: &[(&str, f64)],
    ) -> Result<Self, ExprError> {
        Self::build(Some(control), states, equations, params)
    }

    pub fn algebraic<S: AsRef<str>>(
        variables: &[S],
        equations: &[S],
        params: &[(&str, f64)],
    ) -> Result<Self, ExprError> {
        Self::build(None, variables, equations, params)
    }

    fn build<S: AsRef<str>>(
        control: Option<&str>,
        states: &[S],
        equations: &[S],
        params: &[(&str, f64)],
    ) -> Result<Self, ExprError> {
        if equations.len() != states.len() {
            return Err(ExprError::ArityMismatch {
                expected: states.len(),
                got: equations.len(),
            });
        }
        let param_names: Vec<&str> = params.iter().map(|(name, _)| *name).collect();
        let state_refs: Vec<&str> = states.iter().map(|s| s.as_ref()).collect();
        let mut compiler = Compiler::new(&state_refs, &param_names)?;
        if let Some(name) = control {
            compiler = compiler.with_control(name)?;
        }

        let mut bytecodes = Vec::with_capacity(equations.len());
        for eq_str in equations {
            let expr = parse(eq_str.as_ref())?;
            bytecodes.push(compiler.compile(&expr)?);
        }
        let stack_depth = bytecodes.iter().map(Bytecode::max_depth).max().unwrap_or(0);

        Ok(Self {
            equations: bytecodes,
            params: params.iter().map(|(_, v)| *v).collect(),
            state_names: states.iter().map(|s| s.as_ref().to_string()).collect(),
            control: control.map(str::to_string),
            scratch: Scratch::new(stack_depth),
        })
    }

    pub fn state_names(&self) -> &[String] {
        &self.state_names
    }

    pub fn control_name(&self) -> Option<&str> {
        self.control.as_deref()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.state_names.iter().position(|n| n == name)
    }

    fn evaluate<T: ScratchScalar>(&self, t: T, x: &[T], out: &mut [T]) {
        let mut stack = T::stack(&self.scratch).borrow_mut();
        for (i, eq) in self.equations.iter().enumerate() {
            out[i] = VM::execute_with_control(eq, t, x, &self.params, &mut stack);
        }
    }
}

impl<T: ScratchScalar> OdeSystem<T> for EquationSystem {
    fn dimension(&self) -> usize {
        self.equations.len()
    }

    fn apply(&self, t: T, x: &[T], out: &mut [T]) {
        self.evaluate(t, x, out);
    }
}

impl<T: ScratchScalar> Residual<T> for EquationSystem {
    fn dimension(&self) -> usize {
        self.equations.len()
    }

    fn residual(&self, x: &[T], out: &mut [T]) {
        self.evaluate(T::nan(), x, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn eval1(src: &str, x: f64) -> f64 {
        Expression::parse(src, &["x"]).expect("expression should compile").eval(&[x])
    }

    #[test]
    fn precedence_and_associativity() {
        assert_abs_diff_eq!(eval1("1 + 2 * 3", 0.0), 7.0);
        assert_abs_diff_eq!(eval1("2 ^ 3 ^ 2", 0.0), 512.0);
        assert_abs_diff_eq!(eval1("-x^2", 3.0), -9.0);
        assert_abs_diff_eq!(eval1("x**-1", 4.0), 0.25);
        assert_abs_diff_eq!(eval1("8 / 4 / 2", 0.0), 1.0);
        assert_abs_diff_eq!(eval1("(1 + 2) * 3", 0.0), 9.0);
    }

    #[test]
    fn numbers_constants_and_functions() {
        assert_abs_diff_eq!(eval1("1.5e-3 * 2", 0.0), 3e-3, epsilon = 1e-15);
        assert_abs_diff_eq!(eval1("2*e", 0.0), 2.0 * std::f64::consts::E);
        assert_abs_diff_eq!(eval1("cos(pi)", 0.0), -1.0);
        assert_abs_diff_eq!(eval1("log(exp(x))", 2.5), 2.5, epsilon = 1e-12);
        assert_abs_diff_eq!(eval1("sqrt(abs(x))", -16.0), 4.0);
        assert_abs_diff_eq!(eval1("log10(x)", 1000.0), 3.0, epsilon = 1e-12);
    }

    #[test]
    fn integer_exponents_compile_to_powi() {
        let expr = Expression::parse("x^3", &["x"]).unwrap();
        assert!(expr.bytecode.ops.contains(&OpCode::Powi(3)));
        assert_abs_diff_eq!(expr.eval(&[-2.0]), -8.0);
    }

    #[test]
    fn errors_are_reported() {
        assert_eq!(
            Expression::parse("x + y", &["x"]).unwrap_err(),
            ExprError::UnknownIdentifier("y".into())
        );
        assert_eq!(
            Expression::parse("foo(x)", &["x"]).unwrap_err(),
            ExprError::UnknownFunction("foo".into())
        );
        assert_eq!(parse("(1 + 2").unwrap_err(), ExprError::UnexpectedEnd);
        assert!(matches!(parse("1 2"), Err(ExprError::UnexpectedToken(_))));
        assert!(matches!(parse("1 $ 2"), Err(ExprError::UnexpectedChar('$', 2))));
        assert_eq!(
            parse("atan(y, x)").unwrap_err(),
            ExprError::TooManyArguments("atan".into())
        );
        assert!(matches!(parse("x, y"), Err(ExprError::UnexpectedToken(_))));
        assert!(matches!(
            Compiler::new(&["x", "x"], &[]),
            Err(ExprError::DuplicateName(_))
        ));
    }

    #[test]
    fn checked_evaluation_validates_arity() {
        let expr = Expression::parse("x * y", &["x", "y"]).unwrap();
        assert_abs_diff_eq!(expr.evaluate(&[2.0, 3.0]).unwrap(), 6.0);
        assert_eq!(
            expr.evaluate(&[2.0]).unwrap_err(),
            ExprError::ArityMismatch { expected: 2, got: 1 }
        );
    }

    #[test]
    fn derivatives_through_the_vm() {
        let expr = Expression::parse("x^3 - 2*x - 5", &["x"]).unwrap();
        assert_abs_diff_eq!(expr.derivative(2.0), 10.0, epsilon = 1e-12);

        assert_abs_diff_eq!(expr.second_derivative(2.0), 12.0, epsilon = 1e-12);

        let two = Expression::parse("x * sin(y)", &["x", "y"]).unwrap();
        assert_abs_diff_eq!(two.partial(&[2.0, 0.5], 1), 2.0 * 0.5f64.cos(), epsilon = 1e-12);
    }

    #[test]
    fn parameters_are_resolved_after_variables() {
        let expr = Expression::with_parameters("-k * y", &["y"], &[("k", 0.5)]).unwrap();
        assert_abs_diff_eq!(expr.eval(&[4.0]), -2.0);
    }

    #[test]
    fn ode_system_binds_control_and_states() {
        let system = EquationSystem::ode("t", &["y", "v"], &["v", "-w^2 * y + t"], &[("w", 2.0)])
            .expect("system should compile");
        let mut out = [0.0; 2];
        OdeSystem::apply(&system, 1.0, &[3.0, 4.0], &mut out);
        assert_abs_diff_eq!(out[0], 4.0);
        assert_abs_diff_eq!(out[1], -12.0 + 1.0);
        assert_eq!(system.index_of("v"), Some(1));
        assert_eq!(system.control_name(), Some("t"));
    }

    #[test]
    fn repeated_evaluation_reuses_scratch_stacks() {
        let system = EquationSystem::ode("t", &["y"], &["sin(t) * (y + 2 * y^3) / (1 + t^2)"], &[])
            .unwrap();
        let depth = system.equations[0].max_depth();
        assert_eq!(system.equations[0].ops[0], OpCode::LoadControl);

        let mut out = [0.0; 1];
        let mut dual_out = [Dual::constant(0.0); 1];
        let capacity = (
            system.scratch.real.borrow().capacity(),
            system.scratch.dual.borrow().capacity(),
        );
        assert!(capacity.0 >= depth && capacity.1 >= depth);
        for k in 0..50 {
            let t = k as f64 * 0.1;
            OdeSystem::apply(&system, t, &[1.0], &mut out);
            OdeSystem::apply(&system, Dual::constant(t), &[Dual::variable(1.0)], &mut dual_out);
        }
        assert_eq!(
            (
                system.scratch.real.borrow().capacity(),
                system.scratch.dual.borrow().capacity(),
            ),
            capacity
        );
        assert_abs_diff_eq!(out[0], 4.9f64.sin() * 3.0 / (1.0 + 4.9 * 4.9), epsilon = 1e-12);
    }

    #[test]
    fn control_name_must_be_distinct() {
        let err = EquationSystem::ode("y", &["y"], &["y"], &[]).unwrap_err();
        assert_eq!(err, ExprError::DuplicateName("y".to_string()));
        let err = EquationSystem::ode("t", &["y"], &["k * y"], &[("t", 1.0)]).unwrap_err();
        assert_eq!(err, ExprError::DuplicateName("t".to_string()));
    }

    #[test]
    fn algebraic_system_evaluates_residuals() {
        let system = EquationSystem::algebraic(&["x", "y"], &["x^2 + y^2 - 4", "x - y"], &[])
            .unwrap();
        let mut out = [0.0; 2];
        Residual::residual(&system, &[2.0, 0.0], &mut out);
        assert_eq!(out, [0.0, 2.0]);
    }

    #[test]
    fn system_rejects_mismatched_equation_count() {
        let err = EquationSystem::ode("t", &["y", "v"], &["v"], &[]).unwrap_err();
        assert_eq!(err, ExprError::ArityMismatch { expected: 2, got: 1 });
    }
}
