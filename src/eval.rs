use std::collections::HashMap;
use std::fmt::Display;

use miette::{Diagnostic, Error};
use thiserror::Error;

use crate::parse::{Node, Op};

/// Errors raised while evaluating a program. All of them abort the
/// current evaluation; the host decides whether to continue with the
/// next input.
#[derive(Error, Debug, Diagnostic, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("name '{0}' is not defined")]
    #[diagnostic(code(pylite::name_error))]
    UndefinedVariable(String),

    #[error("function '{0}' is not defined")]
    #[diagnostic(code(pylite::name_error))]
    UndefinedFunction(String),

    #[error("function '{0}' is already defined")]
    #[diagnostic(code(pylite::name_error))]
    FunctionRedefinition(String),

    #[error("function '{name}' expects {expected} arguments, got {got}")]
    #[diagnostic(code(pylite::arity_error))]
    Arity {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("type error in '{op}': cannot compare {left} and {right}")]
    #[diagnostic(code(pylite::type_error))]
    TypeMismatch {
        op: Op,
        left: &'static str,
        right: &'static str,
    },

    #[error("value of type {0} is not a number")]
    #[diagnostic(code(pylite::type_error))]
    NotANumber(&'static str),

    #[error("modulo by zero")]
    #[diagnostic(code(pylite::type_error))]
    ModuloByZero,

    #[error("number literal '{0}' is malformed")]
    #[diagnostic(code(pylite::type_error))]
    MalformedNumber(String),

    #[error("'return' outside of a function")]
    #[diagnostic(code(pylite::return_outside_function))]
    ReturnOutsideFunction,
}

/// A runtime value. Values are copied on every use; nothing is shared
/// or mutated in place.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Bool(bool),
    Str(String),
    None,
}

impl Value {
    /// Numeric view of a value. Booleans coerce to `1`/`0`; everything
    /// else is a type error.
    pub fn as_number(&self) -> Result<f64, RuntimeError> {
        match self {
            Value::Number(n) => Ok(*n),
            Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            other => Err(RuntimeError::NotANumber(other.type_name())),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Bool(_) => "bool",
            Value::Str(_) => "string",
            Value::None => "none",
        }
    }

    /// Truthiness: a boolean is itself, a number is truthy iff nonzero,
    /// a string is truthy iff nonempty, none is falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::None => false,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Number(n) => {
                if n.is_finite() && *n == n.trunc() {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{n}")
                }
            }
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Str(s) => write!(f, "{s}"),
            Value::None => write!(f, "None"),
        }
    }
}

/// A single flat mapping from variable name to value. There are no
/// nested lexical scopes: a user-function call swaps the whole map out
/// and back in instead.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    values: HashMap<String, Value>,
}

impl Environment {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn define(&mut self, name: String, value: Value) {
        self.values.insert(name, value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }
}

/// A host-provided callable, registered by name before evaluation.
pub type BuiltinFn = fn(&[Value]) -> Result<Value, Error>;

#[derive(Debug, Clone)]
struct Function {
    parameters: Vec<String>,
    body: Node,
}

/// Outcome of executing one statement: either a value to carry forward,
/// or a `return` unwinding toward the enclosing function call.
enum Flow {
    Normal(Value),
    Return(Value),
}

/// Tree-walking evaluator.
///
/// The environment and both function registries outlive any particular
/// program: an interactive host parses each input into a fresh tree and
/// evaluates it against the same interpreter, accumulating state.
pub struct Interpreter {
    environment: Environment,
    builtins: HashMap<String, BuiltinFn>,
    functions: HashMap<String, Function>,
    call_stack: Vec<String>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Interpreter {
            environment: Environment::default(),
            builtins: HashMap::new(),
            functions: HashMap::new(),
            call_stack: Vec::new(),
        }
    }

    pub fn register_builtin(&mut self, name: impl Into<String>, function: BuiltinFn) {
        self.builtins.insert(name.into(), function);
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Function names in flight at the moment of the last failure,
    /// most recent call last.
    pub fn call_stack(&self) -> &[String] {
        &self.call_stack
    }

    /// Evaluate a program against the accumulated state and return the
    /// value of its last statement.
    pub fn evaluate(&mut self, program: &Node) -> Result<Value, Error> {
        self.call_stack.clear();
        match self.exec(program)? {
            Flow::Normal(value) => Ok(value),
            Flow::Return(_) => Err(RuntimeError::ReturnOutsideFunction.into()),
        }
    }

    fn exec(&mut self, node: &Node) -> Result<Flow, Error> {
        match node {
            Node::Block(statements) => {
                let mut last = Value::None;
                for statement in statements {
                    match self.exec(statement)? {
                        Flow::Normal(value) => last = value,
                        ret @ Flow::Return(_) => return Ok(ret),
                    }
                }
                Ok(Flow::Normal(last))
            }
            Node::If {
                condition,
                body,
                or_else,
            } => {
                if self.eval(condition)?.is_truthy() {
                    self.exec(body)
                } else if let Some(or_else) = or_else {
                    self.exec(or_else)
                } else {
                    Ok(Flow::Normal(Value::None))
                }
            }
            Node::While { condition, body } => {
                while self.eval(condition)?.is_truthy() {
                    if let ret @ Flow::Return(_) = self.exec(body)? {
                        return Ok(ret);
                    }
                }
                Ok(Flow::Normal(Value::None))
            }
            Node::FunctionDef {
                name,
                parameters,
                body,
            } => {
                if self.functions.contains_key(name) {
                    return Err(RuntimeError::FunctionRedefinition(name.clone()).into());
                }
                self.functions.insert(
                    name.clone(),
                    Function {
                        parameters: parameters.clone(),
                        body: (**body).clone(),
                    },
                );
                Ok(Flow::Normal(Value::None))
            }
            Node::Return(value) => {
                let value = self.eval(value)?;
                Ok(Flow::Return(value))
            }
            Node::Assignment { target, value } => {
                let value = self.eval(value)?;
                self.environment.define(target.clone(), value);
                Ok(Flow::Normal(Value::None))
            }
            expression => Ok(Flow::Normal(self.eval(expression)?)),
        }
    }

    fn eval(&mut self, node: &Node) -> Result<Value, Error> {
        match node {
            Node::Number(text) => {
                let n = text
                    .parse::<f64>()
                    .map_err(|_| RuntimeError::MalformedNumber(text.clone()))?;
                Ok(Value::Number(n))
            }
            Node::String(text) => Ok(Value::Str(text.clone())),
            Node::Boolean(text) => Ok(Value::Bool(text == "True")),
            Node::Variable(name) => match self.environment.get(name) {
                Some(value) => Ok(value.clone()),
                None => Err(RuntimeError::UndefinedVariable(name.clone()).into()),
            },
            Node::Unary { op, operand } => {
                let value = self.eval(operand)?;
                match op {
                    Op::Plus => Ok(value),
                    Op::Minus => Ok(Value::Number(-value.as_number()?)),
                    Op::Not => Ok(Value::Bool(!value.is_truthy())),
                    _ => unreachable!("the parser only emits prefix +, - and not"),
                }
            }
            Node::Binary { op, left, right } => {
                // both operands are always evaluated; `and`/`or` do not
                // short-circuit
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                binary_op(*op, left, right)
            }
            Node::Call { name, arguments } => self.call(name, arguments),
            Node::Assignment { .. }
            | Node::Block(_)
            | Node::If { .. }
            | Node::While { .. }
            | Node::FunctionDef { .. }
            | Node::Return(_) => {
                unreachable!("statement nodes never appear in expression position")
            }
        }
    }

    fn call(&mut self, name: &str, arguments: &[Node]) -> Result<Value, Error> {
        self.call_stack.push(name.to_string());

        let mut args = Vec::with_capacity(arguments.len());
        for argument in arguments {
            args.push(self.eval(argument)?);
        }

        // builtins shadow user definitions
        if let Some(builtin) = self.builtins.get(name) {
            let value = builtin(&args)?;
            self.call_stack.pop();
            return Ok(value);
        }

        let Some(function) = self.functions.get(name) else {
            return Err(RuntimeError::UndefinedFunction(name.to_string()).into());
        };
        let function = function.clone();

        if args.len() != function.parameters.len() {
            return Err(RuntimeError::Arity {
                name: name.to_string(),
                expected: function.parameters.len(),
                got: args.len(),
            }
            .into());
        }

        // dynamic scoping: the call sees only its parameters, and the
        // caller's environment is restored wholesale afterwards
        let mut call_env = Environment::default();
        for (parameter, arg) in function.parameters.iter().zip(args) {
            call_env.define(parameter.clone(), arg);
        }
        let saved = std::mem::replace(&mut self.environment, call_env);
        let flow = self.exec(&function.body);
        self.environment = saved;

        let flow = flow?;
        self.call_stack.pop();
        Ok(match flow {
            Flow::Return(value) => value,
            Flow::Normal(_) => Value::None,
        })
    }
}

fn binary_op(op: Op, left: Value, right: Value) -> Result<Value, Error> {
    let value = match op {
        Op::Plus => match (&left, &right) {
            (Value::Str(l), Value::Str(r)) => Value::Str(format!("{l}{r}")),
            _ => Value::Number(left.as_number()? + right.as_number()?),
        },
        Op::Minus => Value::Number(left.as_number()? - right.as_number()?),
        Op::Mul => match (&left, &right) {
            (Value::Str(s), Value::Number(n)) => Value::Str(repeat_str(s, *n)),
            (Value::Number(n), Value::Str(s)) => Value::Str(repeat_str(s, *n)),
            _ => Value::Number(left.as_number()? * right.as_number()?),
        },
        Op::Div => Value::Number(left.as_number()? / right.as_number()?),
        Op::Mod => {
            let l = left.as_number()? as i64;
            let r = right.as_number()? as i64;
            if r == 0 {
                return Err(RuntimeError::ModuloByZero.into());
            }
            Value::Number(l.wrapping_rem(r) as f64)
        }
        Op::EqEqual | Op::NotEqual => {
            let equal = match (&left, &right) {
                (Value::Str(l), Value::Str(r)) => l == r,
                (Value::Str(_), _) | (_, Value::Str(_)) => {
                    return Err(RuntimeError::TypeMismatch {
                        op,
                        left: left.type_name(),
                        right: right.type_name(),
                    }
                    .into());
                }
                _ => left.as_number()? == right.as_number()?,
            };
            Value::Bool(if op == Op::EqEqual { equal } else { !equal })
        }
        Op::Less | Op::LessEqual | Op::Greater | Op::GreaterEqual => {
            if matches!(left, Value::Str(_)) || matches!(right, Value::Str(_)) {
                return Err(RuntimeError::TypeMismatch {
                    op,
                    left: left.type_name(),
                    right: right.type_name(),
                }
                .into());
            }
            let l = left.as_number()?;
            let r = right.as_number()?;
            Value::Bool(match op {
                Op::Less => l < r,
                Op::LessEqual => l <= r,
                Op::Greater => l > r,
                _ => l >= r,
            })
        }
        Op::And => Value::Bool(left.is_truthy() && right.is_truthy()),
        Op::Or => Value::Bool(left.is_truthy() || right.is_truthy()),
        Op::Not => unreachable!("'not' is a prefix operator"),
    };
    Ok(value)
}

/// String repetition for `*`: the count is truncated to an integer and
/// a negative count yields the empty string.
fn repeat_str(s: &str, count: f64) -> String {
    let count = count.trunc() as i64;
    if count <= 0 {
        String::new()
    } else {
        s.repeat(count as usize)
    }
}
