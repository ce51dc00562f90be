use std::io::{Write, stdout};

use miette::{Error, miette};

use crate::eval::{Interpreter, Value};

/// Install the standard built-in functions into an interpreter. The
/// evaluator itself knows nothing about any of these; it only resolves
/// names through its registry.
pub fn register_default_builtins(interpreter: &mut Interpreter) {
    interpreter.register_builtin("print", print);
    interpreter.register_builtin("println", println);
    interpreter.register_builtin("max", max);
    interpreter.register_builtin("min", min);
}

/// Write each argument followed by a single space, without a newline.
pub fn print(args: &[Value]) -> Result<Value, Error> {
    let mut out = stdout();
    for value in args {
        write!(out, "{value} ").map_err(|e| miette!("{e}"))?;
    }
    out.flush().map_err(|e| miette!("{e}"))?;
    Ok(Value::None)
}

pub fn println(args: &[Value]) -> Result<Value, Error> {
    print(args)?;
    writeln!(stdout()).map_err(|e| miette!("{e}"))?;
    Ok(Value::None)
}

pub fn max(args: &[Value]) -> Result<Value, Error> {
    if args.is_empty() {
        return Err(miette!("max() requires at least one argument"));
    }
    let mut best = args[0].as_number()?;
    for value in &args[1..] {
        let n = value.as_number()?;
        if n > best {
            best = n;
        }
    }
    Ok(Value::Number(best))
}

pub fn min(args: &[Value]) -> Result<Value, Error> {
    if args.is_empty() {
        return Err(miette!("min() requires at least one argument"));
    }
    let mut best = args[0].as_number()?;
    for value in &args[1..] {
        let n = value.as_number()?;
        if n < best {
            best = n;
        }
    }
    Ok(Value::Number(best))
}
