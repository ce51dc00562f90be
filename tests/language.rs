use indoc::indoc;
use miette::Error;
use pylite::eval::{Interpreter, RuntimeError, Value};
use pylite::system::register_default_builtins;

fn run(source: &str) -> Result<Value, Error> {
    let program = pylite::Parser::new(None, source).parse()?;
    let mut interpreter = Interpreter::new();
    register_default_builtins(&mut interpreter);
    interpreter.evaluate(&program)
}

fn assert_value(source: &str, expected: Value) {
    match run(source) {
        Ok(value) => assert_eq!(value, expected, "source:\n{source}"),
        Err(e) => panic!("script failed: {e:?}\nsource:\n{source}"),
    }
}

fn assert_number(source: &str, expected: f64) {
    assert_value(source, Value::Number(expected));
}

fn assert_runtime_error(source: &str, check: impl FnOnce(&RuntimeError) -> bool) {
    match run(source) {
        Ok(value) => panic!("script succeeded with {value:?} but was expected to fail"),
        Err(e) => {
            let Some(runtime) = e.downcast_ref::<RuntimeError>() else {
                panic!("expected a runtime error, got: {e:?}");
            };
            assert!(check(runtime), "unexpected error: {runtime}");
        }
    }
}

fn assert_parse_failure(source: &str) {
    if pylite::Parser::new(None, source).parse().is_ok() {
        panic!("script parsed but was expected to fail:\n{source}");
    }
}

#[test]
fn arithmetic_and_precedence() {
    assert_number("1 + 2 * 3\n", 7.0);
    assert_number("(1 + 2) * 3\n", 9.0);
    assert_number("10 - 2 - 3\n", 5.0);
    assert_number("2 * 3 % 4\n", 2.0);
    assert_number("-2 * -3\n", 6.0);
}

#[test]
fn string_operators() {
    assert_value("\"ab\" + \"c\"\n", Value::Str("abc".to_string()));
    assert_value("\"ab\" * 3\n", Value::Str("ababab".to_string()));
    assert_value("3 * \"ab\"\n", Value::Str("ababab".to_string()));
    assert_value("-1 * \"ab\"\n", Value::Str(String::new()));
}

#[test]
fn comparisons() {
    assert_value("\"a\" == \"a\"\n", Value::Bool(true));
    assert_value("1 < 2 == True\n", Value::Bool(true));
    assert_runtime_error("\"a\" < \"b\"\n", |e| {
        matches!(e, RuntimeError::TypeMismatch { .. })
    });
}

#[test]
fn counting_loop() {
    let source = indoc! {"
        x = 0
        total = 0
        while x < 5:
            x = x + 1
            total = total + x
        total
    "};
    assert_number(source, 15.0);
}

#[test]
fn elif_chain_is_exclusive() {
    let source = indoc! {"
        def classify(n):
            if n < 0:
                return \"negative\"
            elif n == 0:
                return \"zero\"
            else:
                return \"positive\"
        classify(0)
    "};
    assert_value(source, Value::Str("zero".to_string()));
}

#[test]
fn nested_loops() {
    let source = indoc! {"
        total = 0
        i = 0
        while i < 3:
            j = 0
            while j < 3:
                total = total + 1
                j = j + 1
            i = i + 1
        total
    "};
    assert_number(source, 9.0);
}

#[test]
fn function_arguments_bind_left_to_right() {
    let source = indoc! {"
        def sub(a, b):
            return a - b
        sub(10, 4)
    "};
    assert_number(source, 6.0);
}

#[test]
fn return_unwinds_nested_control_flow() {
    let source = indoc! {"
        def find(limit):
            n = 0
            while True:
                if n * n > limit:
                    return n
                n = n + 1
        find(10)
    "};
    assert_number(source, 4.0);
}

#[test]
fn statements_after_return_do_not_run() {
    let source = indoc! {"
        def f():
            return 1
            boom
        f()
    "};
    assert_number(source, 1.0);
}

#[test]
fn dynamic_scoping_hides_globals_and_restores_them() {
    let source = indoc! {"
        a = 1
        def f(a):
            a = a + 100
            return a
        b = f(5)
        a + b
    "};
    // outer `a` survives the call untouched
    assert_number(source, 106.0);
}

#[test]
fn logic_is_eager() {
    assert_runtime_error("True or missing\n", |e| {
        matches!(e, RuntimeError::UndefinedVariable(name) if name == "missing")
    });
    assert_runtime_error("False and missing\n", |e| {
        matches!(e, RuntimeError::UndefinedVariable(name) if name == "missing")
    });
    assert_value("1 and 2\n", Value::Bool(true));
}

#[test]
fn name_errors() {
    assert_runtime_error("missing\n", |e| {
        matches!(e, RuntimeError::UndefinedVariable(name) if name == "missing")
    });
    assert_runtime_error("missing()\n", |e| {
        matches!(e, RuntimeError::UndefinedFunction(name) if name == "missing")
    });
    let source = indoc! {"
        def twice():
            1
        def twice():
            2
    "};
    assert_runtime_error(source, |e| {
        matches!(e, RuntimeError::FunctionRedefinition(name) if name == "twice")
    });
}

#[test]
fn arity_errors() {
    let source = indoc! {"
        def one(a):
            return a
        one(1, 2)
    "};
    assert_runtime_error(source, |e| {
        matches!(
            e,
            RuntimeError::Arity {
                expected: 1,
                got: 2,
                ..
            }
        )
    });
}

#[test]
fn builtin_extremes() {
    assert_number("max(1, 2, 3)\n", 3.0);
    assert_number("min(4, 2, 8)\n", 2.0);
    assert_number("max(min(5, 3), 1)\n", 3.0);
}

#[test]
fn print_returns_none() {
    assert_value("println(\"hi\")\n", Value::None);
}

#[test]
fn truthiness_drives_conditionals() {
    let source = indoc! {"
        r = \"unset\"
        if \"\":
            r = \"then\"
        else:
            r = \"else\"
        r
    "};
    assert_value(source, Value::Str("else".to_string()));
}

#[test]
fn repl_style_state_accumulation() {
    let mut interpreter = Interpreter::new();
    register_default_builtins(&mut interpreter);

    let define = indoc! {"
        def double(n):
            return n * 2
        base = 10
    "};
    let program = pylite::Parser::new(None, define).parse().expect("parse");
    interpreter.evaluate(&program).expect("evaluate");

    let use_it = "double(base)\n";
    let program = pylite::Parser::new(None, use_it).parse().expect("parse");
    assert_eq!(
        interpreter.evaluate(&program).expect("evaluate"),
        Value::Number(20.0)
    );
}

#[test]
fn malformed_sources_fail_to_parse() {
    assert_parse_failure("if a\n    1\n");
    assert_parse_failure("1 +\n");
    assert_parse_failure("def f(:\n    1\n");
    assert_parse_failure("while a:\nb\n");
}

#[test]
fn bad_indentation_fails_to_parse() {
    let result = pylite::Parser::new(None, "if a:\n  b\n").parse();
    let err = result.expect_err("two spaces is not a level");
    assert!(
        err.downcast_ref::<pylite::lex::IndentationError>().is_some(),
        "expected an indentation error, got: {err:?}"
    );
}
