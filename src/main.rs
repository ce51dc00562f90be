use std::fs;
use std::io::{BufRead, Write, stdin, stdout};
use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;
use miette::IntoDiagnostic;
use miette::WrapErr;
use pylite::dot::DotGenerator;
use pylite::eval::{Interpreter, Value};
use pylite::lex::{IndentationError, SingleTokenError, StringTerminationError};
use pylite::system::register_default_builtins;

#[derive(Parser, Debug)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the token stream of a source file
    Tokenize { filename: PathBuf },
    /// Print the parsed syntax tree
    Parse { filename: PathBuf },
    /// Print a Graphviz dot rendering of the syntax tree
    Dot { filename: PathBuf },
    /// Execute a script
    Run { filename: PathBuf },
    /// Start an interactive session
    Repl,
}

fn main() -> miette::Result<()> {
    let args = Args::parse();

    match args.command {
        Commands::Tokenize { filename } => {
            let source = read_source(&filename)?;

            for token in pylite::Lexer::new(filename.to_str(), &source) {
                match token {
                    Ok(token) => println!("{token}"),
                    Err(e) => {
                        if let Some(err) = e.downcast_ref::<SingleTokenError>() {
                            eprintln!(
                                "[line {}] Error: Unexpected character: {}",
                                err.line(),
                                err.token
                            );
                        } else if let Some(err) = e.downcast_ref::<StringTerminationError>() {
                            eprintln!("[line {}] Error: Unterminated string", err.line());
                        } else if let Some(err) = e.downcast_ref::<IndentationError>() {
                            eprintln!("[line {}] Error: Unexpected indent", err.line());
                        }
                        eprintln!("{e:?}");

                        std::process::exit(65);
                    }
                }
            }
        }
        Commands::Parse { filename } => {
            let source = read_source(&filename)?;

            match pylite::Parser::new(filename.to_str(), &source).parse() {
                Ok(program) => println!("{program:#?}"),
                Err(e) => {
                    eprintln!("{e:?}");
                    std::process::exit(65);
                }
            }
        }
        Commands::Dot { filename } => {
            let source = read_source(&filename)?;

            match pylite::Parser::new(filename.to_str(), &source).parse() {
                Ok(program) => println!("{}", DotGenerator::generate(&program)),
                Err(e) => {
                    eprintln!("{e:?}");
                    std::process::exit(65);
                }
            }
        }
        Commands::Run { filename } => {
            let source = read_source(&filename)?;

            let program = match pylite::Parser::new(filename.to_str(), &source).parse() {
                Ok(program) => program,
                Err(e) => {
                    eprintln!("{e:?}");
                    std::process::exit(65);
                }
            };

            let mut interpreter = Interpreter::new();
            register_default_builtins(&mut interpreter);
            if let Err(e) = interpreter.evaluate(&program) {
                print_traceback(interpreter.call_stack());
                eprintln!("{e:?}");
                std::process::exit(70);
            }
        }
        Commands::Repl => repl()?,
    }
    Ok(())
}

fn read_source(filename: &PathBuf) -> miette::Result<String> {
    fs::read_to_string(filename)
        .into_diagnostic()
        .wrap_err_with(|| format!("reading `{}` failed", filename.display()))
}

fn print_traceback(call_stack: &[String]) {
    if call_stack.is_empty() {
        return;
    }
    eprintln!("Traceback (most recent call last):");
    for name in call_stack {
        eprintln!("  in {name}()");
    }
}

/// Interactive loop. One interpreter lives for the whole session, so
/// variables and functions accumulate across inputs; each line is
/// parsed into a fresh tree before evaluation.
fn repl() -> miette::Result<()> {
    let mut interpreter = Interpreter::new();
    register_default_builtins(&mut interpreter);

    let stdin = stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!(">>> ");
        stdout().flush().into_diagnostic()?;
        let Some(line) = lines.next() else { break };
        let mut source = line.into_diagnostic()?;

        if source.trim().is_empty() {
            continue;
        }
        if source.trim() == ":vars" {
            let mut variables: Vec<_> = interpreter.environment().iter().collect();
            variables.sort_by(|a, b| a.0.cmp(b.0));
            println!("------------------");
            println!("Current Variables:");
            for (name, value) in variables {
                println!("  {name} = {value}");
            }
            println!("------------------");
            continue;
        }

        // a block statement keeps reading until a blank line
        if source.trim_end().ends_with(':') {
            loop {
                print!("... ");
                stdout().flush().into_diagnostic()?;
                let Some(next) = lines.next() else { break };
                let next = next.into_diagnostic()?;
                if next.trim().is_empty() {
                    break;
                }
                source.push('\n');
                source.push_str(&next);
            }
        }
        source.push('\n');

        let program = match pylite::Parser::new(None, &source).parse() {
            Ok(program) => program,
            Err(e) => {
                eprintln!("{e:?}");
                continue;
            }
        };
        match interpreter.evaluate(&program) {
            Ok(Value::None) => {}
            Ok(value) => println!("{value}"),
            Err(e) => {
                print_traceback(interpreter.call_stack());
                eprintln!("{e:?}");
            }
        }
    }
    Ok(())
}
