use std::panic;
use std::process;
use std::sync::Once;

use minischeme::analyzer::analyze;
use minischeme::environment::Environment;
use minischeme::evaluator::evaluate;
use minischeme::primitives::primitives;
use minischeme::reader::read_one;
use minischeme::value::Value;
use minischeme::{Error, syntax::Syntax};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::debug;

static TRACING_INIT: Once = Once::new();

/// Install a tracing subscriber, only when `RUST_LOG` is set
fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{EnvFilter, fmt, prelude::*};

        if std::env::var("RUST_LOG").is_ok() {
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(EnvFilter::from_default_env())
                .init();
        }
    });
}

fn main() {
    init_tracing();

    let result = panic::catch_unwind(run_repl);

    if let Err(panic_info) = result {
        eprintln!("The REPL encountered an unexpected error and must exit.");

        if let Some(msg) = panic_info.downcast_ref::<&str>() {
            eprintln!("Error: {msg}");
        } else if let Some(msg) = panic_info.downcast_ref::<String>() {
            eprintln!("Error: {msg}");
        } else {
            eprintln!("Error: Unknown panic occurred");
        }

        process::exit(1);
    }
}

/// What the REPL should do after a datum has been handled
enum Flow {
    Continue,
    Exit,
}

fn run_repl() {
    println!("minischeme");
    println!("Enter S-expressions like: (+ 1 2)");
    println!("Type :help for more commands, or Ctrl+D to exit.");
    println!();

    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(err) => {
            eprintln!("Could not initialize REPL: {err}");
            return;
        }
    };
    let mut env = Environment::new();
    // Text of a datum that spans several lines
    let mut pending = String::new();

    loop {
        let prompt = if pending.is_empty() { "scm> " } else { "...> " };
        match rl.readline(prompt) {
            Ok(line) => {
                if pending.is_empty() {
                    let command = line.trim();
                    if command.is_empty() {
                        continue;
                    }
                    let _ = rl.add_history_entry(command);

                    match command {
                        ":help" => {
                            print_help();
                            continue;
                        }
                        ":env" => {
                            print_environment(&env);
                            continue;
                        }
                        ":quit" | ":exit" => {
                            println!("Goodbye!");
                            break;
                        }
                        _ => {}
                    }
                } else {
                    let _ = rl.add_history_entry(line.trim());
                }

                pending.push_str(&line);
                pending.push('\n');

                if let Flow::Exit = run_pending(&mut pending, &mut env) {
                    break;
                }
            }

            Err(ReadlineError::Interrupted) => {
                // Ctrl+C abandons a partially entered datum
                pending.clear();
            }
            Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                println!("Error: {err:?}");
                break;
            }
        }
    }
}

/// Evaluate every complete datum in `pending`, leaving an incomplete tail
/// in place for the next line
fn run_pending(pending: &mut String, env: &mut Environment) -> Flow {
    let mut rest = pending.as_str();
    loop {
        match read_one(rest) {
            Ok(Some((syntax, next))) => {
                rest = next;
                if let Flow::Exit = run_datum(&syntax, env) {
                    return Flow::Exit;
                }
            }
            Ok(None) => {
                pending.clear();
                return Flow::Continue;
            }
            Err(e) if e.is_incomplete() => {
                *pending = rest.to_string();
                return Flow::Continue;
            }
            Err(e) => {
                report(&e);
                pending.clear();
                return Flow::Continue;
            }
        }
    }
}

fn run_datum(syntax: &Syntax, env: &mut Environment) -> Flow {
    let result = analyze(syntax, env).and_then(|expr| evaluate(&expr, env));
    match result {
        Ok(value) if value.is_terminate() => Flow::Exit,
        Ok(value) => {
            if !value.is_void() {
                println!("{value}");
            }
            Flow::Continue
        }
        Err(e) => {
            report(&e);
            Flow::Continue
        }
    }
}

fn report(error: &Error) {
    debug!(%error, "form failed");
    println!("RuntimeError");
}

fn print_help() {
    println!("minischeme commands:");
    println!("  :help      - Show this help message");
    println!("  :env       - Show global bindings");
    println!("  :quit      - Exit the interpreter");
    println!("  :exit      - Exit the interpreter");
    println!("  Ctrl+D     - Exit the interpreter");
    println!();
    println!("Special forms:");
    println!("  quote if cond and or begin lambda define let letrec set!");
    println!();
    println!("Primitives:");
    let names: Vec<&str> = primitives().iter().map(|p| p.name).collect();
    for row in names.chunks(8) {
        println!("  {}", row.join(" "));
    }
    println!();
    println!("Examples:");
    println!("  (define (fact n) (if (= n 0) 1 (* n (fact (- n 1)))))");
    println!("  (fact 20)");
    println!("  (/ 1 3)");
    println!("  (cons 1 '(2 . 3))");
    println!();
    println!("Set RUST_LOG=minischeme=debug to see why a form failed.");
}

fn print_environment(env: &Environment) {
    let bindings = env.global_bindings();

    if bindings.is_empty() {
        println!("No global definitions.");
        return;
    }

    println!("Global bindings ({} total):", bindings.len());
    println!();

    let mut procedures = Vec::new();
    let mut values = Vec::new();

    for (name, value) in bindings {
        match value {
            Value::Procedure(_) => procedures.push(name),
            _ => values.push((name, value)),
        }
    }

    if !procedures.is_empty() {
        println!("Procedures ({}):", procedures.len());
        let mut col = 0;
        for name in procedures {
            print!("  {name:<15}");
            col += 1;
            if col % 4 == 0 {
                println!();
            }
        }
        if col % 4 != 0 {
            println!();
        }
        println!();
    }

    if !values.is_empty() {
        println!("Values ({}):", values.len());
        for (name, value) in values {
            println!("  {name} = {value}");
        }
    }
}
