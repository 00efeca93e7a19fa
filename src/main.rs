use clap::Parser as ClapParser;
use lispy::{Environment, Error, Sexpr, evaluate, parse_program};
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

/// Runs a Lisp program: every top-level expression is evaluated in order
/// against one shared environment.
#[derive(ClapParser, Debug)]
#[command(name = "lispy", version, about)]
struct Args {
    /// Program to run. Reads stdin when absent or `-`.
    file: Option<PathBuf>,

    /// Log filter (e.g. `debug`, `lispy=trace`). Overrides RUST_LOG.
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Don't print the value of each top-level expression.
    #[arg(short, long)]
    quiet: bool,
}

fn init_logging(log_level: Option<&str>) {
    let filter = match log_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn read_source(file: Option<&PathBuf>) -> io::Result<(String, String)> {
    match file {
        Some(path) if path.as_os_str() != "-" => {
            let text = std::fs::read_to_string(path)?;
            Ok((path.display().to_string(), text))
        }
        _ => {
            let mut text = String::new();
            io::stdin().read_to_string(&mut text)?;
            Ok(("<stdin>".to_string(), text))
        }
    }
}

fn run(source_id: &str, input: &str, quiet: bool) -> Result<(), Error> {
    let program = parse_program(input)?;
    debug!(expressions = program.len(), source = source_id, "parsed program");

    let env = Environment::new_global_populated();
    for node in program {
        let value = evaluate(node, env.clone())?;
        if !quiet && !matches!(value.kind, Sexpr::Void) {
            println!("{}", value);
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.log_level.as_deref());

    let (source_id, input) = match read_source(args.file.as_ref()) {
        Ok(source) => source,
        Err(e) => {
            error!(error = %e, "failed to read program");
            eprintln!("lispy: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(&source_id, &input, args.quiet) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if e.pretty_print(&source_id, &input).is_err() {
                eprintln!("{}", e);
            }
            ExitCode::FAILURE
        }
    }
}
