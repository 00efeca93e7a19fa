use std::borrow::Cow;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use clap::Parser as ClapParser;
use rustyline::error::ReadlineError;
use rustyline::highlight::{CmdKind, Highlighter};
use rustyline::history::DefaultHistory;
use rustyline::validate::{ValidationContext, ValidationResult, Validator};
use rustyline::{Cmd, Completer, Context, Editor, EventHandler, KeyCode, KeyEvent, Modifiers};
use rustyline::{Helper, Highlighter, Hinter, Validator};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use lispy::evaluator::special_form_identifiers;
use lispy::{
    Environment, Error, ParseError, Sexpr, TokenKind, evaluate, parse_program, parse_str,
    run_program, tokenize,
};

/// Interactive read-eval-print loop.
#[derive(ClapParser, Debug)]
#[command(name = "lispy-repl", version, about)]
struct Args {
    /// File the input history is loaded from and saved to.
    #[arg(long, value_name = "PATH", default_value = ".lispy_history")]
    history: PathBuf,

    /// Neither load nor save history.
    #[arg(long)]
    no_history: bool,

    /// Use vi key bindings instead of emacs.
    #[arg(long)]
    vi: bool,

    #[arg(long, value_name = "TEXT", default_value = "lispy> ")]
    prompt: String,

    /// Log filter (e.g. `debug`, `lispy=trace`). Overrides RUST_LOG.
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Evaluate this file before the first prompt.
    #[arg(long, value_name = "FILE")]
    load: Option<PathBuf>,
}

struct LispCompleter {
    env: Rc<RefCell<Environment>>,
}

impl LispCompleter {
    fn new(env: Rc<RefCell<Environment>>) -> Self {
        LispCompleter { env }
    }

    // Every visible name starting with `prefix`, minus the prefix itself.
    fn suffixes(&self, prefix: &str) -> Vec<String> {
        let mut suffixes: Vec<String> = self
            .env
            .borrow()
            .get_identifiers()
            .union(&special_form_identifiers())
            .filter_map(|id| id.strip_prefix(prefix))
            .filter(|suffix| !suffix.is_empty())
            .map(str::to_string)
            .collect();
        suffixes.sort();
        suffixes
    }
}

impl rustyline::completion::Completer for LispCompleter {
    type Candidate = String;
    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<String>)> {
        let tokens = tokenize(&line[..pos]);
        let candidates = match tokens.last() {
            // Only complete an atom the cursor is touching
            Some(token) if token.span.end == pos => match &token.kind {
                TokenKind::Atom(prefix) => self.suffixes(prefix),
                _ => vec![],
            },
            _ => vec![],
        };
        Ok((pos, candidates))
    }
}

#[derive(Completer, Helper, Highlighter, Hinter, Validator)]
struct ReplHelper {
    #[rustyline(Validator)]
    validator: LispValidator,
    #[rustyline(Highlighter)]
    highlighter: ParenHighlighter,
    #[rustyline(Completer)]
    completer: LispCompleter,
}

struct LispValidator;

impl Validator for LispValidator {
    fn validate(&self, ctx: &mut ValidationContext) -> rustyline::Result<ValidationResult> {
        // Keep reading lines while a list is still open. Every other error is
        // left for the evaluation step to report.
        match parse_program(ctx.input()) {
            Err(ParseError::UnexpectedEof) => Ok(ValidationResult::Incomplete),
            _ => Ok(ValidationResult::Valid(None)),
        }
    }
}

struct ParenHighlighter;

impl ParenHighlighter {
    // Byte offsets of matched pairs, and of `)` that close nothing.
    fn match_parens(line: &str) -> (Vec<(usize, usize)>, Vec<usize>) {
        let mut open = Vec::new();
        let mut pairs = Vec::new();
        let mut unmatched = Vec::new();
        for (i, c) in line.char_indices() {
            match c {
                '(' => open.push(i),
                ')' => match open.pop() {
                    Some(start) => pairs.push((start, i)),
                    None => unmatched.push(i),
                },
                _ => {}
            }
        }
        (pairs, unmatched)
    }
}

impl Highlighter for ParenHighlighter {
    fn highlight<'l>(&self, line: &'l str, pos: usize) -> Cow<'l, str> {
        let (pairs, unmatched) = Self::match_parens(line);
        if unmatched.is_empty() && pos == 0 {
            return Cow::Borrowed(line);
        }

        // The pair whose paren sits just before the cursor
        let active = pos.checked_sub(1).and_then(|before| {
            pairs
                .iter()
                .find(|(start, end)| *start == before || *end == before)
                .copied()
        });

        let mut highlighted = String::with_capacity(line.len());
        for (i, c) in line.char_indices() {
            if active.is_some_and(|(start, end)| i == start || i == end) {
                highlighted.push_str(&format!("\x1b[1;34m{}\x1b[0m", c)); // Blue for matching parens
            } else if unmatched.contains(&i) {
                highlighted.push_str(&format!("\x1b[31m{}\x1b[0m", c)); // Red for unmatched closing parens
            } else {
                highlighted.push(c);
            }
        }
        Cow::Owned(highlighted)
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _kind: CmdKind) -> bool {
        true
    }
}

fn init_logging(log_level: Option<&str>) {
    let filter = match log_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn report(error: &Error, source_id: &str, input: &str) {
    if error.pretty_print(source_id, input).is_err() {
        eprintln!("Error: {}", error);
    }
}

fn load_file(path: &Path, env: Rc<RefCell<Environment>>) {
    let source_id = path.display().to_string();
    match std::fs::read_to_string(path) {
        Ok(input) => match run_program(&input, env) {
            Ok(results) => info!(file = %source_id, expressions = results.len(), "loaded"),
            Err(e) => report(&e, &source_id, &input),
        },
        Err(e) => eprintln!("Could not read {}: {}", source_id, e),
    }
}

fn eval_line(input: &str, env: Rc<RefCell<Environment>>) -> Result<Option<String>, Error> {
    let node = parse_str(input)?;
    let result = evaluate(node, env)?;
    Ok(match result.kind {
        Sexpr::Void => None,
        _ => Some(result.to_string()),
    })
}

fn main() -> rustyline::Result<()> {
    let args = Args::parse();
    init_logging(args.log_level.as_deref());

    println!("Lispy REPL v{}", env!("CARGO_PKG_VERSION"));
    println!("Type 'exit' or press Ctrl-D to quit.");

    let global_env = Environment::new_global_populated();
    if let Some(path) = &args.load {
        load_file(path, global_env.clone());
    }

    let h = ReplHelper {
        highlighter: ParenHighlighter,
        validator: LispValidator,
        completer: LispCompleter::new(global_env.clone()),
    };
    let edit_mode = if args.vi {
        rustyline::EditMode::Vi
    } else {
        rustyline::EditMode::Emacs
    };
    let config = rustyline::config::Config::builder()
        .edit_mode(edit_mode)
        .auto_add_history(false)
        .build();
    let mut rl: Editor<ReplHelper, DefaultHistory> = Editor::with_config(config)?;
    rl.set_helper(Some(h));
    rl.bind_sequence(
        KeyEvent(KeyCode::Char('s'), Modifiers::CTRL),
        EventHandler::Simple(Cmd::Newline),
    );
    if !args.no_history && rl.load_history(&args.history).is_err() {
        debug!(path = %args.history.display(), "no previous history");
    }

    loop {
        match rl.readline(&args.prompt) {
            Ok(line) => {
                rl.add_history_entry(line.as_str())?;
                let trimmed_input = line.trim();
                if trimmed_input.is_empty() {
                    continue;
                }
                if trimmed_input.eq_ignore_ascii_case("exit") {
                    break;
                }

                match eval_line(trimmed_input, global_env.clone()) {
                    Ok(Some(printed)) => println!("{}", printed),
                    Ok(None) => {}
                    Err(e) => report(&e, "REPL", trimmed_input),
                }
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl-C
                println!("Interrupted. Type 'exit' or Ctrl-D to quit.");
            }
            Err(ReadlineError::Eof) => {
                // Ctrl-D
                println!("\nExiting.");
                break;
            }
            Err(err) => {
                eprintln!("Readline Error: {:?}", err);
                break;
            }
        }
    }

    if args.no_history {
        Ok(())
    } else {
        rl.save_history(&args.history)
    }
}
