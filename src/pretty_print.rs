use crate::{EnvError, Error, EvalError, ParseError, Span};
use ariadne::{Label, Report, ReportKind, Source};
use std::io;
use std::ops::Range;

// A span recorded while reading earlier input (for example a closure body
// defined on a previous REPL line) may not fit the text being reported.
// Such spans fall back to the whole input.
fn label_range(span: Span, input: &str) -> Range<usize> {
    let range = span.to_range();
    if range.start <= range.end && range.end <= input.len() {
        range
    } else {
        0..input.len()
    }
}

impl EvalError {
    /// Writes an annotated report for this error to stderr.
    pub fn pretty_print(&self, source_id: &str, input: &str) -> io::Result<()> {
        let range = label_range(self.span(), input);
        let report = Report::build(ReportKind::Error, (source_id, range.clone()));
        let label = Label::new((source_id, range));
        let report = match self {
            EvalError::EnvError(EnvError::UnboundVariable(symbol, _)) => report
                .with_message(format!("Unbound symbol `{}`", symbol))
                .with_label(label.with_message("This symbol is not defined in the current scope")),
            EvalError::NotAProcedure(sexpr, _) => report
                .with_message(format!("Not a procedure: {}", sexpr))
                .with_label(label.with_message(format!(
                    "This evaluates to a {}, which cannot be called",
                    sexpr.type_name()
                ))),
            EvalError::InvalidArguments(message, _) => report
                .with_message("Invalid arguments:")
                .with_label(label.with_message(message)),
            EvalError::NotASymbol(sexpr, _) => report
                .with_message(format!("Not a symbol: {}", sexpr))
                .with_label(label.with_message(format!(
                    "Expected a symbol but found a {}",
                    sexpr.type_name()
                ))),
            EvalError::InvalidSpecialForm(message, _) => report
                .with_message(format!("Invalid special form: {}", message))
                .with_label(label.with_message("This special form is malformed or incomplete")),
            EvalError::ArityMismatch {
                expected, found, ..
            } => report
                .with_message("Wrong number of arguments")
                .with_label(label.with_message(format!(
                    "This procedure takes {} arguments but was given {}",
                    expected, found
                ))),
            EvalError::TypeMismatch {
                expected, found, ..
            } => report
                .with_message(format!("Type mismatch: {}", self.span()))
                .with_label(label.with_message(format!(
                    "Expected {}, found {}",
                    expected,
                    found.type_name()
                ))),
        };
        report.finish().eprint((source_id, Source::from(input)))
    }
}

impl ParseError {
    /// Writes an annotated report for this error to stderr.
    pub fn pretty_print(&self, source_id: &str, input: &str) -> io::Result<()> {
        let report = match self {
            ParseError::UnexpectedEof => {
                // Point at the last character read
                let end = input.len();
                let range = input
                    .char_indices()
                    .next_back()
                    .map_or(0..0, |(idx, _)| idx..end);
                Report::build(ReportKind::Error, (source_id, range.clone()))
                    .with_message("Unexpected end of input")
                    .with_label(
                        Label::new((source_id, range))
                            .with_message("The input ends before this expression is complete"),
                    )
            }
            ParseError::UnexpectedCloseParen(span) => {
                let range = label_range(*span, input);
                Report::build(ReportKind::Error, (source_id, range.clone()))
                    .with_message("Unexpected token: )")
                    .with_label(
                        Label::new((source_id, range))
                            .with_message("This closes a list that was never opened"),
                    )
            }
            ParseError::TrailingInput { found, span } => {
                let range = label_range(*span, input);
                Report::build(ReportKind::Error, (source_id, range.clone()))
                    .with_message(format!("Unexpected token: {}", found))
                    .with_label(
                        Label::new((source_id, range))
                            .with_message("Expected a single expression"),
                    )
            }
        };
        report.finish().eprint((source_id, Source::from(input)))
    }
}

impl Error {
    /// Writes an annotated report for this error to stderr.
    pub fn pretty_print(&self, source_id: &str, input: &str) -> io::Result<()> {
        match self {
            Error::Parse(error) => error.pretty_print(source_id, input),
            Error::Eval(error) => error.pretty_print(source_id, input),
        }
    }
}
