use super::ast::{Expr, References};
use super::lexer::tokenize;
use super::parser::{Reference, parse};
use ahash::AHashSet;
use serde::Serialize;

pub const NO_ERROR: &str = "No error found";

/// Outcome of a syntax check, shaped for display in an editor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyntaxReport {
    pub message: String,
    /// Byte range to underline
    pub span: Option<(usize, usize)>,
}

impl SyntaxReport {
    pub fn ok() -> Self {
        Self {
            message: NO_ERROR.to_string(),
            span: None,
        }
    }

    fn error(message: impl Into<String>, span: (usize, usize)) -> Self {
        Self {
            message: message.into(),
            span: Some(span),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.span.is_none() && self.message == NO_ERROR
    }
}

/// What a formula may refer to.
#[derive(Debug, Clone, Default)]
pub struct CheckContext {
    pub fields: AHashSet<String>,
    pub raster_count: usize,
    pub polygon_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    /// Position among the build's cost functions
    pub index: usize,
    pub name: String,
    pub source: String,
    pub expr: Expr,
    pub references: References,
}

fn closing(open: char) -> char {
    match open {
        '(' => ')',
        '[' => ']',
        '{' => '}',
        _ => '$',
    }
}

/// Bracket balance on the raw text. An unclosed bracket is reported at its
/// opening position.
fn check_delimiters(source: &str) -> Result<(), SyntaxReport> {
    let mut stack: Vec<(char, usize)> = Vec::new();
    let mut in_string: Option<usize> = None;

    for (pos, ch) in source.char_indices() {
        if in_string.is_some() {
            if ch == '"' {
                in_string = None;
            }
            continue;
        }
        match ch {
            '"' => in_string = Some(pos),
            '(' | '[' | '{' | '%' => stack.push((ch, pos)),
            ')' | ']' | '}' | '$' => match stack.pop() {
                Some((open, _)) if closing(open) == ch => {}
                Some((open, open_pos)) => {
                    return Err(SyntaxReport::error(
                        format!("'{open}' is closed by '{ch}'"),
                        (open_pos, pos + 1),
                    ));
                }
                None => {
                    return Err(SyntaxReport::error(
                        format!("Unmatched '{ch}'"),
                        (pos, pos + 1),
                    ));
                }
            },
            _ => {}
        }
    }

    if let Some(start) = in_string {
        return Err(SyntaxReport::error(
            "Unterminated string",
            (start, source.len()),
        ));
    }
    if let Some((open, pos)) = stack.pop() {
        return Err(SyntaxReport::error(
            format!("'{open}' is never closed"),
            (pos, pos + 1),
        ));
    }
    Ok(())
}

/// Parses and validates a formula against what the build provides.
pub fn compile(
    index: usize,
    name: &str,
    source: &str,
    context: &CheckContext,
) -> Result<Formula, SyntaxReport> {
    check_delimiters(source)?;
    let tokens = tokenize(source).map_err(|e| SyntaxReport::error(e.message, e.span))?;
    let parsed =
        parse(&tokens, source.len()).map_err(|e| SyntaxReport::error(e.message, e.span))?;

    for (reference, span) in &parsed.references {
        match reference {
            Reference::Field(field) if !context.fields.contains(field) => {
                return Err(SyntaxReport::error(
                    format!("Unknown field '{field}'"),
                    *span,
                ));
            }
            Reference::Raster(i) if *i >= context.raster_count => {
                return Err(SyntaxReport::error(
                    format!(
                        "Raster index {i} is out of range ({} raster(s) configured)",
                        context.raster_count
                    ),
                    *span,
                ));
            }
            Reference::Polygon(i) if *i >= context.polygon_count => {
                return Err(SyntaxReport::error(
                    format!(
                        "Polygon index {i} is out of range ({} polygon layer(s) configured)",
                        context.polygon_count
                    ),
                    *span,
                ));
            }
            _ => {}
        }
    }

    let references = parsed.expr.references();
    Ok(Formula {
        index,
        name: name.to_string(),
        source: source.to_string(),
        expr: parsed.expr,
        references,
    })
}

pub fn check_syntax(source: &str, context: &CheckContext) -> SyntaxReport {
    match compile(0, "", source, context) {
        Ok(_) => SyntaxReport::ok(),
        Err(report) => report,
    }
}
