// src/parser.rs
use log::{trace, warn};
use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser;

use crate::types::{SourceMarker, SourceRange, Statement, StatementPart, SubtagCall};

// Derive the parser using the grammar file
#[derive(Parser)]
#[grammar = "parser.pest"]
struct BBTagParser;

/// Maps byte offsets to 1-based line/column markers.
struct LineIndex<'a> {
    source: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    fn new(source: &'a str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));
        Self { source, line_starts }
    }

    fn marker(&self, index: usize) -> SourceMarker {
        let line = match self.line_starts.binary_search(&index) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        let line_start = self.line_starts[line];
        let column = self.source[line_start..index].chars().count() + 1;
        SourceMarker::new(index, line + 1, column)
    }

    fn range(&self, start: usize, end: usize) -> SourceRange {
        SourceRange::new(self.marker(start), self.marker(end))
    }
}

/// Braces nested deeper than this are kept as literal text.
pub const MAX_NESTING: usize = 256;

/// Parses a BBTag document.
///
/// Parsing never fails: braces that do not form a complete subtag, or that
/// nest deeper than [`MAX_NESTING`], are kept as literal text, so the returned
/// statement always covers the whole input.
pub fn parse(source: &str) -> Statement {
    let lines = LineIndex::new(source);
    let masked = mask_stray_braces(source);
    let document = match BBTagParser::parse(Rule::document, &masked) {
        Ok(mut pairs) => pairs.next(),
        Err(e) => {
            warn!("Grammar rejected document, treating it as literal text: {}", e);
            None
        }
    };

    let statement = match document {
        Some(pair) => build_statement(pair, source, &lines),
        None => literal_statement(source, &lines),
    };
    trace!("Parsed document into {} top-level values", statement.values.len());
    statement
}

/// Pairs braces with a stack in one pass and replaces every brace that is
/// unmatched, or matched beyond [`MAX_NESTING`], with a same-width control
/// byte. The grammar then only sees balanced braces and never backtracks.
fn mask_stray_braces(source: &str) -> String {
    let bytes = source.as_bytes();
    let mut stray = vec![false; bytes.len()];
    // (index of the opening brace, whether it opens a subtag)
    let mut open: Vec<(usize, bool)> = Vec::new();
    let mut depth = 0;

    for (i, byte) in bytes.iter().enumerate() {
        match byte {
            b'{' => {
                let kept = depth < MAX_NESTING;
                if kept {
                    depth += 1;
                }
                open.push((i, kept));
            }
            b'}' => match open.pop() {
                Some((_, true)) => depth -= 1,
                Some((start, false)) => {
                    stray[start] = true;
                    stray[i] = true;
                }
                None => stray[i] = true,
            },
            _ => (),
        }
    }
    for (start, _) in open {
        stray[start] = true;
    }

    source
        .char_indices()
        .map(|(i, c)| if (c == '{' || c == '}') && stray[i] { '\u{1}' } else { c })
        .collect()
}

fn literal_statement(source: &str, lines: &LineIndex) -> Statement {
    let range = lines.range(0, source.len());
    let values = if source.is_empty() {
        Vec::new()
    } else {
        vec![StatementPart::Literal { text: source.to_string(), range }]
    };
    Statement { values, range }
}

/// Builds a statement from a `document` or `argument` pair.
fn build_statement(pair: Pair<Rule>, source: &str, lines: &LineIndex) -> Statement {
    let span = pair.as_span();
    let range = lines.range(span.start(), span.end());
    let mut values: Vec<StatementPart> = Vec::new();

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::text | Rule::stray | Rule::arg_text => {
                let span = inner.as_span();
                push_literal(&mut values, &source[span.start()..span.end()], lines.range(span.start(), span.end()));
            }
            Rule::subtag => values.push(StatementPart::Subtag(build_subtag(inner, source, lines))),
            Rule::EOI => (),
            rule => {
                warn!("Unexpected rule {:?} inside statement, keeping it as text", rule);
                let span = inner.as_span();
                push_literal(&mut values, &source[span.start()..span.end()], lines.range(span.start(), span.end()));
            }
        }
    }

    Statement { values, range }
}

/// Adjacent literal runs (e.g. a stray brace followed by text) are merged.
fn push_literal(values: &mut Vec<StatementPart>, text: &str, range: SourceRange) {
    if let Some(StatementPart::Literal { text: last, range: last_range }) = values.last_mut() {
        if last_range.end.index == range.start.index {
            last.push_str(text);
            last_range.end = range.end;
            return;
        }
    }
    values.push(StatementPart::Literal { text: text.to_string(), range });
}

fn build_subtag(pair: Pair<Rule>, source: &str, lines: &LineIndex) -> SubtagCall {
    let span = pair.as_span();
    let range = lines.range(span.start(), span.end());
    let mut arguments = pair
        .into_inner()
        .filter(|p| p.as_rule() == Rule::argument)
        .map(|p| build_statement(p, source, lines));

    // The grammar always produces at least one argument (the name), possibly empty.
    let name = arguments
        .next()
        .unwrap_or_else(|| Statement::empty(lines.marker(span.start() + 1)));
    let args = arguments.collect();

    SubtagCall { name, args, range }
}
