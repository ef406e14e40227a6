//! Query text handling shared by all drivers.
//!
//! Query text is opaque to the executor, but every driver needs the same two
//! things from it: the individual statements of a multi-statement query, and
//! the `@name` placeholders of each statement resolved against the parameters
//! a binder attached to the [`Command`].
//!
//! The scanner understands single-quoted literals (including `E'...'`
//! escape strings), double-quoted identifiers, dollar-quoted bodies and both
//! comment styles, so `;` and `@` inside those are left alone.

use std::collections::HashSet;
use std::fmt::Write;

use crate::error::{RelExecError, Result};
use crate::types::{Command, SqlValue};

/// How a driver wants placeholders written in the statement text it receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `$1`, `$2`, ... numbered by first occurrence (PostgreSQL).
    Dollar,
    /// `@name` kept as written.
    Named,
}

/// One statement of a command with its placeholders resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundStatement {
    /// Statement text, trimmed, without the trailing `;`.
    pub text: String,
    /// Parameter names in position order.
    pub names: Vec<String>,
    /// Values coerced to each parameter's declared type, aligned with `names`.
    pub values: Vec<SqlValue>,
}

impl BoundStatement {
    pub fn kind(&self) -> StatementKind {
        StatementKind::of(&self.text)
    }
}

/// Coarse statement classification, used to decide whether an affected-row
/// count is meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// SELECT, INSERT, UPDATE, DELETE, MERGE, COPY, WITH, VALUES.
    RowCounting,
    /// DDL, transaction control, SET and anything else.
    Other,
}

impl StatementKind {
    pub fn of(statement: &str) -> Self {
        const COUNTING: [&str; 8] = [
            "select", "insert", "update", "delete", "merge", "copy", "with", "values",
        ];
        let keyword = first_keyword(statement);
        if COUNTING.iter().any(|k| keyword.eq_ignore_ascii_case(k)) {
            StatementKind::RowCounting
        } else {
            StatementKind::Other
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Piece<'a> {
    Text(&'a str),
    Placeholder(&'a str),
}

#[derive(Debug, Default)]
struct Scanned<'a> {
    pieces: Vec<Piece<'a>>,
    has_content: bool,
}

/// Resolves every placeholder of `command`'s text against its parameters.
///
/// Fails with `EmptyQuery` when the text holds no statement, `DuplicateParameter`
/// when a name is bound twice, `UnboundParameter` when a placeholder has no
/// parameter, and `UnreferencedParameter` when an input parameter matches no
/// placeholder in any statement.
pub fn bind_named(command: &Command, style: PlaceholderStyle) -> Result<Vec<BoundStatement>> {
    let statements = scan(command.text());
    if statements.is_empty() {
        return Err(RelExecError::EmptyQuery);
    }

    let mut seen = HashSet::new();
    for parameter in command.parameters() {
        if !seen.insert(parameter.name()) {
            return Err(RelExecError::DuplicateParameter(
                parameter.name().to_string(),
            ));
        }
    }

    let mut referenced: HashSet<&str> = HashSet::new();
    let mut bound = Vec::with_capacity(statements.len());

    for statement in statements {
        let mut text = String::new();
        let mut names: Vec<String> = Vec::new();
        let mut values = Vec::new();

        for piece in statement.pieces {
            let name = match piece {
                Piece::Text(t) => {
                    text.push_str(t);
                    continue;
                }
                Piece::Placeholder(name) => name,
            };

            let parameter = command
                .parameter(name)
                .ok_or_else(|| RelExecError::UnboundParameter(name.to_string()))?;
            referenced.insert(parameter.name());

            let position = match names.iter().position(|n| n == name) {
                Some(position) => position,
                None => {
                    names.push(name.to_string());
                    values.push(parameter.typed_value()?);
                    names.len() - 1
                }
            };

            match style {
                PlaceholderStyle::Dollar => {
                    let _ = write!(text, "${}", position + 1);
                }
                PlaceholderStyle::Named => {
                    text.push('@');
                    text.push_str(name);
                }
            }
        }

        bound.push(BoundStatement {
            text: text.trim().to_string(),
            names,
            values,
        });
    }

    if let Some(unused) = command
        .parameters()
        .iter()
        .find(|p| p.direction.is_input() && !referenced.contains(p.name()))
    {
        return Err(RelExecError::UnreferencedParameter(unused.name().to_string()));
    }

    Ok(bound)
}

fn scan(query: &str) -> Vec<Scanned<'_>> {
    let bytes = query.as_bytes();
    let mut statements = Vec::new();
    let mut current = Scanned::default();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'\'' | b'"') => {
                current.has_content = true;
                let backslash_escapes = quote == b'\'' && is_escape_string_prefix(bytes, i);
                i = skip_quoted(bytes, i, quote, backslash_escapes);
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => i = skip_line_comment(bytes, i),
            b'/' if bytes.get(i + 1) == Some(&b'*') => i = skip_block_comment(bytes, i),
            b'$' => {
                current.has_content = true;
                i = skip_dollar_quoted(bytes, i);
            }
            b'@' if bytes.get(i + 1) == Some(&b'@') => {
                current.has_content = true;
                i += 2;
            }
            b'@' if bytes.get(i + 1).is_some_and(|b| is_ident_start(*b)) => {
                let end = ident_end(bytes, i + 1);
                if start < i {
                    current.pieces.push(Piece::Text(&query[start..i]));
                }
                current.pieces.push(Piece::Placeholder(&query[i + 1..end]));
                current.has_content = true;
                start = end;
                i = end;
            }
            b';' => {
                if start < i {
                    current.pieces.push(Piece::Text(&query[start..i]));
                }
                statements.push(std::mem::take(&mut current));
                start = i + 1;
                i += 1;
            }
            b if b.is_ascii_whitespace() => i += 1,
            _ => {
                current.has_content = true;
                i += 1;
            }
        }
    }

    if start < bytes.len() {
        current.pieces.push(Piece::Text(&query[start..]));
    }
    statements.push(current);
    statements.retain(|s| s.has_content);
    statements
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn ident_end(bytes: &[u8], from: usize) -> usize {
    let mut end = from;
    while end < bytes.len() && is_ident_char(bytes[end]) {
        end += 1;
    }
    end
}

/// True when the `'` at `quote` opens an `E'...'` escape string: it directly
/// follows a lone `E` or `e`, not the last letter of a longer word.
fn is_escape_string_prefix(bytes: &[u8], quote: usize) -> bool {
    match quote.checked_sub(1).map(|p| bytes[p]) {
        Some(b'E' | b'e') => quote < 2 || !is_ident_char(bytes[quote - 2]),
        _ => false,
    }
}

/// `'...'` or `"..."` with doubled-quote escapes, plus backslash escapes when
/// `backslash_escapes` is set. Unterminated runs to the end.
fn skip_quoted(bytes: &[u8], open: usize, quote: u8, backslash_escapes: bool) -> usize {
    let mut j = open + 1;
    while j < bytes.len() {
        if backslash_escapes && bytes[j] == b'\\' {
            j += 2;
            continue;
        }
        if bytes[j] == quote {
            if bytes.get(j + 1) == Some(&quote) {
                j += 2;
                continue;
            }
            return j + 1;
        }
        j += 1;
    }
    bytes.len()
}

fn skip_line_comment(bytes: &[u8], open: usize) -> usize {
    bytes[open..]
        .iter()
        .position(|b| *b == b'\n')
        .map_or(bytes.len(), |p| open + p + 1)
}

/// Block comments nest, as in PostgreSQL.
fn skip_block_comment(bytes: &[u8], open: usize) -> usize {
    let mut depth = 0usize;
    let mut j = open;
    while j + 1 < bytes.len() {
        match (bytes[j], bytes[j + 1]) {
            (b'/', b'*') => {
                depth += 1;
                j += 2;
            }
            (b'*', b'/') => {
                depth -= 1;
                j += 2;
                if depth == 0 {
                    return j;
                }
            }
            _ => j += 1,
        }
    }
    bytes.len()
}

/// `$$...$$` or `$tag$...$tag$`. A `$` not opening a tag (e.g. `$1`) is skipped alone.
fn skip_dollar_quoted(bytes: &[u8], open: usize) -> usize {
    let tag_end = match bytes.get(open + 1) {
        Some(b'$') => open + 1,
        Some(b) if is_ident_start(*b) => {
            let end = ident_end(bytes, open + 1);
            if bytes.get(end) != Some(&b'$') {
                return open + 1;
            }
            end
        }
        _ => return open + 1,
    };

    let tag = &bytes[open..=tag_end];
    let body = tag_end + 1;
    bytes[body..]
        .windows(tag.len())
        .position(|w| w == tag)
        .map_or(bytes.len(), |p| body + p + tag.len())
}

fn first_keyword(statement: &str) -> &str {
    let bytes = statement.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'-' if bytes.get(i + 1) == Some(&b'-') => i = skip_line_comment(bytes, i),
            b'/' if bytes.get(i + 1) == Some(&b'*') => i = skip_block_comment(bytes, i),
            b'(' => i += 1,
            b if b.is_ascii_whitespace() => i += 1,
            _ => break,
        }
    }
    let end = ident_end(bytes, i);
    &statement[i..end]
}
