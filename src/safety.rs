//! Read-only guard for SQL text.
//!
//! A lexical check, not a parser: the statement is tokenized with string
//! literals, quoted identifiers and comments skipped, then it must be a single
//! statement whose first word is `SELECT` and which contains none of
//! [`FORBIDDEN_KEYWORDS`] as a whole word. Obfuscated writes that slip past a
//! keyword blocklist are a known gap; the SQLite connection is additionally
//! opened read-only.

use crate::error::ToolError;

/// Words that may not appear anywhere outside literals.
pub const FORBIDDEN_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "CREATE", "TRUNCATE", "ATTACH", "DETACH",
    "PRAGMA", "VACUUM", "REINDEX",
];

#[derive(Debug, PartialEq)]
enum Token<'a> {
    Word(&'a str),
    Semicolon,
}

/// Accept `sql` only if it is a single read-only `SELECT`.
pub fn check(sql: &str) -> Result<(), ToolError> {
    let tokens = tokenize(sql)?;

    let mut words = tokens.iter().filter_map(|t| match t {
        Token::Word(w) => Some(*w),
        Token::Semicolon => None,
    });
    match words.next() {
        None => return Err(ToolError::unsafe_query("empty SQL statement")),
        Some(first) if !first.eq_ignore_ascii_case("SELECT") => {
            return Err(ToolError::unsafe_query(format!(
                "only SELECT statements are allowed (statement starts with '{}')",
                first.to_ascii_uppercase()
            )));
        }
        Some(_) => {}
    }

    if let Some(pos) = tokens.iter().position(|t| *t == Token::Semicolon) {
        if pos + 1 != tokens.len() {
            return Err(ToolError::unsafe_query(
                "multiple SQL statements are not allowed",
            ));
        }
    }

    for word in words {
        if let Some(kw) = FORBIDDEN_KEYWORDS
            .iter()
            .find(|kw| word.eq_ignore_ascii_case(kw))
        {
            return Err(ToolError::unsafe_query(format!(
                "forbidden keyword '{kw}' in SQL statement"
            )));
        }
    }
    Ok(())
}

fn tokenize(sql: &str) -> Result<Vec<Token<'_>>, ToolError> {
    let bytes = sql.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        match c {
            b'\'' | b'"' | b'`' => {
                i = skip_quoted(bytes, i, c)?;
            }
            b'[' => {
                i = match memchr(bytes, i + 1, b']') {
                    Some(end) => end + 1,
                    None => return Err(unterminated("bracketed identifier")),
                };
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                i = memchr(bytes, i + 2, b'\n').map_or(bytes.len(), |nl| nl + 1);
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = match find_seq(bytes, i + 2, b"*/") {
                    Some(end) => end + 2,
                    None => return Err(unterminated("block comment")),
                };
            }
            b';' => {
                tokens.push(Token::Semicolon);
                i += 1;
            }
            _ if is_word_byte(c) => {
                let start = i;
                while i < bytes.len() && is_word_byte(bytes[i]) {
                    i += 1;
                }
                tokens.push(Token::Word(&sql[start..i]));
            }
            _ => i += 1,
        }
    }
    Ok(tokens)
}

/// Skip a literal opened by `quote` at `start`; a doubled quote is an escape.
fn skip_quoted(bytes: &[u8], start: usize, quote: u8) -> Result<usize, ToolError> {
    let mut i = start + 1;
    while i < bytes.len() {
        if bytes[i] == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return Ok(i + 1);
        }
        i += 1;
    }
    Err(unterminated(match quote {
        b'\'' => "string literal",
        _ => "quoted identifier",
    }))
}

fn unterminated(what: &str) -> ToolError {
    ToolError::unsafe_query(format!("unterminated {what} in SQL statement"))
}

// Non-ASCII bytes count as word bytes so multi-byte identifiers stay whole
// and slicing never splits a char.
fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b >= 0x80
}

fn memchr(bytes: &[u8], from: usize, needle: u8) -> Option<usize> {
    bytes
        .get(from..)?
        .iter()
        .position(|&b| b == needle)
        .map(|p| p + from)
}

fn find_seq(bytes: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    bytes
        .get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}
