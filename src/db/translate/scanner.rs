use super::TranslationError;

#[derive(Clone)]
enum State {
    Normal,
    SingleQuoted,
    DoubleQuoted,
    LineComment,
    BlockComment(u32),
    DollarQuoted(String),
}

/// How `$N` placeholders are written for the target dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `$1`, left untouched.
    Dollar,
    /// `?1`, bound by number.
    NumberedQuestion,
    /// Bare `?`, bound strictly in textual order.
    Question,
}

#[derive(Debug)]
pub(super) struct RewrittenPlaceholders {
    pub(super) sql: String,
    pub(super) bindings: Option<Vec<usize>>,
}

fn starts_with(bytes: &[u8], idx: usize, pattern: &[u8]) -> bool {
    bytes.len() >= idx + pattern.len() && &bytes[idx..idx + pattern.len()] == pattern
}

fn scan_digits(bytes: &[u8], start: usize) -> Option<usize> {
    let mut idx = start;
    while idx < bytes.len() && bytes[idx].is_ascii_digit() {
        idx += 1;
    }
    (idx > start).then_some(idx)
}

// `$$` or `$tag$`, returns the index just past the closing `$`.
fn dollar_tag_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut idx = start + 1;
    if bytes.get(idx) == Some(&b'$') {
        return Some(idx + 1);
    }
    match bytes.get(idx) {
        Some(b) if b.is_ascii_alphabetic() || *b == b'_' => {}
        _ => return None,
    }
    while idx < bytes.len() && (bytes[idx].is_ascii_alphanumeric() || bytes[idx] == b'_') {
        idx += 1;
    }
    (bytes.get(idx) == Some(&b'$')).then_some(idx + 1)
}

/// Rewrites `$N` placeholders outside literals, quoted identifiers, comments
/// and dollar-quoted bodies.
pub(super) fn rewrite_placeholders(
    sql: &str,
    style: PlaceholderStyle,
) -> Result<RewrittenPlaceholders, TranslationError> {
    if style == PlaceholderStyle::Dollar {
        return Ok(RewrittenPlaceholders {
            sql: sql.to_string(),
            bindings: None,
        });
    }

    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len());
    let mut bindings = Vec::new();
    let mut state = State::Normal;
    let mut copied = 0;
    let mut idx = 0;

    while idx < bytes.len() {
        let b = bytes[idx];
        match state {
            State::Normal => {
                if b == b'\'' {
                    state = State::SingleQuoted;
                } else if b == b'"' {
                    state = State::DoubleQuoted;
                } else if starts_with(bytes, idx, b"--") {
                    state = State::LineComment;
                    idx += 1;
                } else if starts_with(bytes, idx, b"/*") {
                    state = State::BlockComment(1);
                    idx += 1;
                } else if b == b'$' {
                    if let Some(end) = scan_digits(bytes, idx + 1) {
                        let digits = &sql[idx + 1..end];
                        let number: usize = digits
                            .parse()
                            .map_err(|_| TranslationError::InvalidPlaceholder(format!("${digits}")))?;
                        if number == 0 {
                            return Err(TranslationError::InvalidPlaceholder("$0".to_string()));
                        }
                        out.push_str(&sql[copied..idx]);
                        out.push('?');
                        match style {
                            PlaceholderStyle::NumberedQuestion => out.push_str(digits),
                            PlaceholderStyle::Question => bindings.push(number - 1),
                            PlaceholderStyle::Dollar => {}
                        }
                        copied = end;
                        idx = end;
                        continue;
                    }
                    if let Some(end) = dollar_tag_end(bytes, idx) {
                        state = State::DollarQuoted(sql[idx..end].to_string());
                        idx = end;
                        continue;
                    }
                }
            }
            State::SingleQuoted => {
                if b == b'\'' {
                    if bytes.get(idx + 1) == Some(&b'\'') {
                        idx += 1;
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::DoubleQuoted => {
                if b == b'"' {
                    if bytes.get(idx + 1) == Some(&b'"') {
                        idx += 1;
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::LineComment => {
                if b == b'\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment(depth) => {
                if starts_with(bytes, idx, b"/*") {
                    state = State::BlockComment(depth + 1);
                    idx += 1;
                } else if starts_with(bytes, idx, b"*/") {
                    state = if depth == 1 {
                        State::Normal
                    } else {
                        State::BlockComment(depth - 1)
                    };
                    idx += 1;
                }
            }
            State::DollarQuoted(ref tag) => {
                if starts_with(bytes, idx, tag.as_bytes()) {
                    idx += tag.len();
                    state = State::Normal;
                    continue;
                }
            }
        }
        idx += 1;
    }
    out.push_str(&sql[copied..]);

    Ok(RewrittenPlaceholders {
        sql: out,
        bindings: (style == PlaceholderStyle::Question).then_some(bindings),
    })
}
