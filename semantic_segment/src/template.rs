//! Query templates: the memo key under which a segment is cached.
//!
//! A template is the query text with every quoted RFC3339 time literal
//! replaced by `?`. Queries that differ only in their time window share one
//! template and therefore one memoized segment. When both bounds are
//! present the two time comparison operators are rewritten to the canonical
//! `>=` / `<` order so that `> a AND <= b` spellings land on the same
//! template as `>= a AND < b`.

/// Derive the template of `query`.
pub fn query_template(query: &str) -> String {
    let replaced = replace_time_literals(query);
    normalize_bound_operators(replaced)
}

/// Replace every `'YYYY-MM-DDTHH:MM:SSZ'` literal (quotes included) with
/// `?`.
fn replace_time_literals(query: &str) -> String {
    let mut out = String::with_capacity(query.len());
    let mut rest = query;
    while let Some(open) = rest.find('\'') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('\'') {
            Some(close) => {
                if is_rfc3339_literal(&after[..close]) {
                    out.push('?');
                } else {
                    out.push_str(&rest[open..open + close + 2]);
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// `2022-01-01T00:00:20Z` and nothing else.
fn is_rfc3339_literal(text: &str) -> bool {
    let b = text.as_bytes();
    if b.len() != 20 {
        return false;
    }
    for (i, c) in b.iter().enumerate() {
        let ok = match i {
            4 | 7 => *c == b'-',
            10 => *c == b'T',
            13 | 16 => *c == b':',
            19 => *c == b'Z',
            _ => c.is_ascii_digit(),
        };
        if !ok {
            return false;
        }
    }
    true
}

/// When the template carries exactly two `?` placeholders, force the
/// comparison operator ahead of the first to `>=` and ahead of the second
/// to `<`.
fn normalize_bound_operators(template: String) -> String {
    if template.matches('?').count() != 2 {
        return template;
    }

    let mut out = template;
    if let Some(at) = out.find('?') {
        if let Some((start, end)) = preceding_operator(&out, at) {
            out.replace_range(start..end, ">=");
        }
    }
    if let Some(first) = out.find('?') {
        if let Some(offset) = out[first + 1..].find('?') {
            let at = first + 1 + offset;
            if let Some((start, end)) = preceding_operator(&out, at) {
                out.replace_range(start..end, "<");
            }
        }
    }
    out
}

/// The span of the `[<>=]+` run immediately before position `at`, skipping
/// whitespace.
fn preceding_operator(text: &str, at: usize) -> Option<(usize, usize)> {
    let bytes = text.as_bytes();
    let mut end = at;
    while end > 0 && bytes[end - 1] == b' ' {
        end -= 1;
    }
    let mut start = end;
    while start > 0 && matches!(bytes[start - 1], b'<' | b'>' | b'=') {
        start -= 1;
    }
    (start < end).then(|| (start, end))
}
