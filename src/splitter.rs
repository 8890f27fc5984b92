// SPDX-License-Identifier: AGPL-3.0-or-later

//! Fixed-count and soft field splitting on a separator.

use crate::error::AgentError;

/// Splits `s` on the first `n - 1` occurrences of `sep`, returning exactly
/// `n` fields. The final field retains any remaining separators. Fails if
/// fewer than `n - 1` occurrences of `sep` exist.
pub fn split<'a>(s: &'a str, sep: char, n: usize) -> Result<Vec<&'a str>, AgentError> {
    if n == 0 {
        return Ok(vec![]);
    }
    let mut fields = Vec::with_capacity(n);
    let mut rest = s;
    for _ in 0..n - 1 {
        match rest.split_once(sep) {
            Some((field, tail)) => {
                fields.push(field);
                rest = tail;
            }
            None => return Err(AgentError::Codec("not enough fields".to_string())),
        }
    }
    fields.push(rest);
    Ok(fields)
}

/// Splits `s` on every occurrence of `sep` (if `n` is `None`), or on the
/// first `n - 1` occurrences (if `n` is `Some`), without failing when
/// fewer separators are present than requested — it just returns however
/// many fields it found.
#[must_use]
pub fn split_soft<'a>(s: &'a str, sep: char, n: Option<usize>) -> Vec<&'a str> {
    match n {
        None => s.split(sep).collect(),
        Some(n) if n == 0 => vec![],
        Some(n) => s.splitn(n, sep).collect(),
    }
}
