// SPDX-License-Identifier: AGPL-3.0-or-later

//! The operational-transform algebra for insertions and deletions.
//!
//! `idx` is always a byte offset into UTF-8 text. Callers are responsible
//! for aligning `idx` to character boundaries; this module does not
//! validate that.

use crate::error::AgentError;

/// A single local or remote edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Insert {
        idx: usize,
        text: String,
    },
    Delete {
        idx: usize,
        nchars: usize,
        /// Populated when the op originates locally from an editor event
        /// whose deleted content we captured. May be absent on incoming
        /// ops and on transformed-against outputs.
        text: Option<String>,
    },
}

impl Op {
    #[must_use]
    pub fn insert(idx: usize, text: impl Into<String>) -> Self {
        Self::Insert { idx, text: text.into() }
    }

    #[must_use]
    pub fn delete(idx: usize, nchars: usize) -> Self {
        Self::Delete { idx, nchars, text: None }
    }

    #[must_use]
    pub fn delete_with_text(idx: usize, nchars: usize, text: impl Into<String>) -> Self {
        Self::Delete { idx, nchars, text: Some(text.into()) }
    }

    #[must_use]
    pub const fn idx(&self) -> usize {
        match self {
            Self::Insert { idx, .. } | Self::Delete { idx, .. } => *idx,
        }
    }

    /// Validates insert/delete range invariants against a document of the
    /// given byte length.
    pub fn validate(&self, doc_len: usize) -> Result<(), AgentError> {
        match self {
            Self::Insert { idx, .. } if *idx > doc_len => {
                Err(AgentError::Invariant(format!("insert idx {idx} exceeds document length {doc_len}")))
            }
            Self::Delete { idx, nchars, .. } if *nchars == 0 => {
                let _ = idx;
                Err(AgentError::Invariant("delete nchars must be >= 1".to_string()))
            }
            Self::Delete { idx, nchars, .. } if idx + nchars > doc_len => {
                Err(AgentError::Invariant(format!(
                    "delete range [{idx}, {}) exceeds document length {doc_len}",
                    idx + nchars
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Applies `op` to `text`, returning the resulting text. Byte offsets.
#[must_use]
pub fn apply(op: &Op, text: &str) -> String {
    match op {
        Op::Insert { idx, text: insert_text } => {
            let mut out = String::with_capacity(text.len() + insert_text.len());
            out.push_str(&text[..*idx]);
            out.push_str(insert_text);
            out.push_str(&text[*idx..]);
            out
        }
        Op::Delete { idx, nchars, .. } => {
            let mut out = String::with_capacity(text.len() - nchars);
            out.push_str(&text[..*idx]);
            out.push_str(&text[*idx + *nchars..]);
            out
        }
    }
}

/// Rebases `a` so that it applies correctly in a world where `b` has
/// already happened. Returns `None` when `b` has made `a` a no-op (the
/// only case that can happen is D-after-D, when `b` fully covers `a`'s
/// range).
#[must_use]
pub fn after(a: &Op, b: &Op) -> Option<Op> {
    match (a, b) {
        (Op::Insert { idx: i_a, text: t_a }, Op::Insert { idx: i_b, text: t_b }) => {
            let l_b = t_b.len();
            if *i_b > *i_a {
                Some(Op::insert(*i_a, t_a.clone()))
            } else {
                // Ties break in favor of b: both inserts land adjacent, b's text first.
                Some(Op::insert(i_a + l_b, t_a.clone()))
            }
        }
        (Op::Insert { idx: i_a, text: t_a }, Op::Delete { idx: i_b, nchars: n_b, .. }) => {
            if *i_b > *i_a {
                Some(Op::insert(*i_a, t_a.clone()))
            } else if i_b + n_b < *i_a {
                Some(Op::insert(i_a - n_b, t_a.clone()))
            } else {
                // Insert falls into or at the boundary of the deleted range:
                // clamp to the deletion's start.
                Some(Op::insert(*i_b, t_a.clone()))
            }
        }
        (Op::Delete { idx: i_a, nchars: n_a, .. }, Op::Insert { idx: i_b, text: t_b }) => {
            let l_b = t_b.len();
            if *i_b > i_a + n_a {
                Some(Op::delete(*i_a, *n_a))
            } else if *i_b < *i_a {
                Some(Op::delete(i_a + l_b, *n_a))
            } else if *i_b == *i_a {
                // Insertion at the left boundary is not captured by the delete.
                Some(Op::delete(i_a + l_b, *n_a))
            } else if *i_b == i_a + n_a {
                // Insertion at the right boundary is not captured by the delete.
                Some(Op::delete(*i_a, *n_a))
            } else {
                // Insertion strictly inside the delete range: swallow it.
                Some(Op::delete(*i_a, n_a + l_b))
            }
        }
        (
            Op::Delete { idx: i_a, nchars: n_a, .. },
            Op::Delete { idx: i_b, nchars: n_b, .. },
        ) => {
            if *i_b >= i_a + n_a {
                Some(Op::delete(*i_a, *n_a))
            } else if i_b + n_b <= *i_a {
                Some(Op::delete(i_a - n_b, *n_a))
            } else if *i_b <= *i_a && i_b + n_b >= i_a + n_a {
                // b already covered a's whole range.
                None
            } else if *i_b <= *i_a {
                let overlap = (i_b + n_b) - i_a;
                Some(Op::delete(*i_b, n_a - overlap))
            } else if i_b + n_b > i_a + n_a {
                Some(Op::delete(*i_a, i_b - i_a))
            } else {
                Some(Op::delete(*i_a, n_a - n_b))
            }
        }
    }
}

/// True when `a` and `b` touch overlapping positions such that their
/// relative application order is semantically observable.
#[must_use]
pub fn conflicts(a: &Op, b: &Op) -> bool {
    match (a, b) {
        (Op::Insert { idx: i_a, .. }, Op::Insert { idx: i_b, .. }) => i_a == i_b,
        (Op::Delete { idx: i_a, nchars: n_a, .. }, Op::Delete { idx: i_b, nchars: n_b, .. }) => {
            let (min_end, max_idx) = if i_a <= i_b {
                (i_a + n_a, *i_b)
            } else {
                (i_b + n_b, *i_a)
            };
            min_end >= max_idx
        }
        (Op::Insert { idx: i_ins, .. }, Op::Delete { idx: i_del, nchars: n_del, .. })
        | (Op::Delete { idx: i_del, nchars: n_del, .. }, Op::Insert { idx: i_ins, .. }) => {
            *i_ins >= *i_del && *i_ins <= i_del + n_del
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_insert() {
        assert_eq!(apply(&Op::insert(0, "hello "), "world"), "hello world");
    }

    #[test]
    fn apply_delete() {
        assert_eq!(apply(&Op::delete(5, 6), "hello world"), "hello");
    }

    #[test]
    fn apply_length_delta() {
        let text = "abcdef";
        let inserted = apply(&Op::insert(3, "XYZ"), text);
        assert_eq!(inserted.len(), text.len() + 3);
        let deleted = apply(&Op::delete(1, 2), text);
        assert_eq!(deleted.len(), text.len() - 2);
    }

    #[test]
    fn after_insert_insert_tie_break() {
        assert_eq!(
            after(&Op::insert(5, "abc"), &Op::insert(5, "xyz")),
            Some(Op::insert(8, "abc"))
        );
    }

    #[test]
    fn after_insert_insert_later() {
        assert_eq!(
            after(&Op::insert(5, "abc"), &Op::insert(6, "xyz")),
            Some(Op::insert(5, "abc"))
        );
    }

    #[test]
    fn after_delete_insert_right_boundary() {
        assert_eq!(
            after(&Op::delete(5, 6), &Op::insert(7, "xyz")),
            Some(Op::delete(5, 9))
        );
    }

    #[test]
    fn after_delete_delete_fully_covered() {
        assert_eq!(after(&Op::delete(5, 6), &Op::delete(4, 7)), None);
    }

    #[test]
    fn after_delete_delete_partial_left_overlap() {
        assert_eq!(
            after(&Op::delete(5, 6), &Op::delete(6, 4)),
            Some(Op::delete(5, 2))
        );
    }

    #[test]
    fn after_insert_delete_tie_clamps_to_start() {
        // insertion at the left boundary of the delete range
        assert_eq!(
            after(&Op::insert(5, "z"), &Op::delete(5, 3)),
            Some(Op::insert(5, "z".to_string()))
        );
        // insertion strictly inside
        assert_eq!(
            after(&Op::insert(6, "z"), &Op::delete(5, 3)),
            Some(Op::insert(5, "z".to_string()))
        );
        // insertion at the right boundary
        assert_eq!(
            after(&Op::insert(8, "z"), &Op::delete(5, 3)),
            Some(Op::insert(5, "z".to_string()))
        );
    }

    #[test]
    fn after_delete_insert_left_boundary_not_captured() {
        assert_eq!(
            after(&Op::delete(5, 3), &Op::insert(5, "xy")),
            Some(Op::delete(7, 3))
        );
    }

    #[test]
    fn after_delete_insert_right_boundary_not_captured() {
        assert_eq!(
            after(&Op::delete(5, 3), &Op::insert(8, "xy")),
            Some(Op::delete(5, 3))
        );
    }

    #[test]
    fn conflicts_insert_insert_same_idx() {
        assert!(conflicts(&Op::insert(5, "a"), &Op::insert(5, "b")));
        assert!(!conflicts(&Op::insert(5, "a"), &Op::insert(6, "b")));
    }

    #[test]
    fn conflicts_delete_delete_touching_endpoints() {
        assert!(conflicts(&Op::delete(5, 6), &Op::delete(11, 1)));
    }

    #[test]
    fn conflicts_is_symmetric() {
        let pairs = [
            (Op::insert(5, "a"), Op::insert(5, "b")),
            (Op::insert(5, "a"), Op::insert(6, "b")),
            (Op::delete(5, 6), Op::delete(11, 1)),
            (Op::delete(5, 6), Op::delete(12, 1)),
            (Op::insert(5, "a"), Op::delete(2, 3)),
            (Op::insert(6, "a"), Op::delete(2, 3)),
        ];
        for (a, b) in pairs {
            assert_eq!(conflicts(&a, &b), conflicts(&b, &a), "not symmetric for {a:?}, {b:?}");
        }
    }

    #[test]
    fn ot_convergence_insert_insert() {
        // Distinct positions only: at an exact tie, "ties break in favor
        // of b" depends on which operand is passed as `b`, so
        // `after(a, b)` and `after(b, a)` deliberately disagree on
        // ordering for that case (confirmed separately by
        // `after_insert_insert_tie_break`). That is not a convergence bug:
        // `Client` only ever calls `after` in one fixed direction — its
        // own pending submission transformed against an already
        // server-sequenced external op (see `Client::on_external`) — so
        // nothing in the real protocol ever needs both directions to
        // agree for the same pair.
        let text = "world";
        let a = Op::insert(0, "hello ");
        let b = Op::insert(3, "cruel ");
        let left = apply(&after(&a, &b).unwrap(), &apply(&b, text));
        let right = apply(&after(&b, &a).unwrap(), &apply(&a, text));
        assert_eq!(left, right);
    }

    #[test]
    fn ot_convergence_delete_delete_disjoint() {
        let text = "0123456789";
        let a = Op::delete(1, 2);
        let b = Op::delete(5, 2);
        let left = apply(&after(&a, &b).unwrap(), &apply(&b, text));
        let right = apply(&after(&b, &a).unwrap(), &apply(&a, text));
        assert_eq!(left, right);
    }

    #[test]
    fn ot_convergence_insert_delete() {
        let text = "0123456789";
        let a = Op::insert(3, "XY");
        let b = Op::delete(1, 4);
        let after_a = after(&a, &b).expect("insert never becomes a no-op");
        let after_b = after(&b, &a);
        let left = apply(&after_a, &apply(&b, text));
        let right = match after_b {
            Some(op) => apply(&op, &apply(&a, text)),
            None => apply(&b, &apply(&a, text)),
        };
        assert_eq!(left, right);
    }

    #[test]
    fn ot_convergence_delete_delete_one_covers_other() {
        let text = "0123456789";
        let a = Op::delete(5, 4); // [5, 9)
        let b = Op::delete(4, 7); // [4, 11), fully covers a
        assert_eq!(after(&a, &b), None);
        let right = after(&b, &a).unwrap();
        let applied_left = apply(&b, text); // a became a no-op once b has happened
        let applied_right = apply(&right, &apply(&a, text));
        assert_eq!(applied_left, applied_right);
    }
}
