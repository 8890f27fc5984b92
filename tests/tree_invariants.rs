// SPDX-License-Identifier: AGPL-3.0-or-later

//! Scenario-level check of the BreakTree's structural invariants across a
//! longer, mixed sequence of inserts and deletes than the inline unit tests
//! in `src/tree.rs` cover. Every `insert_text`/
//! `delete_text` call already runs the tree's own debug-only `validate`
//! pass internally, so a panic here would mean a level/aggregate/linked-
//! list invariant broke; this test's own assertions additionally cross-check
//! the tree's `text()` against a plain-`String` reference model doing the
//! same splices.

use linebreak_agent::tree::BreakTree;
use pretty_assertions::assert_eq;

fn splice_insert(text: &str, idx: usize, insert: &str) -> String {
    let mut out = String::with_capacity(text.len() + insert.len());
    out.push_str(&text[..idx]);
    out.push_str(insert);
    out.push_str(&text[idx..]);
    out
}

fn splice_delete(text: &str, idx: usize, nchars: usize) -> String {
    let mut out = String::with_capacity(text.len() - nchars);
    out.push_str(&text[..idx]);
    out.push_str(&text[idx + nchars..]);
    out
}

#[test]
fn long_mixed_insert_delete_sequence_matches_a_flat_reference() {
    let mut tree = BreakTree::new();
    let mut flat = tree.text();

    // A longer script than any single inline unit test: multi-line
    // inserts that force splits, single-char inserts that force grows,
    // and deletes that span one, several, or zero embedded newlines, all
    // walking across the whole buffer rather than a fixed spot.
    enum Step {
        Insert(usize, &'static str),
        Delete(usize, usize),
    }
    use Step::{Delete, Insert};

    let script = [
        Insert(0, "alpha\nbeta\ngamma\ndelta\n"),
        Insert(6, "beta-prime\n"),
        Insert(0, "zero\n"),
        Delete(0, 5),
        Insert(10, "x"),
        Insert(11, "\n"),
        Delete(3, 8),
        Insert(0, "one\ntwo\nthree\nfour\nfive\n"),
        Delete(4, 16),
        Insert(2, "A\nB\nC\n"),
        Delete(0, 3),
        Insert(0, ""),
    ];

    for step in script {
        match step {
            Insert(idx, text) => {
                tree.insert_text(idx, text).unwrap();
                flat = splice_insert(&flat, idx, text);
            }
            Delete(idx, nchars) => {
                let (removed, ..) = tree.delete_text(idx, nchars).unwrap();
                assert_eq!(removed, flat[idx..idx + nchars]);
                flat = splice_delete(&flat, idx, nchars);
            }
        }
        assert_eq!(tree.text(), flat);
    }
}

#[test]
fn many_small_deletes_shrink_back_to_the_ghost_line() {
    // Insert a long single line, then delete it back down one byte at a
    // time from the front, never touching the ghost's own "\n". The tree
    // should converge on exactly the starting empty-document state.
    let mut tree = BreakTree::new();
    let body = "x".repeat(64);
    tree.insert_text(0, &body).unwrap();
    assert_eq!(tree.len(), body.len() + 1); // the body plus the ghost's "\n"

    for _ in 0..body.len() {
        tree.delete_text(0, 1).unwrap();
    }

    assert_eq!(tree.text(), "\n");
    assert_eq!(tree.len(), 1);
}

#[test]
fn repeated_line_splits_then_full_collapse_round_trips() {
    let mut tree = BreakTree::new();
    for i in 0..40 {
        tree.insert_text(0, &format!("line{i}\n")).unwrap();
    }
    // 40 inserted lines + the ghost; every line (ghost included) ends in
    // exactly one "\n", so counting them is the same as counting lines.
    assert_eq!(tree.text().matches('\n').count(), 41);

    let total_len = tree.text().len();
    let (removed, ..) = tree.delete_text(0, total_len - 1).unwrap();
    assert_eq!(removed.matches('\n').count(), 40);
    assert_eq!(tree.text(), "\n");
    assert_eq!(tree.len(), 1);
}
