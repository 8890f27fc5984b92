// SPDX-License-Identifier: AGPL-3.0-or-later

//! `BreakTree`: an arena-backed Andersson (AA) tree of document lines,
//! indexed by byte offset.
//!
//! Nodes live in a single `Vec` arena and reference each other by index
//! rather than by pointer, so the doubly-linked list and the tree's
//! parent/child links can coexist without `Rc`/`RefCell`. `None` plays
//! the role of the AA-tree's conventional nil sentinel; there's no
//! materialized sentinel node.

use crate::error::AgentError;

struct Node {
    text: String,
    level: u32,
    parent: Option<usize>,
    l: Option<usize>,
    r: Option<usize>,
    next: Option<usize>,
    prev: Option<usize>,
    /// Sum of byte lengths of every line in this node's left subtree.
    lsum: usize,
    /// Count of lines in this node's left subtree.
    lcount: usize,
}

impl Node {
    fn leaf(text: String, prev: Option<usize>, next: Option<usize>) -> Self {
        Self { text, level: 0, parent: None, l: None, r: None, next, prev, lsum: 0, lcount: 0 }
    }
}

/// A balanced, line-indexed representation of a document's text.
pub struct BreakTree {
    nodes: Vec<Node>,
    free: Vec<usize>,
    root: Option<usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl Default for BreakTree {
    fn default() -> Self {
        Self::new()
    }
}

impl BreakTree {
    /// An empty document: a single ghost line.
    #[must_use]
    pub fn new() -> Self {
        let nodes = vec![Node::leaf("\n".to_string(), None, None)];
        Self { nodes, free: Vec::new(), root: Some(0), head: Some(0), tail: Some(0) }
    }

    /// Seeds a fresh tree with `text` as the initial document content.
    pub fn from_text(text: &str) -> Self {
        let mut tree = Self::new();
        if !text.is_empty() {
            tree.insert_text(0, text).expect("inserting into a fresh tree cannot fail");
        }
        tree
    }

    fn alloc(&mut self, node: Node) -> usize {
        if let Some(idx) = self.free.pop() {
            self.nodes[idx] = node;
            idx
        } else {
            self.nodes.push(node);
            self.nodes.len() - 1
        }
    }

    /// Total byte length of the document (every line's text, ghost included).
    #[must_use]
    pub fn len(&self) -> usize {
        let Some(root) = self.root else { return 0 };
        let mut total = 0usize;
        let mut node = root;
        loop {
            total += self.nodes[node].lsum + self.nodes[node].text.len();
            match self.nodes[node].r {
                Some(r) => node = r,
                None => break,
            }
        }
        total
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reconstructs the full document text by walking the linked list.
    /// For tests and diagnostics; production callers should prefer
    /// targeted reads via [`Self::find`].
    #[must_use]
    pub fn text(&self) -> String {
        let mut out = String::with_capacity(self.len());
        let mut cur = self.head;
        while let Some(n) = cur {
            out.push_str(&self.nodes[n].text);
            cur = self.nodes[n].next;
        }
        out
    }

    /// Locates the line containing byte offset `idx`, returning the line's
    /// text, its 0-based line number, and the byte column within it.
    pub fn find(&self, idx: usize) -> Result<(&str, usize, usize), AgentError> {
        let node = self.find_node(idx)?;
        Ok((&self.nodes[node.0].text, node.1, node.2))
    }

    fn find_node(&self, idx: usize) -> Result<(usize, usize, usize), AgentError> {
        let mut node = self.root.ok_or_else(|| AgentError::Invariant("empty tree".to_string()))?;
        let mut rem = idx;
        let mut line_no = 0usize;
        loop {
            let n = &self.nodes[node];
            if rem < n.lsum {
                node = n.l.expect("lsum > 0 implies a left child is present");
                continue;
            }
            rem -= n.lsum;
            line_no += n.lcount;
            if rem < n.text.len() {
                return Ok((node, line_no, rem));
            }
            if let Some(r) = n.r {
                rem -= n.text.len();
                line_no += 1;
                node = r;
                continue;
            }
            if rem == n.text.len() {
                return Ok((node, line_no, rem));
            }
            return Err(AgentError::Invariant(format!("position {idx} is out of range")));
        }
    }

    /// Adds `len_delta`/`count_delta` to the `lsum`/`lcount` of every
    /// ancestor of `node` for which the path from `node` arrives via a
    /// left-child link.
    fn adjust_left_ancestors(&mut self, node: usize, len_delta: isize, count_delta: isize) {
        let mut cur = node;
        while let Some(p) = self.nodes[cur].parent {
            if self.nodes[p].l == Some(cur) {
                self.nodes[p].lsum = (self.nodes[p].lsum as isize + len_delta) as usize;
                self.nodes[p].lcount = (self.nodes[p].lcount as isize + count_delta) as usize;
            }
            cur = p;
        }
    }

    fn replace_in_parent(&mut self, old: usize, new: Option<usize>) {
        match self.nodes[old].parent {
            Some(p) => {
                if self.nodes[p].l == Some(old) {
                    self.nodes[p].l = new;
                } else {
                    self.nodes[p].r = new;
                }
            }
            None => self.root = new,
        }
        if let Some(n) = new {
            self.nodes[n].parent = self.nodes[old].parent;
        }
    }

    /// Converts a left-horizontal link into a right-horizontal one.
    fn skew(&mut self, node: usize) {
        let Some(l) = self.nodes[node].l else { return };
        if self.nodes[l].level != self.nodes[node].level {
            return;
        }
        let lr = self.nodes[l].r;
        let parent = self.nodes[node].parent;
        let l_lsum = self.nodes[l].lsum;
        let l_lcount = self.nodes[l].lcount;
        let l_text_len = self.nodes[l].text.len();

        self.nodes[node].l = lr;
        if let Some(lr_idx) = lr {
            self.nodes[lr_idx].parent = Some(node);
        }
        self.nodes[node].lsum -= l_lsum + l_text_len;
        self.nodes[node].lcount -= l_lcount + 1;

        self.nodes[l].r = Some(node);
        self.nodes[node].parent = Some(l);
        self.nodes[l].parent = parent;
        match parent {
            Some(p) => {
                if self.nodes[p].l == Some(node) {
                    self.nodes[p].l = Some(l);
                } else {
                    self.nodes[p].r = Some(l);
                }
            }
            None => self.root = Some(l),
        }
    }

    /// Splits two consecutive right-horizontal links.
    fn split(&mut self, node: usize) {
        let Some(r) = self.nodes[node].r else { return };
        let Some(rr) = self.nodes[r].r else { return };
        if self.nodes[rr].level != self.nodes[node].level {
            return;
        }
        let rl = self.nodes[r].l;
        let parent = self.nodes[node].parent;
        let node_lsum = self.nodes[node].lsum;
        let node_lcount = self.nodes[node].lcount;
        let node_text_len = self.nodes[node].text.len();

        self.nodes[node].r = rl;
        if let Some(rl_idx) = rl {
            self.nodes[rl_idx].parent = Some(node);
        }

        self.nodes[r].l = Some(node);
        self.nodes[node].parent = Some(r);
        self.nodes[r].lsum += node_lsum + node_text_len;
        self.nodes[r].lcount += node_lcount + 1;
        self.nodes[r].level += 1;

        self.nodes[r].parent = parent;
        match parent {
            Some(p) => {
                if self.nodes[p].l == Some(node) {
                    self.nodes[p].l = Some(r);
                } else {
                    self.nodes[p].r = Some(r);
                }
            }
            None => self.root = Some(r),
        }
    }

    fn rebalance_after_insert(&mut self, new_node: usize) {
        let mut cur = new_node;
        loop {
            let Some(p) = self.nodes[cur].parent else { break };
            self.skew(p);
            self.split(p);
            cur = p;
        }
    }

    /// Inserts a new line of `text` immediately before `before` in both the
    /// linked list and the tree.
    fn insert_line_before(&mut self, before: usize, text: String) -> usize {
        let prev = self.nodes[before].prev;
        let text_len = text.len();
        let new_idx = self.alloc(Node::leaf(text, prev, Some(before)));
        self.nodes[before].prev = Some(new_idx);
        match prev {
            Some(p) => self.nodes[p].next = Some(new_idx),
            None => self.head = Some(new_idx),
        }

        if let Some(l) = self.nodes[before].l {
            let mut cur = l;
            while let Some(r) = self.nodes[cur].r {
                cur = r;
            }
            self.nodes[cur].r = Some(new_idx);
            self.nodes[new_idx].parent = Some(cur);
        } else {
            self.nodes[before].l = Some(new_idx);
            self.nodes[new_idx].parent = Some(before);
        }

        self.adjust_left_ancestors(new_idx, text_len as isize, 1);
        self.rebalance_after_insert(new_idx);
        new_idx
    }

    /// Inserts a new line of `text` as the new last line of the document.
    fn insert_line_at_end(&mut self, text: String) -> usize {
        let tail = self.tail.expect("a BreakTree always has at least the ghost line");
        debug_assert!(self.nodes[tail].r.is_none(), "tail must have no right child");
        let text_len = text.len();
        let new_idx = self.alloc(Node::leaf(text, Some(tail), None));
        self.nodes[tail].next = Some(new_idx);
        self.tail = Some(new_idx);
        self.nodes[tail].r = Some(new_idx);
        self.nodes[new_idx].parent = Some(tail);

        self.adjust_left_ancestors(new_idx, text_len as isize, 1);
        self.rebalance_after_insert(new_idx);
        new_idx
    }

    fn insert_line(&mut self, before: Option<usize>, text: String) -> usize {
        match before {
            Some(b) => self.insert_line_before(b, text),
            None => self.insert_line_at_end(text),
        }
    }

    /// Removes `node` from both the linked list and the tree.
    fn delete_line(&mut self, node: usize) {
        if let Some(l) = self.nodes[node].l {
            // The in-order predecessor is the rightmost descendant of `l`,
            // which is exactly `node.prev` in the linked list; by the tree
            // invariants it is a leaf (at most a single right child, never
            // a left one, since a level-0 node's left child must be nil).
            let prev = self.nodes[node].prev.expect("node has a left child, so it has a predecessor");
            let prev_r = self.nodes[prev].r;
            self.replace_in_parent(prev, prev_r);
            let prev_text_len = self.nodes[prev].text.len();
            self.adjust_left_ancestors(prev, -(prev_text_len as isize), -1);
            self.unlink_list(prev);
            let prev_text = std::mem::take(&mut self.nodes[prev].text);
            self.free.push(prev);

            let old_len = self.nodes[node].text.len();
            let delta = prev_text.len() as isize - old_len as isize;
            self.nodes[node].text = prev_text;
            self.adjust_left_ancestors(node, delta, 0);

            self.rebalance_after_delete(node);
        } else {
            let r = self.nodes[node].r;
            let parent = self.nodes[node].parent;
            self.replace_in_parent(node, r);
            let text_len = self.nodes[node].text.len();
            self.adjust_left_ancestors(node, -(text_len as isize), -1);
            self.unlink_list(node);
            self.free.push(node);
            if let Some(p) = parent {
                self.rebalance_after_delete(p);
            } else if let Some(r_idx) = r {
                self.rebalance_after_delete(r_idx);
            }
        }
    }

    fn unlink_list(&mut self, node: usize) {
        let prev = self.nodes[node].prev;
        let next = self.nodes[node].next;
        match prev {
            Some(p) => self.nodes[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n].prev = prev,
            None => self.tail = prev,
        }
    }

    fn rebalance_after_delete(&mut self, start: usize) {
        let mut node = start;
        loop {
            let l_level = self.nodes[node].l.map_or(0, |l| self.nodes[l].level);
            let r_level = self.nodes[node].r.map_or(0, |r| self.nodes[r].level);
            let max_child = l_level.max(r_level);
            if self.nodes[node].level > max_child + 1 {
                self.nodes[node].level = max_child;
                if let Some(r) = self.nodes[node].r {
                    if self.nodes[r].level > max_child {
                        self.nodes[r].level = max_child;
                    }
                }
            }

            self.skew(node);
            if let Some(r1) = self.nodes[node].r {
                self.skew(r1);
                if let Some(rr1) = self.nodes[r1].r {
                    self.skew(rr1);
                }
            }
            self.split(node);
            if let Some(r2) = self.nodes[node].r {
                self.split(r2);
            }

            match self.nodes[node].parent {
                Some(p) => node = p,
                None => break,
            }
        }
    }

    /// Inserts `text` at byte offset `idx`, returning the 0-based line and
    /// column of the insertion point.
    pub fn insert_text(&mut self, idx: usize, text: &str) -> Result<(usize, usize), AgentError> {
        if text.is_empty() {
            let (_, line_no, col) = self.find_node(idx)?;
            return Ok((line_no, col));
        }
        let (node, line_no, col) = self.find_node(idx)?;
        if text.contains('\n') {
            self.split_line_insert(node, col, text);
        } else {
            self.grow_line(node, col, text);
        }
        if cfg!(debug_assertions) {
            self.validate();
        }
        Ok((line_no, col))
    }

    fn grow_line(&mut self, node: usize, col: usize, text: &str) {
        let mut new_text = String::with_capacity(self.nodes[node].text.len() + text.len());
        new_text.push_str(&self.nodes[node].text[..col]);
        new_text.push_str(text);
        new_text.push_str(&self.nodes[node].text[col..]);
        self.nodes[node].text = new_text;
        self.adjust_left_ancestors(node, text.len() as isize, 0);
    }

    fn split_line_insert(&mut self, node: usize, col: usize, text: &str) {
        let old_text = std::mem::take(&mut self.nodes[node].text);
        let old_len = old_text.len();
        let prefix = &old_text[..col];
        let suffix = &old_text[col..];

        let mut parts: Vec<&str> = text.split('\n').collect();
        let last_segment = parts.pop().expect("split always yields at least one part");
        let first_segment = parts.remove(0);
        let middle = parts;

        let head_text = format!("{prefix}{first_segment}\n");
        let head_delta = head_text.len() as isize - old_len as isize;
        self.nodes[node].text = head_text;
        self.adjust_left_ancestors(node, head_delta, 0);

        let anchor = self.nodes[node].next;
        for seg in &middle {
            self.insert_line(anchor, format!("{seg}\n"));
        }
        self.insert_line(anchor, format!("{last_segment}{suffix}"));
    }

    /// Deletes `nchars` bytes starting at `idx`, returning the removed text
    /// and an editor-facing range: `(sl, sc)` start (inclusive), `(el, ec)`
    /// end (line-inclusive, column-exclusive).
    pub fn delete_text(
        &mut self,
        idx: usize,
        nchars: usize,
    ) -> Result<(String, usize, usize, usize, usize), AgentError> {
        if nchars == 0 {
            return Err(AgentError::Invariant("delete_text nchars must be >= 1".to_string()));
        }
        let (start_node, sl, sc) = self.find_node(idx)?;
        let (boundary_node, el0, ec0) = self.find_node(idx + nchars)?;
        let (el, ec) = if ec0 == 0 {
            let prev = self.nodes[boundary_node].prev.ok_or_else(|| {
                AgentError::Invariant("delete_text range exceeds document start".to_string())
            })?;
            (el0 - 1, self.nodes[prev].text.len())
        } else {
            (el0, ec0)
        };

        let mut removed = String::with_capacity(nchars);
        let mut remaining = nchars;
        let mut end_node = start_node;
        let mut end_offset = sc;
        let mut to_remove = Vec::new();

        let start_len = self.nodes[start_node].text.len();
        if remaining <= start_len - sc {
            end_offset = sc + remaining;
            removed.push_str(&self.nodes[start_node].text[sc..end_offset]);
        } else {
            removed.push_str(&self.nodes[start_node].text[sc..]);
            remaining -= start_len - sc;
            let mut cur = self.nodes[start_node].next;
            loop {
                let n = cur.ok_or_else(|| {
                    AgentError::Invariant("delete_text range exceeds document length".to_string())
                })?;
                let len = self.nodes[n].text.len();
                if remaining <= len {
                    end_node = n;
                    end_offset = remaining;
                    removed.push_str(&self.nodes[n].text[..remaining]);
                    break;
                }
                removed.push_str(&self.nodes[n].text[..]);
                remaining -= len;
                to_remove.push(n);
                cur = self.nodes[n].next;
            }
            to_remove.push(end_node);
        }

        let prefix = self.nodes[start_node].text[..sc].to_string();
        let suffix = self.nodes[end_node].text[end_offset..].to_string();
        let old_start_len = self.nodes[start_node].text.len();
        let new_start_text = format!("{prefix}{suffix}");
        let delta = new_start_text.len() as isize - old_start_len as isize;
        self.nodes[start_node].text = new_start_text;
        self.adjust_left_ancestors(start_node, delta, 0);

        for n in to_remove {
            self.delete_line(n);
        }

        if cfg!(debug_assertions) {
            self.validate();
        }

        Ok((removed, sl, sc, el, ec))
    }

    /// Debug-only structural check of every structural invariant: level
    /// relationships, no same-level right-right chains, correct
    /// `lsum`/`lcount` aggregates, and linked-list order matching in-order
    /// tree traversal.
    fn validate(&self) {
        let Some(root) = self.root else {
            panic!("BreakTree invariant violated: tree has no root");
        };
        let mut in_order = Vec::new();
        self.validate_node(root, &mut in_order);

        let mut via_list = Vec::new();
        let mut cur = self.head;
        while let Some(n) = cur {
            via_list.push(n);
            cur = self.nodes[n].next;
        }
        assert_eq!(in_order, via_list, "BreakTree invariant violated: linked-list order does not match in-order tree traversal");
        assert_eq!(self.tail, via_list.last().copied(), "BreakTree invariant violated: tail pointer does not match the last line");
    }

    /// Returns `(level, lsum, lcount)` for the subtree rooted at `node`,
    /// asserting every local invariant along the way.
    fn validate_node(&self, node: usize, in_order: &mut Vec<usize>) -> (u32, usize, usize) {
        let n = &self.nodes[node];
        let (l_level, l_sum, l_count) = match n.l {
            Some(l) => {
                assert_eq!(self.nodes[l].parent, Some(node), "BreakTree invariant violated: left child's parent pointer is wrong");
                self.validate_node(l, in_order)
            }
            None => (0, 0, 0),
        };
        assert_eq!(n.lsum, l_sum, "BreakTree invariant violated: lsum mismatch at a node");
        assert_eq!(n.lcount, l_count, "BreakTree invariant violated: lcount mismatch at a node");
        if n.l.is_some() {
            assert_eq!(n.level, l_level + 1, "BreakTree invariant violated: left child level is not exactly one less than parent's");
        }

        in_order.push(node);

        let (r_level, r_sum, r_count) = match n.r {
            Some(r) => {
                assert_eq!(self.nodes[r].parent, Some(node), "BreakTree invariant violated: right child's parent pointer is wrong");
                let (rl, _, _) = self.validate_node(r, in_order);
                assert!(rl == n.level || rl + 1 == n.level, "BreakTree invariant violated: right child level out of range");
                if let Some(rr) = self.nodes[r].r {
                    assert!(self.nodes[rr].level != n.level, "BreakTree invariant violated: right-right chain at the same level");
                }
                self.validate_node(r, in_order)
            }
            None => (0, 0, 0),
        };
        if n.l.is_none() && n.r.is_none() {
            assert_eq!(n.level, 0, "BreakTree invariant violated: leaf has nonzero level");
        }

        (n.level, l_sum + n.text.len() + r_sum, l_count + 1 + r_count)
    }
}
