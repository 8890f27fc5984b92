// SPDX-License-Identifier: AGPL-3.0-or-later

//! The host editor boundary. The editor's buffer API is explicitly
//! out of scope: this module only defines the trait [`Client`](crate::client::Client)
//! consumes, plus [`NullEditor`], an in-memory test double. A real
//! integration (e.g. a Neovim plugin, whose `buf_set_lines`/`buf_attach`
//! naming this trait mirrors) supplies its own implementation and reuses
//! the rest of the crate unchanged.

use crate::error::AgentError;
use std::cell::RefCell;

/// Opaque handle to a host-editor buffer. This crate only ever tracks one
/// open document, but the trait keeps a handle parameter so an
/// implementation backed by a real editor can address a specific buffer.
pub type BufferId = u64;

/// One `on_bytes` notification: a single byte-range edit the editor
/// observed in its buffer, in the editor's own row/column/length units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteEdit {
    pub buf: BufferId,
    pub tick: u64,
    /// Absolute char offset where the edit starts.
    pub char_start: usize,
    pub start_row: usize,
    pub start_col: usize,
    pub old_end_row: usize,
    pub old_end_col: usize,
    /// Byte length of the text the edit replaced.
    pub old_len: usize,
    pub new_end_row: usize,
    pub new_end_col: usize,
    /// Byte length of the text the edit introduced.
    pub new_len: usize,
}

/// A queued `on_bytes` subscriber, invoked once per editor-reported edit.
pub type OnBytes = Box<dyn FnMut(ByteEdit) + Send>;

/// The buffer operations `Client` drives on whatever concrete editor is
/// embedding this crate.
pub trait Editor: Send {
    /// Runs `f` on the editor thread. Mirrors the editor's own
    /// schedule-a-callback primitive (e.g. Neovim's `vim.schedule`); this
    /// crate never assumes it runs synchronously.
    fn schedule(&self, f: Box<dyn FnOnce() + Send>);

    /// Replaces buffer lines `[start, end)` with `lines`.
    fn buf_set_lines(
        &mut self,
        buf: BufferId,
        start: usize,
        end: usize,
        strict: bool,
        lines: &[String],
    ) -> Result<(), AgentError>;

    /// Replaces the sub-line range `(sl, sc)..=(el, ec)` with `lines`; `el`
    /// is end-inclusive, `ec` end-exclusive.
    fn buf_set_text(
        &mut self,
        buf: BufferId,
        sl: usize,
        sc: usize,
        el: usize,
        ec: usize,
        lines: &[String],
    ) -> Result<(), AgentError>;

    /// Reads back `(sl, sc)..=(el, ec)`, used to recover inserted text from
    /// the editor's own view after it has applied an edit.
    fn buf_get_text(
        &self,
        buf: BufferId,
        sl: usize,
        sc: usize,
        el: usize,
        ec: usize,
    ) -> Result<Vec<String>, AgentError>;

    /// Subscribes to `on_bytes` notifications for `buf`.
    fn buf_attach(&mut self, buf: BufferId, send_buffer: bool, on_bytes: OnBytes) -> Result<(), AgentError>;

    /// Echoes a message on the editor's error channel; does not
    /// itself fail, matching the "report, continue" handling of editor-
    /// callback failures.
    fn report_error(&self, message: &str);
}

/// An in-memory `Editor` with no real host attached, for exercising the
/// connection/negotiation/reconnect machinery end to end without a real
/// plugin. Lines are stored with their trailing `\n` stripped, the
/// way a host editor's own line buffer typically works.
pub struct NullEditor {
    lines: Vec<String>,
    on_bytes: Option<OnBytes>,
    errors: RefCell<Vec<String>>,
}

impl Default for NullEditor {
    fn default() -> Self {
        Self::new()
    }
}

impl NullEditor {
    #[must_use]
    pub fn new() -> Self {
        Self { lines: vec![String::new()], on_bytes: None, errors: RefCell::new(Vec::new()) }
    }

    /// The buffer's current contents, one line per entry, `\n`-free.
    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Messages reported through [`Editor::report_error`], oldest first.
    #[must_use]
    pub fn errors(&self) -> Vec<String> {
        self.errors.borrow().clone()
    }

    /// Feeds a synthetic `on_bytes` notification to whatever handler is
    /// attached, standing in for a real editor's own edit detection.
    pub fn simulate_edit(&mut self, edit: ByteEdit) {
        if let Some(handler) = &mut self.on_bytes {
            handler(edit);
        }
    }
}

impl Editor for NullEditor {
    fn schedule(&self, f: Box<dyn FnOnce() + Send>) {
        // No real editor thread to hop to; run inline.
        f();
    }

    fn buf_set_lines(
        &mut self,
        _buf: BufferId,
        start: usize,
        end: usize,
        strict: bool,
        lines: &[String],
    ) -> Result<(), AgentError> {
        // Non-strict indexing clamps an out-of-range `end` to the buffer's
        // length instead of erroring, matching `nvim_buf_set_lines` with
        // `strict_indexing=false` — the idiom callers use to mean "replace
        // through end of buffer" without first querying its line count.
        let end = if strict { end } else { end.min(self.lines.len()) };
        if start > self.lines.len() || end > self.lines.len() || start > end {
            return Err(AgentError::EditorCallback(format!(
                "buf_set_lines range [{start}, {end}) out of bounds for {} lines",
                self.lines.len()
            )));
        }
        self.lines.splice(start..end, lines.iter().cloned());
        Ok(())
    }

    fn buf_set_text(
        &mut self,
        _buf: BufferId,
        sl: usize,
        sc: usize,
        el: usize,
        ec: usize,
        lines: &[String],
    ) -> Result<(), AgentError> {
        if el >= self.lines.len() || sl > el {
            return Err(AgentError::EditorCallback(format!(
                "buf_set_text range ({sl},{sc})..=({el},{ec}) out of bounds for {} lines",
                self.lines.len()
            )));
        }
        let prefix = self.lines[sl].get(..sc).unwrap_or(&self.lines[sl]).to_string();
        let suffix = self.lines[el].get(ec..).unwrap_or("").to_string();
        let mut replacement: Vec<String> = lines.to_vec();
        match replacement.first_mut() {
            Some(first) => *first = format!("{prefix}{first}"),
            None => replacement.push(prefix),
        }
        if let Some(last) = replacement.last_mut() {
            last.push_str(&suffix);
        }
        self.lines.splice(sl..=el, replacement);
        Ok(())
    }

    fn buf_get_text(
        &self,
        _buf: BufferId,
        sl: usize,
        sc: usize,
        el: usize,
        ec: usize,
    ) -> Result<Vec<String>, AgentError> {
        if el >= self.lines.len() || sl > el {
            return Err(AgentError::EditorCallback(format!(
                "buf_get_text range ({sl},{sc})..=({el},{ec}) out of bounds for {} lines",
                self.lines.len()
            )));
        }
        if sl == el {
            let line = &self.lines[sl];
            let end = ec.min(line.len());
            let start = sc.min(end);
            return Ok(vec![line[start..end].to_string()]);
        }
        let mut out = Vec::with_capacity(el - sl + 1);
        out.push(self.lines[sl].get(sc..).unwrap_or("").to_string());
        for line in &self.lines[sl + 1..el] {
            out.push(line.clone());
        }
        out.push(self.lines[el].get(..ec).unwrap_or(&self.lines[el]).to_string());
        Ok(out)
    }

    fn buf_attach(&mut self, _buf: BufferId, _send_buffer: bool, on_bytes: OnBytes) -> Result<(), AgentError> {
        self.on_bytes = Some(on_bytes);
        Ok(())
    }

    fn report_error(&self, message: &str) {
        self.errors.borrow_mut().push(message.to_string());
    }
}
