// SPDX-License-Identifier: AGPL-3.0-or-later

//! The client coordinator: ties local edits, remote edits, in-flight
//! submissions, and the `BreakTree` document model together with correct
//! parent references.
//!
//! The world splits into two contexts — the event loop (where `Transport`
//! lives) and the editor context (where `BreakTree` and the host editor's
//! buffer may be mutated). `Client` is the boundary: its
//! [`Client::on_editor_bytes`] entry point runs in the editor context and
//! may mutate `tree` directly; its [`Client::pump`] entry point drains
//! [`TransportEvent`]s that crossed from the event-loop side over an
//! `mpsc` channel (the inbound message queue) and must also run in the
//! editor context, since applying a remote op touches both `tree` and the
//! editor. Nothing here spawns its own task or touches the network
//! directly; that is `Transport`'s job exclusively.

use crate::editor::{BufferId, ByteEdit, Editor};
use crate::error::AgentError;
use crate::ot::{self, Op};
use crate::transport::{TransportEvent, TransportHandle};
use crate::tree::BreakTree;
use crate::wire::{ServerMessage, Submission};
use std::collections::VecDeque;
use tokio::sync::mpsc::UnboundedReceiver;

/// Owns the document model and bridges editor callbacks to `Transport`.
pub struct Client<E: Editor> {
    author_id: Option<u64>,
    reconnect_secret: Option<Vec<u8>>,
    seq: u64,
    latest_server_seq: u64,
    inflight: VecDeque<Submission>,
    tree: BreakTree,
    editor: E,
    buf: BufferId,
    transport: TransportHandle,
    events: UnboundedReceiver<TransportEvent>,
    first_sync: bool,
    /// Local edits that arrived before `first_sync`; held and replayed in
    /// order once the initial snapshot lands.
    pending_local_edits: Vec<Op>,
}

impl<E: Editor> Client<E> {
    #[must_use]
    pub fn new(editor: E, buf: BufferId, transport: TransportHandle, events: UnboundedReceiver<TransportEvent>) -> Self {
        Self {
            author_id: None,
            reconnect_secret: None,
            seq: 0,
            latest_server_seq: 0,
            inflight: VecDeque::new(),
            tree: BreakTree::new(),
            editor,
            buf,
            transport,
            events,
            first_sync: false,
            pending_local_edits: Vec::new(),
        }
    }

    #[must_use]
    pub const fn author_id(&self) -> Option<u64> {
        self.author_id
    }

    #[must_use]
    pub const fn is_synced(&self) -> bool {
        self.first_sync
    }

    /// The client's own strictly monotonic submission counter.
    #[must_use]
    pub const fn seq(&self) -> u64 {
        self.seq
    }

    #[must_use]
    pub fn inflight_len(&self) -> usize {
        self.inflight.len()
    }

    /// The document text as `BreakTree` currently holds it (editor context
    /// only — see module docs).
    #[must_use]
    pub fn text(&self) -> String {
        self.tree.text()
    }

    /// A borrow of the editor this client drives, for callers that need to
    /// inspect editor-side state (e.g. tests reading back `NullEditor`'s
    /// buffer).
    #[must_use]
    pub const fn editor(&self) -> &E {
        &self.editor
    }

    /// Drains every `TransportEvent` that has crossed from the event-loop
    /// side since the last call, applying each in order. Must run in the
    /// editor context.
    pub fn pump(&mut self) -> Result<(), AgentError> {
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event)?;
        }
        Ok(())
    }

    fn handle_event(&mut self, event: TransportEvent) -> Result<(), AgentError> {
        match event {
            TransportEvent::Connected { author_id, seqno, text, reconnect_secret } => {
                self.on_connected(author_id, seqno, text, reconnect_secret)
            }
            TransportEvent::Message(ServerMessage::External { seq, op }) => self.on_external(seq, op),
            TransportEvent::Message(ServerMessage::Accept { seq }) => self.on_accept(seq),
            TransportEvent::Reconnecting => {
                self.editor.report_error("reconnecting...");
                Ok(())
            }
            TransportEvent::Fatal(msg) => {
                self.editor.report_error(&format!("giving up on doc sync: {msg}"));
                Err(AgentError::Protocol(msg))
            }
        }
    }

    /// Initial sync: the supplied `text` is the authoritative document
    /// snapshot. Replaces the editor buffer wholesale, seeds `BreakTree`,
    /// and replays any local edits that arrived before this point.
    fn on_connected(&mut self, author_id: u64, seqno: u64, text: String, reconnect_secret: Vec<u8>) -> Result<(), AgentError> {
        self.author_id = Some(author_id);
        self.reconnect_secret = Some(reconnect_secret);
        self.latest_server_seq = seqno;

        // `BreakTree` always keeps a trailing ghost line that supplies the
        // document's final line terminator. Seeding it with `text` verbatim
        // would double that terminator whenever `text`
        // itself already ends in `\n` — the ordinary case for a snapshot
        // whose last line is non-blank. Stripping exactly one trailing
        // `\n` before seeding, while building the editor's line array from
        // the untouched `text` via `str::lines` (which already collapses
        // that same terminator), keeps both views in the same coordinate
        // space, including when the document's last line genuinely is
        // blank (`text` ending in `"\n\n"`).
        let seed = text.strip_suffix('\n').unwrap_or(&text);
        self.tree = BreakTree::from_text(seed);

        let lines: Vec<String> = text.lines().map(String::from).collect();
        self.editor.buf_set_lines(self.buf, 0, usize::MAX, false, &lines)?;

        self.first_sync = true;
        for op in std::mem::take(&mut self.pending_local_edits) {
            self.submit_local(op)?;
        }
        Ok(())
    }

    /// An edit authored by another peer and already sequenced by the
    /// server. Transforms it against every submission still in flight —
    /// those are edits the server hasn't seen yet, so from its point of
    /// view this external op was generated against a text that didn't
    /// include them — then applies the result.
    fn on_external(&mut self, seq: u64, op: Op) -> Result<(), AgentError> {
        self.latest_server_seq = seq;

        let mut current = op;
        for sub in &self.inflight {
            match ot::after(&current, &sub.op) {
                Some(next) => current = next,
                // Fully subsumed by one of our own in-flight edits: the
                // null case from the delete-after-delete table. Nothing to
                // apply.
                None => return Ok(()),
            }
        }
        self.apply_remote(&current)
    }

    fn apply_remote(&mut self, op: &Op) -> Result<(), AgentError> {
        match op {
            Op::Insert { idx, text } => {
                let (line, col) = self.tree.insert_text(*idx, text)?;
                let lines: Vec<String> = text.split('\n').map(String::from).collect();
                self.editor.buf_set_text(self.buf, line, col, line, col, &lines)
            }
            Op::Delete { idx, nchars, .. } => {
                let (_removed, sl, sc, el, ec) = self.tree.delete_text(*idx, *nchars)?;
                self.editor.buf_set_text(self.buf, sl, sc, el, ec, &[String::new()])
            }
        }
    }

    /// The server's acknowledgement that our submission with this `seq` is
    /// now canonical. Acks must arrive in submission order; a mismatch
    /// against `inflight`'s head is a protocol invariant violation and
    /// therefore fatal.
    fn on_accept(&mut self, seq: u64) -> Result<(), AgentError> {
        match self.inflight.front() {
            Some(sub) if sub.seq == seq => {
                self.inflight.pop_front();
                self.transport.ack(seq);
                Ok(())
            }
            other => Err(AgentError::Protocol(format!(
                "accept for seq {seq} does not match in-flight head {:?}",
                other.map(|s| s.seq)
            ))),
        }
    }

    /// Translates one `on_bytes`-style editor notification into up to two
    /// `Op`s (a delete of the replaced range, then an insert of the new
    /// range) and dispatches each. Always reads from `self`.
    pub fn on_editor_bytes(&mut self, edit: ByteEdit) -> Result<(), AgentError> {
        if edit.old_len == 0 && edit.new_len == 0 {
            return Ok(());
        }

        if edit.old_len > 0 {
            // The deleted text must be captured from `tree` before this
            // mutates it: `tree` still holds the pre-edit content at this
            // point, since the editor applied the edit to its own buffer
            // already but this client's shadow copy has not caught up yet.
            let (removed, ..) = self.tree.delete_text(edit.char_start, edit.old_len)?;
            self.dispatch_local(Op::delete_with_text(edit.char_start, edit.old_len, removed))?;
        }

        if edit.new_len > 0 {
            let inserted = self
                .editor
                .buf_get_text(self.buf, edit.start_row, edit.start_col, edit.new_end_row, edit.new_end_col)?
                .join("\n");
            self.tree.insert_text(edit.char_start, &inserted)?;
            self.dispatch_local(Op::insert(edit.char_start, inserted))?;
        }

        Ok(())
    }

    fn dispatch_local(&mut self, op: Op) -> Result<(), AgentError> {
        if !self.first_sync {
            self.pending_local_edits.push(op);
            return Ok(());
        }
        self.submit_local(op)
    }

    /// Computes the parent reference, assigns the next `seq`, enqueues the
    /// submission to `inflight`, and hands it to `Transport`.
    fn submit_local(&mut self, op: Op) -> Result<(), AgentError> {
        let author_id = self
            .author_id
            .ok_or_else(|| AgentError::Invariant("local edit submitted before author_id was assigned".to_string()))?;

        let (parent_seq, parent_id) = match self.inflight.back() {
            Some(last) => (last.seq, author_id),
            None => (self.latest_server_seq, 0),
        };

        self.seq += 1;
        let seq = self.seq;

        let submission = Submission { seq, parent_seq, parent_id, op };
        self.inflight.push_back(submission.clone());
        self.transport.submit(submission);
        Ok(())
    }
}
