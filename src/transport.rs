// SPDX-License-Identifier: AGPL-3.0-or-later

//! The connection state machine and submission pipeline.
//!
//! A hand-rolled re-entrant `advance_state` function driven by a callback
//! scheduler is one way to model this; Rust's `async`/`await` already gives
//! every suspension point (`connect`, `read`, `write`, timer) a structured
//! representation, so this module collapses that machinery into a single
//! task (spawned by [`spawn`]) that loops through connect → negotiate →
//! drain-writes → read, without needing explicit sub-state enums or a
//! `schedule()` trampoline — an actor task with an internal loop instead of
//! manual re-entrant dispatch.
//!
//! The actor owns the write queue and the live connection exclusively;
//! callers only ever see a [`TransportHandle`] and a stream of
//! [`TransportEvent`]s.

use crate::error::AgentError;
use crate::wire::{self, ServerMessage, Submission};
use derive_more::Display;
use futures::StreamExt;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf, WriteHalf};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::{debug, warn};

const INITIAL_BACKOFF_MS: u64 = 10;
const MAX_BACKOFF_MS: u64 = 15_000;

/// Parsed form of the `--address` CLI flag / config value.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum Address {
    #[display("tcp:{}", _0)]
    Tcp(String),
    #[display("unix:{}", _0.display())]
    Unix(PathBuf),
}

impl Address {
    /// Parses an address in a fixed order: a bare decimal integer is
    /// `localhost:<n>`; anything else containing `:` is `host:port`;
    /// anything containing `/` is a Unix socket path; otherwise the address
    /// is malformed.
    pub fn parse(spec: &str) -> Result<Self, AgentError> {
        if spec.chars().all(|c| c.is_ascii_digit()) && !spec.is_empty() {
            return Ok(Self::Tcp(format!("localhost:{spec}")));
        }
        if spec.contains(':') {
            return Ok(Self::Tcp(spec.to_string()));
        }
        if spec.contains('/') {
            return Ok(Self::Unix(PathBuf::from(spec)));
        }
        Err(AgentError::Protocol(format!("not a valid address spec: {spec:?}")))
    }

    async fn connect(&self) -> io::Result<AnyStream> {
        match self {
            Self::Tcp(addr) => Ok(AnyStream::Tcp(TcpStream::connect(addr).await?)),
            #[cfg(unix)]
            Self::Unix(path) => Ok(AnyStream::Unix(UnixStream::connect(path).await?)),
            #[cfg(not(unix))]
            Self::Unix(_) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "unix-domain sockets are not supported on this platform",
            )),
        }
    }
}

/// A TCP or Unix stream, unified so `Transport` can pick either at runtime
/// from a single address spec rather than at compile time.
enum AnyStream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl AsyncRead for AnyStream {
    fn poll_read(self: Pin<&mut Self>, cx: &mut TaskContext<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            #[cfg(unix)]
            Self::Unix(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for AnyStream {
    fn poll_write(self: Pin<&mut Self>, cx: &mut TaskContext<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            #[cfg(unix)]
            Self::Unix(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(s) => Pin::new(s).poll_flush(cx),
            #[cfg(unix)]
            Self::Unix(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            #[cfg(unix)]
            Self::Unix(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

/// Events handed to whoever owns this `Transport` (the `Client`).
/// `Connected` fires once per successful negotiation, `Message` once per
/// framed line received afterward — a connect-callback/message-callback
/// pair, expressed as an enum over a channel instead of two stored
/// closures.
#[derive(Debug)]
pub enum TransportEvent {
    Connected { author_id: u64, seqno: u64, text: String, reconnect_secret: Vec<u8> },
    Message(ServerMessage),
    /// A connect/read/write/negotiation failure is being retried with
    /// backoff ("reconnecting...").
    Reconnecting,
    /// A protocol invariant was violated; this transport has given up for
    /// good ("giving up on doc sync: <msg>").
    Fatal(String),
}

enum Command {
    Submit(Submission),
    Ack(u64),
}

/// A cheaply-cloned front for the connection actor: a wrapped
/// `mpsc::Sender`.
#[derive(Clone)]
pub struct TransportHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl TransportHandle {
    /// Enqueues a local submission to be sent (and resent across
    /// reconnects) until acknowledged.
    pub fn submit(&self, sub: Submission) {
        let _ = self.commands.send(Command::Submit(sub));
    }

    /// Tells the transport this `seq` has been acknowledged, so it can be
    /// dropped from the resend queue of submissions not yet acknowledged.
    pub fn ack(&self, seq: u64) {
        let _ = self.commands.send(Command::Ack(seq));
    }

    /// A handle that accepts submissions/acks but has no actor behind it,
    /// for exercising `Client` without a live connection in tests.
    #[must_use]
    pub fn inert() -> Self {
        let (commands, _rx) = mpsc::unbounded_channel();
        Self { commands }
    }
}

/// Spawns the connection actor and returns a handle to it plus the event
/// stream it produces. The actor runs until `handle` and every clone of it
/// are dropped, or until a `Fatal` event is sent.
#[must_use]
pub fn spawn(address: Address, display_name: String) -> (TransportHandle, mpsc::UnboundedReceiver<TransportEvent>) {
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut actor = Actor {
            address,
            display_name,
            commands: commands_rx,
            events: events_tx,
            write_q: Vec::new(),
            reconnect_secret: None,
            backoff_ms: INITIAL_BACKOFF_MS,
        };
        actor.run().await;
    });
    (TransportHandle { commands: commands_tx }, events_rx)
}

enum SessionOutcome {
    /// A connect/read/write/negotiation failure: reconnect with backoff.
    Reconnect,
    /// A protocol invariant violation: stop for good.
    Fatal(String),
    /// Every `TransportHandle` was dropped; nothing left to serve.
    HandleDropped,
}

struct Actor {
    address: Address,
    display_name: String,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<TransportEvent>,
    /// Persistent across reconnects: submissions not yet acknowledged.
    write_q: Vec<Submission>,
    /// Persistent across reconnects: set after the first successful
    /// negotiation, reused so every later reconnect presents the secret
    /// instead of re-registering via `new:`.
    reconnect_secret: Option<Vec<u8>>,
    backoff_ms: u64,
}

impl Actor {
    async fn run(&mut self) {
        loop {
            match self.connect_and_negotiate().await {
                Ok((reader, writer)) => {
                    self.backoff_ms = INITIAL_BACKOFF_MS;
                    match self.session(reader, writer).await {
                        SessionOutcome::Reconnect => {}
                        SessionOutcome::Fatal(msg) => {
                            let _ = self.events.send(TransportEvent::Fatal(msg));
                            return;
                        }
                        SessionOutcome::HandleDropped => return,
                    }
                }
                Err(SessionOutcome::Fatal(msg)) => {
                    let _ = self.events.send(TransportEvent::Fatal(msg));
                    return;
                }
                Err(SessionOutcome::HandleDropped) => return,
                Err(SessionOutcome::Reconnect) => {}
            }

            if self.events.send(TransportEvent::Reconnecting).is_err() {
                return;
            }
            debug!(backoff_ms = self.backoff_ms, "reconnecting after backoff");
            tokio::time::sleep(Duration::from_millis(self.backoff_ms)).await;
            self.backoff_ms = (self.backoff_ms * 2).min(MAX_BACKOFF_MS);
        }
    }

    /// Connects, then negotiates: send `new:` or the stored reconnect
    /// secret, wait for exactly one reply line, parse it, and only report
    /// negotiation done once the snapshot has actually been handed off to
    /// the event channel — so a slow consumer can never observe writes
    /// drained before it has the snapshot.
    ///
    /// A malformed negotiation reply resolves to `Reconnect` here rather
    /// than `Fatal` (contrast with mid-session parse failures, handled in
    /// `session`).
    async fn connect_and_negotiate(
        &mut self,
    ) -> Result<(FramedRead<tokio::io::ReadHalf<AnyStream>, LinesCodec>, WriteHalf<AnyStream>), SessionOutcome> {
        let stream = self.address.connect().await.map_err(|err| {
            warn!(address = %self.address, %err, "connect failed");
            SessionOutcome::Reconnect
        })?;
        let (read_half, mut write_half) = tokio::io::split(stream);
        let mut reader = FramedRead::new(read_half, LinesCodec::new());

        let negotiation_line = match &self.reconnect_secret {
            Some(secret) => wire::encode_reconnect(secret),
            None => wire::encode_new(&self.display_name),
        };
        write_half.write_all(negotiation_line.as_bytes()).await.map_err(|err| {
            warn!(%err, "failed to send negotiation line");
            SessionOutcome::Reconnect
        })?;

        let line = match reader.next().await {
            Some(Ok(line)) => line,
            Some(Err(err)) => {
                warn!(%err, "negotiation read failed");
                return Err(SessionOutcome::Reconnect);
            }
            None => {
                warn!("connection closed during negotiation");
                return Err(SessionOutcome::Reconnect);
            }
        };

        let response = wire::parse_negotiation_response(&line).map_err(|err| {
            warn!(%err, "malformed negotiation response");
            SessionOutcome::Reconnect
        })?;

        self.reconnect_secret = Some(response.reconnect_secret.clone());

        self.events
            .send(TransportEvent::Connected {
                author_id: response.author_id,
                seqno: response.seqno,
                text: response.text,
                reconnect_secret: response.reconnect_secret,
            })
            .map_err(|_| SessionOutcome::HandleDropped)?;

        Ok((reader, write_half))
    }

    /// Drains unsent writes, then alternates reading framed lines and
    /// accepting new local submissions/acks until the connection drops or
    /// a fatal parse error occurs.
    async fn session(
        &mut self,
        mut reader: FramedRead<tokio::io::ReadHalf<AnyStream>, LinesCodec>,
        mut writer: WriteHalf<AnyStream>,
    ) -> SessionOutcome {
        for sub in self.write_q.clone() {
            let line = wire::encode_submission(&sub);
            if writer.write_all(line.as_bytes()).await.is_err() {
                return SessionOutcome::Reconnect;
            }
        }

        loop {
            tokio::select! {
                line = reader.next() => {
                    match line {
                        Some(Ok(line)) => match wire::parse_server_message(&line) {
                            Ok(msg) => {
                                if self.events.send(TransportEvent::Message(msg)).is_err() {
                                    return SessionOutcome::HandleDropped;
                                }
                            }
                            Err(err) => {
                                // On parse failure, treat the protocol as
                                // fatal — unlike a malformed negotiation
                                // reply, a malformed in-session message does
                                // not trigger reconnect.
                                return SessionOutcome::Fatal(format!("malformed message {line:?}: {err}"));
                            }
                        },
                        Some(Err(err)) => {
                            warn!(%err, "read error");
                            return SessionOutcome::Reconnect;
                        }
                        None => {
                            warn!("connection closed by peer");
                            return SessionOutcome::Reconnect;
                        }
                    }
                }
                cmd = self.commands.recv() => {
                    match cmd {
                        Some(Command::Submit(sub)) => {
                            self.write_q.push(sub.clone());
                            let line = wire::encode_submission(&sub);
                            if writer.write_all(line.as_bytes()).await.is_err() {
                                return SessionOutcome::Reconnect;
                            }
                        }
                        Some(Command::Ack(seq)) => {
                            if matches!(self.write_q.first(), Some(front) if front.seq == seq) {
                                self.write_q.remove(0);
                            }
                        }
                        None => return SessionOutcome::HandleDropped,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_parses_bare_port_as_localhost_tcp() {
        assert_eq!(Address::parse("4242").unwrap(), Address::Tcp("localhost:4242".to_string()));
    }

    #[test]
    fn address_parses_host_colon_port_as_tcp() {
        assert_eq!(Address::parse("example.com:4242").unwrap(), Address::Tcp("example.com:4242".to_string()));
    }

    #[test]
    fn address_parses_path_as_unix_socket() {
        assert_eq!(Address::parse("/tmp/agent.sock").unwrap(), Address::Unix(PathBuf::from("/tmp/agent.sock")));
    }

    #[test]
    fn address_rejects_unparseable_spec() {
        assert!(Address::parse("not-an-address").is_err());
    }

    #[test]
    fn inert_handle_accepts_submit_and_ack_without_panicking() {
        let handle = TransportHandle::inert();
        handle.submit(Submission { seq: 0, parent_seq: 0, parent_id: 0, op: crate::ot::Op::insert(0, "x") });
        handle.ack(0);
    }
}
