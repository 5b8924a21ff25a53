//! Length-delimited, typed, bi-directional messaging with the viewer.
//!
//! The outer framing is a 4-byte little-endian length prefix around each
//! [`wire`] message. The writer half is owned by the engine thread, the
//! reader half by [`crate::prioritisation::PrioritisationReceiver`] — they
//! share nothing but the underlying socket, obtained via
//! [`std::os::unix::net::UnixStream::try_clone`] the same way a duplex
//! channel is normally split in this ecosystem.

pub mod wire;

use std::io::{self, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;

use bytes::{Buf, BufMut, BytesMut};

use crate::edge_batcher::EdgeBatch;
use crate::error::{FlowtraceError, Result};
use crate::identity::HostStateId;

pub use wire::Message;

/// Connect to the viewer's listening socket, returning independent
/// writer/reader handles over the same duplex connection.
pub fn connect(path: &Path) -> io::Result<(IpcWriter, IpcReader)> {
    let stream = UnixStream::connect(path)?;
    split(stream)
}

/// Split an already-connected stream into writer/reader halves. Exposed
/// separately from [`connect`] so tests can use
/// [`UnixStream::pair`](std::os::unix::net::UnixStream::pair) instead of a
/// filesystem socket.
pub fn split(stream: UnixStream) -> io::Result<(IpcWriter, IpcReader)> {
    let reader_stream = stream.try_clone()?;
    reader_stream.set_nonblocking(true)?;
    Ok((
        IpcWriter { stream },
        IpcReader {
            stream: reader_stream,
            buf: BytesMut::new(),
        },
    ))
}

/// Outbound half: issues `EDGE_BATCH` messages. Owned by the engine thread.
pub struct IpcWriter {
    stream: UnixStream,
}

impl IpcWriter {
    fn write_framed(&mut self, payload: &BytesMut) -> Result<()> {
        let mut framed = BytesMut::with_capacity(4 + payload.len());
        framed.put_u32_le(payload.len() as u32);
        framed.extend_from_slice(payload);
        self.stream.write_all(&framed)?;
        Ok(())
    }

    /// Serialize and send one edge batch. The engine thread must not block
    /// on this for long; a disconnected or saturated viewer surfaces as
    /// an `Err` so the caller can degrade (buffer, or drop oldest batches)
    /// rather than stall the host's callback dispatch.
    pub fn send_edge_batch(&mut self, batch: &EdgeBatch) -> Result<()> {
        let mut payload = BytesMut::new();
        wire::encode_edge_batch(&mut payload, batch);
        self.write_framed(&payload)
    }

    /// Serialize and send a `PRIORITISE_STATES` request. Issued by the
    /// viewer side of the connection, not the engine thread — exposed here
    /// too since both halves share the same framing and either side may
    /// hold an `IpcWriter` (e.g. a viewer-side test harness).
    pub fn send_prioritise_states(&mut self, ids: &[HostStateId]) -> Result<()> {
        let mut payload = BytesMut::new();
        wire::encode_prioritise_states(&mut payload, ids);
        self.write_framed(&payload)
    }
}

/// Inbound half: polls for `PRIORITISE_STATES` messages. Owned by
/// [`crate::prioritisation::PrioritisationReceiver`].
pub struct IpcReader {
    stream: UnixStream,
    buf: BytesMut,
}

impl IpcReader {
    /// Non-blocking poll: returns promptly with `Ok(None)` if no complete
    /// message is buffered yet.
    pub fn try_receive(&mut self) -> Result<Option<Message>> {
        self.pump_socket()?;

        if self.buf.len() < 4 {
            return Ok(None);
        }
        let len = u32::from_le_bytes(self.buf[..4].try_into().unwrap()) as usize;
        if self.buf.len() < 4 + len {
            return Ok(None);
        }

        self.buf.advance(4);
        let mut payload = self.buf.split_to(len);
        let message = wire::decode_message(&mut payload)?;
        Ok(Some(message))
    }

    fn pump_socket(&mut self) -> Result<()> {
        let mut chunk = [0u8; 4096];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => self.buf.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(FlowtraceError::Io(e)),
            }
        }
        Ok(())
    }

    /// Read a single `PRIORITISE_STATES` payload synchronously, for tests
    /// that do not want to poll.
    #[cfg(test)]
    pub fn recv_blocking_prioritise(&mut self) -> Result<Vec<HostStateId>> {
        self.stream.set_nonblocking(false)?;
        loop {
            if let Some(Message::PrioritiseStates(ids)) = self.try_receive()? {
                self.stream.set_nonblocking(true)?;
                return Ok(ids);
            }
        }
    }
}
