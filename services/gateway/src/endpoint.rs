//! Per-connection byte pumps (§2.4) and FIX framing (§1, §2.4).
//!
//! The Receiver parses frames by length prefix (`9=<len>` then the
//! SOH-delimited tail up to and including the checksum field) and hands
//! whole frames upward as opaque bytes — bodies are never decoded here, only
//! scanned for the `MsgType` tag needed to recognise a Logon for the
//! hand-off state machine (§4.6). The Sender buffers outbound bytes and
//! drains them to the socket as the kernel accepts writes.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::TcpStream;

use gw_protocol::{ConnectionId, DisconnectReason, LibraryId};

/// ASCII 0x01, the FIX field delimiter.
const SOH: u8 = 0x01;

/// Cap on bytes read from a single socket in one `poll()` call, so one
/// connection streaming fast cannot starve the rest of the tick (§4.1).
const MAX_READ_PER_POLL: usize = 64 * 1024;

/// A complete, framed FIX message, still tag-value encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixFrame(pub Vec<u8>);

impl FixFrame {
    /// Scans the frame for `35=<value>` and reports whether it is a Logon
    /// (`MsgType` `A`). This is one of only two tags this layer inspects.
    pub fn is_logon(&self) -> bool {
        self.msg_type().as_deref() == Some("A")
    }

    /// Whether this frame is a Heartbeat (`MsgType` `0`), the other tag this
    /// layer inspects — needed to keep a `GatewaySession`'s heartbeat
    /// bookkeeping current without decoding the rest of the body (§4.1(e)).
    pub fn is_heartbeat(&self) -> bool {
        self.msg_type().as_deref() == Some("0")
    }

    pub fn msg_type(&self) -> Option<String> {
        find_tag_value(&self.0, b"35=")
    }
}

fn find_tag_value(body: &[u8], needle: &[u8]) -> Option<String> {
    let mut i = 0;
    while i + needle.len() <= body.len() {
        let at_start = i == 0 || body[i - 1] == SOH;
        if at_start && &body[i..i + needle.len()] == needle {
            let value_start = i + needle.len();
            let value_end = body[value_start..]
                .iter()
                .position(|&b| b == SOH)
                .map(|p| value_start + p)
                .unwrap_or(body.len());
            return Some(String::from_utf8_lossy(&body[value_start..value_end]).into_owned());
        }
        i += 1;
    }
    None
}

/// Accumulates bytes from a non-blocking socket and extracts complete FIX
/// frames as they become available.
#[derive(Debug, Default)]
struct FrameAccumulator {
    buf: Vec<u8>,
}

impl FrameAccumulator {
    fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pulls every complete frame currently buffered. A frame is complete
    /// once a `9=<len>` body length has been read, `len` bytes of body
    /// follow it, and the checksum field (`10=nnn` + SOH) terminates it.
    fn drain_frames(&mut self) -> Vec<FixFrame> {
        let mut frames = Vec::new();
        loop {
            match Self::extract_one(&self.buf) {
                Some(frame_len) => {
                    let frame: Vec<u8> = self.buf.drain(..frame_len).collect();
                    frames.push(FixFrame(frame));
                }
                None => break,
            }
        }
        frames
    }

    fn extract_one(buf: &[u8]) -> Option<usize> {
        let body_len_tag = find_tag_value(buf, b"9=")?;
        let body_len: usize = body_len_tag.parse().ok()?;

        let tag_start = buf.windows(2).position(|w| w == b"9=")?;
        let after_tag = tag_start + 2 + body_len_tag.len();
        let body_start = if buf.get(after_tag) == Some(&SOH) {
            after_tag + 1
        } else {
            return None;
        };

        let body_end = body_start + body_len;
        if buf.len() < body_end {
            return None;
        }

        // Checksum field follows immediately: "10=" + 3 digits + SOH.
        let checksum_len = 3 + 3 + 1;
        let frame_end = body_end + checksum_len;
        if buf.len() < frame_end {
            return None;
        }
        if &buf[body_end..body_end + 3] != b"10=" {
            return None;
        }
        Some(frame_end)
    }
}

/// Owns the read half of a connection and yields complete frames.
#[derive(Debug)]
pub struct ReceiverEndpoint {
    pub connection_id: ConnectionId,
    pub library_id: LibraryId,
    stream: TcpStream,
    accumulator: FrameAccumulator,
    closed: bool,
}

impl ReceiverEndpoint {
    pub fn new(stream: TcpStream, connection_id: ConnectionId, library_id: LibraryId) -> Self {
        ReceiverEndpoint {
            connection_id,
            library_id,
            stream,
            accumulator: FrameAccumulator::default(),
            closed: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Reads whatever is ready without blocking and returns any frames that
    /// completed as a result. Returns `Ok(true)` if the peer closed the
    /// channel (EOF), in which case the caller should treat this as a
    /// `RemoteDisconnect`.
    pub fn poll(&mut self) -> io::Result<(Vec<FixFrame>, bool)> {
        if self.closed {
            return Ok((Vec::new(), false));
        }
        let mut chunk = [0u8; 4096];
        let mut total_read = 0;
        let mut eof = false;
        loop {
            if total_read >= MAX_READ_PER_POLL {
                break;
            }
            match self.stream.read(&mut chunk) {
                Ok(0) => {
                    eof = true;
                    break;
                }
                Ok(n) => {
                    self.accumulator.push(&chunk[..n]);
                    total_read += n;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok((self.accumulator.drain_frames(), eof))
    }

    /// Closes the underlying channel. Idempotent (§5).
    pub fn close(&mut self, _reason: DisconnectReason) {
        if self.closed {
            return;
        }
        let _ = self.stream.shutdown(std::net::Shutdown::Read);
        self.closed = true;
    }
}

/// Owns the write half of a connection and drains a buffered outbound queue.
#[derive(Debug)]
pub struct SenderEndpoint {
    pub connection_id: ConnectionId,
    pub library_id: LibraryId,
    stream: TcpStream,
    outbound: VecDeque<u8>,
    closed: bool,
}

impl SenderEndpoint {
    pub fn new(stream: TcpStream, connection_id: ConnectionId, library_id: LibraryId) -> Self {
        SenderEndpoint {
            connection_id,
            library_id,
            stream,
            outbound: VecDeque::new(),
            closed: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn enqueue(&mut self, bytes: &[u8]) {
        if self.closed {
            return;
        }
        self.outbound.extend(bytes.iter().copied());
    }

    /// Drains as much of the outbound queue as the socket will currently
    /// accept, bounded to one contiguous slice per tick (§4.1).
    pub fn drain(&mut self) -> io::Result<()> {
        if self.closed || self.outbound.is_empty() {
            return Ok(());
        }
        let pending: Vec<u8> = self.outbound.iter().copied().collect();
        match self.stream.write(&pending) {
            Ok(0) => Ok(()),
            Ok(n) => {
                self.outbound.drain(..n);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Closes the underlying channel. Idempotent (§5).
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        let _ = self.stream.shutdown(std::net::Shutdown::Write);
        self.closed = true;
    }
}

/// Constructs paired endpoints around one accepted or initiated TCP channel
/// (§6 Endpoint Factory contract). No `Send` bound: the Framer owns its
/// collaborators on a single dedicated thread (§5).
pub trait EndpointFactory {
    fn make_endpoints(
        &self,
        channel: TcpStream,
        connection_id: ConnectionId,
        library_id: LibraryId,
    ) -> io::Result<(ReceiverEndpoint, SenderEndpoint)>;
}

/// Production [`EndpointFactory`] backed by `std::net::TcpStream::try_clone`:
/// the receiver and sender share the same underlying socket through two
/// independent handles, each responsible for one direction.
#[derive(Debug, Default)]
pub struct TcpEndpointFactory;

impl EndpointFactory for TcpEndpointFactory {
    fn make_endpoints(
        &self,
        channel: TcpStream,
        connection_id: ConnectionId,
        library_id: LibraryId,
    ) -> io::Result<(ReceiverEndpoint, SenderEndpoint)> {
        channel.set_nonblocking(true)?;
        let sender_half = channel.try_clone()?;
        Ok((
            ReceiverEndpoint::new(channel, connection_id, library_id),
            SenderEndpoint::new(sender_half, connection_id, library_id),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logon_frame() -> Vec<u8> {
        // 8=FIX.4.4|9=19|35=A|34=1|49=X|10=000|  (lengths/checksum not
        // cryptographically accurate, only structurally well-formed)
        let body = b"35=A\x0134=1\x0149=X\x01";
        let mut out = Vec::new();
        out.extend_from_slice(b"8=FIX.4.4\x01");
        out.extend_from_slice(format!("9={}\x01", body.len()).as_bytes());
        out.extend_from_slice(body);
        out.extend_from_slice(b"10=000\x01");
        out
    }

    #[test]
    fn recognises_logon_msg_type() {
        let frame = FixFrame(logon_frame());
        assert!(frame.is_logon());
        assert_eq!(frame.msg_type().as_deref(), Some("A"));
    }

    #[test]
    fn recognises_heartbeat_msg_type() {
        let body = b"35=0\x0134=2\x0149=X\x01";
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"8=FIX.4.4\x01");
        bytes.extend_from_slice(format!("9={}\x01", body.len()).as_bytes());
        bytes.extend_from_slice(body);
        bytes.extend_from_slice(b"10=000\x01");
        let frame = FixFrame(bytes);
        assert!(frame.is_heartbeat());
        assert!(!frame.is_logon());
    }

    #[test]
    fn accumulator_waits_for_complete_frame() {
        let mut acc = FrameAccumulator::default();
        let full = logon_frame();
        acc.push(&full[..full.len() - 3]);
        assert!(acc.drain_frames().is_empty());
        acc.push(&full[full.len() - 3..]);
        let frames = acc.drain_frames();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].is_logon());
    }

    #[test]
    fn accumulator_extracts_multiple_frames_from_one_chunk() {
        let mut acc = FrameAccumulator::default();
        let one = logon_frame();
        let mut both = one.clone();
        both.extend_from_slice(&one);
        acc.push(&both);
        let frames = acc.drain_frames();
        assert_eq!(frames.len(), 2);
    }
}
