use std::io::{ErrorKind, Read, Write};

use bytes::BytesMut;
use privsep_wire::{decode_message, encode_message, Message, WireValue, DEFAULT_MAX_FRAME_SIZE};

use crate::dispatch::{Disposition, Handler};
use crate::error::{ChannelError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// A blocking message channel over any `Read + Write` stream.
///
/// Handles partial reads and short writes internally; callers always move
/// whole messages. One channel serves one stream for its whole life — there
/// is no reconnect, a closed stream is the end of the conversation.
pub struct Channel<T> {
    inner: T,
    rx: BytesMut,
    tx: BytesMut,
    max_frame_size: usize,
}

impl<T: Read + Write> Channel<T> {
    /// Create a channel with the default frame size limit.
    pub fn new(inner: T) -> Self {
        Self::with_max_frame_size(inner, DEFAULT_MAX_FRAME_SIZE)
    }

    /// Create a channel with an explicit frame size limit.
    pub fn with_max_frame_size(inner: T, max_frame_size: usize) -> Self {
        Self {
            inner,
            rx: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            tx: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            max_frame_size,
        }
    }

    /// Encode one message and write the whole frame (blocking).
    pub fn send(&mut self, msg_id: u32, args: &[WireValue]) -> Result<()> {
        self.tx.clear();
        encode_message(msg_id, args, &mut self.tx)?;
        tracing::trace!(msg_id, args = args.len(), bytes = self.tx.len(), "send");

        let mut offset = 0usize;
        while offset < self.tx.len() {
            match self.inner.write(&self.tx[offset..]) {
                Ok(0) => return Err(ChannelError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(ChannelError::Io(err)),
            }
        }
        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(ChannelError::Io(err)),
            }
        }
    }

    /// Block until one complete message has arrived and return it decoded.
    ///
    /// Returns `Err(ChannelError::ConnectionClosed)` when EOF is reached.
    /// A malformed frame fails the call before any of it is exposed; bytes
    /// of a following frame already buffered stay put for the next call.
    pub fn receive_message(&mut self) -> Result<Message> {
        loop {
            if let Some(msg) = decode_message(&mut self.rx, self.max_frame_size)? {
                tracing::trace!(msg_id = msg.msg_id, args = msg.args.len(), "receive");
                return Ok(msg);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(ChannelError::Io(err)),
            };

            if read == 0 {
                return Err(ChannelError::ConnectionClosed);
            }

            self.rx.extend_from_slice(&chunk[..read]);
        }
    }

    /// Receive exactly one message and dispatch it through `handler`.
    ///
    /// The handler gets this channel back as its first argument, so it can
    /// reply (or run a nested exchange) before the call returns.
    pub fn receive<H>(&mut self, handler: &mut H) -> Result<Disposition>
    where
        H: Handler<T> + ?Sized,
    {
        let msg = self.receive_message()?;
        handler.on_message(self, &msg)
    }

    /// Receive and dispatch until a handler stops the loop.
    ///
    /// [`Disposition::Continue`] keeps serving, [`Disposition::Ready`]
    /// returns `Ok(())`, and [`Disposition::Fail`] becomes
    /// `ChannelError::Dispatch`.
    pub fn serve<H>(&mut self, handler: &mut H) -> Result<()>
    where
        H: Handler<T> + ?Sized,
    {
        loop {
            match self.receive(&mut *handler)? {
                Disposition::Continue => {}
                Disposition::Ready => return Ok(()),
                Disposition::Fail(code) => return Err(ChannelError::Dispatch { code }),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the channel and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Update the frame size limit for subsequent messages.
    pub fn set_max_frame_size(&mut self, max_frame_size: usize) {
        self.max_frame_size = max_frame_size;
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::os::unix::net::UnixStream;

    use privsep_wire::WireTag;

    use super::*;

    #[test]
    fn send_then_receive_through_memory() {
        let cursor = Cursor::new(Vec::<u8>::new());
        let mut sender = Channel::new(cursor);
        sender
            .send(3, &[WireValue::Int32(56789), WireValue::from("1234")])
            .unwrap();

        let wire = sender.into_inner().into_inner();
        let mut receiver = Channel::new(Cursor::new(wire));
        let msg = receiver.receive_message().unwrap();

        assert_eq!(msg.msg_id, 3);
        assert_eq!(msg.args[0].recover_int32().unwrap(), 56789);
        assert_eq!(msg.args[1].recover_string8().unwrap(), Some("1234"));
    }

    #[test]
    fn roundtrip_over_socket_pair() {
        let (left, right) = UnixStream::pair().unwrap();
        let mut tx = Channel::new(left);
        let mut rx = Channel::new(right);

        tx.send(
            9,
            &[
                WireValue::opt_string16(None),
                WireValue::string16("ab de"),
                WireValue::UInt32(3_221_225_472),
            ],
        )
        .unwrap();

        let msg = rx.receive_message().unwrap();
        assert_eq!(msg.msg_id, 9);
        assert_eq!(msg.args[0].tag(), WireTag::NullString16);
        assert_eq!(msg.args[1].recover_string16().unwrap(), Some("ab de"));
        assert_eq!(msg.args[2].recover_uint32().unwrap(), 3_221_225_472);
    }

    #[test]
    fn messages_arrive_in_send_order() {
        let (left, right) = UnixStream::pair().unwrap();
        let mut tx = Channel::new(left);
        let mut rx = Channel::new(right);

        for id in 1..=5u32 {
            tx.send(id, &[WireValue::UInt32(id * 10)]).unwrap();
        }
        for id in 1..=5u32 {
            let msg = rx.receive_message().unwrap();
            assert_eq!(msg.msg_id, id);
            assert_eq!(msg.args[0].recover_uint32().unwrap(), id * 10);
        }
    }

    #[test]
    fn partial_delivery_reassembled() {
        let mut staging = Channel::new(Cursor::new(Vec::<u8>::new()));
        staging
            .send(13, &[WireValue::NullByteArray])
            .unwrap();
        let wire = staging.into_inner().into_inner();

        let mut channel = Channel::new(ByteByByteReader {
            bytes: wire,
            pos: 0,
        });
        let msg = channel.receive_message().unwrap();
        assert_eq!(msg.msg_id, 13);
        assert_eq!(msg.args[0].recover_bytes().unwrap(), None);
    }

    #[test]
    fn closed_stream_reported() {
        let mut channel = Channel::new(Cursor::new(Vec::<u8>::new()));
        let err = channel.receive_message().unwrap_err();
        assert!(matches!(err, ChannelError::ConnectionClosed));
    }

    #[test]
    fn eof_mid_frame_reported_as_closed() {
        let mut staging = Channel::new(Cursor::new(Vec::<u8>::new()));
        staging.send(1, &[WireValue::from("truncated")]).unwrap();
        let mut wire = staging.into_inner().into_inner();
        wire.truncate(wire.len() - 3);

        let mut channel = Channel::new(Cursor::new(wire));
        let err = channel.receive_message().unwrap_err();
        assert!(matches!(err, ChannelError::ConnectionClosed));
    }

    #[test]
    fn corrupt_frame_reported_as_wire_error() {
        let mut staging = Channel::new(Cursor::new(Vec::<u8>::new()));
        staging.send(1, &[]).unwrap();
        let mut wire = staging.into_inner().into_inner();
        wire[0] ^= 0xFF;

        let mut channel = Channel::new(Cursor::new(wire));
        let err = channel.receive_message().unwrap_err();
        assert!(matches!(err, ChannelError::Wire(_)));
    }

    #[test]
    fn interrupted_read_retries() {
        let mut staging = Channel::new(Cursor::new(Vec::<u8>::new()));
        staging.send(8, &[WireValue::from("ok")]).unwrap();
        let wire = staging.into_inner().into_inner();

        let mut channel = Channel::new(InterruptedThenData {
            state: 0,
            bytes: wire,
            pos: 0,
        });
        let msg = channel.receive_message().unwrap();
        assert_eq!(msg.msg_id, 8);
    }

    #[test]
    fn zero_length_write_reported_as_closed() {
        let mut channel = Channel::new(ZeroWriter);
        let err = channel.send(1, &[]).unwrap_err();
        assert!(matches!(err, ChannelError::ConnectionClosed));
    }

    #[derive(Debug)]
    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    impl Write for ByteByByteReader {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct InterruptedThenData {
        state: u8,
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.state == 0 {
                self.state = 1;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            if self.pos >= self.bytes.len() {
                return Ok(0);
            }
            let n = (self.bytes.len() - self.pos).min(buf.len());
            buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    impl Write for InterruptedThenData {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct ZeroWriter;

    impl Read for ZeroWriter {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Ok(0)
        }
    }

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
