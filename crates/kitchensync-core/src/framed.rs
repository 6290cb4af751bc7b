//! Framed command stream (spec component C2): one command per message, no
//! length envelope beyond the codec's own array framing. Commands are
//! read/written as `[name, arg0, arg1, ...]`; replies are a single packed
//! value written back with no additional wrapper, since the protocol never
//! pipelines — exactly one reply is owed to exactly one outstanding
//! request at a time (spec.md §5).

use std::io::{self, Read, Write};

use crate::codec::{self, Reader};
use crate::error::{CodecError, Error, Result};
use crate::value::PackedValue;

/// A bidirectional framed command channel over any `Read + Write` pair —
/// in production, a peer's stdin/stdout.
pub struct FramedStream<S> {
    stream: S,
}

impl<S: Read + Write> FramedStream<S> {
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Read one command message: `[name, args...]`.
    pub fn read_command(&mut self) -> Result<(String, Vec<PackedValue>)> {
        let value = self.read_value()?;
        let mut items = match value {
            PackedValue::Array(items) => items,
            other => {
                return Err(Error::Codec(CodecError::TypeMismatch {
                    expected: "array",
                    found: other.type_name(),
                }));
            }
        };
        if items.is_empty() {
            return Err(Error::Codec(CodecError::TypeMismatch { expected: "command name", found: "empty array" }));
        }
        let name = items.remove(0);
        let name = name
            .as_str()
            .ok_or(Error::Codec(CodecError::TypeMismatch { expected: "str", found: name.type_name() }))?
            .to_string();
        Ok((name, items))
    }

    pub fn write_command(&mut self, name: &str, args: &[PackedValue]) -> Result<()> {
        let mut items = Vec::with_capacity(args.len() + 1);
        items.push(PackedValue::from(name));
        items.extend_from_slice(args);
        self.write_value(&PackedValue::Array(items))
    }

    /// Read a single packed value — used for replies, which are not
    /// wrapped in a `[name, ...]` envelope.
    pub fn read_value(&mut self) -> Result<PackedValue> {
        // The codec decodes from an in-memory buffer; since there is no
        // outer length envelope we must read byte-by-byte from the stream
        // until a complete top-level value has been consumed. We do this
        // by growing a buffer and retrying decode on short read, which is
        // simple and correct for the message sizes this protocol moves
        // (schemas, single rows) without needing a separate parser that
        // understands partial streams.
        let mut buf = Vec::with_capacity(64);
        loop {
            let mut byte = [0_u8; 1];
            match self.stream.read_exact(&mut byte) {
                Ok(()) => buf.push(byte[0]),
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    return Err(Error::ConnectionLost);
                }
                Err(_) => return Err(Error::ConnectionLost),
            }
            let mut r = Reader::new(&buf);
            match codec::unpack_value(&mut r) {
                Ok(value) => {
    tracing::trace!(bytes = buf.len(), kind = value.type_name(), "decoded frame");
                    return Ok(value);
                }
                Err(Error::Codec(CodecError::ShortRead)) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    pub fn write_value(&mut self, value: &PackedValue) -> Result<()> {
        let mut buf = Vec::new();
        codec::pack_value(&mut buf, value);
        self.stream.write_all(&buf).map_err(|_| Error::ConnectionLost)?;
        self.stream.flush().map_err(|_| Error::ConnectionLost)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    struct DuplexBuf {
        read_from: Cursor<Vec<u8>>,
        written: Vec<u8>,
    }

    impl Read for DuplexBuf {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.read_from.read(buf)
        }
    }

    impl Write for DuplexBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_then_read_command_roundtrips() {
        let mut encode_buf = Vec::new();
        codec::pack_value(
            &mut encode_buf,
            &PackedValue::Array(vec![PackedValue::from("protocol"), PackedValue::Int(9)]),
        );
        let mut stream = FramedStream::new(DuplexBuf { read_from: Cursor::new(encode_buf), written: Vec::new() });
        let (name, args) = stream.read_command().unwrap();
        assert_eq!(name, "protocol");
        assert_eq!(args, vec![PackedValue::Int(9)]);
    }

    #[test]
    fn write_command_produces_name_prefixed_array() {
        let mut stream = FramedStream::new(DuplexBuf { read_from: Cursor::new(Vec::new()), written: Vec::new() });
        stream.write_command("schema", &[]).unwrap();
        let inner = stream.into_inner();
        let mut r = Reader::new(&inner.written);
        let value = codec::unpack_value(&mut r).unwrap();
        match value {
            PackedValue::Array(items) => {
                assert_eq!(items.len(), 1);
                assert_eq!(items[0].as_str(), Some("schema"));
            }
            _ => panic!("expected array"),
        }
    }

    #[test]
    fn eof_mid_frame_is_connection_lost_not_a_decode_error() {
        let mut stream = FramedStream::new(DuplexBuf { read_from: Cursor::new(vec![0x91]), written: Vec::new() });
        let err = stream.read_value().unwrap_err();
        assert!(matches!(err, Error::ConnectionLost));
    }
}
