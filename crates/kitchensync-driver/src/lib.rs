//! Endpoint driver loop (spec component C8): version handshake and
//! command dispatch on one side of a [`kitchensync_core::FramedStream`],
//! generic over any [`Adapter`].
//!
//! Range/hash/rows synchronization (spec.md §4.2's "delegated — treated
//! as external collaborator") is out of this crate's scope; [`run`]
//! accepts an optional [`RangeSync`] the caller wires up, and replies
//! `Unsupported` for those three commands when none is installed.

use std::io::{Read, Write};

use asupersync::Cx;
use kitchensync_adapter::Adapter;
use kitchensync_core::error::{Error, Result};
use kitchensync_core::protocol::{self, command};
use kitchensync_core::value::PackedValue;
use kitchensync_core::FramedStream;
use kitchensync_schema::wire;

/// Out-of-scope collaborator for the range-hashing synchronization
/// commands (spec.md §1's "out of scope" row-content hash/diff
/// algorithm). A real deployment wires a concrete implementation in;
/// this crate only defines the seam.
pub trait RangeSync {
    fn range(&mut self, args: &[PackedValue]) -> Result<PackedValue>;
    fn hash(&mut self, args: &[PackedValue]) -> Result<PackedValue>;
    fn rows(&mut self, args: &[PackedValue]) -> Result<PackedValue>;
}

/// One negotiated session's mutable state: the protocol version in
/// effect and the two target-size knobs the "to" side may push down
/// (spec.md §4.2's `target_block_size`/`target_minimum_block_size`),
/// which the out-of-scope sync subsystem consults but this crate only
/// stores.
#[derive(Debug, Default)]
pub struct SessionState {
    pub negotiated_version: Option<i64>,
    pub target_block_size: Option<i64>,
    pub target_minimum_block_size: Option<i64>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    fn version_or(&self, fallback: i64) -> i64 {
        self.negotiated_version.unwrap_or(fallback)
    }
}

fn ack() -> PackedValue {
    PackedValue::Bool(true)
}

fn arg(args: &[PackedValue], index: usize) -> Result<&PackedValue> {
    args.get(index)
        .ok_or(Error::Codec(kitchensync_core::error::CodecError::TypeMismatch { expected: "argument", found: "missing" }))
}

/// Run the endpoint driver loop: read one command, dispatch, write one
/// reply, repeat until `quit` or EOF (spec.md §4.8). `cx` is the
/// structured-concurrency context every `Adapter` call takes; the loop
/// itself never holds more than one outstanding adapter call, matching
/// spec.md §5's single-outstanding-suspension-point requirement.
pub async fn run<S, A>(stream: &mut FramedStream<S>, cx: &Cx, adapter: &mut A, range_sync: Option<&mut dyn RangeSync>) -> Result<()>
where
    S: Read + Write,
    A: Adapter,
{
    let mut state = SessionState::new();
    let mut range_sync = range_sync;
    loop {
        let (name, args) = stream.read_command()?;
        tracing::debug!(command = name.as_str(), argc = args.len(), "dispatching command");

        let reply = match name.as_str() {
            command::PROTOCOL => {
                let peer_proposed = arg(&args, 0)?.as_i64().ok_or(Error::Codec(
                    kitchensync_core::error::CodecError::TypeMismatch { expected: "int", found: "non-int" },
                ))?;
                let negotiated = protocol::negotiate(peer_proposed);
                if !protocol::is_supported(negotiated) {
                    return Err(Error::ProtocolVersion(kitchensync_core::error::ProtocolVersionError {
                        peer_version: peer_proposed,
                    }));
                }
                state.negotiated_version = Some(negotiated);
                tracing::debug!(negotiated, "protocol version negotiated");
                PackedValue::Int(negotiated)
            }
            command::SCHEMA => {
                let db = adapter.database_schema(cx).await?;
                wire::encode_database(&db)
            }
            command::EXPORT_SNAPSHOT => {
                let token = adapter.export_snapshot(cx).await?;
                PackedValue::from(token.as_str())
            }
            command::IMPORT_SNAPSHOT => {
                let token = arg(&args, 0)?
                    .as_str()
                    .ok_or(Error::Codec(kitchensync_core::error::CodecError::TypeMismatch {
                        expected: "str",
                        found: "non-str",
                    }))?;
                adapter.import_snapshot(cx, token).await?;
                ack()
            }
            command::UNHOLD_SNAPSHOT => {
                adapter.unhold_snapshot(cx).await?;
                ack()
            }
            command::WITHOUT_SNAPSHOT => {
                adapter.start_read_transaction(cx).await?;
                ack()
            }
            command::IDLE => {
                if state.version_or(protocol::LATEST_SUPPORTED_VERSION) < protocol::IDLE_COMMAND_MINIMUM_VERSION {
                    return Err(Error::unsupported(command::IDLE, state.version_or(0)));
                }
                ack()
            }
            command::TARGET_BLOCK_SIZE => {
                let size = arg(&args, 0)?.as_i64().ok_or(Error::Codec(
                    kitchensync_core::error::CodecError::TypeMismatch { expected: "int", found: "non-int" },
                ))?;
                state.target_block_size = Some(size);
                ack()
            }
            command::TARGET_MINIMUM_BLOCK_SIZE => {
                let size = arg(&args, 0)?.as_i64().ok_or(Error::Codec(
                    kitchensync_core::error::CodecError::TypeMismatch { expected: "int", found: "non-int" },
                ))?;
                state.target_minimum_block_size = Some(size);
                ack()
            }
            command::RANGE => match &mut range_sync {
                Some(h) => h.range(&args)?,
                None => return Err(Error::unsupported(command::RANGE, state.version_or(0))),
            },
            command::HASH => match &mut range_sync {
                Some(h) => h.hash(&args)?,
                None => return Err(Error::unsupported(command::HASH, state.version_or(0))),
            },
            command::ROWS => match &mut range_sync {
                Some(h) => h.rows(&args)?,
                None => return Err(Error::unsupported(command::ROWS, state.version_or(0))),
            },
            command::QUIT => {
                tracing::debug!("peer requested quit, ending session");
                break;
            }
            other => {
                return Err(Error::unsupported(other, state.version_or(0)));
            }
        };

        stream.write_value(&reply)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use asupersync::runtime::RuntimeBuilder;
    use kitchensync_core::codec;
    use kitchensync_schema::Database;
    use std::io::Cursor;

    struct DuplexBuf {
        read_from: Cursor<Vec<u8>>,
        written: Vec<u8>,
    }

    impl Read for DuplexBuf {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.read_from.read(buf)
        }
    }

    impl Write for DuplexBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct NoopAdapter;

    impl Adapter for NoopAdapter {
        async fn database_schema(&mut self, _cx: &Cx) -> Result<Database> {
            Ok(Database::new())
        }
        fn convert_unsupported_schema(&self, _peer_schema: &mut Database) {}
        async fn start_read_transaction(&mut self, _cx: &Cx) -> Result<()> {
            Ok(())
        }
        async fn start_write_transaction(&mut self, _cx: &Cx) -> Result<()> {
            Ok(())
        }
        async fn commit_transaction(&mut self, _cx: &Cx) -> Result<()> {
            Ok(())
        }
        async fn rollback_transaction(&mut self, _cx: &Cx) -> Result<()> {
            Ok(())
        }
        async fn export_snapshot(&mut self, _cx: &Cx) -> Result<String> {
            Ok("token-123".to_string())
        }
        async fn import_snapshot(&mut self, _cx: &Cx, _token: &str) -> Result<()> {
            Ok(())
        }
        async fn unhold_snapshot(&mut self, _cx: &Cx) -> Result<()> {
            Ok(())
        }
        async fn disable_referential_integrity(&mut self, _cx: &Cx) -> Result<()> {
            Ok(())
        }
        async fn enable_referential_integrity(&mut self, _cx: &Cx) -> Result<()> {
            Ok(())
        }
        async fn execute(&mut self, _cx: &Cx, _sql: &str) -> Result<u64> {
            Ok(0)
        }
        async fn query<'a>(
            &'a mut self,
            _cx: &'a Cx,
            _sql: &'a str,
            _row_handler: &'a mut kitchensync_adapter::RowHandler<'a>,
        ) -> Result<()> {
            Ok(())
        }
        fn escape_string(&self, s: &str) -> String {
            format!("'{s}'")
        }
        fn escape_bytea(&self, bytes: &[u8]) -> String {
            format!("'\\x{}'", hex(bytes))
        }
        fn escape_spatial(&self, wkb: &[u8]) -> String {
            format!("ST_GeomFromWKB('\\x{}')", hex(wkb))
        }
        fn escape_column_value(&self, _column: &kitchensync_schema::Column, _value: &PackedValue) -> String {
            String::new()
        }
        fn quote_identifier(&self, name: &str) -> String {
            format!("\"{name}\"")
        }
        fn supported_flags(&self) -> kitchensync_adapter::SupportedFlags {
            kitchensync_adapter::SupportedFlags::empty()
        }
        fn column_definition(&self, _table: &kitchensync_schema::Table, _column_index: usize) -> String {
            String::new()
        }
    }

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    fn encode_request(name: &str, args: Vec<PackedValue>) -> Vec<u8> {
        let mut items = vec![PackedValue::from(name)];
        items.extend(args);
        let mut buf = Vec::new();
        codec::pack_value(&mut buf, &PackedValue::Array(items));
        buf
    }

    fn decode_one(bytes: &[u8]) -> PackedValue {
        let mut r = codec::Reader::new(bytes);
        codec::unpack_value(&mut r).unwrap()
    }

    #[test]
    fn protocol_negotiation_replies_with_lesser_version() {
        let mut input = Vec::new();
        input.extend(encode_request("protocol", vec![PackedValue::Int(9)]));
        input.extend(encode_request("quit", vec![]));
        let mut stream = FramedStream::new(DuplexBuf { read_from: Cursor::new(input), written: Vec::new() });
        let mut adapter = NoopAdapter;

        let rt = RuntimeBuilder::current_thread().build().expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let result = rt.block_on(run(&mut stream, &cx, &mut adapter, None));
        assert!(result.is_ok());

        let inner = stream.into_inner();
        let reply = decode_one(&inner.written);
        assert_eq!(reply, PackedValue::Int(9));
    }

    #[test]
    fn protocol_below_earliest_supported_is_fatal() {
        let input = encode_request("protocol", vec![PackedValue::Int(3)]);
        let mut stream = FramedStream::new(DuplexBuf { read_from: Cursor::new(input), written: Vec::new() });
        let mut adapter = NoopAdapter;

        let rt = RuntimeBuilder::current_thread().build().expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let result = rt.block_on(run(&mut stream, &cx, &mut adapter, None));
        assert!(matches!(result, Err(Error::ProtocolVersion(_))));
    }

    #[test]
    fn schema_command_replies_with_encoded_database() {
        let mut input = Vec::new();
        input.extend(encode_request("schema", vec![]));
        input.extend(encode_request("quit", vec![]));
        let mut stream = FramedStream::new(DuplexBuf { read_from: Cursor::new(input), written: Vec::new() });
        let mut adapter = NoopAdapter;

        let rt = RuntimeBuilder::current_thread().build().expect("create asupersync runtime");
        let cx = Cx::for_testing();
        rt.block_on(run(&mut stream, &cx, &mut adapter, None)).unwrap();

        let inner = stream.into_inner();
        let reply = decode_one(&inner.written);
        let db = wire::decode_database(&reply).unwrap();
        assert!(db.tables.is_empty());
    }

    #[test]
    fn idle_before_v8_negotiation_is_unsupported() {
        let input = encode_request("idle", vec![]);
        let mut stream = FramedStream::new(DuplexBuf { read_from: Cursor::new(input), written: Vec::new() });
        let mut adapter = NoopAdapter;

        let rt = RuntimeBuilder::current_thread().build().expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let result = rt.block_on(run(&mut stream, &cx, &mut adapter, None));
        assert!(matches!(result, Err(Error::Unsupported(_))));
    }

    #[test]
    fn range_command_without_a_handler_is_unsupported() {
        let input = encode_request("range", vec![]);
        let mut stream = FramedStream::new(DuplexBuf { read_from: Cursor::new(input), written: Vec::new() });
        let mut adapter = NoopAdapter;

        let rt = RuntimeBuilder::current_thread().build().expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let result = rt.block_on(run(&mut stream, &cx, &mut adapter, None));
        assert!(matches!(result, Err(Error::Unsupported(_))));
    }

    #[test]
    fn quit_ends_the_loop_without_a_reply() {
        let input = encode_request("quit", vec![]);
        let mut stream = FramedStream::new(DuplexBuf { read_from: Cursor::new(input), written: Vec::new() });
        let mut adapter = NoopAdapter;

        let rt = RuntimeBuilder::current_thread().build().expect("create asupersync runtime");
        let cx = Cx::for_testing();
        rt.block_on(run(&mut stream, &cx, &mut adapter, None)).unwrap();

        let inner = stream.into_inner();
        assert!(inner.written.is_empty());
    }
}
