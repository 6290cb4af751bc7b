//! Incremental decoder for backend messages arriving off the wire.
//!
//! The driver hands the reader whatever bytes `read_some` returned via
//! [`MessageReader::feed`], then calls [`MessageReader::next_message`]
//! in a loop until it returns `Ok(None)`, at which point it reads more.
//! This lets one TCP read satisfy zero, one, or several protocol
//! messages without the caller worrying about framing.

use std::fmt;

use super::messages::{
    BackendMessage, ErrorFields, FieldDescription, TransactionStatus, auth_type, backend_type,
};

#[derive(Debug)]
pub struct ReaderError(String);

impl fmt::Display for ReaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ReaderError {}

fn err(msg: impl Into<String>) -> ReaderError {
    ReaderError(msg.into())
}

/// Growable byte buffer that peels off complete backend messages as
/// enough bytes accumulate, leaving any partial trailing message in
/// place for the next `feed`.
#[derive(Debug, Default)]
pub struct MessageReader {
    buf: Vec<u8>,
    consumed: usize,
}

impl MessageReader {
    pub fn new() -> Self {
        Self { buf: Vec::with_capacity(4096), consumed: 0 }
    }

    pub fn feed(&mut self, data: &[u8]) -> Result<(), ReaderError> {
        if self.consumed > 0 {
            self.buf.drain(..self.consumed);
            self.consumed = 0;
        }
        self.buf.extend_from_slice(data);
        Ok(())
    }

    /// Parse and consume one message if the buffer holds a complete
    /// one, otherwise leave the buffer untouched and return `Ok(None)`.
    pub fn next_message(&mut self) -> Result<Option<BackendMessage>, ReaderError> {
        let available = &self.buf[self.consumed..];
        if available.len() < 5 {
            return Ok(None);
        }
        let type_byte = available[0];
        let len = i32::from_be_bytes([available[1], available[2], available[3], available[4]]) as usize;
        if len < 4 {
            return Err(err(format!("invalid message length {len}")));
        }
        let total = 1 + len;
        if available.len() < total {
            return Ok(None);
        }
        let body = &available[5..total];
        let msg = decode_body(type_byte, body)?;
        self.consumed += total;
        Ok(Some(msg))
    }
}

fn cstr(body: &[u8], pos: &mut usize) -> Result<String, ReaderError> {
    let start = *pos;
    let nul = body[start..].iter().position(|&b| b == 0).ok_or_else(|| err("unterminated C string"))?;
    let s = String::from_utf8(body[start..start + nul].to_vec()).map_err(|e| err(e.to_string()))?;
    *pos = start + nul + 1;
    Ok(s)
}

fn i16_at(body: &[u8], pos: &mut usize) -> Result<i16, ReaderError> {
    if body.len() < *pos + 2 {
        return Err(err("short read for i16"));
    }
    let v = i16::from_be_bytes([body[*pos], body[*pos + 1]]);
    *pos += 2;
    Ok(v)
}

fn i32_at(body: &[u8], pos: &mut usize) -> Result<i32, ReaderError> {
    if body.len() < *pos + 4 {
        return Err(err("short read for i32"));
    }
    let v = i32::from_be_bytes([body[*pos], body[*pos + 1], body[*pos + 2], body[*pos + 3]]);
    *pos += 4;
    Ok(v)
}

fn decode_body(type_byte: u8, body: &[u8]) -> Result<BackendMessage, ReaderError> {
    match type_byte {
        backend_type::AUTHENTICATION => decode_authentication(body),
        backend_type::BACKEND_KEY_DATA => {
            let mut pos = 0;
            let process_id = i32_at(body, &mut pos)?;
            let secret_key = i32_at(body, &mut pos)?;
            Ok(BackendMessage::BackendKeyData { process_id, secret_key })
        }
        backend_type::PARAMETER_STATUS => {
            let mut pos = 0;
            let name = cstr(body, &mut pos)?;
            let value = cstr(body, &mut pos)?;
            Ok(BackendMessage::ParameterStatus { name, value })
        }
        backend_type::READY_FOR_QUERY => {
            let status = body.first().copied().and_then(TransactionStatus::from_byte).ok_or_else(|| err("bad transaction status byte"))?;
            Ok(BackendMessage::ReadyForQuery(status))
        }
        backend_type::ROW_DESCRIPTION => decode_row_description(body),
        backend_type::DATA_ROW => decode_data_row(body),
        backend_type::COMMAND_COMPLETE => {
            let mut pos = 0;
            Ok(BackendMessage::CommandComplete(cstr(body, &mut pos)?))
        }
        backend_type::EMPTY_QUERY => Ok(BackendMessage::EmptyQueryResponse),
        backend_type::PARSE_COMPLETE => Ok(BackendMessage::ParseComplete),
        backend_type::BIND_COMPLETE => Ok(BackendMessage::BindComplete),
        backend_type::CLOSE_COMPLETE => Ok(BackendMessage::CloseComplete),
        backend_type::PARAMETER_DESCRIPTION => {
            let mut pos = 0;
            let n = i16_at(body, &mut pos)? as usize;
            let mut oids = Vec::with_capacity(n);
            for _ in 0..n {
                oids.push(i32_at(body, &mut pos)? as u32);
            }
            Ok(BackendMessage::ParameterDescription(oids))
        }
        backend_type::NO_DATA => Ok(BackendMessage::NoData),
        backend_type::PORTAL_SUSPENDED => Ok(BackendMessage::PortalSuspended),
        backend_type::ERROR_RESPONSE => Ok(BackendMessage::ErrorResponse(decode_error_fields(body)?)),
        backend_type::NOTICE_RESPONSE => Ok(BackendMessage::NoticeResponse(decode_error_fields(body)?)),
        backend_type::COPY_IN_RESPONSE | backend_type::COPY_OUT_RESPONSE | backend_type::COPY_BOTH_RESPONSE => {
            decode_copy_response(type_byte, body)
        }
        backend_type::COPY_DATA => Ok(BackendMessage::CopyData(body.to_vec())),
        backend_type::COPY_DONE => Ok(BackendMessage::CopyDone),
        backend_type::NOTIFICATION_RESPONSE => {
            let mut pos = 0;
            let process_id = i32_at(body, &mut pos)?;
            let channel = cstr(body, &mut pos)?;
            let payload = cstr(body, &mut pos)?;
            Ok(BackendMessage::NotificationResponse { process_id, channel, payload })
        }
        backend_type::FUNCTION_CALL_RESPONSE => {
            let mut pos = 0;
            let len = i32_at(body, &mut pos)?;
            if len < 0 {
                Ok(BackendMessage::FunctionCallResponse(None))
            } else {
                let len = len as usize;
                Ok(BackendMessage::FunctionCallResponse(Some(body[pos..pos + len].to_vec())))
            }
        }
        backend_type::NEGOTIATE_PROTOCOL_VERSION => {
            let mut pos = 0;
            let newest_minor = i32_at(body, &mut pos)?;
            let count = i32_at(body, &mut pos)? as usize;
            let mut unrecognized = Vec::with_capacity(count);
            for _ in 0..count {
                unrecognized.push(cstr(body, &mut pos)?);
            }
            Ok(BackendMessage::NegotiateProtocolVersion { newest_minor, unrecognized })
        }
        other => Err(err(format!("unrecognized backend message type {other:#x}"))),
    }
}

fn decode_authentication(body: &[u8]) -> Result<BackendMessage, ReaderError> {
    let mut pos = 0;
    let code = i32_at(body, &mut pos)?;
    match code {
        auth_type::OK => Ok(BackendMessage::AuthenticationOk),
        auth_type::CLEARTEXT_PASSWORD => Ok(BackendMessage::AuthenticationCleartextPassword),
        auth_type::MD5_PASSWORD => {
            if body.len() < pos + 4 {
                return Err(err("short MD5 salt"));
            }
            let salt = [body[pos], body[pos + 1], body[pos + 2], body[pos + 3]];
            Ok(BackendMessage::AuthenticationMD5Password(salt))
        }
        auth_type::SASL => {
            let mut mechanisms = Vec::new();
            loop {
                let m = cstr(body, &mut pos)?;
                if m.is_empty() {
                    break;
                }
                mechanisms.push(m);
            }
            Ok(BackendMessage::AuthenticationSASL(mechanisms))
        }
        auth_type::SASL_CONTINUE => Ok(BackendMessage::AuthenticationSASLContinue(body[pos..].to_vec())),
        auth_type::SASL_FINAL => Ok(BackendMessage::AuthenticationSASLFinal(body[pos..].to_vec())),
        other => Err(err(format!("unsupported authentication method {other}"))),
    }
}

fn decode_row_description(body: &[u8]) -> Result<BackendMessage, ReaderError> {
    let mut pos = 0;
    let count = i16_at(body, &mut pos)? as usize;
    let mut fields = Vec::with_capacity(count);
    for _ in 0..count {
        let name = cstr(body, &mut pos)?;
        let table_oid = i32_at(body, &mut pos)? as u32;
        let column_id = i16_at(body, &mut pos)?;
        let type_oid = i32_at(body, &mut pos)? as u32;
        let type_size = i16_at(body, &mut pos)?;
        let type_modifier = i32_at(body, &mut pos)?;
        let format = i16_at(body, &mut pos)?;
        fields.push(FieldDescription { name, table_oid, column_id, type_oid, type_size, type_modifier, format });
    }
    Ok(BackendMessage::RowDescription(fields))
}

fn decode_data_row(body: &[u8]) -> Result<BackendMessage, ReaderError> {
    let mut pos = 0;
    let count = i16_at(body, &mut pos)? as usize;
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        let len = i32_at(body, &mut pos)?;
        if len < 0 {
            values.push(None);
        } else {
            let len = len as usize;
            if body.len() < pos + len {
                return Err(err("short read for data row value"));
            }
            values.push(Some(body[pos..pos + len].to_vec()));
            pos += len;
        }
    }
    Ok(BackendMessage::DataRow(values))
}

fn decode_copy_response(type_byte: u8, body: &[u8]) -> Result<BackendMessage, ReaderError> {
    let mut pos = 0;
    let format = i8::from_be_bytes([body[pos]]);
    pos += 1;
    let count = i16_at(body, &mut pos)? as usize;
    let mut column_formats = Vec::with_capacity(count);
    for _ in 0..count {
        column_formats.push(i16_at(body, &mut pos)?);
    }
    Ok(match type_byte {
        backend_type::COPY_IN_RESPONSE => BackendMessage::CopyInResponse { format, column_formats },
        backend_type::COPY_OUT_RESPONSE => BackendMessage::CopyOutResponse { format, column_formats },
        _ => BackendMessage::CopyBothResponse { format, column_formats },
    })
}

fn decode_error_fields(body: &[u8]) -> Result<ErrorFields, ReaderError> {
    let mut fields = ErrorFields::default();
    let mut pos = 0;
    loop {
        if pos >= body.len() {
            return Err(err("unterminated error/notice field list"));
        }
        let tag = body[pos];
        pos += 1;
        if tag == 0 {
            break;
        }
        let value = cstr(body, &mut pos)?;
        match tag {
            b'S' => fields.severity = value,
            b'V' => fields.severity_localized = Some(value),
            b'C' => fields.code = value,
            b'M' => fields.message = value,
            b'D' => fields.detail = Some(value),
            b'H' => fields.hint = Some(value),
            b'P' => fields.position = value.parse().ok(),
            b'p' => fields.internal_position = value.parse().ok(),
            b'q' => fields.internal_query = Some(value),
            b'W' => fields.where_ = Some(value),
            b's' => fields.schema = Some(value),
            b't' => fields.table = Some(value),
            b'c' => fields.column = Some(value),
            b'd' => fields.data_type = Some(value),
            b'n' => fields.constraint = Some(value),
            b'F' => fields.file = Some(value),
            b'L' => fields.line = value.parse().ok(),
            b'R' => fields.routine = Some(value),
            _ => {}
        }
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::messages::frontend_type;

    fn frame(type_byte: u8, body: &[u8]) -> Vec<u8> {
        let mut out = vec![type_byte];
        out.extend_from_slice(&((body.len() + 4) as i32).to_be_bytes());
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn partial_message_yields_none_until_complete() {
        let mut reader = MessageReader::new();
        let full = frame(backend_type::COMMAND_COMPLETE, b"SELECT 1\0");
        reader.feed(&full[..3]).unwrap();
        assert!(reader.next_message().unwrap().is_none());
        reader.feed(&full[3..]).unwrap();
        match reader.next_message().unwrap() {
            Some(BackendMessage::CommandComplete(tag)) => assert_eq!(tag, "SELECT 1"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn two_messages_in_one_feed_both_decode() {
        let mut reader = MessageReader::new();
        let mut buf = frame(backend_type::PARSE_COMPLETE, &[]);
        buf.extend(frame(backend_type::BIND_COMPLETE, &[]));
        reader.feed(&buf).unwrap();
        assert!(matches!(reader.next_message().unwrap(), Some(BackendMessage::ParseComplete)));
        assert!(matches!(reader.next_message().unwrap(), Some(BackendMessage::BindComplete)));
        assert!(reader.next_message().unwrap().is_none());
    }

    #[test]
    fn ready_for_query_decodes_transaction_status() {
        let mut reader = MessageReader::new();
        reader.feed(&frame(backend_type::READY_FOR_QUERY, &[b'T'])).unwrap();
        assert_eq!(reader.next_message().unwrap(), Some(BackendMessage::ReadyForQuery(TransactionStatus::Transaction)));
    }

    #[test]
    fn error_response_parses_known_fields() {
        let mut body = Vec::new();
        body.push(b'S');
        body.extend_from_slice(b"ERROR\0");
        body.push(b'C');
        body.extend_from_slice(b"23505\0");
        body.push(b'M');
        body.extend_from_slice(b"duplicate key\0");
        body.push(0);
        let mut reader = MessageReader::new();
        reader.feed(&frame(backend_type::ERROR_RESPONSE, &body)).unwrap();
        match reader.next_message().unwrap() {
            Some(BackendMessage::ErrorResponse(f)) => {
                assert_eq!(f.severity, "ERROR");
                assert_eq!(f.code, "23505");
                assert_eq!(f.message, "duplicate key");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn data_row_distinguishes_null_from_empty() {
        let mut body = Vec::new();
        body.extend_from_slice(&2i16.to_be_bytes());
        body.extend_from_slice(&(-1i32).to_be_bytes());
        body.extend_from_slice(&0i32.to_be_bytes());
        let mut reader = MessageReader::new();
        reader.feed(&frame(backend_type::DATA_ROW, &body)).unwrap();
        match reader.next_message().unwrap() {
            Some(BackendMessage::DataRow(values)) => {
                assert_eq!(values, vec![None, Some(Vec::new())]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unrecognized_type_byte_is_an_error() {
        let mut reader = MessageReader::new();
        reader.feed(&frame(frontend_type::QUERY, &[])).ok();
        // 'Q' isn't a valid backend type byte.
        let res = reader.next_message();
        assert!(res.is_err());
    }
}
