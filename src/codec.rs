// ABOUTME: Pure functions converting between a Frame and the self-describing packed
// ABOUTME: array it occupies on the wire (a 7-element MessagePack array, per spec.md §4.1)

use std::collections::HashMap;
use std::io::Cursor;

use rmpv::Value;
use thiserror::Error;

use crate::frame::{Frame, FrameType};

/// The original C implementation names this constant `DPX_PACK_ARRAY_SIZE`.
const FRAME_ARRAY_LEN: usize = 7;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed frame: expected an array, got {0}")]
    NotAnArray(String),

    #[error("malformed frame: array has {0} elements, expected {FRAME_ARRAY_LEN}")]
    WrongArity(usize),

    #[error("malformed frame: unknown frame type {0}")]
    UnknownFrameType(i64),

    #[error("malformed frame: field {0} has the wrong type")]
    WrongFieldType(&'static str),

    #[error("malformed frame: {0}")]
    Malformed(String),

    #[error("io error decoding frame: {0}")]
    Io(#[from] std::io::Error),
}

/// Encode a `Frame` to its wire representation: a 7-element MessagePack
/// array of `[type, channel, method, headers, error, last, payload]`.
pub fn encode(frame: &Frame) -> Vec<u8> {
    let method = match &frame.method {
        Some(s) => Value::from(s.as_str()),
        None => Value::Nil,
    };
    let error = match &frame.error {
        Some(s) => Value::from(s.as_str()),
        None => Value::Nil,
    };
    let headers = Value::Map(
        frame
            .headers
            .iter()
            .map(|(k, v)| (Value::from(k.as_str()), Value::from(v.as_str())))
            .collect(),
    );

    let array = Value::Array(vec![
        Value::from(frame.frame_type.as_i64()),
        Value::from(frame.channel),
        method,
        headers,
        error,
        Value::from(frame.last),
        Value::Binary(frame.payload.clone()),
    ]);

    let mut buf = Vec::new();
    rmpv::encode::write_value(&mut buf, &array).expect("encoding a Frame into a Vec is infallible");
    buf
}

/// Attempt to decode one frame from the front of `buf`.
///
/// Returns `Ok(None)` if `buf` does not yet contain a complete frame (the
/// streaming case: the reader should read more bytes and retry). Returns
/// `Ok(Some((frame, consumed)))` on success, where `consumed` is the
/// number of bytes of `buf` the frame occupied and must be dropped by the
/// caller before the next call.
pub fn try_decode(buf: &[u8]) -> Result<Option<(Frame, usize)>, CodecError> {
    let mut cursor = Cursor::new(buf);
    match rmpv::decode::read_value(&mut cursor) {
        Ok(value) => {
            let consumed = cursor.position() as usize;
            let frame = value_to_frame(value)?;
            Ok(Some((frame, consumed)))
        }
        Err(err) => {
            if is_incomplete(&err) {
                Ok(None)
            } else {
                Err(CodecError::Malformed(err.to_string()))
            }
        }
    }
}

fn is_incomplete(err: &rmpv::decode::Error) -> bool {
    use rmpv::decode::Error;
    let io_err = match err {
        Error::InvalidMarkerRead(e) | Error::InvalidDataRead(e) => e,
        Error::DepthLimitExceeded => return false,
    };
    io_err.kind() == std::io::ErrorKind::UnexpectedEof
}

fn value_to_frame(value: Value) -> Result<Frame, CodecError> {
    let elements = match value {
        Value::Array(elements) => elements,
        other => return Err(CodecError::NotAnArray(format!("{other:?}"))),
    };

    if elements.len() != FRAME_ARRAY_LEN {
        return Err(CodecError::WrongArity(elements.len()));
    }

    let mut it = elements.into_iter();
    let raw_type = it.next().unwrap();
    let raw_channel = it.next().unwrap();
    let raw_method = it.next().unwrap();
    let raw_headers = it.next().unwrap();
    let raw_error = it.next().unwrap();
    let raw_last = it.next().unwrap();
    let raw_payload = it.next().unwrap();

    let type_num = raw_type
        .as_i64()
        .ok_or(CodecError::WrongFieldType("type"))?;
    let frame_type =
        FrameType::from_i64(type_num).ok_or(CodecError::UnknownFrameType(type_num))?;

    let channel = raw_channel
        .as_i64()
        .ok_or(CodecError::WrongFieldType("channel"))?;

    let method = decode_nullable_string(raw_method, "method")?;
    let error = decode_nullable_string(raw_error, "error")?;

    let headers = match raw_headers {
        Value::Map(pairs) => {
            let mut map = HashMap::with_capacity(pairs.len());
            for (k, v) in pairs {
                let key = k
                    .as_str()
                    .ok_or(CodecError::WrongFieldType("headers.key"))?
                    .to_owned();
                let value = v
                    .as_str()
                    .ok_or(CodecError::WrongFieldType("headers.value"))?
                    .to_owned();
                map.insert(key, value);
            }
            map
        }
        Value::Nil => HashMap::new(),
        _ => return Err(CodecError::WrongFieldType("headers")),
    };

    let last = raw_last
        .as_bool()
        .ok_or(CodecError::WrongFieldType("last"))?;

    let payload = match raw_payload {
        Value::Binary(bytes) => bytes,
        Value::String(s) => s.into_bytes(),
        Value::Nil => Vec::new(),
        _ => return Err(CodecError::WrongFieldType("payload")),
    };

    Ok(Frame {
        frame_type,
        channel,
        method,
        headers,
        error,
        last,
        payload,
    })
}

fn decode_nullable_string(value: Value, field: &'static str) -> Result<Option<String>, CodecError> {
    match value {
        Value::Nil => Ok(None),
        Value::String(s) => Ok(Some(
            s.into_str()
                .ok_or(CodecError::WrongFieldType(field))?,
        )),
        _ => Err(CodecError::WrongFieldType(field)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(frame: Frame) {
        let encoded = encode(&frame);
        let (decoded, consumed) = try_decode(&encoded).unwrap().unwrap();
        assert_eq!(consumed, encoded.len());
        assert_eq!(decoded, frame);
    }

    #[test]
    fn roundtrips_open_frame_with_method() {
        roundtrip(Frame::open("foobar").with_payload(vec![1, 2, 3]));
    }

    #[test]
    fn roundtrips_data_frame_without_method() {
        let mut f = Frame::data();
        f.channel = 7;
        f.last = true;
        f.payload = vec![9, 9, 9];
        roundtrip(f);
    }

    #[test]
    fn null_and_empty_string_are_distinct() {
        let mut none_method = Frame::data();
        none_method.method = None;
        let mut empty_method = Frame::data();
        empty_method.method = Some(String::new());
        assert_ne!(encode(&none_method), encode(&empty_method));
        roundtrip(none_method);
        roundtrip(empty_method);
    }

    #[test]
    fn headers_roundtrip_and_absence_decodes_to_empty_map() {
        let mut f = Frame::data();
        f.header_add("k1", "v1");
        f.header_add("k2", "v2");
        roundtrip(f);
    }

    #[test]
    fn incomplete_buffer_yields_none() {
        let encoded = encode(&Frame::open("x").with_payload(vec![1, 2, 3, 4, 5]));
        let partial = &encoded[..encoded.len() - 1];
        assert!(try_decode(partial).unwrap().is_none());
    }

    #[test]
    fn wrong_arity_is_an_error() {
        let mut buf = Vec::new();
        let bad = Value::Array(vec![Value::from(0)]);
        rmpv::encode::write_value(&mut buf, &bad).unwrap();
        let err = try_decode(&buf).unwrap_err();
        assert!(matches!(err, CodecError::WrongArity(1)));
    }

    #[test]
    fn two_frames_back_to_back_decode_independently() {
        let a = Frame::open("a");
        let b = Frame::data().with_payload(vec![1]);
        let mut buf = encode(&a);
        buf.extend(encode(&b));

        let (decoded_a, consumed_a) = try_decode(&buf).unwrap().unwrap();
        assert_eq!(decoded_a, a);
        let (decoded_b, consumed_b) = try_decode(&buf[consumed_a..]).unwrap().unwrap();
        assert_eq!(decoded_b, b);
        assert_eq!(consumed_a + consumed_b, buf.len());
    }
}
