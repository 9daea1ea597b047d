//! # Minimal MongoDB wire codec for the readiness round trip.
//!
//! Only what the probe needs: an `OP_MSG` carrying
//! `{ listDatabases: 1, nameOnly: true, $db: "admin" }`, and enough of the reply to read
//! the top-level `ok` / `errmsg` fields.
//!
//! ## Frame layout (little endian)
//! ```text
//! MsgHeader { messageLength: i32, requestID: i32, responseTo: i32, opCode: i32 = 2013 }
//! flagBits: u32
//! section kind 0: u8 = 0, BSON document
//! [checksum: u32]   (only when flagBits & 1)
//! ```

use crate::error::ProbeError;

/// `OP_MSG` opcode.
pub const OP_MSG: i32 = 2013;
/// Size of the standard message header.
pub const HEADER_LEN: usize = 16;
/// Largest reply the probe accepts.
pub const MAX_MESSAGE_LEN: usize = 48_000_000;

const FLAG_CHECKSUM_PRESENT: u32 = 1;

const BSON_DOUBLE: u8 = 0x01;
const BSON_STRING: u8 = 0x02;
const BSON_DOCUMENT: u8 = 0x03;
const BSON_ARRAY: u8 = 0x04;
const BSON_BINARY: u8 = 0x05;
const BSON_UNDEFINED: u8 = 0x06;
const BSON_OBJECT_ID: u8 = 0x07;
const BSON_BOOL: u8 = 0x08;
const BSON_DATETIME: u8 = 0x09;
const BSON_NULL: u8 = 0x0A;
const BSON_REGEX: u8 = 0x0B;
const BSON_DB_POINTER: u8 = 0x0C;
const BSON_CODE: u8 = 0x0D;
const BSON_SYMBOL: u8 = 0x0E;
const BSON_CODE_W_SCOPE: u8 = 0x0F;
const BSON_INT32: u8 = 0x10;
const BSON_TIMESTAMP: u8 = 0x11;
const BSON_INT64: u8 = 0x12;
const BSON_DECIMAL128: u8 = 0x13;
const BSON_MIN_KEY: u8 = 0xFF;
const BSON_MAX_KEY: u8 = 0x7F;

/// Decoded message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub length: i32,
    pub request_id: i32,
    pub response_to: i32,
    pub op_code: i32,
}

impl Header {
    /// Decodes the 16 header bytes.
    pub fn decode(buf: &[u8; HEADER_LEN]) -> Self {
        Self {
            length: read_i32(&buf[0..4]),
            request_id: read_i32(&buf[4..8]),
            response_to: read_i32(&buf[8..12]),
            op_code: read_i32(&buf[12..16]),
        }
    }

    /// Body length (everything after the header), validated against [`MAX_MESSAGE_LEN`].
    pub fn body_len(&self) -> Result<usize, ProbeError> {
        let total = usize::try_from(self.length)
            .map_err(|_| ProbeError::Protocol(format!("negative message length {}", self.length)))?;
        if !(HEADER_LEN..=MAX_MESSAGE_LEN).contains(&total) {
            return Err(ProbeError::Protocol(format!(
                "message length {total} out of range"
            )));
        }
        Ok(total - HEADER_LEN)
    }
}

/// Builds a BSON document field by field.
pub(crate) struct DocWriter {
    buf: Vec<u8>,
}

impl DocWriter {
    pub(crate) fn new() -> Self {
        Self {
            buf: vec![0; 4],
        }
    }

    fn key(&mut self, tag: u8, key: &str) {
        self.buf.push(tag);
        self.buf.extend_from_slice(key.as_bytes());
        self.buf.push(0);
    }

    pub(crate) fn int32(mut self, key: &str, value: i32) -> Self {
        self.key(BSON_INT32, key);
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    #[cfg(test)]
    pub(crate) fn double(mut self, key: &str, value: f64) -> Self {
        self.key(BSON_DOUBLE, key);
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub(crate) fn boolean(mut self, key: &str, value: bool) -> Self {
        self.key(BSON_BOOL, key);
        self.buf.push(u8::from(value));
        self
    }

    pub(crate) fn string(mut self, key: &str, value: &str) -> Self {
        self.key(BSON_STRING, key);
        // An oversized value makes the enclosing document oversized too; `finish` rejects it.
        let len = i32::try_from(value.len() + 1).unwrap_or(i32::MAX);
        self.buf.extend_from_slice(&len.to_le_bytes());
        self.buf.extend_from_slice(value.as_bytes());
        self.buf.push(0);
        self
    }

    pub(crate) fn finish(mut self) -> Result<Vec<u8>, ProbeError> {
        self.buf.push(0);
        let len = length_field(self.buf.len())?;
        self.buf[0..4].copy_from_slice(&len.to_le_bytes());
        Ok(self.buf)
    }
}

/// Converts a byte count into an `i32` length field, refusing anything that would wrap.
fn length_field(len: usize) -> Result<i32, ProbeError> {
    i32::try_from(len)
        .map_err(|_| ProbeError::Protocol(format!("length {len} does not fit a length field")))
}

/// Wraps a BSON document into a complete `OP_MSG` frame.
pub(crate) fn encode_op_msg(
    request_id: i32,
    response_to: i32,
    doc: &[u8],
) -> Result<Vec<u8>, ProbeError> {
    let total = HEADER_LEN + 4 + 1 + doc.len();
    let length = length_field(total)?;
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&length.to_le_bytes());
    out.extend_from_slice(&request_id.to_le_bytes());
    out.extend_from_slice(&response_to.to_le_bytes());
    out.extend_from_slice(&OP_MSG.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.push(0);
    out.extend_from_slice(doc);
    Ok(out)
}

/// Encodes the `listDatabases` readiness request.
pub fn encode_list_databases(request_id: i32) -> Result<Vec<u8>, ProbeError> {
    let doc = DocWriter::new()
        .int32("listDatabases", 1)
        .boolean("nameOnly", true)
        .string("$db", "admin")
        .finish()?;
    encode_op_msg(request_id, 0, &doc)
}

/// Checks an `OP_MSG` reply body (the bytes after the header).
///
/// Succeeds only when the body document carries `ok: 1`.
pub fn check_reply(body: &[u8]) -> Result<(), ProbeError> {
    if body.len() < 5 {
        return Err(ProbeError::Protocol("reply too short".to_string()));
    }
    let flags = read_u32(&body[0..4]);
    let mut sections = &body[4..];
    if flags & FLAG_CHECKSUM_PRESENT != 0 {
        if sections.len() < 4 {
            return Err(ProbeError::Protocol("missing checksum".to_string()));
        }
        sections = &sections[..sections.len() - 4];
    }
    let Some((&kind, payload)) = sections.split_first() else {
        return Err(ProbeError::Protocol("reply has no sections".to_string()));
    };
    if kind != 0 {
        return Err(ProbeError::Protocol(format!(
            "unexpected first section kind {kind}"
        )));
    }
    let doc = document(payload)?;

    let ok = match find_field(doc, "ok")? {
        Some((BSON_DOUBLE, v)) => f64::from_le_bytes(array8(v)) == 1.0,
        Some((BSON_INT32, v)) => read_i32(v) == 1,
        Some((BSON_INT64, v)) => i64::from_le_bytes(array8(v)) == 1,
        Some((BSON_BOOL, v)) => v[0] != 0,
        Some((tag, _)) => {
            return Err(ProbeError::Protocol(format!("unexpected ok type 0x{tag:02x}")));
        }
        None => return Err(ProbeError::Protocol("reply has no ok field".to_string())),
    };
    if ok {
        return Ok(());
    }
    let errmsg = match find_field(doc, "errmsg")? {
        Some((BSON_STRING, v)) => string_value(v),
        _ => "command failed".to_string(),
    };
    Err(ProbeError::Protocol(errmsg))
}

/// Returns the document at the start of `buf`, bounded by its declared length.
fn document(buf: &[u8]) -> Result<&[u8], ProbeError> {
    if buf.len() < 5 {
        return Err(ProbeError::Protocol("truncated document".to_string()));
    }
    let len = read_i32(&buf[0..4]);
    let len = usize::try_from(len)
        .ok()
        .filter(|l| (5..=buf.len()).contains(l))
        .ok_or_else(|| ProbeError::Protocol(format!("bad document length {len}")))?;
    Ok(&buf[..len])
}

/// Finds a top-level field and returns its type tag and value bytes.
fn find_field<'a>(doc: &'a [u8], key: &str) -> Result<Option<(u8, &'a [u8])>, ProbeError> {
    let mut pos = 4;
    let end = doc.len() - 1;
    while pos < end {
        let tag = doc[pos];
        pos += 1;
        let name_end = doc[pos..end]
            .iter()
            .position(|b| *b == 0)
            .map(|off| pos + off)
            .ok_or_else(|| ProbeError::Protocol("unterminated field name".to_string()))?;
        let name = &doc[pos..name_end];
        pos = name_end + 1;

        let len = value_len(tag, &doc[pos..end])?;
        if pos + len > end {
            return Err(ProbeError::Protocol("field overruns document".to_string()));
        }
        if name == key.as_bytes() {
            return Ok(Some((tag, &doc[pos..pos + len])));
        }
        pos += len;
    }
    Ok(None)
}

/// Length in bytes of a value of type `tag` at the start of `rest`.
fn value_len(tag: u8, rest: &[u8]) -> Result<usize, ProbeError> {
    let prefixed = |extra: usize| -> Result<usize, ProbeError> {
        if rest.len() < 4 {
            return Err(ProbeError::Protocol("truncated value".to_string()));
        }
        usize::try_from(read_i32(&rest[0..4]))
            .map(|n| n + extra)
            .map_err(|_| ProbeError::Protocol("negative value length".to_string()))
    };
    let cstring = |from: usize| -> Result<usize, ProbeError> {
        rest.get(from..)
            .and_then(|s| s.iter().position(|b| *b == 0))
            .map(|off| from + off + 1)
            .ok_or_else(|| ProbeError::Protocol("unterminated cstring".to_string()))
    };
    match tag {
        BSON_DOUBLE | BSON_DATETIME | BSON_TIMESTAMP | BSON_INT64 => Ok(8),
        BSON_STRING | BSON_CODE | BSON_SYMBOL => prefixed(4),
        BSON_DOCUMENT | BSON_ARRAY | BSON_CODE_W_SCOPE => prefixed(0),
        BSON_BINARY => prefixed(5),
        BSON_UNDEFINED | BSON_NULL | BSON_MIN_KEY | BSON_MAX_KEY => Ok(0),
        BSON_OBJECT_ID => Ok(12),
        BSON_BOOL => Ok(1),
        BSON_REGEX => cstring(0).and_then(cstring),
        BSON_DB_POINTER => prefixed(4 + 12),
        BSON_INT32 => Ok(4),
        BSON_DECIMAL128 => Ok(16),
        other => Err(ProbeError::Protocol(format!("unknown BSON type 0x{other:02x}"))),
    }
}

fn string_value(v: &[u8]) -> String {
    let bytes = &v[4..];
    let bytes = bytes.strip_suffix(&[0]).unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

fn read_i32(b: &[u8]) -> i32 {
    i32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

fn read_u32(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

fn array8(b: &[u8]) -> [u8; 8] {
    let mut out = [0u8; 8];
    out.copy_from_slice(&b[..8]);
    out
}

#[cfg(test)]
pub(crate) fn encode_reply(response_to: i32, doc: &[u8]) -> Vec<u8> {
    encode_op_msg(9000 + response_to, response_to, doc).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body_of(frame: &[u8]) -> &[u8] {
        &frame[HEADER_LEN..]
    }

    #[test]
    fn test_request_header() {
        let frame = encode_list_databases(7).unwrap();
        let header = Header::decode(frame[..HEADER_LEN].try_into().unwrap());

        assert_eq!(header.length as usize, frame.len());
        assert_eq!(header.request_id, 7);
        assert_eq!(header.response_to, 0);
        assert_eq!(header.op_code, OP_MSG);
        assert_eq!(header.body_len().unwrap(), frame.len() - HEADER_LEN);
    }

    #[test]
    fn test_request_document_fields() {
        let frame = encode_list_databases(1).unwrap();
        let doc = document(&body_of(&frame)[5..]).unwrap();

        assert_eq!(
            find_field(doc, "listDatabases").unwrap(),
            Some((BSON_INT32, &1i32.to_le_bytes()[..]))
        );
        assert_eq!(find_field(doc, "nameOnly").unwrap(), Some((BSON_BOOL, &[1u8][..])));
        let (tag, db) = find_field(doc, "$db").unwrap().unwrap();
        assert_eq!(tag, BSON_STRING);
        assert_eq!(string_value(db), "admin");
    }

    #[test]
    fn test_ok_reply_accepted() {
        let doc = DocWriter::new()
            .string("note", "skip me")
            .int32("totalSize", 0)
            .double("ok", 1.0)
            .finish()
            .unwrap();
        assert!(check_reply(body_of(&encode_reply(1, &doc))).is_ok());
    }

    #[test]
    fn test_failed_reply_carries_errmsg() {
        let doc = DocWriter::new()
            .double("ok", 0.0)
            .string("errmsg", "not primary")
            .finish()
            .unwrap();
        let err = check_reply(body_of(&encode_reply(1, &doc))).unwrap_err();
        assert_eq!(err.as_message(), "protocol: not primary");
    }

    #[test]
    fn test_reply_without_ok_rejected() {
        let doc = DocWriter::new().int32("n", 1).finish().unwrap();
        assert!(matches!(
            check_reply(body_of(&encode_reply(1, &doc))),
            Err(ProbeError::Protocol(_))
        ));
    }

    #[test]
    fn test_truncated_document_rejected() {
        let doc = DocWriter::new().double("ok", 1.0).finish().unwrap();
        let frame = encode_reply(1, &doc);
        let body = body_of(&frame);
        assert!(check_reply(&body[..body.len() - 3]).is_err());
    }

    #[test]
    fn test_header_length_bounds() {
        let mut raw = [0u8; HEADER_LEN];
        raw[0..4].copy_from_slice(&8i32.to_le_bytes());
        assert!(Header::decode(&raw).body_len().is_err());
        raw[0..4].copy_from_slice(&(-1i32).to_le_bytes());
        assert!(Header::decode(&raw).body_len().is_err());
    }

    #[test]
    fn test_length_fields_refuse_to_wrap() {
        assert_eq!(length_field(5).unwrap(), 5);
        assert_eq!(length_field(i32::MAX as usize).unwrap(), i32::MAX);

        let err = length_field(i32::MAX as usize + 1).unwrap_err();
        assert_eq!(err.as_label(), "probe_protocol");
        assert!(length_field(usize::MAX).is_err());
    }

    #[test]
    fn test_frame_length_matches_encoded_size() {
        let doc = DocWriter::new().string("s", &"x".repeat(300)).finish().unwrap();
        assert_eq!(read_i32(&doc[0..4]) as usize, doc.len());

        let frame = encode_op_msg(3, 0, &doc).unwrap();
        let header = Header::decode(frame[..HEADER_LEN].try_into().unwrap());
        assert_eq!(header.length as usize, frame.len());
    }
}
