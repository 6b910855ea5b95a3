//! Binary work-order encoding.
//!
//! Fixed-schema layout for the broadcast payload. The bus sees only a topic
//! tag and opaque bytes; workers decode just the fields they need. Layout
//! (little-endian, length-prefixed strings):
//!
//! ```text
//! [version: u8][kind: u8]
//! [request_id len: u16][request_id bytes]
//! [served_id len: u16][served_id bytes]
//! [item count: u16] { [name len: u16][name bytes][quantity: u32] }*
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::proto::RequestKind;

/// Wire format version, first byte of every payload.
const WIRE_VERSION: u8 = 1;

/// Result type for codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;

/// Errors that can occur while encoding or decoding a work order.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("payload truncated")]
    UnexpectedEof,

    #[error("unsupported wire version {0}")]
    BadVersion(u8),

    #[error("unknown request kind {0}")]
    UnknownKind(u8),

    #[error("trailing bytes after work order")]
    TrailingBytes,

    #[error("field of {len} bytes exceeds wire limit")]
    Oversize { len: usize },

    #[error("invalid UTF-8 in string field")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// One item line in a work order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub name: String,
    pub quantity: u32,
}

/// The dispatch payload broadcast to all workers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkOrder {
    pub request_id: String,
    pub kind: RequestKind,
    pub served_id: String,
    pub items: Vec<WorkItem>,
}

/// Encode a work order into its wire form.
pub fn encode(order: &WorkOrder) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(64 + order.request_id.len() + order.served_id.len());

    buf.put_u8(WIRE_VERSION);
    buf.put_u8(order.kind as i32 as u8);
    put_string(&mut buf, &order.request_id)?;
    put_string(&mut buf, &order.served_id)?;

    if order.items.len() > u16::MAX as usize {
        return Err(CodecError::Oversize {
            len: order.items.len(),
        });
    }
    buf.put_u16_le(order.items.len() as u16);
    for item in &order.items {
        put_string(&mut buf, &item.name)?;
        buf.put_u32_le(item.quantity);
    }

    Ok(buf.freeze())
}

/// Decode a wire payload back into a work order.
///
/// Rejects truncated payloads, unknown versions/kinds, and trailing bytes.
pub fn decode(payload: &[u8]) -> Result<WorkOrder> {
    let mut buf = payload;

    let version = take_u8(&mut buf)?;
    if version != WIRE_VERSION {
        return Err(CodecError::BadVersion(version));
    }

    let kind = match take_u8(&mut buf)? {
        0 => RequestKind::Fetch,
        1 => RequestKind::Restock,
        k => return Err(CodecError::UnknownKind(k)),
    };

    let request_id = take_string(&mut buf)?;
    let served_id = take_string(&mut buf)?;

    let count = take_u16(&mut buf)? as usize;
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        let name = take_string(&mut buf)?;
        let quantity = take_u32(&mut buf)?;
        items.push(WorkItem { name, quantity });
    }

    if buf.has_remaining() {
        return Err(CodecError::TrailingBytes);
    }

    Ok(WorkOrder {
        request_id,
        kind,
        served_id,
        items,
    })
}

fn put_string(buf: &mut BytesMut, value: &str) -> Result<()> {
    if value.len() > u16::MAX as usize {
        return Err(CodecError::Oversize { len: value.len() });
    }
    buf.put_u16_le(value.len() as u16);
    buf.put_slice(value.as_bytes());
    Ok(())
}

fn take_u8(buf: &mut &[u8]) -> Result<u8> {
    if buf.remaining() < 1 {
        return Err(CodecError::UnexpectedEof);
    }
    Ok(buf.get_u8())
}

fn take_u16(buf: &mut &[u8]) -> Result<u16> {
    if buf.remaining() < 2 {
        return Err(CodecError::UnexpectedEof);
    }
    Ok(buf.get_u16_le())
}

fn take_u32(buf: &mut &[u8]) -> Result<u32> {
    if buf.remaining() < 4 {
        return Err(CodecError::UnexpectedEof);
    }
    Ok(buf.get_u32_le())
}

fn take_string(buf: &mut &[u8]) -> Result<String> {
    let len = take_u16(buf)? as usize;
    if buf.remaining() < len {
        return Err(CodecError::UnexpectedEof);
    }
    let bytes = buf[..len].to_vec();
    buf.advance(len);
    Ok(String::from_utf8(bytes)?)
}
