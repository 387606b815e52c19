//! Varint and protobuf wire helpers used by the legacy on-disk format.
//!
//! IAVL nodes use Go's `encoding/binary` varints (zigzag for signed values)
//! with length-prefixed byte slices. Commit info records are protobuf
//! messages, whose `int64` fields are plain (non-zigzag) varints.

const MAX_VARINT_LEN: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("unexpected end of input")]
    UnexpectedEof,

    #[error("varint overflows 64 bits")]
    VarintOverflow,

    #[error("length prefix {0} exceeds remaining input")]
    LengthOutOfRange(u64),

    #[error("unsupported protobuf wire type {0}")]
    UnsupportedWireType(u8),

    #[error("store name is not valid UTF-8")]
    InvalidUtf8,

    #[error("node height {0} out of range")]
    HeightOutOfRange(i64),

    #[error("hash has unexpected length {0} (expected 32)")]
    HashLength(usize),

    #[error("{0} trailing byte(s) after node")]
    TrailingBytes(usize),
}

/// Protobuf wire types this crate understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WireType {
    Varint,
    Fixed64,
    LengthDelimited,
    Fixed32,
}

impl TryFrom<u64> for WireType {
    type Error = DecodeError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Varint),
            1 => Ok(Self::Fixed64),
            2 => Ok(Self::LengthDelimited),
            5 => Ok(Self::Fixed32),
            other => Err(DecodeError::UnsupportedWireType(other as u8)),
        }
    }
}

pub(crate) struct Decoder<'a> {
    buf: &'a [u8],
}

impl<'a> Decoder<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len()
    }

    pub(crate) fn uvarint(&mut self) -> Result<u64, DecodeError> {
        let mut value = 0u64;
        for (index, byte) in self.buf.iter().copied().enumerate() {
            if index == MAX_VARINT_LEN {
                return Err(DecodeError::VarintOverflow);
            }
            if byte < 0x80 {
                if index == MAX_VARINT_LEN - 1 && byte > 1 {
                    return Err(DecodeError::VarintOverflow);
                }
                self.buf = &self.buf[index + 1..];
                return Ok(value | (u64::from(byte) << (7 * index)));
            }
            value |= u64::from(byte & 0x7f) << (7 * index);
        }
        Err(DecodeError::UnexpectedEof)
    }

    /// Zigzag-encoded signed varint.
    pub(crate) fn varint(&mut self) -> Result<i64, DecodeError> {
        let raw = self.uvarint()?;
        let value = (raw >> 1) as i64;
        Ok(if raw & 1 != 0 { !value } else { value })
    }

    pub(crate) fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        if len > self.buf.len() {
            return Err(DecodeError::LengthOutOfRange(len as u64));
        }
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    /// Uvarint length prefix followed by that many bytes.
    pub(crate) fn bytes(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = self.uvarint()?;
        let len = usize::try_from(len).map_err(|_| DecodeError::LengthOutOfRange(len))?;
        self.take(len)
    }

    /// Next protobuf field header, or `None` at the end of the message.
    pub(crate) fn field(&mut self) -> Result<Option<(u64, WireType)>, DecodeError> {
        if self.buf.is_empty() {
            return Ok(None);
        }
        let key = self.uvarint()?;
        Ok(Some((key >> 3, WireType::try_from(key & 0x7)?)))
    }

    pub(crate) fn skip(&mut self, wire_type: WireType) -> Result<(), DecodeError> {
        match wire_type {
            WireType::Varint => self.uvarint().map(drop),
            WireType::Fixed64 => self.take(8).map(drop),
            WireType::LengthDelimited => self.bytes().map(drop),
            WireType::Fixed32 => self.take(4).map(drop),
        }
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub(crate) mod encode {
    pub(crate) fn put_uvarint(buf: &mut Vec<u8>, mut value: u64) {
        while value >= 0x80 {
            buf.push((value as u8) | 0x80);
            value >>= 7;
        }
        buf.push(value as u8);
    }

    pub(crate) fn put_varint(buf: &mut Vec<u8>, value: i64) {
        let zigzag = ((value << 1) ^ (value >> 63)) as u64;
        put_uvarint(buf, zigzag);
    }

    pub(crate) fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
        put_uvarint(buf, bytes.len() as u64);
        buf.extend_from_slice(bytes);
    }

    pub(crate) fn put_proto_varint(buf: &mut Vec<u8>, field: u64, value: u64) {
        put_uvarint(buf, field << 3);
        put_uvarint(buf, value);
    }

    pub(crate) fn put_proto_bytes(buf: &mut Vec<u8>, field: u64, bytes: &[u8]) {
        put_uvarint(buf, (field << 3) | 2);
        put_bytes(buf, bytes);
    }
}
