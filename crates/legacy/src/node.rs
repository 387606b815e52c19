//! IAVL v0 node layout.
//!
//! Each store lives under the prefix `"s/k:" + name + "/"`:
//!
//! | Data       | Key                     | Value                      |
//! |------------|-------------------------|----------------------------|
//! | Tree root  | `"r" + version(8 BE)`   | root hash, empty if empty  |
//! | Tree node  | `"n" + hash(32)`        | encoded node               |
//!
//! Node encoding: varint height, varint size, varint version, bytes key,
//! then bytes value for leaves or bytes left hash, bytes right hash for
//! branches.

use crate::ExportedNode;
use crate::encoding::{DecodeError, Decoder};

const ROOT_PREFIX: u8 = b'r';
const NODE_PREFIX: u8 = b'n';

pub(crate) fn store_prefix(store: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(store.len() + 5);
    prefix.extend_from_slice(b"s/k:");
    prefix.extend_from_slice(store.as_bytes());
    prefix.push(b'/');
    prefix
}

/// `prefix + "r"`, the common prefix of every root key of a store.
pub(crate) fn root_key_prefix(prefix: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + 9);
    key.extend_from_slice(prefix);
    key.push(ROOT_PREFIX);
    key
}

pub(crate) fn root_key(prefix: &[u8], version: i64) -> Vec<u8> {
    let mut key = root_key_prefix(prefix);
    key.extend_from_slice(&version.to_be_bytes());
    key
}

pub(crate) fn node_key(prefix: &[u8], hash: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + 1 + hash.len());
    key.extend_from_slice(prefix);
    key.push(NODE_PREFIX);
    key.extend_from_slice(hash);
    key
}

/// Parses the version suffix of a root key.
pub(crate) fn decode_root_version(suffix: &[u8]) -> Result<i64, DecodeError> {
    let bytes = <[u8; 8]>::try_from(suffix).map_err(|_| DecodeError::UnexpectedEof)?;
    Ok(i64::from_be_bytes(bytes))
}

pub(crate) fn decode_root_hash(raw: &[u8]) -> Result<Option<[u8; 32]>, DecodeError> {
    if raw.is_empty() {
        return Ok(None);
    }
    <[u8; 32]>::try_from(raw)
        .map(Some)
        .map_err(|_| DecodeError::HashLength(raw.len()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum NodeKind {
    Leaf { value: Vec<u8> },
    Branch { left: Vec<u8>, right: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LegacyNode {
    pub(crate) height: i8,
    pub(crate) size: i64,
    pub(crate) version: i64,
    pub(crate) key: Vec<u8>,
    pub(crate) kind: NodeKind,
}

impl LegacyNode {
    pub(crate) fn decode(raw: &[u8]) -> Result<Self, DecodeError> {
        let mut decoder = Decoder::new(raw);
        let height = decoder.varint()?;
        let height = i8::try_from(height).map_err(|_| DecodeError::HeightOutOfRange(height))?;
        let size = decoder.varint()?;
        let version = decoder.varint()?;
        let key = decoder.bytes()?.to_vec();

        let kind = if height == 0 {
            NodeKind::Leaf {
                value: decoder.bytes()?.to_vec(),
            }
        } else {
            NodeKind::Branch {
                left: decoder.bytes()?.to_vec(),
                right: decoder.bytes()?.to_vec(),
            }
        };

        if decoder.remaining() != 0 {
            return Err(DecodeError::TrailingBytes(decoder.remaining()));
        }

        Ok(Self {
            height,
            size,
            version,
            key,
            kind,
        })
    }

    pub(crate) fn into_exported(self) -> ExportedNode {
        let value = match self.kind {
            NodeKind::Leaf { value } => value,
            NodeKind::Branch { .. } => Vec::new(),
        };
        ExportedNode {
            key: self.key,
            value,
            version: self.version,
            height: self.height,
        }
    }

    #[cfg(any(test, feature = "test-utils"))]
    pub(crate) fn encode(&self) -> Vec<u8> {
        use crate::encoding::encode::{put_bytes, put_varint};

        let mut buf = Vec::new();
        put_varint(&mut buf, i64::from(self.height));
        put_varint(&mut buf, self.size);
        put_varint(&mut buf, self.version);
        put_bytes(&mut buf, &self.key);
        match &self.kind {
            NodeKind::Leaf { value } => put_bytes(&mut buf, value),
            NodeKind::Branch { left, right } => {
                put_bytes(&mut buf, left);
                put_bytes(&mut buf, right);
            }
        }
        buf
    }
}
