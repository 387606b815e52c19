//! Multi-store commit metadata.
//!
//! | Data             | Key               | Value                          |
//! |------------------|-------------------|--------------------------------|
//! | Latest version   | `"s/latest"`      | protobuf `Int64Value`          |
//! | Commit info      | `"s/" + version`  | protobuf `CommitInfo`          |
//!
//! ```text
//! CommitInfo { 1: int64 version, 2: repeated StoreInfo }
//! StoreInfo  { 1: string name, 2: CommitID }
//! CommitID   { 1: int64 version, 2: bytes hash }
//! ```

use crate::encoding::{DecodeError, Decoder, WireType};

pub(crate) const LATEST_VERSION_KEY: &[u8] = b"s/latest";

/// Version and hash at which a store was last committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub name: String,
    pub version: i64,
    pub hash: Vec<u8>,
}

pub(crate) fn commit_info_key(version: i64) -> Vec<u8> {
    format!("s/{version}").into_bytes()
}

/// Decodes the `Int64Value` stored under `s/latest`. An empty message is
/// version 0.
pub(crate) fn decode_latest_version(raw: &[u8]) -> Result<i64, DecodeError> {
    let mut decoder = Decoder::new(raw);
    let mut version = 0;
    while let Some((field, wire_type)) = decoder.field()? {
        match (field, wire_type) {
            (1, WireType::Varint) => version = decoder.uvarint()? as i64,
            (_, wire_type) => decoder.skip(wire_type)?,
        }
    }
    Ok(version)
}

/// Decodes a `CommitInfo` message into one record per store.
pub(crate) fn decode_commit_info(raw: &[u8]) -> Result<Vec<CommitInfo>, DecodeError> {
    let mut decoder = Decoder::new(raw);
    let mut stores = Vec::new();
    while let Some((field, wire_type)) = decoder.field()? {
        match (field, wire_type) {
            (2, WireType::LengthDelimited) => stores.push(decode_store_info(decoder.bytes()?)?),
            (_, wire_type) => decoder.skip(wire_type)?,
        }
    }
    Ok(stores)
}

fn decode_store_info(raw: &[u8]) -> Result<CommitInfo, DecodeError> {
    let mut decoder = Decoder::new(raw);
    let mut info = CommitInfo {
        name: String::new(),
        version: 0,
        hash: Vec::new(),
    };
    while let Some((field, wire_type)) = decoder.field()? {
        match (field, wire_type) {
            (1, WireType::LengthDelimited) => {
                info.name = std::str::from_utf8(decoder.bytes()?)
                    .map_err(|_| DecodeError::InvalidUtf8)?
                    .to_owned();
            }
            (2, WireType::LengthDelimited) => {
                let mut commit_id = Decoder::new(decoder.bytes()?);
                while let Some((field, wire_type)) = commit_id.field()? {
                    match (field, wire_type) {
                        (1, WireType::Varint) => info.version = commit_id.uvarint()? as i64,
                        (2, WireType::LengthDelimited) => info.hash = commit_id.bytes()?.to_vec(),
                        (_, wire_type) => commit_id.skip(wire_type)?,
                    }
                }
            }
            (_, wire_type) => decoder.skip(wire_type)?,
        }
    }
    Ok(info)
}

#[cfg(any(test, feature = "test-utils"))]
pub(crate) fn encode_latest_version(version: i64) -> Vec<u8> {
    let mut buf = Vec::new();
    crate::encoding::encode::put_proto_varint(&mut buf, 1, version as u64);
    buf
}

#[cfg(any(test, feature = "test-utils"))]
pub(crate) fn encode_commit_info(version: i64, stores: &[CommitInfo]) -> Vec<u8> {
    use crate::encoding::encode::{put_proto_bytes, put_proto_varint};

    let mut buf = Vec::new();
    put_proto_varint(&mut buf, 1, version as u64);
    for store in stores {
        let mut commit_id = Vec::new();
        put_proto_varint(&mut commit_id, 1, store.version as u64);
        put_proto_bytes(&mut commit_id, 2, &store.hash);

        let mut store_info = Vec::new();
        put_proto_bytes(&mut store_info, 1, store.name.as_bytes());
        put_proto_bytes(&mut store_info, 2, &commit_id);

        put_proto_bytes(&mut buf, 2, &store_info);
    }
    buf
}
