use sha2::{Digest, Sha256};

fn put_uvarint(buf: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        buf.push((value as u8) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

fn put_varint(buf: &mut Vec<u8>, value: i64) {
    put_uvarint(buf, ((value << 1) ^ (value >> 63)) as u64);
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    put_uvarint(buf, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

pub(crate) fn leaf_hash(version: i64, key: &[u8], value: &[u8]) -> [u8; 32] {
    let mut buf = Vec::with_capacity(key.len() + 48);
    put_varint(&mut buf, 0);
    put_varint(&mut buf, 1);
    put_varint(&mut buf, version);
    put_bytes(&mut buf, key);
    put_bytes(&mut buf, &Sha256::digest(value));
    Sha256::digest(&buf).into()
}

pub(crate) fn branch_hash(
    height: i8,
    size: i64,
    version: i64,
    left: &[u8; 32],
    right: &[u8; 32],
) -> [u8; 32] {
    let mut buf = Vec::with_capacity(96);
    put_varint(&mut buf, i64::from(height));
    put_varint(&mut buf, size);
    put_varint(&mut buf, version);
    put_bytes(&mut buf, left);
    put_bytes(&mut buf, right);
    Sha256::digest(&buf).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zigzag_encoding_matches_go() {
        let mut buf = Vec::new();
        put_varint(&mut buf, -1);
        put_varint(&mut buf, 1);
        put_varint(&mut buf, 64);
        assert_eq!(buf, [0x01, 0x02, 0x80, 0x01]);
    }

    #[test]
    fn leaf_hash_depends_on_every_field() {
        let base = leaf_hash(1, b"k", b"v");
        assert_ne!(base, leaf_hash(2, b"k", b"v"));
        assert_ne!(base, leaf_hash(1, b"j", b"v"));
        assert_ne!(base, leaf_hash(1, b"k", b"w"));
    }

    #[test]
    fn branch_hash_is_order_sensitive() {
        let left = [1; 32];
        let right = [2; 32];
        assert_ne!(
            branch_hash(1, 2, 5, &left, &right),
            branch_hash(1, 2, 5, &right, &left)
        );
    }
}
