//! Window diff payload codec.
//!
//! A payload reconstructs one window of plaintext from a base text using
//! three instructions, in the svndiff mold:
//!
//! ```text
//! payload := target-len:varint instruction*
//! instruction := op-byte [length:varint] [offset:varint] [new-data]
//! op-byte := op:2 length:6     -- length 0 means a varint length follows
//! op 0: copy `length` bytes from the base at `offset`
//! op 1: copy `length` bytes from the target already produced at `offset`
//!       (ranges may overlap forward, giving run-length expansion)
//! op 2: insert the next `length` payload bytes verbatim
//! ```
//!
//! Varints are 7-bit groups, big-endian, high bit set on every byte but
//! the last. The decoder is the general interpreter and checks every
//! range; the encoder emits a common-prefix copy, a literal middle, and a
//! common-suffix copy, which is enough for compact storage of the usual
//! append/patch shapes. Smarter deltification is a caller's policy choice.

use strata_error::{Result, StrataError};

const OP_COPY_BASE: u8 = 0;
const OP_COPY_TARGET: u8 = 1;
const OP_INSERT: u8 = 2;

/// Longest length encodable in the op byte itself.
const SHORT_LEN_MAX: u64 = 0x3f;

fn invalid(detail: &str) -> StrataError {
    StrataError::InvalidDelta {
        detail: detail.to_owned(),
    }
}

fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    let mut groups = [0u8; 10];
    let mut n = 0;
    loop {
        groups[n] = (value & 0x7f) as u8;
        value >>= 7;
        n += 1;
        if value == 0 {
            break;
        }
    }
    for i in (0..n).rev() {
        let continuation = if i > 0 { 0x80 } else { 0 };
        out.push(groups[i] | continuation);
    }
}

fn read_varint(payload: &[u8], pos: &mut usize) -> Result<u64> {
    let mut value: u64 = 0;
    for _ in 0..10 {
        let byte = *payload
            .get(*pos)
            .ok_or_else(|| invalid("truncated varint"))?;
        *pos += 1;
        value = value
            .checked_mul(128)
            .and_then(|v| v.checked_add(u64::from(byte & 0x7f)))
            .ok_or_else(|| invalid("varint overflow"))?;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(invalid("varint too long"))
}

fn write_instruction(out: &mut Vec<u8>, op: u8, len: u64, offset: Option<u64>) {
    if len > 0 && len <= SHORT_LEN_MAX {
        out.push((op << 6) | len as u8);
    } else {
        out.push(op << 6);
        write_varint(out, len);
    }
    if let Some(offset) = offset {
        write_varint(out, offset);
    }
}

/// Apply `payload` against `base`, producing the window's plaintext.
pub fn apply(payload: &[u8], base: &[u8]) -> Result<Vec<u8>> {
    let mut pos = 0;
    let target_len = read_varint(payload, &mut pos)? as usize;
    let mut out = Vec::with_capacity(target_len);

    while pos < payload.len() {
        let op_byte = payload[pos];
        pos += 1;
        let op = op_byte >> 6;
        let len = match u64::from(op_byte & 0x3f) {
            0 => read_varint(payload, &mut pos)?,
            short => short,
        } as usize;

        match op {
            OP_COPY_BASE => {
                let offset = read_varint(payload, &mut pos)? as usize;
                let end = offset
                    .checked_add(len)
                    .filter(|&end| end <= base.len())
                    .ok_or_else(|| invalid("base copy out of range"))?;
                out.extend_from_slice(&base[offset..end]);
            }
            OP_COPY_TARGET => {
                let offset = read_varint(payload, &mut pos)? as usize;
                if offset >= out.len() {
                    return Err(invalid("target copy from unproduced range"));
                }
                // Byte-at-a-time so the source may overlap what this very
                // instruction appends.
                for i in 0..len {
                    let byte = out[offset + i];
                    out.push(byte);
                }
            }
            OP_INSERT => {
                let end = pos
                    .checked_add(len)
                    .filter(|&end| end <= payload.len())
                    .ok_or_else(|| invalid("insert runs past payload"))?;
                out.extend_from_slice(&payload[pos..end]);
                pos = end;
            }
            _ => return Err(invalid("unknown instruction")),
        }

        if out.len() > target_len {
            return Err(invalid("instructions overrun target length"));
        }
    }

    if out.len() != target_len {
        return Err(invalid("instructions underrun target length"));
    }
    Ok(out)
}

/// Encode `target` against `base`.
///
/// Matches the longest common prefix and suffix and inserts the middle
/// literally. With an empty base this degenerates to a pure insert.
pub fn encode(base: &[u8], target: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    write_varint(&mut out, target.len() as u64);

    let prefix = base
        .iter()
        .zip(target.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let suffix = base[prefix..]
        .iter()
        .rev()
        .zip(target[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();

    if prefix > 0 {
        write_instruction(&mut out, OP_COPY_BASE, prefix as u64, Some(0));
    }
    let middle = &target[prefix..target.len() - suffix];
    if !middle.is_empty() {
        write_instruction(&mut out, OP_INSERT, middle.len() as u64, None);
        out.extend_from_slice(middle);
    }
    if suffix > 0 {
        write_instruction(
            &mut out,
            OP_COPY_BASE,
            suffix as u64,
            Some((base.len() - suffix) as u64),
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(base: &[u8], target: &[u8]) {
        let payload = encode(base, target);
        assert_eq!(apply(&payload, base).unwrap(), target);
    }

    #[test]
    fn encode_apply_roundtrips() {
        roundtrip(b"", b"");
        roundtrip(b"", b"brand new content");
        roundtrip(b"unchanged", b"unchanged");
        roundtrip(b"the quick brown fox", b"the quick red fox");
        roundtrip(b"prefix only", b"prefix only plus a tail");
        roundtrip(b"cut my head off", b"head off");
        roundtrip(b"anything at all", b"");
    }

    #[test]
    fn encode_reuses_base() {
        // A one-word edit in a large text should cost far less than the
        // text itself.
        let base = vec![b'a'; 5000];
        let mut target = base.clone();
        target[2500] = b'b';
        let payload = encode(&base, &target);
        assert!(payload.len() < 40, "payload was {} bytes", payload.len());
        assert_eq!(apply(&payload, &base).unwrap(), target);
    }

    #[test]
    fn target_copy_expands_runs() {
        // Hand-built payload: insert "ab", then self-copy 6 bytes from
        // offset 0 → "abababab".
        let mut payload = Vec::new();
        write_varint(&mut payload, 8);
        write_instruction(&mut payload, OP_INSERT, 2, None);
        payload.extend_from_slice(b"ab");
        write_instruction(&mut payload, OP_COPY_TARGET, 6, Some(0));
        assert_eq!(apply(&payload, b"").unwrap(), b"abababab");
    }

    #[test]
    fn long_lengths_use_varint_form() {
        let base = Vec::new();
        let target = vec![7u8; 1000];
        roundtrip(&base, &target);
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        // Truncated varint.
        assert!(apply(&[0x80], b"").is_err());

        // Base copy out of range.
        let mut payload = Vec::new();
        write_varint(&mut payload, 4);
        write_instruction(&mut payload, OP_COPY_BASE, 4, Some(10));
        assert!(apply(&payload, b"short").is_err());

        // Target copy from bytes not yet produced.
        let mut payload = Vec::new();
        write_varint(&mut payload, 4);
        write_instruction(&mut payload, OP_COPY_TARGET, 4, Some(0));
        assert!(apply(&payload, b"").is_err());

        // Insert that runs past the payload.
        let mut payload = Vec::new();
        write_varint(&mut payload, 4);
        write_instruction(&mut payload, OP_INSERT, 4, None);
        payload.extend_from_slice(b"ab");
        assert!(apply(&payload, b"").is_err());

        // Underrun: fewer bytes produced than promised.
        let mut payload = Vec::new();
        write_varint(&mut payload, 9);
        write_instruction(&mut payload, OP_INSERT, 2, None);
        payload.extend_from_slice(b"ab");
        assert!(apply(&payload, b"").is_err());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Round-trip over arbitrary base/target pairs.
            #[test]
            fn arbitrary_roundtrip(
                base in proptest::collection::vec(any::<u8>(), 0..300),
                target in proptest::collection::vec(any::<u8>(), 0..300),
            ) {
                let payload = encode(&base, &target);
                prop_assert_eq!(apply(&payload, &base).unwrap(), target);
            }

            /// The decoder never panics on garbage payloads.
            #[test]
            fn apply_arbitrary_bytes(
                payload in proptest::collection::vec(any::<u8>(), 0..200),
                base in proptest::collection::vec(any::<u8>(), 0..100),
            ) {
                let _ = apply(&payload, &base);
            }
        }
    }
}
