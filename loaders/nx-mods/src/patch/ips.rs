//! Binary IPS / IPS32 patch parsing
//!
//! The classic IPS layout: a magic string, then records of a big-endian
//! offset, a 16-bit length, and either literal bytes or (when the length is
//! zero) an RLE count and fill byte, terminated by `EOF`. The IPS32 variant
//! widens offsets to 32 bits and terminates with `EEOF`. The target build id
//! is not part of the container; it is encoded in the file name.

use super::MemPatch;
use crate::{Error, Result};
use byteorder::{BigEndian, ReadBytesExt};
use std::io::{Cursor, Read};
use std::path::Path;

/// IPS magic string
const IPS_MAGIC: &[u8; 5] = b"PATCH";
/// IPS32 magic string
const IPS32_MAGIC: &[u8; 5] = b"IPS32";
/// IPS end-of-records marker
const IPS_TAIL: &[u8; 3] = b"EOF";
/// IPS32 end-of-records marker
const IPS32_TAIL: &[u8; 4] = b"EEOF";

/// Derive the target build id from an IPS file name
///
/// The extension and any secondary dotted suffix are stripped, then trailing
/// `'0'` characters are trimmed: `60FD0400.1.ips` targets build id `60FD04`.
pub fn build_id_from_file_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let name = stem.split('.').next().unwrap_or_default();
    name.trim_end_matches('0').to_uppercase()
}

/// Parse an IPS or IPS32 blob into a record set
pub fn parse(data: &[u8]) -> Result<MemPatch> {
    let mut cursor = Cursor::new(data);

    let mut magic = [0u8; 5];
    cursor
        .read_exact(&mut magic)
        .map_err(|_| Error::invalid_patch("missing IPS magic"))?;

    let wide_offsets = match &magic {
        IPS_MAGIC => false,
        IPS32_MAGIC => true,
        _ => return Err(Error::invalid_patch("unrecognized IPS magic")),
    };

    let mut patch = MemPatch::new();

    loop {
        let offset = if wide_offsets {
            let mut buf = [0u8; 4];
            cursor
                .read_exact(&mut buf)
                .map_err(|_| Error::invalid_patch("truncated record offset"))?;
            if &buf == IPS32_TAIL {
                break;
            }
            u32::from_be_bytes(buf)
        } else {
            let mut buf = [0u8; 3];
            cursor
                .read_exact(&mut buf)
                .map_err(|_| Error::invalid_patch("truncated record offset"))?;
            if &buf == IPS_TAIL {
                break;
            }
            u32::from_be_bytes([0, buf[0], buf[1], buf[2]])
        };

        let length = cursor
            .read_u16::<BigEndian>()
            .map_err(|_| Error::invalid_patch("truncated record length"))?;

        if length == 0 {
            // RLE record: repeat count and fill byte
            let count = cursor
                .read_u16::<BigEndian>()
                .map_err(|_| Error::invalid_patch("truncated RLE count"))?;
            let filler = cursor
                .read_u8()
                .map_err(|_| Error::invalid_patch("truncated RLE fill byte"))?;
            patch.add_fill(offset, count as usize, filler);
        } else {
            let mut payload = vec![0u8; length as usize];
            cursor
                .read_exact(&mut payload)
                .map_err(|_| Error::invalid_patch("truncated record payload"))?;
            patch.add(offset, payload);
        }
    }

    Ok(patch)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ips(records: &[&[u8]]) -> Vec<u8> {
        let mut data = IPS_MAGIC.to_vec();
        for record in records {
            data.extend_from_slice(record);
        }
        data.extend_from_slice(IPS_TAIL);
        data
    }

    #[test]
    fn test_parse_literal_record() {
        // offset 0x000010, length 2, payload AB CD
        let data = ips(&[&[0x00, 0x00, 0x10, 0x00, 0x02, 0xAB, 0xCD]]);
        let patch = parse(&data).unwrap();
        assert_eq!(patch.len(), 1);

        let mut memory = vec![0u8; 0x20];
        patch.apply(&mut memory, 0);
        assert_eq!(&memory[0x10..0x12], &[0xAB, 0xCD]);
    }

    #[test]
    fn test_parse_rle_record() {
        // offset 0x000004, length 0 -> RLE count 3, fill 0xEE
        let data = ips(&[&[0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x03, 0xEE]]);
        let patch = parse(&data).unwrap();

        let mut memory = vec![0u8; 8];
        patch.apply(&mut memory, 0);
        assert_eq!(memory, [0, 0, 0, 0, 0xEE, 0xEE, 0xEE, 0]);
    }

    #[test]
    fn test_parse_ips32_wide_offset() {
        let mut data = IPS32_MAGIC.to_vec();
        // offset 0x01000000, length 1, payload 0x7F
        data.extend_from_slice(&[0x01, 0x00, 0x00, 0x00, 0x00, 0x01, 0x7F]);
        data.extend_from_slice(IPS32_TAIL);

        let patch = parse(&data).unwrap();
        let mut memory = vec![0u8; 4];
        // Rebase the large offset down into the small test image.
        patch.apply(&mut memory, 0x00FF_FFFE);
        assert_eq!(memory[2], 0x7F);
    }

    #[test]
    fn test_bad_magic_rejected() {
        assert!(matches!(
            parse(b"NOTIPS"),
            Err(Error::InvalidPatch(_))
        ));
    }

    #[test]
    fn test_truncated_payload_rejected() {
        let mut data = IPS_MAGIC.to_vec();
        data.extend_from_slice(&[0x00, 0x00, 0x10, 0x00, 0x05, 0xAB]);
        assert!(matches!(parse(&data), Err(Error::InvalidPatch(_))));
    }

    #[test]
    fn test_missing_tail_rejected() {
        let mut data = IPS_MAGIC.to_vec();
        data.extend_from_slice(&[0x00, 0x00, 0x10, 0x00, 0x01, 0xAB]);
        assert!(matches!(parse(&data), Err(Error::InvalidPatch(_))));
    }

    #[test]
    fn test_build_id_from_file_name() {
        assert_eq!(build_id_from_file_name(Path::new("60FD0400.ips")), "60FD04");
        assert_eq!(
            build_id_from_file_name(Path::new("ABCD000000.1.ips")),
            "ABCD"
        );
        assert_eq!(build_id_from_file_name(Path::new("abcd00.ips")), "ABCD");
    }
}
