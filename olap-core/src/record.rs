//! On-disk record layout
//!
//! Short records (inside shard files) omit `a_id`, which the offset index
//! supplies. Long records (spill files) carry it up front. All fields are
//! little-endian:
//!
//! ```text
//! long only: a_id u32
//! word u32:  b_id (low 31 bits) | flipped << 31
//! a_hang i16, b_hang i16, orig_erate u16, corr_erate u16
//! ```

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

use crate::types::{FragId, OverlapRecord, MAX_FRAG_ID};

/// Byte size of a short record; recorded in every index header
pub const SHORT_RECORD_SIZE: usize = 12;

/// Byte size of a long record
pub const LONG_RECORD_SIZE: usize = 4 + SHORT_RECORD_SIZE;

const FLIPPED_BIT: u32 = 1 << 31;
const CORR_ERATE_OFFSET: usize = 10;

fn pack_word(rec: &OverlapRecord) -> u32 {
    let flipped = if rec.flipped { FLIPPED_BIT } else { 0 };
    (rec.b_id & MAX_FRAG_ID) | flipped
}

/// Write the short form of `rec`
pub fn write_short<W: Write>(writer: &mut W, rec: &OverlapRecord) -> io::Result<()> {
    writer.write_u32::<LittleEndian>(pack_word(rec))?;
    writer.write_i16::<LittleEndian>(rec.a_hang)?;
    writer.write_i16::<LittleEndian>(rec.b_hang)?;
    writer.write_u16::<LittleEndian>(rec.orig_erate)?;
    writer.write_u16::<LittleEndian>(rec.corr_erate)?;
    Ok(())
}

/// Read one short record; `a_id` comes from the caller's position in the index
pub fn read_short<R: Read>(reader: &mut R, a_id: FragId) -> io::Result<OverlapRecord> {
    let word = reader.read_u32::<LittleEndian>()?;
    let a_hang = reader.read_i16::<LittleEndian>()?;
    let b_hang = reader.read_i16::<LittleEndian>()?;
    let orig_erate = reader.read_u16::<LittleEndian>()?;
    let corr_erate = reader.read_u16::<LittleEndian>()?;
    Ok(OverlapRecord {
        a_id,
        b_id: word & MAX_FRAG_ID,
        flipped: word & FLIPPED_BIT != 0,
        a_hang,
        b_hang,
        orig_erate,
        corr_erate,
    })
}

/// Write the long form of `rec`
pub fn write_long<W: Write>(writer: &mut W, rec: &OverlapRecord) -> io::Result<()> {
    writer.write_u32::<LittleEndian>(rec.a_id)?;
    write_short(writer, rec)
}

pub fn read_long<R: Read>(reader: &mut R) -> io::Result<OverlapRecord> {
    let a_id = reader.read_u32::<LittleEndian>()?;
    read_short(reader, a_id)
}

pub fn encode_short(rec: &OverlapRecord) -> [u8; SHORT_RECORD_SIZE] {
    let mut buf = [0u8; SHORT_RECORD_SIZE];
    let mut slot = &mut buf[..];
    // Writing into a correctly sized slice cannot fail
    let _ = write_short(&mut slot, rec);
    buf
}

/// `b_id` of an encoded short record
pub fn short_b_id(bytes: &[u8]) -> FragId {
    LittleEndian::read_u32(&bytes[..4]) & MAX_FRAG_ID
}

/// Overwrite `corr_erate` of an encoded short record in place
pub fn set_short_corr_erate(bytes: &mut [u8], erate: u16) {
    LittleEndian::write_u16(&mut bytes[CORR_ERATE_OFFSET..CORR_ERATE_OFFSET + 2], erate);
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Cursor;

    #[test]
    fn test_short_layout_is_fixed() {
        let rec = OverlapRecord {
            a_id: 1,
            b_id: 2,
            flipped: true,
            a_hang: -10,
            b_hang: 5,
            orig_erate: 20,
            corr_erate: 21,
        };
        let bytes = encode_short(&rec);
        assert_eq!(&bytes[0..4], &[2, 0, 0, 0x80]);
        assert_eq!(&bytes[4..6], &(-10i16).to_le_bytes());
        assert_eq!(&bytes[6..8], &[5, 0]);
        assert_eq!(&bytes[8..10], &[20, 0]);
        assert_eq!(&bytes[10..12], &[21, 0]);
    }

    #[test]
    fn test_in_place_field_access() {
        let rec = OverlapRecord::new(4, 123_456, false, 3, -2, 50);
        let mut bytes = encode_short(&rec);
        assert_eq!(short_b_id(&bytes), 123_456);

        set_short_corr_erate(&mut bytes, 500);
        let back = read_short(&mut Cursor::new(&bytes[..]), 4).unwrap();
        assert_eq!(back.corr_erate, 500);
        assert_eq!(back.orig_erate, 50);
        assert_eq!(back.b_id, 123_456);
    }

    #[test]
    fn test_short_read_reports_eof() {
        let bytes = [0u8; SHORT_RECORD_SIZE - 1];
        let err = read_short(&mut Cursor::new(&bytes[..]), 1).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    proptest! {
        #[test]
        fn prop_long_form_preserves_all_fields(
            a_id in 1u32..=MAX_FRAG_ID,
            b_id in 1u32..=MAX_FRAG_ID,
            flipped: bool,
            a_hang: i16,
            b_hang: i16,
            orig_erate: u16,
            corr_erate: u16,
        ) {
            let rec = OverlapRecord { a_id, b_id, flipped, a_hang, b_hang, orig_erate, corr_erate };
            let mut buf = Vec::new();
            write_long(&mut buf, &rec).unwrap();
            prop_assert_eq!(buf.len(), LONG_RECORD_SIZE);
            prop_assert_eq!(read_long(&mut Cursor::new(buf)).unwrap(), rec);
        }
    }
}
