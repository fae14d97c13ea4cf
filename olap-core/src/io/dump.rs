//! Reader for dump-format overlap lines
//!
//! `a_id b_id orient a_hang b_hang orig_erate% corr_erate%`, whitespace
//! separated. Each line describes one overlap and yields the record as
//! written plus its reciprocal; the same overlap must not also appear from
//! the other side.

use std::io::BufRead;
use std::path::{Path, PathBuf};

use crate::error::StoreResult;
use crate::io::{open_input, ParseError};
use crate::quality;
use crate::types::{check_frag_id, to_hang, OverlapRecord};

/// Parse one dump-format line into its forward record
pub fn parse_line(line: &str) -> Result<OverlapRecord, String> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 7 {
        return Err(format!("expected 7 fields, got {}", fields.len()));
    }

    let int = |i: usize| -> Result<i64, String> {
        fields[i]
            .parse::<i64>()
            .map_err(|_| format!("field {} is not an integer: '{}'", i + 1, fields[i]))
    };
    let pct = |i: usize| -> Result<f32, String> {
        fields[i]
            .parse::<f32>()
            .map_err(|_| format!("field {} is not a number: '{}'", i + 1, fields[i]))
    };

    let a_id = id_field(int(0)?)?;
    let b_id = id_field(int(1)?)?;
    let flipped = !fields[2]
        .chars()
        .next()
        .is_some_and(|c| c.eq_ignore_ascii_case(&'n'));
    let a_hang = hang_field(int(3)?)?;
    let b_hang = hang_field(int(4)?)?;

    Ok(OverlapRecord {
        a_id,
        b_id,
        flipped,
        a_hang,
        b_hang,
        orig_erate: quality::shrink_percent(pct(5)?),
        corr_erate: quality::shrink_percent(pct(6)?),
    })
}

fn id_field(value: i64) -> Result<u32, String> {
    let id = u32::try_from(value).map_err(|_| format!("fragment id {value} out of range"))?;
    check_frag_id(id).map_err(|e| e.to_string())
}

fn hang_field(value: i64) -> Result<i16, String> {
    let hang = i32::try_from(value).map_err(|_| format!("hang {value} out of range"))?;
    to_hang(hang).map_err(|e| e.to_string())
}

/// Streaming reader yielding `(forward, reciprocal)` pairs
pub struct DumpReader<R> {
    reader: R,
    path: PathBuf,
    line_no: usize,
    buf: String,
}

impl DumpReader<Box<dyn BufRead>> {
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref();
        Ok(Self::new(open_input(path)?, path))
    }
}

impl<R: BufRead> DumpReader<R> {
    pub fn new<P: Into<PathBuf>>(reader: R, path: P) -> Self {
        Self {
            reader,
            path: path.into(),
            line_no: 0,
            buf: String::new(),
        }
    }

    fn next_pair(&mut self) -> StoreResult<Option<(OverlapRecord, OverlapRecord)>> {
        loop {
            self.buf.clear();
            if self.reader.read_line(&mut self.buf)? == 0 {
                return Ok(None);
            }
            self.line_no += 1;
            if self.buf.trim().is_empty() {
                continue;
            }
            let fwd = parse_line(&self.buf)
                .map_err(|message| ParseError::syntax(&self.path, self.line_no, message))?;
            return Ok(Some((fwd, fwd.reciprocal())));
        }
    }
}

impl<R: BufRead> Iterator for DumpReader<R> {
    type Item = StoreResult<(OverlapRecord, OverlapRecord)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_pair().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_parse_printed_line() {
        let rec = OverlapRecord {
            a_id: 12,
            b_id: 40,
            flipped: true,
            a_hang: -33,
            b_hang: 17,
            orig_erate: 25,
            corr_erate: 18,
        };
        assert_eq!(parse_line(&rec.to_string()).unwrap(), rec);
    }

    #[test]
    fn test_orientation_letter() {
        assert!(!parse_line("1 2 n 0 0 1.0 1.0").unwrap().flipped);
        assert!(!parse_line("1 2 N 0 0 1.0 1.0").unwrap().flipped);
        assert!(parse_line("1 2 I 0 0 1.0 1.0").unwrap().flipped);
        assert!(parse_line("1 2 A 0 0 1.0 1.0").unwrap().flipped);
    }

    #[test]
    fn test_percent_erates_are_quantized() {
        let rec = parse_line("1 2 N -10 -5 2.00 1.50").unwrap();
        assert_eq!(rec.orig_erate, 20);
        assert_eq!(rec.corr_erate, 15);
    }

    #[test]
    fn test_reader_yields_reciprocals() {
        let text = "1 2 N -10 -5 2.0 2.0\n\n3 4 I 3 -2 5.0 5.0\n";
        let pairs: Vec<_> = DumpReader::new(Cursor::new(text), "x.dump")
            .collect::<StoreResult<_>>()
            .unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!((pairs[0].1.a_id, pairs[0].1.a_hang, pairs[0].1.b_hang), (2, 10, 5));
        assert_eq!((pairs[1].1.a_id, pairs[1].1.a_hang, pairs[1].1.b_hang), (4, -2, 3));
    }

    #[test]
    fn test_bad_line_reports_position() {
        let text = "1 2 N 0 0 1.0 1.0\n1 2 N\n";
        let err = DumpReader::new(Cursor::new(text), "x.dump")
            .collect::<StoreResult<Vec<_>>>()
            .unwrap_err();
        assert!(err.to_string().contains("x.dump:2"));
    }

    #[test]
    fn test_rejects_zero_id_and_wide_hang() {
        assert!(parse_line("0 2 N 0 0 1.0 1.0").is_err());
        assert!(parse_line("1 2 N 40000 0 1.0 1.0").is_err());
    }
}
