//! Reader for assembler overlap messages
//!
//! Only `{OVL ...}` messages are decoded:
//!
//! ```text
//! {OVL
//! afr:17
//! bfr:42
//! ori:N
//! olt:D
//! ahg:-10
//! bhg:-5
//! qua:0.020000
//! mno:0
//! mxo:0
//! pct:0
//! del:
//! .
//! }
//! ```
//!
//! Every other message type, nested or not, is skipped.

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::StoreResult;
use crate::io::{open_input, ParseError};
use crate::types::{Orientation, PhysicalOverlap};

#[derive(Default)]
struct PendingOverlap {
    a_id: Option<u32>,
    b_id: Option<u32>,
    orientation: Option<Orientation>,
    a_hang: Option<i32>,
    b_hang: Option<i32>,
    quality: Option<f32>,
}

/// Streaming reader yielding one [`PhysicalOverlap`] per `OVL` message
pub struct OvlReader<R> {
    reader: R,
    path: PathBuf,
    line_no: usize,
    buf: String,
    done: bool,
}

impl OvlReader<Box<dyn BufRead>> {
    /// Open a message file, gzip-compressed if it ends in `.gz`
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref();
        Ok(Self::new(open_input(path)?, path))
    }
}

impl<R: BufRead> OvlReader<R> {
    pub fn new<P: Into<PathBuf>>(reader: R, path: P) -> Self {
        Self {
            reader,
            path: path.into(),
            line_no: 0,
            buf: String::new(),
            done: false,
        }
    }

    fn syntax(&self, message: impl Into<String>) -> ParseError {
        ParseError::syntax(&self.path, self.line_no, message)
    }

    fn parse_value<T: FromStr>(&self, key: &str, value: &str) -> Result<T, ParseError> {
        value
            .trim()
            .parse()
            .map_err(|_| self.syntax(format!("bad value for {key}: '{}'", value.trim())))
    }

    fn read_message(&mut self) -> StoreResult<Option<PhysicalOverlap>> {
        let mut depth = 0usize;
        let mut in_ovl = false;
        let mut pending = PendingOverlap::default();

        loop {
            self.buf.clear();
            if self.reader.read_line(&mut self.buf)? == 0 {
                if depth > 0 {
                    return Err(ParseError::truncated(&self.path, "message not closed").into());
                }
                return Ok(None);
            }
            self.line_no += 1;
            let line = self.buf.trim_end().to_string();

            if let Some(tag) = line.strip_prefix('{') {
                depth += 1;
                if depth == 1 {
                    in_ovl = tag.trim() == "OVL";
                }
                continue;
            }

            if line == "}" {
                if depth == 0 {
                    return Err(self.syntax("unmatched '}'").into());
                }
                depth -= 1;
                if depth == 0 && in_ovl {
                    return self.finish(pending).map(Some);
                }
                continue;
            }

            if depth != 1 || !in_ovl {
                continue;
            }

            // del: blocks and free text carry no "key:" prefix we care about
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            match key {
                "afr" => pending.a_id = Some(self.parse_value(key, value)?),
                "bfr" => pending.b_id = Some(self.parse_value(key, value)?),
                "ori" => {
                    let c = value
                        .trim()
                        .chars()
                        .next()
                        .ok_or_else(|| self.syntax("empty orientation"))?;
                    pending.orientation = Some(Orientation::from(c));
                }
                "ahg" => pending.a_hang = Some(self.parse_value(key, value)?),
                "bhg" => pending.b_hang = Some(self.parse_value(key, value)?),
                "qua" => pending.quality = Some(self.parse_value(key, value)?),
                _ => {}
            }
        }
    }

    fn finish(&self, pending: PendingOverlap) -> StoreResult<PhysicalOverlap> {
        let missing = |field: &str| self.syntax(format!("OVL message missing {field}"));
        Ok(PhysicalOverlap {
            a_id: pending.a_id.ok_or_else(|| missing("afr"))?,
            b_id: pending.b_id.ok_or_else(|| missing("bfr"))?,
            orientation: pending.orientation.ok_or_else(|| missing("ori"))?,
            a_hang: pending.a_hang.ok_or_else(|| missing("ahg"))?,
            b_hang: pending.b_hang.ok_or_else(|| missing("bhg"))?,
            quality: pending.quality.ok_or_else(|| missing("qua"))?,
        })
    }
}

impl<R: BufRead> Iterator for OvlReader<R> {
    type Item = StoreResult<PhysicalOverlap>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_message() {
            Ok(Some(ovl)) => Some(Ok(ovl)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
