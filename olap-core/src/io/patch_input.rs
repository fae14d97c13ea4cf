//! Inputs for the quality patcher

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::path::Path;

use crate::error::{StoreError, StoreResult};
use crate::io::{open_input, ParseError};
use crate::types::{check_frag_id, FragId};

const ERATE_HEADER_SIZE: u64 = 12;

/// Replacement `corr_erate` values for every record of `[lo_id, hi_id]`, in stream order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErateFile {
    pub lo_id: FragId,
    pub hi_id: FragId,
    pub erates: Vec<u16>,
}

/// Read an erate file: `u32 lo_id, u32 hi_id, u32 count` then `count` `u16` values
pub fn read_erate_file<P: AsRef<Path>>(path: P) -> StoreResult<ErateFile> {
    let path = path.as_ref();
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Err(StoreError::not_found(path)),
        Err(e) => return Err(e.into()),
    };
    let file_len = file.metadata()?.len();
    let mut reader = BufReader::new(file);

    let truncated = |e: std::io::Error, what: &str| -> StoreError {
        if e.kind() == ErrorKind::UnexpectedEof {
            ParseError::truncated(path, what.to_string()).into()
        } else {
            e.into()
        }
    };

    let lo_id = reader
        .read_u32::<LittleEndian>()
        .map_err(|e| truncated(e, "header"))?;
    let hi_id = reader
        .read_u32::<LittleEndian>()
        .map_err(|e| truncated(e, "header"))?;
    let count = reader
        .read_u32::<LittleEndian>()
        .map_err(|e| truncated(e, "header"))?;

    let expected_len = ERATE_HEADER_SIZE + 2 * count as u64;
    if file_len < expected_len {
        return Err(ParseError::truncated(
            path,
            format!("header declares {count} values, file holds {file_len} bytes, needs {expected_len}"),
        )
        .into());
    }

    let mut erates = vec![0u16; count as usize];
    reader
        .read_u16_into::<LittleEndian>(&mut erates)
        .map_err(|e| truncated(e, &format!("header declares {count} values")))?;

    Ok(ErateFile { lo_id, hi_id, erates })
}

/// Write an erate file in the layout [`read_erate_file`] expects
pub fn write_erate_file<P: AsRef<Path>>(path: P, erates: &ErateFile) -> StoreResult<()> {
    let mut writer = BufWriter::new(File::create(path.as_ref())?);
    writer.write_u32::<LittleEndian>(erates.lo_id)?;
    writer.write_u32::<LittleEndian>(erates.hi_id)?;
    writer.write_u32::<LittleEndian>(erates.erates.len() as u32)?;
    for &q in &erates.erates {
        writer.write_u16::<LittleEndian>(q)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read whitespace-separated `a_id b_id` pairs, which must be sorted by `a_id`
pub fn read_pair_list<P: AsRef<Path>>(path: P) -> StoreResult<Vec<(FragId, FragId)>> {
    let path = path.as_ref();
    let reader = open_input(path)?;

    let mut tokens: Vec<(usize, String)> = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        tokens.extend(line.split_whitespace().map(|t| (i + 1, t.to_string())));
    }
    if tokens.len() % 2 != 0 {
        let line = tokens.last().map_or(0, |(n, _)| *n);
        return Err(ParseError::syntax(path, line, "odd number of ids in pair list").into());
    }

    let mut pairs = Vec::with_capacity(tokens.len() / 2);
    for chunk in tokens.chunks(2) {
        let mut ids = [0u32; 2];
        for (slot, (line, token)) in ids.iter_mut().zip(chunk) {
            let id: u32 = token
                .parse()
                .map_err(|_| ParseError::syntax(path, *line, format!("bad fragment id '{token}'")))?;
            *slot = check_frag_id(id)?;
        }
        pairs.push((ids[0], ids[1]));
    }

    check_sorted_pairs(&pairs)?;
    Ok(pairs)
}

/// Reject pair lists that are not sorted by `a_id`
pub fn check_sorted_pairs(pairs: &[(FragId, FragId)]) -> StoreResult<()> {
    if let Some(i) = pairs.windows(2).position(|w| w[0].0 > w[1].0) {
        return Err(StoreError::invalid_input(format!(
            "pair list not sorted by a_id: {} follows {} at pair {}",
            pairs[i + 1].0,
            pairs[i].0,
            i + 2
        )));
    }
    Ok(())
}
