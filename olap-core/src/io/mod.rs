//! Text and binary input formats consumed by the grower and patcher
//!
//! - [`ovl`]: assembler `{OVL ...}` overlap messages
//! - [`dump`]: one record per line, as printed by the dump command
//! - [`patch_input`]: erate arrays and `(a_id, b_id)` pair lists

pub mod dump;
pub mod ovl;
pub mod patch_input;

pub use dump::DumpReader;
pub use ovl::OvlReader;
pub use patch_input::{read_erate_file, read_pair_list, ErateFile};

use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::error::{StoreError, StoreResult};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("{}:{line}: {message}", path.display())]
    Syntax {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("{}: unexpected end of file: {message}", path.display())]
    Truncated { path: PathBuf, message: String },
}

impl ParseError {
    pub fn syntax<P: Into<PathBuf>, S: Into<String>>(path: P, line: usize, message: S) -> Self {
        Self::Syntax {
            path: path.into(),
            line,
            message: message.into(),
        }
    }

    pub fn truncated<P: Into<PathBuf>, S: Into<String>>(path: P, message: S) -> Self {
        Self::Truncated {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Open a text input, transparently decompressing `.gz` files
pub fn open_input<P: AsRef<Path>>(path: P) -> StoreResult<Box<dyn BufRead>> {
    let path = path.as_ref();
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(StoreError::not_found(path));
        }
        Err(e) => return Err(e.into()),
    };

    if path.extension().is_some_and(|ext| ext == "gz") {
        Ok(Box::new(BufReader::new(GzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Read a list file: one input path per line, blank lines and `#` comments ignored
pub fn read_list_file<P: AsRef<Path>>(path: P) -> StoreResult<Vec<PathBuf>> {
    let reader = open_input(path.as_ref())?;
    let mut paths = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        paths.push(PathBuf::from(trimmed));
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_open_gzip_input() -> StoreResult<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("olaps.ovl.gz");
        let mut encoder = GzEncoder::new(File::create(&path)?, Compression::default());
        encoder.write_all(b"hello\nworld\n")?;
        encoder.finish()?;

        let lines: Vec<String> = open_input(&path)?.lines().collect::<Result<_, _>>()?;
        assert_eq!(lines, vec!["hello", "world"]);
        Ok(())
    }

    #[test]
    fn test_list_file_skips_comments() -> StoreResult<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("inputs.txt");
        std::fs::write(&path, "# batch 1\na.ovl\n\n  b.ovl.gz  \n")?;

        let paths = read_list_file(&path)?;
        assert_eq!(paths, vec![PathBuf::from("a.ovl"), PathBuf::from("b.ovl.gz")]);
        Ok(())
    }

    #[test]
    fn test_missing_input_is_not_found() {
        let err = open_input("/nonexistent/olaps.ovl").err().unwrap();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }
}
