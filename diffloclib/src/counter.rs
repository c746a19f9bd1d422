//! Line counting primitive.
//!
//! Counts newline bytes in 32 KiB chunks. A NUL byte in the first chunk marks the
//! file as binary and stops reading; binary files count as zero lines. A final line
//! without a trailing newline is not counted.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use crate::error::DifflocError;
use crate::Result;

/// Size of each read.
pub const CHUNK_SIZE: usize = 32 * 1024;

/// Line count of one file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineCount {
    /// Number of newline bytes; 0 for binary content
    pub lines: u64,
    /// Whether the first chunk contained a NUL byte
    pub binary: bool,
}

impl LineCount {
    fn binary() -> Self {
        Self {
            lines: 0,
            binary: true,
        }
    }
}

/// Count lines in a file on disk.
///
/// Failing to open the file is an error. A read failure after the first chunk returns
/// [`DifflocError::PartialRead`] carrying the lines counted so far.
pub fn count_lines(path: impl AsRef<Path>) -> Result<LineCount> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| DifflocError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    count_reader(file).map_err(|(lines, source)| DifflocError::PartialRead {
        path: path.to_path_buf(),
        lines,
        source,
    })
}

/// Count lines from any reader.
///
/// On a read error, returns the lines counted before it together with the error.
pub fn count_reader<R: Read>(mut reader: R) -> std::result::Result<LineCount, (u64, std::io::Error)> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut lines = 0u64;
    let mut first_chunk = true;

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err((lines, e)),
        };
        let chunk = &buf[..n];

        if first_chunk {
            if chunk.contains(&0) {
                return Ok(LineCount::binary());
            }
            first_chunk = false;
        }

        lines += count_newlines(chunk);
    }

    Ok(LineCount {
        lines,
        binary: false,
    })
}

/// Count lines in an in-memory buffer with the same rules as [`count_reader`].
pub fn count_bytes(content: &[u8]) -> LineCount {
    let head = &content[..content.len().min(CHUNK_SIZE)];
    if head.contains(&0) {
        return LineCount::binary();
    }
    LineCount {
        lines: count_newlines(content),
        binary: false,
    }
}

fn count_newlines(chunk: &[u8]) -> u64 {
    chunk.iter().filter(|&&b| b == b'\n').count() as u64
}
