//! Reading kernel pseudo-files.
//!
//! Files under tracefs report a size of zero (or a meaningless size), so they
//! can't be stat'ed and read in one go. Instead the destination buffer is grown
//! a chunk at a time until the kernel reports end of file.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use crate::error::{Result, TracepointError};

/// Number of bytes the buffer grows by before each read.
pub const READ_CHUNK_SIZE: usize = 512;

/// Append the entire contents of `path` to `dest`.
///
/// On failure `dest` is restored to the length it had on entry.
pub fn append_tracing_file(dest: &mut Vec<u8>, path: &Path) -> Result<()> {
    let file = File::open(path).map_err(|source| TracepointError::NotFound {
        path: path.to_path_buf(),
        source,
    })?;

    append_from_reader(dest, file).map_err(|err| match err {
        ReadFailure::OutOfMemory => TracepointError::OutOfMemory,
        ReadFailure::Io(source) => TracepointError::Io {
            path: path.to_path_buf(),
            source,
        },
    })
}

#[derive(Debug)]
pub enum ReadFailure {
    OutOfMemory,
    Io(std::io::Error),
}

/// Append everything `reader` produces to `dest`, growing it by
/// [`READ_CHUNK_SIZE`] bytes at a time.
///
/// On failure `dest` is restored to the length it had on entry.
pub fn append_from_reader<R: Read>(dest: &mut Vec<u8>, mut reader: R) -> Result<(), ReadFailure> {
    let old_len = dest.len();
    let mut pos = old_len;
    loop {
        if dest.try_reserve(READ_CHUNK_SIZE).is_err() {
            dest.truncate(old_len);
            return Err(ReadFailure::OutOfMemory);
        }
        dest.resize(pos + READ_CHUNK_SIZE, 0);

        while pos < dest.len() {
            match reader.read(&mut dest[pos..]) {
                Ok(0) => {
                    dest.truncate(pos);
                    return Ok(());
                }
                Ok(read) => pos += read,
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => {
                    dest.truncate(old_len);
                    return Err(ReadFailure::Io(err));
                }
            }
        }
    }
}
