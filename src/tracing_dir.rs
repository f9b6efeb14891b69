//! Discovery of the tracefs mount point.
//!
//! The kernel exposes tracepoint control files either through a `tracefs` mount
//! (usually `/sys/kernel/tracing`) or through the `tracing` directory of a
//! `debugfs` mount (usually `/sys/kernel/debug/tracing`). The mount table is
//! scanned at most once per [`TracingDirResolver`]; later callers read the
//! published result without locking.

use std::ffi::OsStr;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, OnceLock};

/// Default location of the mount table.
pub const PROC_MOUNTS: &str = "/proc/mounts";

/// Longest tracing directory path we accept, in bytes.
pub const TRACING_DIR_MAX: usize = 256;

/// Mount table lines longer than this are skipped.
pub const MOUNTS_LINE_MAX: usize = 4096;

static GLOBAL_RESOLVER: LazyLock<Arc<TracingDirResolver>> =
    LazyLock::new(|| Arc::new(TracingDirResolver::new(PROC_MOUNTS)));

/// Lazily resolved path of the tracing directory.
#[derive(Debug)]
pub struct TracingDirResolver {
    mounts_path: PathBuf,
    dir: OnceLock<Option<PathBuf>>,
}

impl TracingDirResolver {
    /// A resolver that scans `mounts_path` on first use.
    pub fn new(mounts_path: impl Into<PathBuf>) -> Self {
        TracingDirResolver {
            mounts_path: mounts_path.into(),
            dir: OnceLock::new(),
        }
    }

    /// A resolver whose result is already published. `None` means tracing is
    /// unavailable.
    pub fn with_dir(dir: Option<PathBuf>) -> Self {
        TracingDirResolver {
            mounts_path: PathBuf::from(PROC_MOUNTS),
            dir: OnceLock::from(dir),
        }
    }

    /// The process-wide resolver backed by `/proc/mounts`.
    pub fn global() -> Arc<TracingDirResolver> {
        Arc::clone(&GLOBAL_RESOLVER)
    }

    pub fn mounts_path(&self) -> &Path {
        &self.mounts_path
    }

    /// Returns the tracing directory, scanning the mount table if this is the
    /// first call. Concurrent first callers block until one scan publishes.
    pub fn tracing_dir(&self) -> Option<&Path> {
        self.dir
            .get_or_init(|| {
                let dir = scan_mounts_file(&self.mounts_path);
                match &dir {
                    Some(dir) => tracing::debug!("tracing directory is {}", dir.display()),
                    None => tracing::debug!(
                        "no tracefs or debugfs mount found in {}",
                        self.mounts_path.display()
                    ),
                }
                dir
            })
            .as_deref()
    }

    /// True once a scan (or injection) has published a result.
    pub fn is_resolved(&self) -> bool {
        self.dir.get().is_some()
    }

    /// Forget the published result so the next call scans again.
    pub fn reset(&mut self) {
        self.dir.take();
    }
}

/// The tracing directory according to the process-wide resolver.
pub fn tracing_directory() -> Option<&'static Path> {
    LazyLock::force(&GLOBAL_RESOLVER).tracing_dir()
}

fn scan_mounts_file(path: &Path) -> Option<PathBuf> {
    match File::open(path) {
        Ok(file) => find_tracing_dir(BufReader::new(file)),
        Err(err) => {
            tracing::debug!("unable to open {}: {}", path.display(), err);
            None
        }
    }
}

/// Scan mount table lines and return the first tracefs mount point, or the
/// `tracing` directory under the first debugfs mount point, whichever comes
/// first.
pub fn find_tracing_dir<R: BufRead>(mut reader: R) -> Option<PathBuf> {
    let mut line = Vec::with_capacity(256);
    loop {
        line.clear();
        // One byte past the bound is enough to tell an overlong line apart.
        let limit = MOUNTS_LINE_MAX as u64 + 1;
        match reader.by_ref().take(limit).read_until(b'\n', &mut line) {
            Ok(0) => return None,
            Ok(_) => {}
            Err(err) => {
                tracing::debug!("error reading mount table: {}", err);
                return None;
            }
        }
        if line.last() != Some(&b'\n') && line.len() > MOUNTS_LINE_MAX {
            if let Err(err) = skip_line(&mut reader) {
                tracing::debug!("error reading mount table: {}", err);
                return None;
            }
            continue;
        }
        if let Some(dir) = parse_mounts_line(&line) {
            return Some(dir);
        }
    }
}

// Consume the rest of the current line, including its newline.
fn skip_line<R: BufRead>(reader: &mut R) -> io::Result<()> {
    loop {
        let buf = reader.fill_buf()?;
        if buf.is_empty() {
            return Ok(());
        }
        match buf.iter().position(|&ch| ch == b'\n') {
            Some(pos) => {
                reader.consume(pos + 1);
                return Ok(());
            }
            None => {
                let len = buf.len();
                reader.consume(len);
            }
        }
    }
}

fn is_space(ch: u8) -> bool {
    ch == b' ' || ch == b'\t'
}

/// Parse one `device mountPoint fileSystem options...` line.
///
/// Returns the tracing directory if the line describes a tracefs or debugfs
/// mount. The filesystem field must be followed by whitespace.
pub fn parse_mounts_line(line: &[u8]) -> Option<PathBuf> {
    let is_field = |ch: u8| ch != b'\0' && ch != b'\n' && !is_space(ch);
    let skip_field = |pos: usize| pos + line[pos..].iter().take_while(|ch| is_field(**ch)).count();
    let skip_space = |pos: usize| pos + line[pos..].iter().take_while(|ch| is_space(**ch)).count();

    let pos = skip_field(0);
    let mount_begin = skip_space(pos);
    let mount_end = skip_field(mount_begin);
    let fs_begin = skip_space(mount_end);
    let fs_end = skip_field(fs_begin);

    if !line.get(fs_end).copied().is_some_and(is_space) {
        return None;
    }

    let suffix: &[u8] = match &line[fs_begin..fs_end] {
        b"tracefs" => b"",
        b"debugfs" => b"/tracing",
        _ => return None,
    };

    let mut dir = unescape_mount_field(&line[mount_begin..mount_end]);
    dir.extend_from_slice(suffix);
    if dir.is_empty() || dir.len() > TRACING_DIR_MAX {
        return None;
    }
    Some(PathBuf::from(OsStr::from_bytes(&dir)))
}

// The kernel writes space, tab, newline and backslash in mount points as
// three-digit octal escapes.
fn unescape_mount_field(field: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(field.len());
    let mut i = 0;
    while i < field.len() {
        if field[i] == b'\\' && i + 3 < field.len() && is_octal_escape(&field[i + 1..i + 4]) {
            let digits = &field[i + 1..i + 4];
            let value = digits
                .iter()
                .fold(0u32, |acc, digit| acc * 8 + u32::from(digit - b'0'));
            if let Ok(byte) = u8::try_from(value) {
                out.push(byte);
                i += 4;
                continue;
            }
        }
        out.push(field[i]);
        i += 1;
    }
    out
}

fn is_octal_escape(digits: &[u8]) -> bool {
    digits.len() == 3 && digits.iter().all(|ch| (b'0'..=b'7').contains(ch))
}
