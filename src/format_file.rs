//! Locating and loading `events/<system>/<event>/format` files.

use std::path::{Path, PathBuf};

use crate::error::{Result, TracepointError};
use crate::name::is_valid_name_part;
use crate::reader::append_tracing_file;
use crate::tracing_dir::{TracingDirResolver, TRACING_DIR_MAX};

/// Composed format file paths must be shorter than this many bytes.
pub const FORMAT_PATH_MAX: usize = TRACING_DIR_MAX + 256;

fn check_name_part(what: &'static str, value: &str) -> Result<()> {
    if is_valid_name_part(value) {
        Ok(())
    } else {
        Err(TracepointError::InvalidArgument {
            what,
            value: value.to_string(),
        })
    }
}

fn check_names(system: &str, event: &str) -> Result<()> {
    check_name_part("system", system)?;
    check_name_part("event", event)
}

/// Build `<tracing_dir>/events/<system>/<event>/format`.
pub fn format_file_path(tracing_dir: &Path, system: &str, event: &str) -> Result<PathBuf> {
    check_names(system, event)?;
    compose_path(tracing_dir, system, event)
}

// Names must already be checked.
fn compose_path(tracing_dir: &Path, system: &str, event: &str) -> Result<PathBuf> {
    let path = tracing_dir
        .join("events")
        .join(system)
        .join(event)
        .join("format");
    let len = path.as_os_str().len();
    if len >= FORMAT_PATH_MAX {
        return Err(TracepointError::TooLarge {
            len,
            max: FORMAT_PATH_MAX - 1,
        });
    }
    Ok(path)
}

/// Append the contents of the format file for `system:event` to `dest`.
///
/// Names are checked before the filesystem is touched. Callers that build a
/// cache record put `"<system>\n"` in `dest` first.
pub fn append_format_file(
    resolver: &TracingDirResolver,
    dest: &mut Vec<u8>,
    system: &str,
    event: &str,
) -> Result<()> {
    check_names(system, event)?;
    let tracing_dir = resolver.tracing_dir().ok_or(TracepointError::Unsupported)?;
    let path = compose_path(tracing_dir, system, event)?;
    tracing::trace!("reading {}", path.display());
    append_tracing_file(dest, &path)
}
