//! Tracepoint metadata cache.
//!
//! This library finds the kernel's tracing directory, reads tracepoint
//! `format` files out of it, parses them and caches the result so raw sample
//! bytes can be mapped back to the event that produced them.
//!
//! # Modules
//!
//! - [`tracing_dir`] - Locating the tracefs (or debugfs) mount
//! - [`reader`] - Reading kernel pseudo-files of unknown size
//! - [`format_file`] - Composing and loading `events/<system>/<event>/format`
//! - [`format`] - Format file parsing
//! - [`cache`] - The ID/name indexed metadata cache
//!
//! # Example
//!
//! ```no_run
//! use tracepoint_cache::{TracepointCache, TracepointName};
//!
//! let mut cache = TracepointCache::new();
//! let switch = cache
//!     .find_or_add_from_system(TracepointName::new("sched", "sched_switch"))
//!     .expect("Failed to load sched:sched_switch");
//! println!("{} has id {}", switch.name(), switch.id());
//!
//! // Later, map a raw sample back to its metadata.
//! let raw: &[u8] = &[0u8; 64];
//! if let Some(metadata) = cache.find_by_raw_data(raw) {
//!     println!("sample is {}", metadata.name());
//! }
//! ```

pub mod cache;
pub mod error;
pub mod format;
pub mod format_file;
pub mod metadata;
pub mod name;
pub mod reader;
pub mod tracing_dir;

pub use cache::{TracepointCache, NATIVE_LONG_SIZE_64};
pub use error::{ParseError, TracepointError};
pub use format::FieldArray;
pub use format_file::{append_format_file, format_file_path};
pub use metadata::{CommonTypeLayout, EventMetadata, Field};
pub use name::TracepointName;
pub use reader::append_tracing_file;
pub use tracing_dir::{tracing_directory, TracingDirResolver};
