//! Loads, parses and caches tracepoint metadata.
//!
//! Entries live in an append-only arena and are addressed by their index. The
//! ID index and the name index both store arena indices, so neither can be
//! invalidated by later insertions. Entries are never removed; they live as
//! long as the cache.
//!
//! The cache does no locking of its own. Mutating calls need `&mut self`, so
//! sharing it across threads means wrapping it the usual way (`Mutex`,
//! `RwLock`).

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Result, TracepointError};
use crate::format_file::append_format_file;
use crate::metadata::{CommonTypeLayout, EventMetadata};
use crate::name::TracepointName;
use crate::tracing_dir::TracingDirResolver;

/// Whether `long` is 8 bytes on this system.
pub const NATIVE_LONG_SIZE_64: bool = std::mem::size_of::<libc::c_long>() == 8;

pub struct TracepointCache {
    resolver: Arc<TracingDirResolver>,
    entries: Vec<EventMetadata>,
    by_id: HashMap<u32, usize>,
    by_name: HashMap<Box<str>, HashMap<Box<str>, usize>>,
    // Fixed by the first insertion and never revisited.
    common_type: Option<CommonTypeLayout>,
}

impl Default for TracepointCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TracepointCache {
    /// An empty cache that finds format files through the process-wide
    /// tracing directory.
    pub fn new() -> Self {
        Self::with_resolver(TracingDirResolver::global())
    }

    /// An empty cache that finds format files through `resolver`.
    pub fn with_resolver(resolver: Arc<TracingDirResolver>) -> Self {
        TracepointCache {
            resolver,
            entries: Vec::new(),
            by_id: HashMap::new(),
            by_name: HashMap::new(),
            common_type: None,
        }
    }

    pub fn resolver(&self) -> &TracingDirResolver {
        &self.resolver
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cached events in insertion order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &EventMetadata> {
        self.entries.iter()
    }

    /// Layout of the `common_type` field, `None` while the cache is empty.
    pub fn common_type(&self) -> Option<CommonTypeLayout> {
        self.common_type
    }

    /// Offset of `common_type` within raw samples (usually 0).
    pub fn common_type_offset(&self) -> Option<u16> {
        self.common_type.map(|layout| layout.offset)
    }

    /// Size of `common_type` (1, 2 or 4; usually 2).
    pub fn common_type_size(&self) -> Option<u8> {
        self.common_type.map(|layout| layout.size)
    }

    /// Look up an event by the ID found in its `common_type` field. This is
    /// not the perf sample ID.
    pub fn find_by_id(&self, id: u32) -> Option<&EventMetadata> {
        self.by_id.get(&id).map(|&index| &self.entries[index])
    }

    pub fn find_by_name(&self, name: TracepointName<'_>) -> Option<&EventMetadata> {
        self.name_index(name).map(|index| &self.entries[index])
    }

    /// Look up the event a raw (host-endian) sample belongs to, using the
    /// cache's `common_type` layout to pull the ID out of `raw`.
    pub fn find_by_raw_data(&self, raw: &[u8]) -> Option<&EventMetadata> {
        let id = self.common_type?.read(raw)?;
        self.find_by_id(id)
    }

    /// Parse `format_text` and add the result. Fails with `AlreadyExists` if an
    /// event with the same ID or name is cached; nothing changes on failure.
    pub fn add_from_format(
        &mut self,
        system: &str,
        format_text: &str,
        long_size_64: bool,
    ) -> Result<&EventMetadata> {
        let metadata = EventMetadata::from_format(system, format_text, long_size_64)?;
        let index = self.insert(metadata).map_err(|(err, _)| err)?;
        Ok(&self.entries[index])
    }

    /// Load `events/<system>/<event>/format` from the tracing directory and
    /// add it. Fails with `AlreadyExists` if an event with the same ID or name
    /// is cached.
    pub fn add_from_system(&mut self, name: TracepointName<'_>) -> Result<&EventMetadata> {
        let index = self.load_and_insert(name).map_err(|(err, _)| err)?;
        Ok(&self.entries[index])
    }

    /// Return the cached event for `name`, loading it from the tracing
    /// directory if needed.
    ///
    /// An `AlreadyExists` result from the load is not an error here: the entry
    /// that collided is returned instead.
    pub fn find_or_add_from_system(&mut self, name: TracepointName<'_>) -> Result<&EventMetadata> {
        if let Some(index) = self.name_index(name) {
            return Ok(&self.entries[index]);
        }
        match self.load_and_insert(name) {
            Ok(index) | Err((_, Some(index))) => Ok(&self.entries[index]),
            Err((err, None)) => Err(err),
        }
    }

    fn name_index(&self, name: TracepointName<'_>) -> Option<usize> {
        self.by_name.get(name.system)?.get(name.event).copied()
    }

    fn load_and_insert(
        &mut self,
        name: TracepointName<'_>,
    ) -> std::result::Result<usize, (TracepointError, Option<usize>)> {
        let mut record = Vec::new();
        record
            .try_reserve(name.system.len() + 1)
            .map_err(|_| (TracepointError::OutOfMemory, None))?;
        record.extend_from_slice(name.system.as_bytes());
        record.push(b'\n');
        append_format_file(&self.resolver, &mut record, name.system, name.event)
            .map_err(|err| (err, None))?;

        // The system name runs up to the first newline.
        let system_len = record
            .iter()
            .position(|&ch| ch == b'\n')
            .unwrap_or(record.len());
        let metadata = EventMetadata::from_record(record, system_len, NATIVE_LONG_SIZE_64)
            .map_err(|err| (err, None))?;
        self.insert(metadata)
    }

    /// Add `metadata` to both indices. On collision returns `AlreadyExists`
    /// along with the index of the entry that is in the way.
    fn insert(
        &mut self,
        metadata: EventMetadata,
    ) -> std::result::Result<usize, (TracepointError, Option<usize>)> {
        let id = metadata.id();
        let existing = self
            .by_id
            .get(&id)
            .copied()
            .or_else(|| self.name_index(metadata.name()));
        if let Some(existing) = existing {
            tracing::debug!("not adding {} (id {}): already cached", metadata.name(), id);
            let err = TracepointError::AlreadyExists {
                id,
                name: metadata.name().to_string(),
            };
            return Err((err, Some(existing)));
        }

        // Index space is reserved; the inserts below cannot fail.
        let slot = self.reserve_slot(&metadata).map_err(|err| (err, None))?;

        let layout = metadata.common_type_layout();
        match self.common_type {
            None => self.common_type = Some(layout),
            Some(fixed) if fixed != layout => {
                tracing::warn!(
                    "{} has common_type at offset {} size {}, cache uses offset {} size {}",
                    metadata.name(),
                    layout.offset,
                    layout.size,
                    fixed.offset,
                    fixed.size
                );
            }
            Some(_) => {}
        }

        let index = self.entries.len();
        self.by_id.insert(id, index);
        match slot.new_system {
            Some((system, mut events)) => {
                events.insert(slot.event, index);
                self.by_name.insert(system, events);
            }
            None => {
                if let Some(events) = self.by_name.get_mut(metadata.system_name()) {
                    events.insert(slot.event, index);
                }
            }
        }
        tracing::debug!("cached {} (id {})", metadata.name(), id);
        self.entries.push(metadata);
        Ok(index)
    }

    fn reserve_slot(&mut self, metadata: &EventMetadata) -> Result<NameSlot> {
        let event = try_boxed_str(metadata.event_name())?;
        self.entries.try_reserve(1).map_err(|_| TracepointError::OutOfMemory)?;
        self.by_id.try_reserve(1).map_err(|_| TracepointError::OutOfMemory)?;

        let new_system = match self.by_name.get_mut(metadata.system_name()) {
            Some(events) => {
                events.try_reserve(1).map_err(|_| TracepointError::OutOfMemory)?;
                None
            }
            None => {
                self.by_name.try_reserve(1).map_err(|_| TracepointError::OutOfMemory)?;
                let mut events = HashMap::new();
                events.try_reserve(1).map_err(|_| TracepointError::OutOfMemory)?;
                Some((try_boxed_str(metadata.system_name())?, events))
            }
        };
        Ok(NameSlot { event, new_system })
    }
}

/// Name index space reserved for one insertion.
struct NameSlot {
    event: Box<str>,
    // Set when the system has no events cached yet.
    new_system: Option<(Box<str>, HashMap<Box<str>, usize>)>,
}

fn try_boxed_str(value: &str) -> Result<Box<str>> {
    let mut owned = String::new();
    owned
        .try_reserve_exact(value.len())
        .map_err(|_| TracepointError::OutOfMemory)?;
    owned.push_str(value);
    Ok(owned.into_boxed_str())
}
