//! Parsed tracepoint metadata that owns its format text.

use std::fmt;

use serde::ser::{Serialize, SerializeStruct, Serializer};

use crate::error::{ParseError, Result, TracepointError};
use crate::format::{EventFormat, FieldArray, FieldFormat};
use crate::name::TracepointName;

/// Location of the `common_type` field within a raw sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub struct CommonTypeLayout {
    pub offset: u16,
    /// 1, 2 or 4.
    pub size: u8,
}

impl CommonTypeLayout {
    /// Read the host-endian `common_type` value from `raw`, if it is long
    /// enough.
    pub fn read(&self, raw: &[u8]) -> Option<u32> {
        let start = usize::from(self.offset);
        let bytes = raw.get(start..start + usize::from(self.size))?;
        match *bytes {
            [b0] => Some(u32::from(b0)),
            [b0, b1] => Some(u32::from(u16::from_ne_bytes([b0, b1]))),
            [b0, b1, b2, b3] => Some(u32::from_ne_bytes([b0, b1, b2, b3])),
            _ => None,
        }
    }
}

/// Metadata for one tracepoint.
///
/// Owns the `"<system>\n<format file contents>"` record it was parsed from.
/// Every string handed out borrows from that record, so nothing outlives the
/// `EventMetadata` it came from.
pub struct EventMetadata {
    record: Box<str>,
    format: EventFormat,
}

impl EventMetadata {
    /// Parse `format_text` for an event of system `system`.
    pub fn from_format(system: &str, format_text: &str, long_size_64: bool) -> Result<Self> {
        let mut record = Vec::new();
        record
            .try_reserve_exact(system.len() + 1 + format_text.len())
            .map_err(|_| TracepointError::OutOfMemory)?;
        record.extend_from_slice(system.as_bytes());
        record.push(b'\n');
        record.extend_from_slice(format_text.as_bytes());
        Self::from_record(record, system.len(), long_size_64)
    }

    /// Parse a record already laid out as `"<system>\n<format>"`, where the
    /// system name is the first `system_len` bytes.
    pub(crate) fn from_record(record: Vec<u8>, system_len: usize, long_size_64: bool) -> Result<Self> {
        let record = String::from_utf8(record)
            .map_err(|_| ParseError::InvalidUtf8)?
            .into_boxed_str();
        let format = EventFormat::parse(&record, system_len, long_size_64)?;
        Ok(EventMetadata { record, format })
    }

    /// The event ID from the format's `ID:` line, matching `common_type` in
    /// raw samples.
    pub fn id(&self) -> u32 {
        self.format.id
    }

    pub fn name(&self) -> TracepointName<'_> {
        TracepointName::new(self.system_name(), self.event_name())
    }

    pub fn system_name(&self) -> &str {
        self.format.system.get(&self.record)
    }

    pub fn event_name(&self) -> &str {
        self.format.name.get(&self.record)
    }

    /// The format file contents this metadata was parsed from.
    pub fn format_text(&self) -> &str {
        self.format.format_text.get(&self.record)
    }

    /// Text after `print fmt:`, empty if the format had none.
    pub fn print_fmt(&self) -> &str {
        self.format.print_fmt.get(&self.record)
    }

    /// All fields, common fields first, in format file order.
    pub fn fields(&self) -> impl ExactSizeIterator<Item = Field<'_>> + '_ {
        self.wrap(&self.format.fields)
    }

    /// The `common_*` fields shared by every tracepoint.
    pub fn common_fields(&self) -> impl ExactSizeIterator<Item = Field<'_>> + '_ {
        self.wrap(&self.format.fields[..self.format.common_field_count])
    }

    /// The fields specific to this tracepoint.
    pub fn event_fields(&self) -> impl ExactSizeIterator<Item = Field<'_>> + '_ {
        self.wrap(&self.format.fields[self.format.common_field_count..])
    }

    pub fn field(&self, name: &str) -> Option<Field<'_>> {
        self.fields().find(|field| field.name() == name)
    }

    pub fn common_type_offset(&self) -> u16 {
        self.format.common_type().offset
    }

    pub fn common_type_size(&self) -> u8 {
        // The parser only accepts sizes 1, 2 and 4.
        self.format.common_type().size as u8
    }

    pub fn common_type_layout(&self) -> CommonTypeLayout {
        CommonTypeLayout {
            offset: self.common_type_offset(),
            size: self.common_type_size(),
        }
    }

    fn wrap<'a>(
        &'a self,
        fields: &'a [FieldFormat],
    ) -> impl ExactSizeIterator<Item = Field<'a>> + 'a {
        fields.iter().map(move |format| Field {
            record: &self.record,
            format,
        })
    }
}

impl fmt::Debug for EventMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventMetadata")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("fields", &self.format.fields.len())
            .finish()
    }
}

impl Serialize for EventMetadata {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("EventMetadata", 6)?;
        state.serialize_field("id", &self.id())?;
        state.serialize_field("system", self.system_name())?;
        state.serialize_field("name", self.event_name())?;
        state.serialize_field("common_type", &self.common_type_layout())?;
        state.serialize_field("print_fmt", self.print_fmt())?;
        state.serialize_field("fields", &self.fields().collect::<Vec<_>>())?;
        state.end()
    }
}

/// One field of a tracepoint, borrowed from its [`EventMetadata`].
#[derive(Clone, Copy)]
pub struct Field<'a> {
    record: &'a str,
    format: &'a FieldFormat,
}

impl<'a> Field<'a> {
    pub fn name(&self) -> &'a str {
        self.format.name.get(self.record)
    }

    /// The C type, without array brackets or `__data_loc`/`__rel_loc`.
    pub fn type_name(&self) -> &'a str {
        self.format.type_name.get(self.record)
    }

    /// The declaration exactly as written after `field:`.
    pub fn decl(&self) -> &'a str {
        self.format.decl.get(self.record)
    }

    pub fn offset(&self) -> u16 {
        self.format.offset
    }

    pub fn size(&self) -> u16 {
        self.format.size
    }

    /// `None` if the format file did not say.
    pub fn signed(&self) -> Option<bool> {
        self.format.signed
    }

    pub fn array(&self) -> FieldArray {
        self.format.array
    }

    pub fn element_size(&self) -> u16 {
        self.format.element_size
    }
}

impl fmt::Debug for Field<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("decl", &self.decl())
            .field("offset", &self.offset())
            .field("size", &self.size())
            .finish()
    }
}

impl Serialize for Field<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Field", 7)?;
        state.serialize_field("name", self.name())?;
        state.serialize_field("type", self.type_name())?;
        state.serialize_field("offset", &self.offset())?;
        state.serialize_field("size", &self.size())?;
        state.serialize_field("signed", &self.signed())?;
        state.serialize_field("array", &self.array())?;
        state.serialize_field("element_size", &self.element_size())?;
        state.end()
    }
}
