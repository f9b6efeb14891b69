//! Tracepoint format file parsing.
//!
//! Format files look like:
//! ```text
//! name: sched_switch
//! ID: 316
//! format:
//!         field:unsigned short common_type;       offset:0;       size:2; signed:0;
//!         field:unsigned char common_flags;       offset:2;       size:1; signed:0;
//!         field:unsigned char common_preempt_count;       offset:3;       size:1; signed:0;
//!         field:int common_pid;   offset:4;       size:4; signed:1;
//!
//!         field:char prev_comm[16];       offset:8;       size:16;        signed:0;
//!         field:pid_t prev_pid;   offset:24;      size:4; signed:1;
//!
//! print fmt: "prev_comm=%s prev_pid=%d", REC->prev_comm, REC->prev_pid
//! ```
//!
//! The parser never copies the text. Everything it extracts is recorded as a
//! byte span into the record it was given, so the result is only meaningful
//! next to that record.

use serde::Serialize;

use crate::error::ParseError;

/// Byte range into a format record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Span {
    start: u32,
    len: u32,
}

impl Span {
    pub(crate) fn get<'a>(&self, base: &'a str) -> &'a str {
        let start = self.start as usize;
        &base[start..start + self.len as usize]
    }
}

/// A slice of the record that remembers where it starts, so the parser can
/// record spans while working with ordinary string methods.
#[derive(Clone, Copy, Debug)]
struct Text<'a> {
    start: usize,
    text: &'a str,
}

impl<'a> Text<'a> {
    fn new(text: &'a str) -> Self {
        Text { start: 0, text }
    }

    /// `range` must fall on char boundaries of `self.text`.
    fn slice(self, range: std::ops::Range<usize>) -> Text<'a> {
        Text {
            start: self.start + range.start,
            text: &self.text[range],
        }
    }

    fn after(self, pos: usize) -> Text<'a> {
        self.slice(pos..self.text.len())
    }

    fn before(self, pos: usize) -> Text<'a> {
        self.slice(0..pos)
    }

    /// Empty text positioned at the end of `self`.
    fn end(self) -> Text<'a> {
        self.after(self.text.len())
    }

    fn is_empty(self) -> bool {
        self.text.is_empty()
    }

    fn trim_start(self) -> Text<'a> {
        self.after(self.text.len() - self.text.trim_start().len())
    }

    fn trim_end(self) -> Text<'a> {
        self.before(self.text.trim_end().len())
    }

    fn trim(self) -> Text<'a> {
        self.trim_start().trim_end()
    }

    fn strip_prefix(self, prefix: &str) -> Option<Text<'a>> {
        self.text.starts_with(prefix).then(|| self.after(prefix.len()))
    }

    fn strip_suffix(self, suffix: &str) -> Option<Text<'a>> {
        self.text
            .ends_with(suffix)
            .then(|| self.before(self.text.len() - suffix.len()))
    }

    /// Lines without their `\n` or `\r\n` terminators.
    fn lines(self) -> impl Iterator<Item = Text<'a>> {
        let mut pos = 0;
        self.text.split_inclusive('\n').map(move |raw| {
            let line = self.slice(pos..pos + raw.len());
            pos += raw.len();
            let line = line.strip_suffix("\n").unwrap_or(line);
            line.strip_suffix("\r").unwrap_or(line)
        })
    }

    fn split(self, sep: char) -> impl Iterator<Item = Text<'a>> {
        let mut pos = 0;
        self.text.split(sep).map(move |part| {
            let piece = self.slice(pos..pos + part.len());
            pos += part.len() + sep.len_utf8();
            piece
        })
    }

    fn span(self) -> Span {
        Span {
            start: self.start as u32,
            len: self.text.len() as u32,
        }
    }
}

/// How a field stores repeated elements.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldArray {
    /// A single value.
    None,
    /// `type name[N]`: N elements stored inline.
    Fixed(u16),
    /// `__data_loc type[] name`: a 32-bit (offset, length) locator whose
    /// offset is relative to the start of the raw sample.
    DataLoc,
    /// `__rel_loc type[] name`: like `DataLoc`, but the offset is relative to
    /// the end of the locator.
    RelLoc,
}

#[derive(Clone, Debug)]
pub(crate) struct FieldFormat {
    pub(crate) decl: Span,
    pub(crate) type_name: Span,
    pub(crate) name: Span,
    pub(crate) offset: u16,
    pub(crate) size: u16,
    pub(crate) signed: Option<bool>,
    pub(crate) array: FieldArray,
    pub(crate) element_size: u16,
}

/// Parsed layout of one tracepoint. String data lives in the record passed to
/// [`EventFormat::parse`].
#[derive(Clone, Debug)]
pub(crate) struct EventFormat {
    pub(crate) system: Span,
    pub(crate) name: Span,
    pub(crate) format_text: Span,
    pub(crate) print_fmt: Span,
    pub(crate) id: u32,
    pub(crate) fields: Vec<FieldFormat>,
    pub(crate) common_field_count: usize,
    pub(crate) common_type_index: usize,
}

impl EventFormat {
    /// Parse `record`, which is laid out as `"<system>\n<format file contents>"`
    /// with the system name occupying the first `system_len` bytes.
    ///
    /// `long_size_64` says whether `long` and pointers were 8 bytes on the
    /// system that produced the format, which matters when deducing the element
    /// size of dynamic arrays.
    pub(crate) fn parse(
        record: &str,
        system_len: usize,
        long_size_64: bool,
    ) -> Result<EventFormat, ParseError> {
        if u32::try_from(record.len()).is_err() {
            return Err(ParseError::TooLong { len: record.len() });
        }
        let whole = Text::new(record);
        if record.get(..system_len).is_none() {
            return Err(ParseError::MissingName);
        }
        let system = whole.before(system_len);
        let format_text = match record.get(system_len + 1..) {
            Some(_) => whole.after(system_len + 1),
            None => whole.end(),
        };

        let mut name = None;
        let mut id = None;
        let mut print_fmt = None;
        let mut in_format = false;
        let mut saw_format = false;
        let mut common_field_count = None;
        let mut fields = Vec::new();

        for (lineno, line) in format_text.lines().enumerate() {
            let trimmed = line.trim();

            if in_format {
                if trimmed.is_empty() {
                    if common_field_count.is_none() && !fields.is_empty() {
                        common_field_count = Some(fields.len());
                    }
                    continue;
                }
                if trimmed.text.starts_with("field:") {
                    fields.push(parse_field_line(trimmed, lineno + 1, long_size_64)?);
                    continue;
                }
                in_format = false;
            }

            if let Some(rest) = trimmed.strip_prefix("name:") {
                if name.is_none() {
                    name = Some(rest.trim());
                }
            } else if let Some(rest) = trimmed.strip_prefix("ID:") {
                if id.is_none() {
                    let value = rest.trim().text;
                    id = Some(value.parse::<u32>().map_err(|_| ParseError::InvalidId {
                        value: value.to_string(),
                    })?);
                }
            } else if trimmed.text == "format:" {
                in_format = true;
                saw_format = true;
            } else if let Some(rest) = trimmed.strip_prefix("print fmt:") {
                print_fmt = Some(rest.trim());
            }
        }

        let name = name.filter(|name| !name.is_empty()).ok_or(ParseError::MissingName)?;
        let id = id.ok_or(ParseError::MissingId)?;
        if !saw_format {
            return Err(ParseError::MissingFormat);
        }

        // Without a blank separator line, the common fields are the leading
        // common_* run.
        let common_field_count = common_field_count.unwrap_or_else(|| {
            fields
                .iter()
                .take_while(|field| field.name.get(record).starts_with("common_"))
                .count()
        });

        let common_type_index = fields[..common_field_count]
            .iter()
            .position(|field| field.name.get(record) == "common_type")
            .ok_or(ParseError::MissingCommonType)?;
        let common_type_size = fields[common_type_index].size;
        if !matches!(common_type_size, 1 | 2 | 4) {
            return Err(ParseError::InvalidCommonTypeSize {
                size: common_type_size,
            });
        }

        Ok(EventFormat {
            system: system.span(),
            name: name.span(),
            format_text: format_text.span(),
            print_fmt: print_fmt.map(Text::span).unwrap_or_default(),
            id,
            fields,
            common_field_count,
            common_type_index,
        })
    }

    pub(crate) fn common_type(&self) -> &FieldFormat {
        &self.fields[self.common_type_index]
    }
}

// field:TYPE NAME; offset:N; size:N; signed:N;
fn parse_field_line(
    line: Text<'_>,
    lineno: usize,
    long_size_64: bool,
) -> Result<FieldFormat, ParseError> {
    let invalid = |reason| ParseError::InvalidField {
        line: lineno,
        reason,
    };

    let mut decl = None;
    let mut offset = None;
    let mut size = None;
    let mut signed = None;

    for part in line.split(';') {
        let part = part.trim();
        if let Some(rest) = part.strip_prefix("field:") {
            decl = Some(rest.trim());
        } else if let Some(rest) = part.strip_prefix("offset:") {
            offset = Some(rest.trim().text.parse::<u16>().map_err(|_| invalid("bad offset"))?);
        } else if let Some(rest) = part.strip_prefix("size:") {
            size = Some(rest.trim().text.parse::<u16>().map_err(|_| invalid("bad size"))?);
        } else if let Some(rest) = part.strip_prefix("signed:") {
            signed = match rest.trim().text {
                "0" => Some(false),
                "1" => Some(true),
                _ => return Err(invalid("bad signed")),
            };
        }
    }

    let decl = decl.filter(|decl| !decl.is_empty()).ok_or(invalid("missing declaration"))?;
    let offset = offset.ok_or(invalid("missing offset"))?;
    let size = size.ok_or(invalid("missing size"))?;

    // Peel off a trailing "[N]" first; N may be an expression such as
    // "sizeof(struct sockaddr_in6)".
    let bracketed = decl.strip_suffix("]").and_then(|rest| {
        let open = rest.text.find('[')?;
        Some((rest.before(open), rest.after(open + 1)))
    });
    let (head, count) = match bracketed {
        Some((head, count)) => (head.trim_end(), Some(count.trim().text)),
        None => (decl, None),
    };

    // The name is the last token, after any '*'.
    let name_start = head
        .text
        .rfind(|ch: char| ch.is_whitespace() || ch == '*')
        .map_or(0, |pos| pos + 1);
    let name = head.after(name_start);
    let mut type_name = head.before(name_start).trim_end();

    let mut array = match count {
        None => FieldArray::None,
        Some("") => FieldArray::DataLoc,
        Some(count) => match count.parse::<u16>() {
            Ok(count) => FieldArray::Fixed(count),
            Err(_) => {
                let element = type_element_size(type_name.text, long_size_64).unwrap_or(1);
                FieldArray::Fixed(size / element)
            }
        },
    };
    if name.is_empty() || type_name.is_empty() {
        return Err(invalid("missing field name"));
    }

    for (prefix, kind) in [
        ("__data_loc", FieldArray::DataLoc),
        ("__rel_loc", FieldArray::RelLoc),
    ] {
        if let Some(rest) = type_name.strip_prefix(prefix) {
            array = kind;
            type_name = rest.trim_start();
            type_name = type_name.strip_suffix("[]").unwrap_or(type_name).trim_end();
        }
    }

    let element_size = match array {
        FieldArray::None => size,
        FieldArray::Fixed(count) if count > 0 && size % count == 0 => size / count,
        _ => type_element_size(type_name.text, long_size_64).unwrap_or(1),
    };

    Ok(FieldFormat {
        decl: decl.span(),
        type_name: type_name.span(),
        name: name.span(),
        offset,
        size,
        signed,
        array,
        element_size,
    })
}

/// Size of one element of the C type `type_name`, if it is a well-known
/// scalar type.
pub fn type_element_size(type_name: &str, long_size_64: bool) -> Option<u16> {
    let long_size = if long_size_64 { 8 } else { 4 };
    if type_name.contains('*') {
        return Some(long_size);
    }

    let tokens: Vec<&str> = type_name
        .split_whitespace()
        .filter(|token| !matches!(*token, "const" | "volatile" | "signed" | "unsigned"))
        .collect();

    let size = match tokens.as_slice() {
        [] | ["int"] => 4,
        ["char"] | ["bool"] | ["_Bool"] => 1,
        ["short"] | ["short", "int"] => 2,
        ["long"] | ["long", "int"] => long_size,
        ["long", "long"] | ["long", "long", "int"] => 8,
        [typedef] => match *typedef {
            "u8" | "s8" | "__u8" | "__s8" | "uint8_t" | "int8_t" => 1,
            "u16" | "s16" | "__u16" | "__s16" | "__le16" | "__be16" | "uint16_t" | "int16_t" => 2,
            "u32" | "s32" | "__u32" | "__s32" | "__le32" | "__be32" | "uint32_t" | "int32_t"
            | "pid_t" | "uid_t" | "gid_t" | "dev_t" | "gfp_t" => 4,
            "u64" | "s64" | "__u64" | "__s64" | "__le64" | "__be64" | "uint64_t" | "int64_t"
            | "loff_t" => 8,
            "size_t" | "ssize_t" | "off_t" | "uintptr_t" | "intptr_t" => long_size,
            _ => return None,
        },
        _ => return None,
    };
    Some(size)
}
