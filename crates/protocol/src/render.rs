//! JSON rendering in the layouts the model was trained on.
//!
//! Action calls are written inline with `", "` and `": "` separators and
//! non-ASCII escaped as `\uXXXX`; tool catalogues are pretty-printed with a
//! four-space indent and non-ASCII kept verbatim.

use std::io;

use roleplayer_core::ProtocolError;
use serde::Serialize;
use serde_json::ser::{Formatter, PrettyFormatter};

/// Single-line formatter with spaced separators.
struct InlineFormatter {
    ensure_ascii: bool,
}

impl Formatter for InlineFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if !self.ensure_ascii || fragment.is_ascii() {
            return writer.write_all(fragment.as_bytes());
        }
        let mut units = [0u16; 2];
        for ch in fragment.chars() {
            if ch.is_ascii() {
                writer.write_all(&[ch as u8])?;
            } else {
                for unit in ch.encode_utf16(&mut units) {
                    write!(writer, "\\u{:04x}", unit)?;
                }
            }
        }
        Ok(())
    }
}

fn to_string_with<T, F>(value: &T, formatter: F) -> Result<String, ProtocolError>
where
    T: Serialize + ?Sized,
    F: Formatter,
{
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value
        .serialize(&mut ser)
        .map_err(|e| ProtocolError::Render(e.to_string()))?;
    String::from_utf8(buf).map_err(|e| ProtocolError::Render(e.to_string()))
}

/// `{"name": "search", "parameters": {"q": "x"}}`
pub fn inline<T: Serialize + ?Sized>(value: &T) -> Result<String, ProtocolError> {
    to_string_with(value, InlineFormatter { ensure_ascii: true })
}

/// Four-space indented JSON, non-ASCII verbatim.
pub fn pretty<T: Serialize + ?Sized>(value: &T) -> Result<String, ProtocolError> {
    to_string_with(value, PrettyFormatter::with_indent(b"    "))
}
