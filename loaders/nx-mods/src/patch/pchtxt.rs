//! IPSwitch text patch (`.pchtxt`) parsing
//!
//! A pchtxt file names its target build id on the first meaningful line
//! (`@nsobid-<id>`), then lists patch records between `@enabled` and
//! `@disabled` markers. Record lines are an offset in hex followed by the
//! replacement values: runs of hex bytes or double-quoted ASCII strings.
//! `@stop` ends parsing, `@flag offset_shift <n>` displaces the offsets of
//! every following record, and `//` starts a comment.

use super::{MemPatch, ParsedPatch};
use crate::{Error, Result};

/// Build id declaration prefix
const BID_HEADER: &str = "@nsobid-";

/// Parse a pchtxt document into its build id and record set
pub fn parse(text: &str) -> Result<ParsedPatch> {
    let mut lines = text.lines();

    let build_id = loop {
        let line = lines
            .next()
            .ok_or_else(|| Error::invalid_patch("missing @nsobid header"))?;
        let line = strip_comment(line).trim();
        if line.is_empty() {
            continue;
        }
        let Some(id) = line.strip_prefix(BID_HEADER) else {
            return Err(Error::invalid_patch("first line is not an @nsobid header"));
        };
        break id.trim().trim_end_matches('0').to_uppercase();
    };

    let mut patch = MemPatch::new();
    let mut enabled = false;
    let mut offset_shift: i64 = 0;

    for line in lines {
        let line = strip_comment(line).trim();
        if line.is_empty() {
            continue;
        }

        if line == "@stop" {
            break;
        } else if line.starts_with("@enabled") {
            enabled = true;
        } else if line.starts_with("@disabled") {
            enabled = false;
        } else if let Some(flag) = line.strip_prefix("@flag") {
            let mut parts = flag.split_whitespace();
            if parts.next() == Some("offset_shift") {
                let value = parts
                    .next()
                    .ok_or_else(|| Error::invalid_patch("offset_shift without a value"))?;
                offset_shift = parse_int(value)
                    .ok_or_else(|| Error::invalid_patch("bad offset_shift value"))?;
            }
            // Other flags carry no meaning for compilation.
        } else if line.starts_with('@') {
            // Unknown directive, skip.
        } else if enabled {
            let (offset, values) = parse_record(line)?;
            let offset = offset as i64 + offset_shift;
            let offset = u32::try_from(offset)
                .map_err(|_| Error::invalid_patch("shifted offset out of range"))?;
            patch.add(offset, values);
        }
    }

    Ok(ParsedPatch { build_id, patch })
}

/// Drop everything from `//` onward
fn strip_comment(line: &str) -> &str {
    match line.find("//") {
        Some(pos) => &line[..pos],
        None => line,
    }
}

/// Parse a decimal or `0x`-prefixed hex integer
fn parse_int(value: &str) -> Option<i64> {
    if let Some(hex) = value.strip_prefix("0x").or_else(|| value.strip_prefix("-0x")) {
        let parsed = i64::from_str_radix(hex, 16).ok()?;
        Some(if value.starts_with('-') { -parsed } else { parsed })
    } else {
        value.parse().ok()
    }
}

/// Parse one record line: `<hex offset> <values...>`
fn parse_record(line: &str) -> Result<(u32, Vec<u8>)> {
    let (offset_text, rest) = line
        .split_once(char::is_whitespace)
        .ok_or_else(|| Error::invalid_patch(format!("record without values: '{line}'")))?;

    let offset = u32::from_str_radix(offset_text.trim_start_matches("0x"), 16)
        .map_err(|_| Error::invalid_patch(format!("bad record offset: '{offset_text}'")))?;

    let values = parse_values(rest)?;
    if values.is_empty() {
        return Err(Error::invalid_patch(format!(
            "record without values: '{line}'"
        )));
    }

    Ok((offset, values))
}

/// Parse the value portion of a record: hex runs and quoted strings
fn parse_values(text: &str) -> Result<Vec<u8>> {
    let mut values = Vec::new();
    let mut chars = text.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '"' {
            chars.next();
            let mut escaped = false;
            loop {
                let Some(c) = chars.next() else {
                    return Err(Error::invalid_patch("unterminated string value"));
                };
                if escaped {
                    let byte = match c {
                        'n' => b'\n',
                        't' => b'\t',
                        '0' => 0,
                        other => other as u8,
                    };
                    values.push(byte);
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == '"' {
                    break;
                } else {
                    values.push(c as u8);
                }
            }
        } else {
            let mut token = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() || c == '"' {
                    break;
                }
                token.push(c);
                chars.next();
            }
            let bytes = hex::decode(&token)
                .map_err(|_| Error::invalid_patch(format!("bad hex value: '{token}'")))?;
            values.extend_from_slice(&bytes);
        }
    }

    Ok(values)
}
