//! Turns captured report text back into structured records.

use memstat_core::format::{Label, HEX32_WIDTH};
use memstat_core::report::labels;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("line {line}: not a heap, isr_stack or thread record")]
    UnknownRecord { line: usize },
    #[error("line {line}: expected {expected:?}")]
    ExpectedLabel { line: usize, expected: &'static str },
    #[error("line {line}: field '{field}' is not an 8-digit hex value")]
    BadHex { line: usize, field: &'static str },
    #[error("report ends in the middle of a line")]
    Truncated,
}

/// How much of the interrupt stack the canary scan found used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StackUsage {
    NotMeasured,
    Measured { bytes: u32 },
    AtCapacity { bytes: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    Heap {
        start: u32,
        end: u32,
        size: u32,
        used: u32,
        alloc_ok: u32,
        alloc_fail: u32,
    },
    IsrStack {
        start: u32,
        end: u32,
        size: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        used: Option<StackUsage>,
    },
    Thread {
        id: u32,
        entry: u32,
        stack_start: u32,
        stack_end: u32,
        stack_size: u32,
        stack_used: u32,
    },
}

const LINE_BREAK: &str = "\r\n";

/// Parses a complete report stream. Every record must end with CRLF.
pub fn decode(text: &str) -> Result<Vec<Record>, DecodeError> {
    let mut lines: Vec<&str> = text.split(LINE_BREAK).collect();
    // `split` leaves an empty tail after the last terminator.
    match lines.pop() {
        Some("") | None => {}
        Some(_) => return Err(DecodeError::Truncated),
    }
    lines
        .into_iter()
        .enumerate()
        .map(|(i, line)| decode_line(i + 1, line))
        .collect()
}

fn decode_line(line: usize, text: &str) -> Result<Record, DecodeError> {
    let mut f = Fields {
        rest: text,
        line,
    };
    if f.rest.starts_with(label(labels::HEAP_START)) {
        let start = f.field(labels::HEAP_START, "start")?;
        let end = f.field(labels::END, "end")?;
        let size = f.field(labels::SIZE, "size")?;
        let used = f.field(labels::USED, "used")?;
        let alloc_ok = f.field(labels::ALLOC_OK, "ok")?;
        let alloc_fail = f.field(labels::ALLOC_FAIL, "fail")?;
        f.finish()?;
        Ok(Record::Heap {
            start,
            end,
            size,
            used,
            alloc_ok,
            alloc_fail,
        })
    } else if f.rest.starts_with(label(labels::ISR_STACK_START)) {
        let start = f.field(labels::ISR_STACK_START, "start")?;
        let end = f.field(labels::END, "end")?;
        let size = f.field(labels::SIZE, "size")?;
        let used = if f.rest.starts_with(label(labels::USED)) {
            f.expect(labels::USED)?;
            Some(f.stack_usage()?)
        } else {
            None
        };
        f.finish()?;
        Ok(Record::IsrStack {
            start,
            end,
            size,
            used,
        })
    } else if f.rest.starts_with(label(labels::STACK_START)) {
        let stack_start = f.field(labels::STACK_START, "start")?;
        let stack_end = f.field(labels::END, "end")?;
        let stack_size = f.field(labels::SIZE, "size")?;
        let stack_used = f.field(labels::USED, "used")?;
        f.expect(labels::STACK_CLOSE)?;
        let id = f.field(labels::THREAD_ID, "id")?;
        let entry = f.field(labels::ENTRY, "entry")?;
        f.finish()?;
        Ok(Record::Thread {
            id,
            entry,
            stack_start,
            stack_end,
            stack_size,
            stack_used,
        })
    } else {
        Err(DecodeError::UnknownRecord { line })
    }
}

fn label(l: Label) -> &'static str {
    // Labels are built from `&str`, so this never falls through.
    std::str::from_utf8(l.as_bytes()).unwrap_or_default()
}

struct Fields<'a> {
    rest: &'a str,
    line: usize,
}

impl Fields<'_> {
    fn expect(&mut self, l: Label) -> Result<(), DecodeError> {
        let text = label(l);
        match self.rest.strip_prefix(text) {
            Some(rest) => {
                self.rest = rest;
                Ok(())
            }
            None => Err(DecodeError::ExpectedLabel {
                line: self.line,
                expected: text,
            }),
        }
    }

    fn hex(&mut self, field: &'static str) -> Result<u32, DecodeError> {
        let bad = DecodeError::BadHex {
            line: self.line,
            field,
        };
        let digits = self.rest.get(..HEX32_WIDTH).ok_or(bad.clone())?;
        if !digits
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'A'..=b'F').contains(&b))
        {
            return Err(bad);
        }
        let value = u32::from_str_radix(digits, 16).map_err(|_| bad)?;
        self.rest = &self.rest[HEX32_WIDTH..];
        Ok(value)
    }

    fn field(&mut self, l: Label, name: &'static str) -> Result<u32, DecodeError> {
        self.expect(l)?;
        self.hex(name)
    }

    fn stack_usage(&mut self) -> Result<StackUsage, DecodeError> {
        if self.rest.starts_with(label(labels::NOT_MEASURED)) {
            self.expect(labels::NOT_MEASURED)?;
            return Ok(StackUsage::NotMeasured);
        }
        let bytes = self.hex("used")?;
        if self.rest.starts_with(label(labels::AT_CAPACITY)) {
            self.expect(labels::AT_CAPACITY)?;
            return Ok(StackUsage::AtCapacity { bytes });
        }
        Ok(StackUsage::Measured { bytes })
    }

    /// The record's closing text; LINE_END minus the CRLF the splitter consumed.
    fn finish(&mut self) -> Result<(), DecodeError> {
        let close = label(labels::LINE_END).trim_end_matches(LINE_BREAK);
        if self.rest == close {
            self.rest = "";
            Ok(())
        } else {
            Err(DecodeError::ExpectedLabel {
                line: self.line,
                expected: label(labels::LINE_END),
            })
        }
    }
}
