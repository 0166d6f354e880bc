//! Crash-safe journal of mirror mutations.
//!
//! ## Record framing
//!
//! ```text
//! | magic "LSJR" (4) | version u16 (2) | kind u8 (1) | len u32 (4) | payload | crc32 (4) |
//! ```
//!
//! Integers are little endian. The CRC covers everything before it.
//!
//! A record cut short at the end of the journal is the mark of a crash
//! mid-append: replay drops it and truncates the journal. Any other damage
//! is corruption and stops the open.

use ledgersync_codec::{CodecError, TaggedValue, WireDecoder, WireEncoder};
use ledgersync_protocol::LogicalTimestamp;
use tracing::warn;

use super::backend::JournalBackend;
use super::schema::Target;
use crate::error::{CoreError, CoreResult};

/// Magic bytes identifying a journal record.
pub const JOURNAL_MAGIC: [u8; 4] = *b"LSJR";
/// Current journal format version.
pub const JOURNAL_VERSION: u16 = 1;

/// magic (4) + version (2) + kind (1) + length (4)
const HEADER_SIZE: usize = 11;
const CRC_SIZE: usize = 4;

/// Kind of journal record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordKind {
    /// Cells from one applied batch, with the cursor it advanced to.
    Batch = 1,
    /// Cursor moved without any cell changes.
    Cursor = 2,
    /// Full state; replaces everything before it.
    Snapshot = 3,
}

impl RecordKind {
    /// Converts a byte to a record kind.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Batch),
            2 => Some(Self::Cursor),
            3 => Some(Self::Snapshot),
            _ => None,
        }
    }
}

/// One resolved cell assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    /// Table or prefs map.
    pub target: Target,
    /// Row id, or preference key for prefs.
    pub row: String,
    /// Field name. Empty for prefs.
    pub field: String,
    /// Assigned value.
    pub value: TaggedValue,
}

/// Payload shared by every record kind.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct JournalEntry {
    /// Cell assignments in apply order.
    pub cells: Vec<Cell>,
    /// Cursor after this entry, if it moved.
    pub cursor: Option<LogicalTimestamp>,
}

impl JournalEntry {
    const NAME: &'static str = "JournalEntry";
    const CELL: &'static str = "JournalCell";

    fn encode(&self) -> CoreResult<Vec<u8>> {
        let mut enc = WireEncoder::new();
        for cell in &self.cells {
            let mut inner = WireEncoder::new();
            inner
                .string(1, cell.target.name())
                .string(2, &cell.row)
                .string(3, &cell.field)
                .string(4, &cell.value.encode()?);
            enc.message(1, inner.as_bytes());
        }
        if let Some(cursor) = &self.cursor {
            enc.string(2, &cursor.to_string());
        }
        Ok(enc.into_bytes())
    }

    fn decode(bytes: &[u8]) -> CoreResult<Self> {
        let mut entry = Self::default();
        let mut decoder = WireDecoder::new(bytes);
        while let Some((field, value)) = decoder.next_field()? {
            match field {
                1 => entry.cells.push(Self::decode_cell(value.as_bytes(Self::NAME, field)?)?),
                2 => entry.cursor = Some(value.as_str(Self::NAME, field)?.parse::<LogicalTimestamp>()?),
                other => return Err(CodecError::unknown_field(Self::NAME, other).into()),
            }
        }
        Ok(entry)
    }

    fn decode_cell(bytes: &[u8]) -> CoreResult<Cell> {
        let (mut target, mut row, mut field_name, mut value) = ("", "", "", "");
        let mut decoder = WireDecoder::new(bytes);
        while let Some((field, raw)) = decoder.next_field()? {
            match field {
                1 => target = raw.as_str(Self::CELL, field)?,
                2 => row = raw.as_str(Self::CELL, field)?,
                3 => field_name = raw.as_str(Self::CELL, field)?,
                4 => value = raw.as_str(Self::CELL, field)?,
                other => return Err(CodecError::unknown_field(Self::CELL, other).into()),
            }
        }
        let target = Target::from_name(target).ok_or_else(|| {
            CoreError::journal_corruption(format!("journal names unknown table {target:?}"))
        })?;
        Ok(Cell {
            target,
            row: row.to_string(),
            field: field_name.to_string(),
            value: TaggedValue::decode(value)?,
        })
    }
}

/// Frames a record.
///
/// # Errors
///
/// Fails if the payload does not fit the 4-byte length field.
pub fn encode_record(kind: RecordKind, payload: &[u8]) -> CoreResult<Vec<u8>> {
    let len = u32::try_from(payload.len()).map_err(|_| {
        CoreError::journal_corruption(format!("record payload of {} bytes too large", payload.len()))
    })?;
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
    buf.extend_from_slice(&JOURNAL_MAGIC);
    buf.extend_from_slice(&JOURNAL_VERSION.to_le_bytes());
    buf.push(kind as u8);
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(payload);
    let crc = compute_crc32(&buf);
    buf.extend_from_slice(&crc.to_le_bytes());
    Ok(buf)
}

/// Result of scanning raw journal bytes.
#[derive(Debug)]
pub struct Scan {
    /// Records in journal order.
    pub records: Vec<(RecordKind, JournalEntry)>,
    /// Length of the well-formed prefix.
    pub valid_len: u64,
    /// True if a partial record followed the valid prefix.
    pub torn_tail: bool,
}

/// Parses every record in `data`.
///
/// # Errors
///
/// Returns [`CoreError::ChecksumMismatch`] or
/// [`CoreError::JournalCorruption`] for damage other than a torn tail.
pub fn scan(data: &[u8]) -> CoreResult<Scan> {
    let mut records = Vec::new();
    let mut pos = 0usize;

    while pos < data.len() {
        let rest = &data[pos..];
        if rest.len() < HEADER_SIZE {
            return Ok(torn(records, pos));
        }
        if rest[0..4] != JOURNAL_MAGIC {
            return Err(CoreError::journal_corruption(format!(
                "bad magic at offset {pos}"
            )));
        }
        let version = u16::from_le_bytes([rest[4], rest[5]]);
        if version != JOURNAL_VERSION {
            return Err(CoreError::journal_corruption(format!(
                "unsupported journal version {version} at offset {pos}"
            )));
        }
        let kind = RecordKind::from_byte(rest[6]).ok_or_else(|| {
            CoreError::journal_corruption(format!("unknown record kind {} at offset {pos}", rest[6]))
        })?;
        let len = u32::from_le_bytes([rest[7], rest[8], rest[9], rest[10]]) as usize;

        let total = HEADER_SIZE + len + CRC_SIZE;
        if rest.len() < total {
            return Ok(torn(records, pos));
        }

        let body_end = HEADER_SIZE + len;
        let expected = u32::from_le_bytes([
            rest[body_end],
            rest[body_end + 1],
            rest[body_end + 2],
            rest[body_end + 3],
        ]);
        let actual = compute_crc32(&rest[..body_end]);
        if expected != actual {
            return Err(CoreError::ChecksumMismatch { expected, actual });
        }

        let entry = JournalEntry::decode(&rest[HEADER_SIZE..body_end])?;
        records.push((kind, entry));
        pos += total;
    }

    Ok(Scan {
        records,
        valid_len: pos as u64,
        torn_tail: false,
    })
}

fn torn(records: Vec<(RecordKind, JournalEntry)>, pos: usize) -> Scan {
    Scan {
        records,
        valid_len: pos as u64,
        torn_tail: true,
    }
}

/// Record-level access to a journal backend.
#[derive(Debug)]
pub struct Journal {
    backend: Box<dyn JournalBackend>,
    sync_on_append: bool,
}

impl Journal {
    /// Wraps a backend.
    pub fn new(backend: Box<dyn JournalBackend>, sync_on_append: bool) -> Self {
        Self {
            backend,
            sync_on_append,
        }
    }

    /// Reads every record, dropping a torn tail.
    ///
    /// # Errors
    ///
    /// Fails on corruption or I/O errors.
    pub fn replay(&mut self) -> CoreResult<Vec<(RecordKind, JournalEntry)>> {
        let data = self.backend.read_all()?;
        let scan = scan(&data)?;
        if scan.torn_tail {
            warn!(
                valid = scan.valid_len,
                size = data.len(),
                "journal ends in a partial record, truncating"
            );
            self.backend.truncate(scan.valid_len)?;
        }
        Ok(scan.records)
    }

    /// Appends one record.
    ///
    /// # Errors
    ///
    /// Fails on encoding or I/O errors. On failure the journal is cut back to
    /// its previous length so later appends do not follow a partial record.
    pub fn append(&mut self, kind: RecordKind, entry: &JournalEntry) -> CoreResult<()> {
        let record = encode_record(kind, &entry.encode()?)?;
        let before = self.backend.size()?;
        let written = self.backend.append(&record).and_then(|()| {
            if self.sync_on_append {
                self.backend.sync()
            } else {
                Ok(())
            }
        });
        if let Err(err) = written {
            if let Err(rollback) = self.backend.truncate(before) {
                warn!(error = %rollback, "could not roll back failed journal append");
            }
            return Err(err);
        }
        Ok(())
    }

    /// Replaces the journal with a single snapshot record.
    ///
    /// # Errors
    ///
    /// Fails on encoding or I/O errors.
    pub fn rewrite(&mut self, snapshot: &JournalEntry) -> CoreResult<()> {
        let record = encode_record(RecordKind::Snapshot, &snapshot.encode()?)?;
        self.backend.replace(&record)
    }

    /// Journal size in bytes.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors.
    pub fn size(&self) -> CoreResult<u64> {
        self.backend.size()
    }
}

/// Computes CRC32 (IEEE polynomial) of data.
#[must_use]
pub fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}
