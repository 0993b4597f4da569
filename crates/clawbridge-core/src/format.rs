//! Binary format definitions for ClawBridge write batches
//!
//! A write batch is a header followed by a body of records:
//!
//! ```text
//! BatchHeader (20 bytes):
//!   [0..4]   magic:    [u8;4] - "CLWB"
//!   [4..12]  sequence: u64 LE - sequence number assigned to the first record
//!   [12..16] count:    u32 LE - number of records in the body
//!   [16..20] checksum: u32 LE - CRC32C of the body bytes
//!
//! Record:
//!   tag(u8) [cf_id(varint32)] key_len(varint32) key [value_len(varint32) value]
//! ```
//!
//! Legacy tags carry no column family and decode against the default family.
//! Column-family tags carry an explicit id. Deletes have no value.

use crate::error::{BridgeError, BridgeResult};

/// Magic bytes identifying a ClawBridge write batch
pub const MAGIC_ARRAY: [u8; 4] = [0x43, 0x4C, 0x57, 0x42]; // 'C','L','W','B'

/// Header size in bytes
pub const HEADER_SIZE: usize = 20;

/// Longest encoding of a varint32
pub const MAX_VARINT32_LEN: usize = 5;

/// Column family identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ColumnFamilyId(pub u32);

impl ColumnFamilyId {
    /// The implicit family of untagged records
    pub const DEFAULT: ColumnFamilyId = ColumnFamilyId(0);

    pub fn is_default(self) -> bool {
        self == Self::DEFAULT
    }
}

impl From<u32> for ColumnFamilyId {
    fn from(id: u32) -> Self { ColumnFamilyId(id) }
}

/// Kind of mutation a record carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpType {
    Put,
    Merge,
    Delete,
}

/// On-the-wire record tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordTag {
    Delete = 0x00,
    Put = 0x01,
    Merge = 0x02,
    CfDelete = 0x04,
    CfPut = 0x05,
    CfMerge = 0x06,
}

impl RecordTag {
    /// Tag for an operation in a family; the default family uses the legacy tag.
    pub fn for_op(op: OpType, cf: ColumnFamilyId) -> Self {
        match (op, cf.is_default()) {
            (OpType::Put, true) => RecordTag::Put,
            (OpType::Merge, true) => RecordTag::Merge,
            (OpType::Delete, true) => RecordTag::Delete,
            (OpType::Put, false) => RecordTag::CfPut,
            (OpType::Merge, false) => RecordTag::CfMerge,
            (OpType::Delete, false) => RecordTag::CfDelete,
        }
    }

    pub fn op(self) -> OpType {
        match self {
            RecordTag::Put | RecordTag::CfPut => OpType::Put,
            RecordTag::Merge | RecordTag::CfMerge => OpType::Merge,
            RecordTag::Delete | RecordTag::CfDelete => OpType::Delete,
        }
    }

    pub fn has_column_family(self) -> bool {
        matches!(self, RecordTag::CfPut | RecordTag::CfMerge | RecordTag::CfDelete)
    }
}

impl TryFrom<u8> for RecordTag {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(RecordTag::Delete),
            0x01 => Ok(RecordTag::Put),
            0x02 => Ok(RecordTag::Merge),
            0x04 => Ok(RecordTag::CfDelete),
            0x05 => Ok(RecordTag::CfPut),
            0x06 => Ok(RecordTag::CfMerge),
            other => Err(other),
        }
    }
}

/// Fixed-size header in front of every batch body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchHeader {
    pub magic: [u8; 4],
    pub sequence: u64,
    pub count: u32,
    pub checksum: u32,
}

impl BatchHeader {
    /// Header for a body, computing its checksum
    pub fn for_body(sequence: u64, count: u32, body: &[u8]) -> Self {
        Self {
            magic: MAGIC_ARRAY,
            sequence,
            count,
            checksum: crc32c::crc32c(body),
        }
    }

    /// Serialize header to bytes for writing
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.magic);
        buf[4..12].copy_from_slice(&self.sequence.to_le_bytes());
        buf[12..16].copy_from_slice(&self.count.to_le_bytes());
        buf[16..20].copy_from_slice(&self.checksum.to_le_bytes());
        buf
    }

    /// Parse header from bytes
    pub fn from_bytes(bytes: &[u8; HEADER_SIZE]) -> Self {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);
        let mut sequence = [0u8; 8];
        sequence.copy_from_slice(&bytes[4..12]);

        Self {
            magic,
            sequence: u64::from_le_bytes(sequence),
            count: u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]),
            checksum: u32::from_le_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]),
        }
    }
}

/// Split an encoded batch into a verified header and its body.
pub fn split_batch(data: &[u8]) -> BridgeResult<(BatchHeader, &[u8])> {
    if data.len() < HEADER_SIZE {
        return Err(BridgeError::corruption(
            0,
            format!("malformed write batch: {} bytes, need at least {}", data.len(), HEADER_SIZE),
        ));
    }

    let mut header_bytes = [0u8; HEADER_SIZE];
    header_bytes.copy_from_slice(&data[..HEADER_SIZE]);
    let header = BatchHeader::from_bytes(&header_bytes);

    if header.magic != MAGIC_ARRAY {
        return Err(BridgeError::corruption(
            0,
            format!(
                "bad magic: found {:02x}{:02x}{:02x}{:02x}",
                header.magic[0], header.magic[1], header.magic[2], header.magic[3]
            ),
        ));
    }

    let body = &data[HEADER_SIZE..];
    let actual = crc32c::crc32c(body);
    if actual != header.checksum {
        return Err(BridgeError::ChecksumMismatch {
            expected: header.checksum,
            actual,
        });
    }

    Ok((header, body))
}

// ---------------------------------------------------------------------------
// Varint coding
// ---------------------------------------------------------------------------

/// Append `value` as a little-endian base-128 varint.
pub fn put_varint32(dst: &mut Vec<u8>, mut value: u32) {
    while value >= 0x80 {
        dst.push((value as u8) | 0x80);
        value >>= 7;
    }
    dst.push(value as u8);
}

/// Append a varint32 length followed by the bytes.
pub fn put_length_prefixed(dst: &mut Vec<u8>, bytes: &[u8]) {
    put_varint32(dst, bytes.len() as u32);
    dst.extend_from_slice(bytes);
}

/// Read-only cursor over a batch body. Offsets reported in errors are
/// absolute positions within the whole batch.
pub struct BodyReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> BodyReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    /// Absolute offset in the encoded batch
    pub fn offset(&self) -> usize {
        HEADER_SIZE + self.pos
    }

    pub fn read_u8(&mut self) -> Option<u8> {
        let b = *self.buf.get(self.pos)?;
        self.pos += 1;
        Some(b)
    }

    pub fn read_varint32(&mut self) -> Option<u32> {
        let mut result: u32 = 0;
        for i in 0..MAX_VARINT32_LEN {
            let byte = *self.buf.get(self.pos + i)?;
            let shift = 7 * i as u32;
            if i == MAX_VARINT32_LEN - 1 && byte > 0x0f {
                // Would overflow 32 bits
                return None;
            }
            result |= ((byte & 0x7f) as u32) << shift;
            if byte & 0x80 == 0 {
                self.pos += i + 1;
                return Some(result);
            }
        }
        None
    }

    pub fn read_length_prefixed(&mut self) -> Option<&'a [u8]> {
        let start = self.pos;
        let len = match self.read_varint32() {
            Some(len) => len as usize,
            None => {
                self.pos = start;
                return None;
            }
        };
        let end = self.pos.checked_add(len)?;
        if end > self.buf.len() {
            self.pos = start;
            return None;
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Some(slice)
    }
}
