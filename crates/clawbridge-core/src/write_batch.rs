//! WriteBatch: ordered, atomic group of mutations
//!
//! Records are appended to an in-memory body in call order. `encode()` puts
//! the checksummed header in front, producing the bytes `decoder::decode`
//! reads back. Records for the default column family use the legacy
//! (untagged) encoding.

use crate::config::Config;
use crate::decoder::{self, BatchHandler, BatchItem, ItemCollector};
use crate::error::{BridgeError, BridgeResult};
use crate::format::{put_length_prefixed, put_varint32, split_batch, BatchHeader, ColumnFamilyId, OpType, RecordTag, HEADER_SIZE};

/// Builder and container for an encoded batch
#[derive(Debug, Clone)]
pub struct WriteBatch {
    sequence: u64,
    count: u32,
    body: Vec<u8>,
    max_key_size: usize,
    max_value_size: usize,
    max_records: u32,
}

impl WriteBatch {
    /// Empty batch with the default limits
    pub fn new() -> Self {
        Self::with_config(&Config::default())
    }

    /// Empty batch using the size limits of `config`
    pub fn with_config(config: &Config) -> Self {
        Self {
            sequence: 0,
            count: 0,
            body: Vec::new(),
            max_key_size: config.max_key_size,
            max_value_size: config.max_value_size,
            max_records: config.max_batch_records,
        }
    }

    /// Rebuild a batch from encoded bytes. The body is fully validated.
    pub fn from_bytes(data: &[u8]) -> BridgeResult<Self> {
        let (header, body) = split_batch(data)?;
        decoder::parse_body(body, header.count)?;
        let config = Config::default();
        Ok(Self {
            sequence: header.sequence,
            count: header.count,
            body: body.to_vec(),
            max_key_size: config.max_key_size,
            max_value_size: config.max_value_size,
            max_records: config.max_batch_records.max(header.count),
        })
    }

    pub fn put(&mut self, key: &[u8], value: &[u8]) -> BridgeResult<()> {
        self.append(OpType::Put, ColumnFamilyId::DEFAULT, key, value)
    }

    pub fn put_cf(&mut self, cf: ColumnFamilyId, key: &[u8], value: &[u8]) -> BridgeResult<()> {
        self.append(OpType::Put, cf, key, value)
    }

    pub fn merge(&mut self, key: &[u8], value: &[u8]) -> BridgeResult<()> {
        self.append(OpType::Merge, ColumnFamilyId::DEFAULT, key, value)
    }

    pub fn merge_cf(&mut self, cf: ColumnFamilyId, key: &[u8], value: &[u8]) -> BridgeResult<()> {
        self.append(OpType::Merge, cf, key, value)
    }

    pub fn delete(&mut self, key: &[u8]) -> BridgeResult<()> {
        self.append(OpType::Delete, ColumnFamilyId::DEFAULT, key, &[])
    }

    pub fn delete_cf(&mut self, cf: ColumnFamilyId, key: &[u8]) -> BridgeResult<()> {
        self.append(OpType::Delete, cf, key, &[])
    }

    /// Append an already-decoded item
    pub fn push_item(&mut self, item: &BatchItem) -> BridgeResult<()> {
        self.append(item.op(), item.column_family(), item.key(), item.value())
    }

    fn append(&mut self, op: OpType, cf: ColumnFamilyId, key: &[u8], value: &[u8]) -> BridgeResult<()> {
        // Validate sizes BEFORE touching the body so a rejected record leaves no trace
        if key.len() > self.max_key_size {
            return Err(BridgeError::OversizedEntry {
                entry_size: key.len() as u64,
                max_size: self.max_key_size as u64,
                component: "key".to_string(),
            });
        }
        if value.len() > self.max_value_size {
            return Err(BridgeError::OversizedEntry {
                entry_size: value.len() as u64,
                max_size: self.max_value_size as u64,
                component: "value".to_string(),
            });
        }
        if self.count >= self.max_records {
            return Err(BridgeError::InvalidArgument(format!(
                "write batch is full ({} records)",
                self.max_records
            )));
        }

        let tag = RecordTag::for_op(op, cf);
        self.body.push(tag as u8);
        if tag.has_column_family() {
            put_varint32(&mut self.body, cf.0);
        }
        put_length_prefixed(&mut self.body, key);
        if op != OpType::Delete {
            put_length_prefixed(&mut self.body, value);
        }
        self.count += 1;
        Ok(())
    }

    /// Number of records
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Drop every record; the sequence number is kept
    pub fn clear(&mut self) {
        self.body.clear();
        self.count = 0;
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn set_sequence(&mut self, sequence: u64) {
        self.sequence = sequence;
    }

    /// Encoded size in bytes, header included
    pub fn size_in_bytes(&self) -> usize {
        HEADER_SIZE + self.body.len()
    }

    /// Serialize header + body
    pub fn encode(&self) -> Vec<u8> {
        let header = BatchHeader::for_body(self.sequence, self.count, &self.body);
        let mut buffer = Vec::with_capacity(self.size_in_bytes());
        buffer.extend_from_slice(&header.to_bytes());
        buffer.extend_from_slice(&self.body);
        buffer
    }

    /// Visit every record in order
    pub fn iterate<H: BatchHandler + ?Sized>(&self, handler: &mut H) -> BridgeResult<()> {
        let records = decoder::parse_body(&self.body, self.count)?;
        decoder::dispatch(&records, handler);
        Ok(())
    }

    /// Owned copies of every record, in order
    pub fn items(&self) -> BridgeResult<Vec<BatchItem>> {
        let mut collector = ItemCollector::with_capacity(self.count as usize);
        self.iterate(&mut collector)?;
        Ok(collector.into_items())
    }
}

impl Default for WriteBatch {
    fn default() -> Self { Self::new() }
}
