//! Write-batch decoder
//!
//! Turns an encoded batch into the ordered list of mutations it records.
//! Order is an apply-order contract: records are never reordered or
//! coalesced, even when adjacent records touch the same key.
//!
//! The whole body is validated before any record reaches a handler, so a
//! handler never observes a truncated prefix of a broken batch.

use crate::error::{BridgeError, BridgeResult};
use crate::format::{split_batch, BodyReader, ColumnFamilyId, OpType, RecordTag};

/// One decoded mutation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BatchItem {
    op: OpType,
    column_family: ColumnFamilyId,
    key: Vec<u8>,
    value: Vec<u8>,
}

impl BatchItem {
    pub fn put(cf: impl Into<ColumnFamilyId>, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self { op: OpType::Put, column_family: cf.into(), key: key.into(), value: value.into() }
    }

    pub fn merge(cf: impl Into<ColumnFamilyId>, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self { op: OpType::Merge, column_family: cf.into(), key: key.into(), value: value.into() }
    }

    /// Deletes never carry a value.
    pub fn delete(cf: impl Into<ColumnFamilyId>, key: impl Into<Vec<u8>>) -> Self {
        Self { op: OpType::Delete, column_family: cf.into(), key: key.into(), value: Vec::new() }
    }

    pub fn op(&self) -> OpType {
        self.op
    }

    pub fn column_family(&self) -> ColumnFamilyId {
        self.column_family
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }
}

/// Visitor over the records of a batch, called strictly in batch order.
pub trait BatchHandler {
    fn put(&mut self, cf: ColumnFamilyId, key: &[u8], value: &[u8]);

    fn merge(&mut self, cf: ColumnFamilyId, key: &[u8], value: &[u8]);

    fn delete(&mut self, cf: ColumnFamilyId, key: &[u8]);
}

/// Handler that collects every record as an owned `BatchItem`.
#[derive(Debug, Default)]
pub struct ItemCollector {
    items: Vec<BatchItem>,
}

impl ItemCollector {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { items: Vec::with_capacity(capacity) }
    }

    pub fn into_items(self) -> Vec<BatchItem> {
        self.items
    }
}

impl BatchHandler for ItemCollector {
    fn put(&mut self, cf: ColumnFamilyId, key: &[u8], value: &[u8]) {
        self.items.push(BatchItem::put(cf, key, value));
    }

    fn merge(&mut self, cf: ColumnFamilyId, key: &[u8], value: &[u8]) {
        self.items.push(BatchItem::merge(cf, key, value));
    }

    fn delete(&mut self, cf: ColumnFamilyId, key: &[u8]) {
        self.items.push(BatchItem::delete(cf, key));
    }
}

/// Borrowed view of one record inside a body
#[derive(Debug, Clone, Copy)]
pub(crate) struct RecordRef<'a> {
    pub op: OpType,
    pub cf: ColumnFamilyId,
    pub key: &'a [u8],
    pub value: &'a [u8],
}

/// Parse every record of a body. `expected` is the header count.
pub(crate) fn parse_body(body: &[u8], expected: u32) -> BridgeResult<Vec<RecordRef<'_>>> {
    // Every record needs at least a tag and a key length byte
    let mut records = Vec::with_capacity((expected as usize).min(body.len() / 2));
    let mut reader = BodyReader::new(body);

    while !reader.is_empty() {
        let record_start = reader.offset();
        let raw_tag = reader
            .read_u8()
            .ok_or_else(|| BridgeError::corruption(record_start, "missing record tag"))?;
        let tag = RecordTag::try_from(raw_tag).map_err(|t| {
            BridgeError::corruption(record_start, format!("unknown write batch tag 0x{:02x}", t))
        })?;

        let cf = if tag.has_column_family() {
            let id = reader.read_varint32().ok_or_else(|| {
                BridgeError::corruption(reader.offset(), "bad column family id")
            })?;
            ColumnFamilyId(id)
        } else {
            ColumnFamilyId::DEFAULT
        };

        let op = tag.op();
        let key = reader.read_length_prefixed().ok_or_else(|| {
            BridgeError::corruption(reader.offset(), format!("bad write batch {:?} key", op))
        })?;

        let value: &[u8] = match op {
            OpType::Put | OpType::Merge => reader.read_length_prefixed().ok_or_else(|| {
                BridgeError::corruption(reader.offset(), format!("bad write batch {:?} value", op))
            })?,
            OpType::Delete => &[],
        };

        records.push(RecordRef { op, cf, key, value });
    }

    if records.len() != expected as usize {
        return Err(BridgeError::corruption(
            reader.offset(),
            format!("write batch has wrong count: header says {}, found {}", expected, records.len()),
        ));
    }

    Ok(records)
}

pub(crate) fn dispatch<H: BatchHandler + ?Sized>(records: &[RecordRef<'_>], handler: &mut H) {
    for r in records {
        match r.op {
            OpType::Put => handler.put(r.cf, r.key, r.value),
            OpType::Merge => handler.merge(r.cf, r.key, r.value),
            OpType::Delete => handler.delete(r.cf, r.key),
        }
    }
}

/// Walk an encoded batch, feeding each record to `handler` in order.
///
/// Fails without calling the handler at all if the batch is malformed.
pub fn iterate<H: BatchHandler + ?Sized>(data: &[u8], handler: &mut H) -> BridgeResult<()> {
    let (header, body) = split_batch(data)?;
    let records = parse_body(body, header.count).map_err(|e| {
        tracing::debug!(error = %e, "rejecting write batch");
        e
    })?;
    dispatch(&records, handler);
    Ok(())
}

/// Decode an encoded batch into owned items, preserving record order.
pub fn decode(data: &[u8]) -> BridgeResult<Vec<BatchItem>> {
    let (header, body) = split_batch(data)?;
    let records = parse_body(body, header.count)?;
    let mut collector = ItemCollector::with_capacity(records.len());
    dispatch(&records, &mut collector);
    Ok(collector.into_items())
}
