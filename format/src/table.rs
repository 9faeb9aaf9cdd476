//! A read-only hash table file format.
//!
//! A file starts with a 24 byte header followed by table chunks and the blobs
//! they point at. Every multi-byte integer uses the byte order recorded in the
//! header, so the whole file can be mapped and read in place.
//!
//! ```text
//! header:  magic[8]  order-marker:u32  version:u32  root:pointer
//! pointer: start:u32 end:u32
//! table:   n_buckets:u32 n_items:u32 bucket_start[n_buckets]:u32 item[n_items]
//! item:    hash:u32 parent:u32 key:pointer kind:u8 pad[3] value:pointer options:pointer
//! ```
//!
//! Items are sorted by bucket (`hash % n_buckets`); `bucket_start[b]` is the
//! index of the first item of bucket `b`. `parent` is the index of another
//! item of the same table, or `u32::MAX`. Values and options are stored as a
//! type signature followed by the payload.

use crate::{
    bb::{ByteBuffer, ByteBufferMut, ByteOrder},
    types::VariantType,
    value::Value,
};
use std::collections::HashMap;
use thiserror::Error;

pub const MAGIC: &[u8; 8] = b"GSCHEMA\0";
pub const VERSION: u32 = 1;

const HEADER_SIZE: usize = 24;
const ITEM_SIZE: usize = 36;
const NO_PARENT: u32 = u32::MAX;

const KIND_EMPTY: u8 = b'-';
const KIND_VALUE: u8 = b'v';
const KIND_TABLE: u8 = b'H';

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TableError {
    #[error("not a schema cache: bad magic")]
    BadMagic,

    #[error("unsupported schema cache version {0}")]
    UnsupportedVersion(u32),

    #[error("schema cache has an unknown byte order marker")]
    BadByteOrder,

    #[error("corrupt schema cache: {0}")]
    Corrupt(String),

    #[error("schema cache item '{0}' is not a {1}")]
    WrongKind(String, &'static str),
}

/// The djb string hash used to place keys in buckets.
pub fn hash_key(key: &str) -> u32 {
    key.bytes()
        .fold(5381u32, |h, b| h.wrapping_mul(33).wrapping_add(b as u32))
}

/// Handle to an item inside a [TableBuilder].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemId(usize);

#[derive(Debug, Clone, PartialEq)]
enum ItemValue {
    Empty,
    Value(Value),
    Table(TableBuilder),
}

#[derive(Debug, Clone, PartialEq)]
struct Item {
    key:     String,
    parent:  Option<ItemId>,
    value:   ItemValue,
    options: Option<Value>,
}

/// Collects items in memory and serializes them into the table file format.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableBuilder {
    items: Vec<Item>,
    index: HashMap<String, ItemId>,
}

impl TableBuilder {
    pub fn new() -> TableBuilder {
        TableBuilder::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Inserts an empty item. Inserting an existing key resets that item.
    pub fn insert(&mut self, key: &str) -> ItemId {
        if let Some(&id) = self.index.get(key) {
            self.items[id.0] = Item {
                key:     key.to_owned(),
                parent:  None,
                value:   ItemValue::Empty,
                options: None,
            };
            return id;
        }
        let id = ItemId(self.items.len());
        self.items.push(Item {
            key:     key.to_owned(),
            parent:  None,
            value:   ItemValue::Empty,
            options: None,
        });
        self.index.insert(key.to_owned(), id);
        id
    }

    /// Inserts an item holding a string value.
    pub fn insert_string(&mut self, key: &str, value: &str) -> ItemId {
        let id = self.insert(key);
        self.set_value(id, Value::String(value.to_owned()));
        id
    }

    pub fn set_parent(&mut self, item: ItemId, parent: ItemId) {
        self.items[item.0].parent = Some(parent);
    }

    pub fn set_value(&mut self, item: ItemId, value: Value) {
        self.items[item.0].value = ItemValue::Value(value);
    }

    pub fn set_options(&mut self, item: ItemId, options: Value) {
        self.items[item.0].options = Some(options);
    }

    pub fn set_table(&mut self, item: ItemId, table: TableBuilder) {
        self.items[item.0].value = ItemValue::Table(table);
    }

    /// Serializes this table as the root of a complete file.
    pub fn serialize(&self, order: ByteOrder) -> Vec<u8> {
        let mut bb = ByteBufferMut::new(order);
        bb.write_bytes(MAGIC);
        bb.write_u32(1);
        bb.write_u32(VERSION);
        let root = bb.len();
        bb.write_u32(0);
        bb.write_u32(0);

        let (start, end) = self.write(&mut bb);
        bb.patch_u32(root, start);
        bb.patch_u32(root + 4, end);
        bb.data()
    }

    fn write(&self, bb: &mut ByteBufferMut) -> (u32, u32) {
        let n_items = self.items.len();
        let n_buckets = n_items.max(1) as u32;
        let hashes: Vec<u32> = self.items.iter().map(|item| hash_key(&item.key)).collect();

        // Stable sort keeps insertion order inside a bucket.
        let mut sorted: Vec<usize> = (0..n_items).collect();
        sorted.sort_by_key(|&i| hashes[i] % n_buckets);
        let mut position = vec![0u32; n_items];
        for (pos, &i) in sorted.iter().enumerate() {
            position[i] = pos as u32;
        }

        let mut blobs = Vec::with_capacity(n_items);
        for &i in &sorted {
            let item = &self.items[i];
            let key = write_blob(bb, item.key.as_bytes());
            let (kind, value) = match &item.value {
                ItemValue::Empty => (KIND_EMPTY, (0, 0)),
                ItemValue::Value(value) => (KIND_VALUE, write_value(bb, value)),
                ItemValue::Table(table) => (KIND_TABLE, table.write(bb)),
            };
            let options = match &item.options {
                Some(options) => write_value(bb, options),
                None => (0, 0),
            };
            blobs.push((key, kind, value, options));
        }

        bb.align(8);
        let start = bb.len() as u32;
        bb.write_u32(n_buckets);
        bb.write_u32(n_items as u32);
        let mut next = 0;
        for bucket in 0..n_buckets {
            while next < n_items && hashes[sorted[next]] % n_buckets < bucket {
                next += 1;
            }
            bb.write_u32(next as u32);
        }
        for (pos, &i) in sorted.iter().enumerate() {
            let (key, kind, value, options) = blobs[pos];
            bb.write_u32(hashes[i]);
            bb.write_u32(match self.items[i].parent {
                Some(parent) => position[parent.0],
                None => NO_PARENT,
            });
            write_pointer(bb, key);
            bb.write_bytes(&[kind, 0, 0, 0]);
            write_pointer(bb, value);
            write_pointer(bb, options);
        }
        (start, bb.len() as u32)
    }
}

fn write_pointer(bb: &mut ByteBufferMut, (start, end): (u32, u32)) {
    bb.write_u32(start);
    bb.write_u32(end);
}

fn write_blob(bb: &mut ByteBufferMut, bytes: &[u8]) -> (u32, u32) {
    let start = bb.len() as u32;
    bb.write_bytes(bytes);
    (start, bb.len() as u32)
}

fn write_value(bb: &mut ByteBufferMut, value: &Value) -> (u32, u32) {
    bb.align(8);
    let start = bb.len() as u32;
    value.encode_variant(bb);
    (start, bb.len() as u32)
}

struct RawItem {
    hash:    u32,
    parent:  u32,
    key:     (u32, u32),
    kind:    u8,
    value:   (u32, u32),
    options: (u32, u32),
}

/// A table inside a serialized file, read in place.
#[derive(Debug, Clone, Copy)]
pub struct Table<'a> {
    data:      &'a [u8],
    order:     ByteOrder,
    n_buckets: u32,
    n_items:   u32,
    buckets:   usize,
    items:     usize,
}

impl<'a> Table<'a> {
    /// Reads the header of a complete file and returns its root table.
    pub fn open(data: &'a [u8]) -> Result<Table<'a>, TableError> {
        if data.len() < HEADER_SIZE || &data[..8] != MAGIC {
            return Err(TableError::BadMagic);
        }
        let order = match data[8..12] {
            [1, 0, 0, 0] => ByteOrder::Little,
            [0, 0, 0, 1] => ByteOrder::Big,
            _ => return Err(TableError::BadByteOrder),
        };
        let mut bb = ByteBuffer::new(data, order);
        bb.seek(12).map_err(|_| corrupt("truncated header"))?;
        let version = bb.read_u32().map_err(|_| corrupt("truncated header"))?;
        if version != VERSION {
            return Err(TableError::UnsupportedVersion(version));
        }
        let start = bb.read_u32().map_err(|_| corrupt("truncated header"))?;
        let end = bb.read_u32().map_err(|_| corrupt("truncated header"))?;
        Table::at(data, order, (start, end))
    }

    fn at(data: &'a [u8], order: ByteOrder, (start, end): (u32, u32)) -> Result<Table<'a>, TableError> {
        let (start, end) = (start as usize, end as usize);
        if start > end || end > data.len() || end - start < 8 {
            return Err(corrupt("table pointer out of bounds"));
        }
        let mut bb = ByteBuffer::new(&data[..end], order);
        bb.seek(start).map_err(|_| corrupt("table pointer out of bounds"))?;
        let n_buckets = bb.read_u32().map_err(|_| corrupt("truncated table"))?;
        let n_items = bb.read_u32().map_err(|_| corrupt("truncated table"))?;
        let buckets = start + 8;
        let items = buckets + 4 * n_buckets as usize;
        if n_buckets == 0 || items + ITEM_SIZE * n_items as usize != end {
            return Err(corrupt("table size does not match its item count"));
        }

        let table = Table {
            data,
            order,
            n_buckets,
            n_items,
            buckets,
            items,
        };
        let mut previous = 0;
        for bucket in 0..n_buckets {
            let first = table.bucket_start(bucket)?;
            if first < previous || first > n_items {
                return Err(corrupt("bucket index out of order"));
            }
            previous = first;
        }
        Ok(table)
    }

    /// The byte order the file was written in.
    pub fn order(&self) -> ByteOrder {
        self.order
    }

    pub fn len(&self) -> usize {
        self.n_items as usize
    }

    pub fn is_empty(&self) -> bool {
        self.n_items == 0
    }

    fn reader(&self, offset: usize) -> Result<ByteBuffer<'a>, TableError> {
        let mut bb = ByteBuffer::new(self.data, self.order);
        bb.seek(offset).map_err(|_| corrupt("offset out of bounds"))?;
        Ok(bb)
    }

    fn bucket_start(&self, bucket: u32) -> Result<u32, TableError> {
        self.reader(self.buckets + 4 * bucket as usize)?
            .read_u32()
            .map_err(|_| corrupt("truncated bucket index"))
    }

    fn raw_item(&self, index: u32) -> Result<RawItem, TableError> {
        let mut bb = self.reader(self.items + ITEM_SIZE * index as usize)?;
        let truncated = |_| corrupt("truncated item");
        let hash = bb.read_u32().map_err(truncated)?;
        let parent = bb.read_u32().map_err(truncated)?;
        let key = (bb.read_u32().map_err(truncated)?, bb.read_u32().map_err(truncated)?);
        let kind = bb.read_byte().map_err(truncated)?;
        bb.read_bytes(3).map_err(truncated)?;
        let value = (bb.read_u32().map_err(truncated)?, bb.read_u32().map_err(truncated)?);
        let options = (bb.read_u32().map_err(truncated)?, bb.read_u32().map_err(truncated)?);
        Ok(RawItem {
            hash,
            parent,
            key,
            kind,
            value,
            options,
        })
    }

    fn blob(&self, (start, end): (u32, u32)) -> Result<&'a [u8], TableError> {
        let (start, end) = (start as usize, end as usize);
        if start > end || end > self.data.len() {
            return Err(corrupt("blob pointer out of bounds"));
        }
        Ok(&self.data[start..end])
    }

    fn key_of(&self, item: &RawItem) -> Result<&'a str, TableError> {
        std::str::from_utf8(self.blob(item.key)?).map_err(|_| corrupt("key is not UTF-8"))
    }

    fn decode(&self, pointer: (u32, u32)) -> Result<Value, TableError> {
        let blob = self.blob(pointer)?;
        let mut bb = ByteBuffer::new(blob, self.order);
        let value = Value::decode_variant(&mut bb).map_err(|_| corrupt("undecodable value"))?;
        if bb.index() != blob.len() {
            return Err(corrupt("trailing bytes after value"));
        }
        Ok(value)
    }

    fn find(&self, key: &str) -> Result<Option<(u32, RawItem)>, TableError> {
        if self.n_items == 0 {
            return Ok(None);
        }
        let hash = hash_key(key);
        let bucket = hash % self.n_buckets;
        let first = self.bucket_start(bucket)?;
        let last = if bucket + 1 < self.n_buckets {
            self.bucket_start(bucket + 1)?
        } else {
            self.n_items
        };
        for index in first..last {
            let item = self.raw_item(index)?;
            if item.hash == hash && self.key_of(&item)? == key {
                return Ok(Some((index, item)));
            }
        }
        Ok(None)
    }

    pub fn contains(&self, key: &str) -> Result<bool, TableError> {
        Ok(self.find(key)?.is_some())
    }

    /// All keys in storage order.
    pub fn keys(&self) -> Result<Vec<&'a str>, TableError> {
        (0..self.n_items)
            .map(|index| {
                let item = self.raw_item(index)?;
                self.key_of(&item)
            })
            .collect()
    }

    /// The value stored under `key`, if it exists and holds a value.
    pub fn get_value(&self, key: &str) -> Result<Option<Value>, TableError> {
        match self.find(key)? {
            None => Ok(None),
            Some((_, item)) if item.kind == KIND_VALUE => Ok(Some(self.decode(item.value)?)),
            Some(_) => Err(TableError::WrongKind(key.to_owned(), "value")),
        }
    }

    /// The options stored alongside `key`.
    pub fn get_options(&self, key: &str) -> Result<Option<Value>, TableError> {
        match self.find(key)? {
            Some((_, item)) if item.options != (0, 0) => Ok(Some(self.decode(item.options)?)),
            _ => Ok(None),
        }
    }

    /// The nested table stored under `key`.
    pub fn get_table(&self, key: &str) -> Result<Option<Table<'a>>, TableError> {
        match self.find(key)? {
            None => Ok(None),
            Some((_, item)) if item.kind == KIND_TABLE => {
                Ok(Some(Table::at(self.data, self.order, item.value)?))
            }
            Some(_) => Err(TableError::WrongKind(key.to_owned(), "table")),
        }
    }

    /// The key of the parent of `key`.
    pub fn get_parent(&self, key: &str) -> Result<Option<&'a str>, TableError> {
        match self.find(key)? {
            Some((_, item)) if item.parent != NO_PARENT => {
                if item.parent >= self.n_items {
                    return Err(corrupt("parent index out of bounds"));
                }
                let parent = self.raw_item(item.parent)?;
                Ok(Some(self.key_of(&parent)?))
            }
            _ => Ok(None),
        }
    }

    /// Keys of all items whose parent is `key`, in storage order.
    pub fn children(&self, key: &str) -> Result<Vec<&'a str>, TableError> {
        let Some((parent, _)) = self.find(key)? else {
            return Ok(vec![]);
        };
        let mut children = vec![];
        for index in 0..self.n_items {
            let item = self.raw_item(index)?;
            if item.parent == parent {
                children.push(self.key_of(&item)?);
            }
        }
        Ok(children)
    }
}

fn corrupt(reason: &str) -> TableError {
    TableError::Corrupt(reason.to_owned())
}

/// Builds an `a{sv}` dictionary from option name/value pairs.
pub fn options_dict<'v>(options: impl IntoIterator<Item = (&'v str, Value)>) -> Value {
    let entry = VariantType::DictEntry(Box::new(VariantType::String), Box::new(VariantType::Variant));
    Value::Array(
        entry,
        options
            .into_iter()
            .map(|(name, value)| {
                Value::DictEntry(
                    Box::new(Value::String(name.to_owned())),
                    Box::new(Value::Variant(Box::new(value))),
                )
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TableBuilder {
        let mut inner = TableBuilder::new();
        let root = inner.insert("");
        let volume = inner.insert("volume");
        inner.set_parent(volume, root);
        inner.set_value(volume, Value::Int32(50));
        inner.set_options(volume, options_dict([("l10n", Value::Byte(b'm'))]));
        let child = inner.insert_string("sub/", "org.example.sub");
        inner.set_parent(child, root);

        let mut outer = TableBuilder::new();
        let schema = outer.insert("org.example");
        outer.set_table(schema, inner);
        outer.insert_string("other", "value");
        outer
    }

    #[test]
    fn test_roundtrip_in_both_orders() {
        for order in [ByteOrder::Little, ByteOrder::Big] {
            let data = sample().serialize(order);
            let root = Table::open(&data).unwrap();
            assert_eq!(root.order(), order);
            assert_eq!(root.len(), 2);

            let schema = root.get_table("org.example").unwrap().unwrap();
            assert_eq!(schema.get_value("volume").unwrap(), Some(Value::Int32(50)));
            assert_eq!(
                schema.get_value("sub/").unwrap(),
                Some(Value::String("org.example.sub".into()))
            );
            let options = schema.get_options("volume").unwrap().unwrap();
            assert_eq!(
                options.lookup(&Value::String("l10n".into())),
                Some(&Value::Variant(Box::new(Value::Byte(b'm'))))
            );
            assert_eq!(schema.get_parent("volume").unwrap(), Some(""));
            assert_eq!(schema.get_parent("").unwrap(), None);

            let mut children = schema.children("").unwrap();
            children.sort();
            assert_eq!(children, vec!["sub/", "volume"]);

            assert_eq!(schema.get_value("missing").unwrap(), None);
            assert_eq!(root.get_value("other").unwrap(), Some(Value::String("value".into())));
        }
    }

    #[test]
    fn test_byte_orders_differ() {
        let little = sample().serialize(ByteOrder::Little);
        let big = sample().serialize(ByteOrder::Big);
        assert_eq!(little.len(), big.len());
        assert_ne!(little, big);
        assert_eq!(&little[8..12], &[1, 0, 0, 0]);
        assert_eq!(&big[8..12], &[0, 0, 0, 1]);
    }

    #[test]
    fn test_deterministic() {
        assert_eq!(sample().serialize(ByteOrder::Little), sample().serialize(ByteOrder::Little));
    }

    #[test]
    fn test_empty_table() {
        let data = TableBuilder::new().serialize(ByteOrder::Little);
        let root = Table::open(&data).unwrap();
        assert!(root.is_empty());
        assert_eq!(root.get_value("x").unwrap(), None);
        assert_eq!(root.keys().unwrap(), Vec::<&str>::new());
    }

    #[test]
    fn test_many_keys_all_found() {
        let mut builder = TableBuilder::new();
        for i in 0..200 {
            let id = builder.insert(&format!("key-{}", i));
            builder.set_value(id, Value::UInt32(i));
        }
        let data = builder.serialize(ByteOrder::Big);
        let table = Table::open(&data).unwrap();
        for i in 0..200 {
            assert_eq!(
                table.get_value(&format!("key-{}", i)).unwrap(),
                Some(Value::UInt32(i))
            );
        }
        assert_eq!(table.keys().unwrap().len(), 200);
    }

    #[test]
    fn test_wrong_kind() {
        let data = sample().serialize(ByteOrder::Little);
        let root = Table::open(&data).unwrap();
        assert!(matches!(root.get_value("org.example"), Err(TableError::WrongKind(..))));
        assert!(matches!(root.get_table("other"), Err(TableError::WrongKind(..))));
    }

    #[test]
    fn test_rejects_bad_headers() {
        assert_eq!(Table::open(b"nope").unwrap_err(), TableError::BadMagic);

        let mut data = sample().serialize(ByteOrder::Little);
        data[8] = 7;
        assert_eq!(Table::open(&data).unwrap_err(), TableError::BadByteOrder);

        let mut data = sample().serialize(ByteOrder::Little);
        data[12] = 9;
        assert_eq!(Table::open(&data).unwrap_err(), TableError::UnsupportedVersion(9));

        let data = sample().serialize(ByteOrder::Little);
        assert!(matches!(Table::open(&data[..data.len() - 1]), Err(TableError::Corrupt(_))));
    }

    #[test]
    fn test_reinsert_resets_item() {
        let mut builder = TableBuilder::new();
        let a = builder.insert("a");
        builder.set_value(a, Value::Boolean(true));
        let again = builder.insert("a");
        assert_eq!(a, again);
        assert_eq!(builder.len(), 1);
        let data = builder.serialize(ByteOrder::Little);
        let table = Table::open(&data).unwrap();
        assert!(table.contains("a").unwrap());
        assert_eq!(table.get_value("a").unwrap(), None);
    }
}
