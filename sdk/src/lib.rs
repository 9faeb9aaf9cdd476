//! gschema
//!
//! Runtime access to a compiled schema cache (`gschemas.compiled`).
//!
//! - `SchemaCache` opens a cache and lists the schemas it holds
//! - `SchemaView` answers key, child and metadata queries for one schema
//! - `dump_to_json` renders a whole cache for inspection

use std::{collections::BTreeMap, fs, path::Path};

use gschema_format::Table;
use serde::Serialize;
use thiserror::Error;

pub use gschema_format::{ByteOrder, TableError, Value, VariantType};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Table(#[from] TableError),

    #[error("entry {0} holds a value of the wrong type")]
    UnexpectedValue(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A compiled schema cache held in memory.
#[derive(Debug, Clone)]
pub struct SchemaCache {
    data:  Vec<u8>,
    order: ByteOrder,
}

impl SchemaCache {
    pub fn open(path: impl AsRef<Path>) -> Result<SchemaCache, CacheError> {
        SchemaCache::from_bytes(fs::read(path)?)
    }

    /// Takes ownership of the bytes of a cache, checking its header.
    pub fn from_bytes(data: Vec<u8>) -> Result<SchemaCache, CacheError> {
        let order = Table::open(&data)?.order();
        Ok(SchemaCache { data, order })
    }

    /// The byte order the cache was written in.
    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    fn root(&self) -> Result<Table<'_>, CacheError> {
        Ok(Table::open(&self.data)?)
    }

    /// Ids of all schemas, sorted.
    pub fn schema_ids(&self) -> Result<Vec<&str>, CacheError> {
        let mut ids = self.root()?.keys()?;
        ids.sort_unstable();
        Ok(ids)
    }

    pub fn schema(&self, id: &str) -> Result<Option<SchemaView<'_>>, CacheError> {
        Ok(self.root()?.get_table(id)?.map(|table| SchemaView {
            id: id.to_owned(),
            table,
        }))
    }
}

/// One schema inside a [SchemaCache].
#[derive(Debug, Clone)]
pub struct SchemaView<'a> {
    id:    String,
    table: Table<'a>,
}

impl<'a> SchemaView<'a> {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Names of all keys, sorted.
    pub fn keys(&self) -> Result<Vec<&'a str>, CacheError> {
        let mut keys: Vec<&str> = self
            .table
            .children("")?
            .into_iter()
            .filter(|name| !name.ends_with('/') && !name.starts_with('.'))
            .collect();
        keys.sort_unstable();
        Ok(keys)
    }

    /// Names of all children, without the trailing `/`, sorted.
    pub fn children(&self) -> Result<Vec<&'a str>, CacheError> {
        let mut children: Vec<&str> = self
            .table
            .children("")?
            .into_iter()
            .filter_map(|name| name.strip_suffix('/'))
            .collect();
        children.sort_unstable();
        Ok(children)
    }

    /// The id of the schema referenced by child `name`.
    pub fn child(&self, name: &str) -> Result<Option<String>, CacheError> {
        self.string(&format!("{}/", name))
    }

    pub fn path(&self) -> Result<Option<String>, CacheError> {
        self.string(".path")
    }

    pub fn gettext_domain(&self) -> Result<Option<String>, CacheError> {
        self.string(".gettext-domain")
    }

    fn string(&self, name: &str) -> Result<Option<String>, CacheError> {
        match self.table.get_value(name)? {
            None => Ok(None),
            Some(Value::String(value)) => Ok(Some(value)),
            Some(_) => Err(CacheError::UnexpectedValue(name.to_owned())),
        }
    }

    pub fn default_value(&self, key: &str) -> Result<Option<Value>, CacheError> {
        if key.ends_with('/') || key.starts_with('.') {
            return Ok(None);
        }
        Ok(self.table.get_value(key)?)
    }

    /// The options bag of `key`; empty when the key has none.
    pub fn options(&self, key: &str) -> Result<BTreeMap<String, Value>, CacheError> {
        let mut options = BTreeMap::new();
        let Some(dict) = self.table.get_options(key)? else {
            return Ok(options);
        };
        for entry in dict.as_slice() {
            match entry {
                Value::DictEntry(name, value) => match (&**name, &**value) {
                    (Value::String(name), Value::Variant(value)) => {
                        options.insert(name.clone(), (**value).clone());
                    }
                    _ => return Err(CacheError::UnexpectedValue(key.to_owned())),
                },
                _ => return Err(CacheError::UnexpectedValue(key.to_owned())),
            }
        }
        Ok(options)
    }

    /// The localization marker (`'m'` or `'t'`) and message of `key`. A
    /// translation context, if any, precedes the message, separated by `\x04`.
    pub fn l10n(&self, key: &str) -> Result<Option<(char, String)>, CacheError> {
        match self.options(key)?.remove("l10n") {
            None => Ok(None),
            Some(Value::Tuple(items)) => match items.as_slice() {
                [Value::Byte(marker), Value::String(message)] => Ok(Some((*marker as char, message.clone()))),
                _ => Err(CacheError::UnexpectedValue(key.to_owned())),
            },
            Some(_) => Err(CacheError::UnexpectedValue(key.to_owned())),
        }
    }

    pub fn range(&self, key: &str) -> Result<Option<(Value, Value)>, CacheError> {
        match self.options(key)?.remove("range") {
            None => Ok(None),
            Some(Value::Tuple(mut items)) if items.len() == 2 => {
                let max = items.pop();
                let min = items.pop();
                Ok(min.zip(max))
            }
            Some(_) => Err(CacheError::UnexpectedValue(key.to_owned())),
        }
    }

    pub fn choices(&self, key: &str) -> Result<Vec<String>, CacheError> {
        match self.options(key)?.remove("choices") {
            None => Ok(vec![]),
            Some(value) if value.value_type() == VariantType::Array(Box::new(VariantType::String)) => {
                Ok(value.strings().into_iter().map(str::to_owned).collect())
            }
            Some(_) => Err(CacheError::UnexpectedValue(key.to_owned())),
        }
    }
}

#[derive(Serialize)]
struct KeyDump {
    #[serde(rename = "type")]
    value_type: String,
    default:    String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    options:    BTreeMap<String, String>,
}

#[derive(Serialize)]
struct SchemaDump {
    #[serde(skip_serializing_if = "Option::is_none")]
    path:           Option<String>,
    #[serde(rename = "gettext-domain", skip_serializing_if = "Option::is_none")]
    gettext_domain: Option<String>,
    keys:           BTreeMap<String, KeyDump>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    children:       BTreeMap<String, String>,
}

/// Decode a schema cache into a pretty-printed JSON string. Values are shown
/// in their text literal form.
pub fn dump_to_json(buffer: &[u8]) -> Result<String, CacheError> {
    let cache = SchemaCache::from_bytes(buffer.to_vec())?;
    let mut schemas = BTreeMap::new();

    for id in cache.schema_ids()? {
        let Some(schema) = cache.schema(id)? else {
            continue;
        };
        let mut keys = BTreeMap::new();
        for key in schema.keys()? {
            let default = schema
                .default_value(key)?
                .ok_or_else(|| CacheError::UnexpectedValue(key.to_owned()))?;
            let options = schema
                .options(key)?
                .into_iter()
                .map(|(name, value)| (name, value.to_string()))
                .collect();
            keys.insert(
                key.to_owned(),
                KeyDump {
                    value_type: default.value_type().to_string(),
                    default: default.to_string(),
                    options,
                },
            );
        }
        let mut children = BTreeMap::new();
        for child in schema.children()? {
            if let Some(target) = schema.child(child)? {
                children.insert(child.to_owned(), target);
            }
        }
        schemas.insert(
            id.to_owned(),
            SchemaDump {
                path: schema.path()?,
                gettext_domain: schema.gettext_domain()?,
                keys,
                children,
            },
        );
    }

    Ok(serde_json::to_string_pretty(&schemas)?)
}
