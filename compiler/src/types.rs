use std::collections::{BTreeMap, HashMap};

use gschema_format::{Value, VariantType};

use crate::{error::SchemaError, utils::quote};

/// Index of an entry inside its schema's entry table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryId(pub usize);

#[derive(Debug, Clone, PartialEq)]
pub enum EntryKind {
    Root,
    Key(KeyEntry),
    /// A reference to another schema, stored under `name/`.
    Child { schema: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub name:   String,
    pub parent: Option<EntryId>,
    pub kind:   EntryKind,
}

/// Bounds and permitted values attached to a key.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Constraints {
    pub range:   Option<(Value, Value)>,
    pub choices: Vec<String>,
}

impl Constraints {
    pub fn is_empty(&self) -> bool {
        self.range.is_none() && self.choices.is_empty()
    }

    /// Checks `value` against the bounds and the permitted choices.
    pub fn check(&self, value: &Value) -> Result<(), SchemaError> {
        if let Some((min, max)) = &self.range {
            let below = value.compare(min).map_or(true, |o| o.is_lt());
            let above = value.compare(max).map_or(true, |o| o.is_gt());
            if below || above {
                return Err(SchemaError::Constraint(format!(
                    "<default> value {} is not contained in the specified range [{}, {}]",
                    value, min, max
                )));
            }
        }
        if !self.choices.is_empty() {
            for string in value.strings() {
                if !self.choices.iter().any(|choice| choice == string) {
                    return Err(SchemaError::Constraint(format!(
                        "<default> contains string {} which is not in the list of choices",
                        quote(string)
                    )));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeyEntry {
    pub name:        String,
    pub value_type:  VariantType,
    pub default:     Option<Value>,
    pub options:     BTreeMap<String, Value>,
    pub constraints: Constraints,
    pub summary:     Option<String>,
    pub description: Option<String>,
}

impl KeyEntry {
    pub fn new(name: &str, value_type: VariantType) -> KeyEntry {
        KeyEntry {
            name:        name.to_owned(),
            value_type,
            default:     None,
            options:     BTreeMap::new(),
            constraints: Constraints::default(),
            summary:     None,
            description: None,
        }
    }

    pub fn set_default(&mut self, value: Value) {
        self.default = Some(value);
    }

    pub fn set_options(&mut self, options: BTreeMap<String, Value>) {
        self.options = options;
    }

    pub fn set_range(&mut self, min: Value, max: Value) {
        self.constraints.range = Some((min, max));
    }

    pub fn set_choices(&mut self, choices: Vec<String>) {
        self.constraints.choices = choices;
    }

    pub fn set_summary(&mut self, summary: String) {
        self.summary = Some(summary);
    }

    pub fn set_description(&mut self, description: String) {
        self.description = Some(description);
    }

    /// The options bag as written to the cache, constraints included.
    pub fn stored_options(&self) -> BTreeMap<String, Value> {
        let mut options = self.options.clone();
        if let Some((min, max)) = &self.constraints.range {
            options.insert("range".to_owned(), Value::Tuple(vec![min.clone(), max.clone()]));
        }
        if !self.constraints.choices.is_empty() {
            options.insert(
                "choices".to_owned(),
                Value::Array(
                    VariantType::String,
                    self.constraints.choices.iter().cloned().map(Value::String).collect(),
                ),
            );
        }
        options
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub id:             String,
    pub path:           Option<String>,
    pub gettext_domain: Option<String>,
    entries:            Vec<Entry>,
    index:              HashMap<String, EntryId>,
}

impl Schema {
    /// A new schema holding only its root entry `""`.
    pub fn new(id: &str) -> Schema {
        let mut index = HashMap::new();
        index.insert(String::new(), EntryId(0));
        Schema {
            id: id.to_owned(),
            path: None,
            gettext_domain: None,
            entries: vec![Entry {
                name:   String::new(),
                parent: None,
                kind:   EntryKind::Root,
            }],
            index,
        }
    }

    pub fn root(&self) -> EntryId {
        EntryId(0)
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn entry(&self, id: EntryId) -> Option<&Entry> {
        self.entries.get(id.0)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn key(&self, name: &str) -> Option<&KeyEntry> {
        match &self.entries[self.index.get(name)?.0].kind {
            EntryKind::Key(key) => Some(key),
            _ => None,
        }
    }

    pub fn key_mut(&mut self, id: EntryId) -> Option<&mut KeyEntry> {
        match &mut self.entries.get_mut(id.0)?.kind {
            EntryKind::Key(key) => Some(key),
            _ => None,
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &KeyEntry> {
        self.entries.iter().filter_map(|entry| match &entry.kind {
            EntryKind::Key(key) => Some(key),
            _ => None,
        })
    }

    /// Child name (without the trailing `/`) and referenced schema id.
    pub fn children(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().filter_map(|entry| match &entry.kind {
            EntryKind::Child { schema } => Some((entry.name.trim_end_matches('/'), schema.as_str())),
            _ => None,
        })
    }

    fn push(&mut self, name: String, kind: EntryKind) -> EntryId {
        let id = EntryId(self.entries.len());
        self.index.insert(name.clone(), id);
        self.entries.push(Entry {
            name,
            parent: Some(self.root()),
            kind,
        });
        id
    }

    /// Adds a key under the root. The name must not be taken yet.
    pub fn insert_key(&mut self, name: &str, value_type: VariantType) -> Result<EntryId, SchemaError> {
        if self.contains(name) {
            return Err(SchemaError::Duplicate(format!("<key name='{}'>", name)));
        }
        Ok(self.push(name.to_owned(), EntryKind::Key(KeyEntry::new(name, value_type))))
    }

    /// Adds a reference to schema `schema` under `name/`.
    pub fn insert_child(&mut self, name: &str, schema: &str) -> Result<EntryId, SchemaError> {
        let entry_name = format!("{}/", name);
        if self.contains(&entry_name) {
            return Err(SchemaError::Duplicate(format!("<child name='{}'>", name)));
        }
        Ok(self.push(entry_name, EntryKind::Child { schema: schema.to_owned() }))
    }
}

/// All schemas of one compilation run, ordered by id.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SchemaSet {
    schemas: BTreeMap<String, Schema>,
}

impl SchemaSet {
    pub fn new() -> SchemaSet {
        SchemaSet::default()
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.schemas.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Schema> {
        self.schemas.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Schema> {
        self.schemas.get_mut(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Schema> {
        self.schemas.values()
    }

    /// Creates an empty schema. Ids are unique across the whole set.
    pub fn insert_schema(&mut self, id: &str) -> Result<&mut Schema, SchemaError> {
        if self.contains(id) {
            return Err(SchemaError::Duplicate(format!("<schema id='{}'>", id)));
        }
        Ok(self.schemas.entry(id.to_owned()).or_insert_with(|| Schema::new(id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_ids_unique() {
        let mut set = SchemaSet::new();
        set.insert_schema("org.example").unwrap();
        let err = set.insert_schema("org.example").unwrap_err();
        assert_eq!(err.to_string(), "<schema id='org.example'> already specified");
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_entries_hang_off_root() {
        let mut schema = Schema::new("org.example");
        let volume = schema.insert_key("volume", VariantType::Int32).unwrap();
        let child = schema.insert_child("sub", "org.example.sub").unwrap();

        assert_eq!(schema.entry(volume).unwrap().parent, Some(schema.root()));
        assert_eq!(schema.entry(child).unwrap().name, "sub/");
        assert_eq!(schema.entry(child).unwrap().parent, Some(schema.root()));
        assert_eq!(schema.entry(schema.root()).unwrap().parent, None);
        assert_eq!(schema.children().collect::<Vec<_>>(), vec![("sub", "org.example.sub")]);
    }

    #[test]
    fn test_duplicate_key_and_child() {
        let mut schema = Schema::new("s");
        schema.insert_key("a", VariantType::Boolean).unwrap();
        let err = schema.insert_key("a", VariantType::String).unwrap_err();
        assert_eq!(err.to_string(), "<key name='a'> already specified");

        schema.insert_child("a", "other").unwrap();
        let err = schema.insert_child("a", "other").unwrap_err();
        assert_eq!(err.to_string(), "<child name='a'> already specified");
    }

    #[test]
    fn test_constraints() {
        let mut key = KeyEntry::new("volume", VariantType::Int32);
        key.set_range(Value::Int32(0), Value::Int32(100));
        assert!(key.constraints.check(&Value::Int32(50)).is_ok());
        assert!(key.constraints.check(&Value::Int32(0)).is_ok());
        assert!(matches!(key.constraints.check(&Value::Int32(101)), Err(SchemaError::Constraint(_))));

        let options = key.stored_options();
        assert_eq!(options["range"], Value::Tuple(vec![Value::Int32(0), Value::Int32(100)]));

        let mut key = KeyEntry::new("mode", VariantType::String);
        key.set_choices(vec!["fast".into(), "slow".into()]);
        assert!(key.constraints.check(&Value::String("fast".into())).is_ok());
        assert!(key.constraints.check(&Value::String("medium".into())).is_err());
        assert_eq!(key.stored_options()["choices"].strings(), vec!["fast", "slow"]);
    }
}
