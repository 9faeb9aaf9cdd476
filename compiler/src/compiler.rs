use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use gschema_format::{table::options_dict, ByteOrder, TableBuilder};
use tempfile::NamedTempFile;
use tracing::debug;
use walkdir::WalkDir;

use crate::{
    config::{CompileOptions, SOURCE_EXTENSION},
    error::SchemaError,
    parser::ParseState,
    tokenizer::tokenize_markup,
    types::{EntryKind, Schema, SchemaSet},
};

/// Compile one schema document into a `SchemaSet`.
pub fn compile_schema(text: &str) -> Result<SchemaSet, SchemaError> {
    let mut set = SchemaSet::new();
    ParseState::new(&mut set).parse(&tokenize_markup(text)?)?;
    Ok(set)
}

/// Compile several documents into one `SchemaSet`. Each source is a file name
/// used in error messages and the document text. The first error aborts the run.
pub fn compile_sources<P: AsRef<Path>>(sources: &[(P, String)]) -> Result<SchemaSet, SchemaError> {
    let mut set = SchemaSet::new();
    let mut state = ParseState::new(&mut set);
    for (name, text) in sources {
        let name = name.as_ref();
        tokenize_markup(text)
            .and_then(|tokens| state.parse(&tokens))
            .map_err(|e| e.in_file(name))?;
        debug!(file = %name.display(), "parsed schema source");
    }
    Ok(set)
}

/// Read and compile the given files in order.
pub fn compile_files(paths: &[PathBuf]) -> Result<SchemaSet, SchemaError> {
    let mut sources = Vec::with_capacity(paths.len());
    for path in paths {
        let text = fs::read_to_string(path).map_err(|e| SchemaError::Io(e).in_file(path))?;
        sources.push((path.clone(), text));
    }
    compile_sources(&sources)
}

/// The `*.gschema` files directly inside `dir`, sorted by file name. Symbolic
/// links are followed.
pub fn discover_sources(dir: &Path) -> Result<Vec<PathBuf>, SchemaError> {
    let mut paths = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = entry.map_err(std::io::Error::from)?;
        let path = entry.path();
        if entry.file_type().is_file() && path.extension().map_or(false, |ext| ext == SOURCE_EXTENSION) {
            debug!(file = %path.display(), "found schema source");
            paths.push(path.to_path_buf());
        }
    }
    Ok(paths)
}

fn schema_table(schema: &Schema) -> TableBuilder {
    let mut table = TableBuilder::new();
    let root = table.insert("");

    for entry in schema.entries() {
        let item = match &entry.kind {
            EntryKind::Root => continue,
            EntryKind::Key(key) => {
                let item = table.insert(&entry.name);
                if let Some(default) = &key.default {
                    table.set_value(item, default.clone());
                }
                let options = key.stored_options();
                if !options.is_empty() {
                    table.set_options(
                        item,
                        options_dict(options.iter().map(|(name, value)| (name.as_str(), value.clone()))),
                    );
                }
                item
            }
            EntryKind::Child { schema } => table.insert_string(&entry.name, schema),
        };
        table.set_parent(item, root);
    }

    if let Some(path) = &schema.path {
        let item = table.insert_string(".path", path);
        table.set_parent(item, root);
    }
    if let Some(domain) = &schema.gettext_domain {
        let item = table.insert_string(".gettext-domain", domain);
        table.set_parent(item, root);
    }
    table
}

/// Serialize a `SchemaSet` into the binary cache format.
pub fn encode_schema_set(set: &SchemaSet, order: ByteOrder) -> Vec<u8> {
    let mut outer = TableBuilder::new();
    for schema in set.iter() {
        let item = outer.insert(&schema.id);
        outer.set_table(item, schema_table(schema));
    }
    outer.serialize(order)
}

/// Write the cache to `path`. The file is written next to its destination and
/// renamed into place, so `path` is either untouched or complete.
pub fn write_schema_set(set: &SchemaSet, path: &Path, order: ByteOrder) -> Result<(), SchemaError> {
    let data = encode_schema_set(set, order);
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(&data)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| SchemaError::Io(e.error))?;

    debug!(path = %path.display(), bytes = data.len(), schemas = set.len(), "wrote schema cache");
    Ok(())
}

/// Compile every schema source of `options.source_dir` and write the cache.
/// Returns the path of the written file.
pub fn compile_directory(options: &CompileOptions) -> Result<PathBuf, SchemaError> {
    let sources = discover_sources(&options.source_dir)?;
    if sources.is_empty() {
        return Err(SchemaError::NoSchemaFiles);
    }

    let set = compile_files(&sources)?;
    let output = options.output_path();
    write_schema_set(&set, &output, options.byte_order)?;
    Ok(output)
}
