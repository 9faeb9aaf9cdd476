use std::path::PathBuf;

use gschema_format::ByteOrder;

/// File name of the compiled schema cache.
pub const OUTPUT_FILE: &str = "gschemas.compiled";

/// File extension of schema sources.
pub const SOURCE_EXTENSION: &str = "gschema";

/// Everything one run of the compiler needs to know.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileOptions {
    /// Directory scanned for `*.gschema` files.
    pub source_dir: PathBuf,
    /// Where `gschemas.compiled` goes; the source directory when unset. A
    /// relative path is taken relative to the source directory.
    pub target_dir: Option<PathBuf>,
    pub byte_order: ByteOrder,
}

impl CompileOptions {
    pub fn new(source_dir: impl Into<PathBuf>) -> CompileOptions {
        CompileOptions {
            source_dir: source_dir.into(),
            target_dir: None,
            byte_order: ByteOrder::default(),
        }
    }

    pub fn with_target_dir(mut self, target_dir: impl Into<PathBuf>) -> CompileOptions {
        self.target_dir = Some(target_dir.into());
        self
    }

    pub fn with_byte_order(mut self, byte_order: ByteOrder) -> CompileOptions {
        self.byte_order = byte_order;
        self
    }

    pub fn output_path(&self) -> PathBuf {
        let dir: PathBuf = match self.target_dir.as_deref() {
            Some(target) => self.source_dir.join(target),
            None => self.source_dir.clone(),
        };
        dir.join(OUTPUT_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_path() {
        let options = CompileOptions::new("/usr/share/schemas");
        assert_eq!(options.output_path(), PathBuf::from("/usr/share/schemas/gschemas.compiled"));
        assert_eq!(options.byte_order, ByteOrder::Little);

        let options = options.with_target_dir("/tmp/out").with_byte_order(ByteOrder::Big);
        assert_eq!(options.output_path(), PathBuf::from("/tmp/out/gschemas.compiled"));
        assert_eq!(options.byte_order, ByteOrder::Big);

        let options = CompileOptions::new("schemas").with_target_dir("out");
        assert_eq!(options.output_path(), PathBuf::from("schemas/out/gschemas.compiled"));
    }
}
