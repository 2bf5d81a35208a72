//! Storage collaborator for annotated documents.
//!
//! The pipeline reads an existing annotation tree by file-group name and
//! writes a new or updated group after each stage. The core only needs
//! `load` and `store`; [`DirectoryStorage`] ships as a directory-backed
//! JSON implementation sized to round-tripping the hierarchy.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;

use crate::core::errors::PipelineResult;
use crate::domain::tree::Document;

/// Load/store boundary towards the annotation workspace.
pub trait Storage {
    /// Loads the document stored under the given file-group name.
    fn load(&self, file_group: &str) -> PipelineResult<Document>;

    /// Stores the document under the given file-group name, replacing any
    /// previous content.
    fn store(&self, file_group: &str, doc: &Document) -> PipelineResult<()>;
}

/// Stores each file group as `<root>/<group>.json`.
#[derive(Debug, Clone)]
pub struct DirectoryStorage {
    root: PathBuf,
}

impl DirectoryStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn group_path(&self, file_group: &str) -> PathBuf {
        self.root.join(format!("{}.json", file_group))
    }
}

impl Storage for DirectoryStorage {
    fn load(&self, file_group: &str) -> PipelineResult<Document> {
        let file = File::open(self.group_path(file_group))?;
        let doc = serde_json::from_reader(BufReader::new(file))?;
        Ok(doc)
    }

    fn store(&self, file_group: &str, doc: &Document) -> PipelineResult<()> {
        std::fs::create_dir_all(&self.root)?;
        let file = File::create(self.group_path(file_group))?;
        serde_json::to_writer_pretty(BufWriter::new(file), doc)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::tree::{ImageRef, NodeData, PageAttrs, RegionAttrs, RegionKind};
    use crate::processors::geometry::{BoundingBox, Geometry};

    #[test]
    fn test_directory_storage_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DirectoryStorage::new(dir.path());

        let mut doc = Document::new();
        let page = doc.add_page(PageAttrs::new(ImageRef::new("p1.png"), 800, 600));
        doc.attach_children(
            page,
            vec![NodeData::Region(RegionAttrs::new(
                Geometry::Rect(BoundingBox::new(10.0, 10.0, 700.0, 500.0)),
                RegionKind::Text,
            ))],
        )
        .unwrap();

        storage.store("OCR-D-SEG", &doc).unwrap();
        let restored = storage.load("OCR-D-SEG").unwrap();
        assert_eq!(doc, restored);
    }

    #[test]
    fn test_missing_group_fails() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DirectoryStorage::new(dir.path());
        assert!(storage.load("NOPE").is_err());
    }
}
