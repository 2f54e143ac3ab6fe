//! Book metadata and the per-book model: text models, footnotes, internal
//! hyperlinks, the contents tree, and the font manager.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::allocator::BlockAllocator;
use crate::error::Result;
use crate::text_model::TextModel;

#[derive(Debug, Clone, Default)]
pub struct Author {
    pub display_name: String,
    pub sort_key: String,
}

#[derive(Debug, Clone)]
pub struct Book {
    pub title: String,
    pub language: Option<String>,
    pub encoding: Option<String>,
    pub authors: Vec<Author>,
    /// Hierarchical tag paths, e.g. `["Fiction", "Science Fiction"]`.
    pub tags: Vec<Vec<String>>,
    pub unique_ids: Vec<(String, String)>,
    pub series_title: Option<String>,
    pub series_index: Option<String>,
    pub inner_title: Option<String>,
    pub file_ref: PathBuf,
    pub is_local: bool,
}

impl Book {
    pub fn new(file_ref: impl Into<PathBuf>) -> Self {
        Self {
            title: String::new(),
            language: None,
            encoding: None,
            authors: Vec::new(),
            tags: Vec::new(),
            unique_ids: Vec::new(),
            series_title: None,
            series_index: None,
            inner_title: None,
            file_ref: file_ref.into(),
            is_local: false,
        }
    }
}

/// Target text-model reference, or the unresolved sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelRef {
    Main,
    Footnote(String),
}

/// `(target model, paragraph number)`. Paragraph number -1 = unresolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub model: Option<ModelRef>,
    pub paragraph_number: i32,
}

impl Label {
    pub fn unresolved() -> Self {
        Self { model: None, paragraph_number: -1 }
    }

    pub fn is_resolved(&self) -> bool {
        self.paragraph_number >= 0
    }
}

/// Sentinel reference for synthetic "..." contents nodes (§4.8 level-skip).
pub const SYNTHETIC_REFERENCE: i32 = -2;

#[derive(Debug, Clone, Default)]
pub struct ContentsNode {
    pub text: String,
    pub reference: i32,
    pub children: Vec<ContentsNode>,
}

impl ContentsNode {
    fn new(reference: i32) -> Self {
        Self { text: String::new(), reference, children: Vec::new() }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FontFileInfo {
    pub path: PathBuf,
    pub encrypted: bool,
}

#[derive(Debug, Clone, Default)]
pub struct FontEntry {
    pub normal: Option<FontFileInfo>,
    pub bold: Option<FontFileInfo>,
    pub italic: Option<FontFileInfo>,
    pub bold_italic: Option<FontFileInfo>,
}

/// Owns every text model, the contents tree, and the hyperlink table for one
/// book. Readers are handed a `&mut BookModel` for the duration of a read
/// and never keep an owning reference back into it (see design notes on
/// one-owner-per-object).
pub struct BookModel {
    pub name: String,
    pub cache_dir: PathBuf,
    pub main_text_model: TextModel,
    pub footnote_models: HashMap<String, TextModel>,
    pub internal_hyperlinks: HashMap<String, Label>,
    pub contents_root: Vec<ContentsNode>,
    pub font_manager: HashMap<String, FontEntry>,
    block_size: u32,
}

impl BookModel {
    /// `name` is empty for a local book, otherwise the book file's basename
    /// without its extension (the cache key the allocator files are
    /// prefixed with).
    pub fn new(book_path: &Path, is_local: bool, cache_dir: impl Into<PathBuf>, block_size: u32) -> Self {
        let cache_dir = cache_dir.into();
        let name = if is_local {
            String::new()
        } else {
            book_path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default()
        };
        let main_alloc = BlockAllocator::new(cache_dir.clone(), name.clone(), "ncache", "data", block_size);
        Self {
            name,
            cache_dir,
            main_text_model: TextModel::new(main_alloc),
            footnote_models: HashMap::new(),
            internal_hyperlinks: HashMap::new(),
            contents_root: Vec::new(),
            font_manager: HashMap::new(),
            block_size,
        }
    }

    pub fn footnote_model_mut(&mut self, id: &str) -> &mut TextModel {
        self.footnote_models.entry(id.to_string()).or_insert_with(|| {
            let suffix = format!("nfn{id}");
            let alloc = BlockAllocator::new(self.cache_dir.clone(), self.name.clone(), suffix, "data", self.block_size);
            TextModel::new(alloc)
        })
    }

    pub fn label_paragraph_number(&self, anchor: &str) -> i32 {
        self.internal_hyperlinks.get(anchor).map(|l| l.paragraph_number).unwrap_or(-1)
    }

    /// Flushes the main model, every footnote model, and the
    /// internal-hyperlinks block. Returns `Ok` only if none of them failed.
    pub fn flush(&mut self) -> Result<()> {
        self.main_text_model.flush()?;
        for model in self.footnote_models.values_mut() {
            model.flush()?;
        }
        self.flush_hyperlinks_block()?;
        Ok(())
    }

    /// Writes the internal-hyperlinks cache block in the wire format §6
    /// describes: repeated `(id, modelId, paragraphNumber)` records.
    fn flush_hyperlinks_block(&mut self) -> Result<()> {
        let mut alloc = BlockAllocator::new(self.cache_dir.clone(), self.name.clone(), "nlinks", "data", self.block_size);
        for (id, label) in &self.internal_hyperlinks {
            let model_id = match &label.model {
                None => String::new(),
                Some(ModelRef::Main) => String::new(),
                Some(ModelRef::Footnote(fid)) => fid.clone(),
            };
            write_hyperlink_record(&mut alloc, id, &model_id, label.paragraph_number);
        }
        alloc.flush()
    }
}

fn write_hyperlink_record(alloc: &mut BlockAllocator, id: &str, model_id: &str, paragraph_number: i32) {
    use crate::allocator::{write_u16_le, write_u32_le};
    let id_units: Vec<u16> = id.encode_utf16().collect();
    let model_units: Vec<u16> = model_id.encode_utf16().collect();
    let len = 2 + id_units.len() * 2 + 2 + model_units.len() * 2 + 4;
    let (_, buf) = alloc.allocate(len);
    let mut pos = 0;
    write_u16_le(buf, pos, id_units.len() as u16);
    pos += 2;
    for u in &id_units {
        write_u16_le(buf, pos, *u);
        pos += 2;
    }
    write_u16_le(buf, pos, model_units.len() as u16);
    pos += 2;
    for u in &model_units {
        write_u16_le(buf, pos, *u);
        pos += 2;
    }
    write_u32_le(buf, pos, paragraph_number as u32);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_is_empty_for_local_book() {
        let dir = tempfile::tempdir().unwrap();
        let model = BookModel::new(Path::new("/books/Dune.epub"), true, dir.path(), 131_072);
        assert_eq!(model.name, "");
    }

    #[test]
    fn name_is_basename_without_extension_for_non_local_book() {
        let dir = tempfile::tempdir().unwrap();
        let model = BookModel::new(Path::new("/books/Dune.epub"), false, dir.path(), 131_072);
        assert_eq!(model.name, "Dune");
    }

    #[test]
    fn unresolved_label_is_paragraph_negative_one() {
        let label = Label::unresolved();
        assert_eq!(label.paragraph_number, -1);
        assert!(!label.is_resolved());
    }

    #[test]
    fn flush_writes_hyperlinks_block() {
        let dir = tempfile::tempdir().unwrap();
        let mut model = BookModel::new(Path::new("book.epub"), false, dir.path(), 131_072);
        model.internal_hyperlinks.insert(
            "0#intro".to_string(),
            Label { model: Some(ModelRef::Main), paragraph_number: 3 },
        );
        model.main_text_model.flush().unwrap();
        model.flush().unwrap();
        let path = dir.path().join("booknlinks.data.0");
        assert!(path.exists());
    }
}
