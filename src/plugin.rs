//! Format-plugin registry (§4.9) and the plugin-shim status contract (§6).
//!
//! A host (the out-of-scope JNI/FFI shim) looks a file type up by its tag
//! and calls into the capability record it gets back. Registration is
//! static: the registry is built once behind a [`OnceLock`] and consulted
//! read-only thereafter, matching §5's "initialized once, read-only
//! thereafter" concurrency guarantee. Only `"ePub"` has a real
//! implementation — every other tag resolves to [`Error::PluginNotFound`]
//! by construction, since only the EPUB/OEB pipeline is in scope.

use std::path::Path;
use std::sync::OnceLock;

use crate::book_model::Book;
use crate::config::ReaderConfig;
use crate::error::{Error, Result};
use crate::pipeline::{self, ReadResult};

/// One format plugin's capability record: a struct of function pointers,
/// not a trait-object hierarchy, per §4.9's explicit Rust translation.
pub struct PluginEntry {
    pub tag: &'static str,
    pub read_metainfo: fn(&Path) -> Result<Book>,
    pub read_uids: fn(&Path) -> Result<Vec<(String, String)>>,
    pub read_language_and_encoding: fn(&Path, f64) -> Result<Option<(String, String)>>,
    pub read_encryption_infos: fn(&Path) -> Result<Vec<String>>,
    pub read_model: fn(&Path, &ReaderConfig) -> Result<ReadResult>,
    pub read_annotation: fn(&Path) -> Result<Option<String>>,
    pub cover_image: fn(&Path) -> Result<Option<Vec<u8>>>,
}

const EPUB_ENTRY: PluginEntry = PluginEntry {
    tag: "ePub",
    read_metainfo: pipeline::read_metainfo,
    read_uids: pipeline::read_uids,
    read_language_and_encoding: pipeline::read_language_and_encoding,
    read_encryption_infos: pipeline::read_encryption_infos,
    read_model: pipeline::read_book,
    read_annotation: pipeline::read_annotation,
    cover_image: pipeline::cover_image_bytes,
};

fn registry() -> &'static [PluginEntry] {
    static REGISTRY: OnceLock<Vec<PluginEntry>> = OnceLock::new();
    REGISTRY.get_or_init(|| vec![EPUB_ENTRY]).as_slice()
}

/// Looks up the plugin registered for `tag`. Unknown tags (anything other
/// than `"ePub"`, e.g. `"fb2"` or `"mobi"`) resolve to `PluginNotFound`.
pub fn find_plugin(tag: &str) -> Result<&'static PluginEntry> {
    registry().iter().find(|entry| entry.tag == tag).ok_or_else(|| Error::PluginNotFound(tag.to_string()))
}

/// The plugin-shim status contract (§6): a small, `repr(u8)` mirror of
/// [`Error`]'s variants plus a success discriminant, suitable for crossing
/// an FFI boundary as a plain integer (the marshalling itself is out of
/// scope — only the status vocabulary is modeled here).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShimStatus {
    Ok = 0,
    IoError = 1,
    ZipError = 2,
    XmlError = 3,
    Utf8Error = 4,
    InvalidFormat = 5,
    MissingElement = 6,
    PluginNotFound = 7,
    AllocatorFailed = 8,
}

impl From<&Error> for ShimStatus {
    fn from(err: &Error) -> Self {
        match err {
            Error::Io(_) => ShimStatus::IoError,
            Error::Zip(_) => ShimStatus::ZipError,
            Error::Xml(_) => ShimStatus::XmlError,
            Error::Utf8(_) => ShimStatus::Utf8Error,
            Error::InvalidEpub(_) => ShimStatus::InvalidFormat,
            Error::MissingElement(_) => ShimStatus::MissingElement,
            Error::PluginNotFound(_) => ShimStatus::PluginNotFound,
            Error::AllocatorFailed(_) => ShimStatus::AllocatorFailed,
        }
    }
}

impl<T> From<&Result<T>> for ShimStatus {
    fn from(result: &Result<T>) -> Self {
        match result {
            Ok(_) => ShimStatus::Ok,
            Err(e) => ShimStatus::from(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn build_epub() -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut zip = zip::ZipWriter::new(file.reopen().unwrap());
        let options = SimpleFileOptions::default();
        zip.start_file("META-INF/container.xml", options).unwrap();
        zip.write_all(
            br#"<?xml version="1.0"?><container><rootfiles><rootfile full-path="OEBPS/content.opf"/></rootfiles></container>"#,
        )
        .unwrap();
        zip.start_file("OEBPS/content.opf", options).unwrap();
        zip.write_all(
            br#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0">
  <metadata>
    <dc:title xmlns:dc="http://purl.org/dc/elements/1.1/">Test Book</dc:title>
    <dc:description xmlns:dc="http://purl.org/dc/elements/1.1/">A short blurb.</dc:description>
  </metadata>
  <manifest><item id="a" href="a.xhtml" media-type="application/xhtml+xml"/></manifest>
  <spine><itemref idref="a"/></spine>
</package>"#,
        )
        .unwrap();
        zip.start_file("OEBPS/a.xhtml", options).unwrap();
        zip.write_all(br#"<html><body><p>hello</p></body></html>"#).unwrap();
        zip.finish().unwrap();
        file
    }

    #[test]
    fn epub_tag_resolves_to_registered_plugin() {
        assert_eq!(find_plugin("ePub").unwrap().tag, "ePub");
    }

    #[test]
    fn unknown_tag_is_plugin_not_found() {
        let err = find_plugin("fb2").unwrap_err();
        assert!(matches!(err, Error::PluginNotFound(tag) if tag == "fb2"));
    }

    #[test]
    fn epub_entry_reads_metainfo_and_annotation() {
        let epub = build_epub();
        let entry = find_plugin("ePub").unwrap();
        let book = (entry.read_metainfo)(epub.path()).unwrap();
        assert_eq!(book.title, "Test Book");
        let annotation = (entry.read_annotation)(epub.path()).unwrap();
        assert_eq!(annotation.as_deref(), Some("A short blurb."));
    }

    #[test]
    fn shim_status_maps_plugin_not_found() {
        let err = Error::PluginNotFound("fb2".to_string());
        assert_eq!(ShimStatus::from(&err), ShimStatus::PluginNotFound);
    }

    #[test]
    fn shim_status_ok_for_success() {
        let result: Result<u32> = Ok(42);
        assert_eq!(ShimStatus::from(&result), ShimStatus::Ok);
    }
}
