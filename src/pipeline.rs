//! EPUB pipeline (§4.7) and TOC generation (§4.8): opens the container
//! archive, resolves encryption sidecars, parses the OPF and NCX, drives the
//! XHTML reader across the spine in order, and assembles the contents tree.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use quick_xml::events::Event;
use quick_xml::Reader;
use zip::ZipArchive;

use crate::book_model::{Book, BookModel};
use crate::book_reader::{apply_metadata, BookReader};
use crate::config::ReaderConfig;
use crate::css::Stylesheet;
use crate::error::{Error, Result};
use crate::io::{ByteSource, ByteSourceCursor, FileSource};
use crate::ncx::{parse_ncx, NavPoint};
use crate::opf::{parse_nav_landmarks, parse_opf, OpfDocument};
use crate::text_model::ParagraphKind;
use crate::xhtml::{normalize_path, normalized_reference, XhtmlReader};
use crate::xml_util::{dir_name, local_name, resolve_path, strip_bom};

/// Set of archive paths an encryption sidecar lists. Per §4.5 point 2, a
/// listed file is always treated as unreadable — this crate never attempts
/// decryption, it only surfaces the gap as an encrypted-section paragraph.
#[derive(Debug, Default)]
pub struct EncryptionMap {
    encrypted: HashSet<String>,
}

impl EncryptionMap {
    pub fn empty() -> Self {
        Self { encrypted: HashSet::new() }
    }

    pub fn is_encrypted(&self, path: &str) -> bool {
        self.encrypted.contains(path)
    }

    /// Archive paths listed as encrypted, in an arbitrary but stable order.
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.encrypted.iter().cloned().collect();
        paths.sort();
        paths
    }

    /// Parses `META-INF/encryption.xml`'s `CipherReference` entries. URIs are
    /// relative to the archive root, the same base `container.xml` uses, so
    /// no directory prefix is applied.
    fn parse(content: &str) -> Result<Self> {
        let mut reader = Reader::from_str(content);
        reader.config_mut().trim_text(true);
        let mut encrypted = HashSet::new();

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                    let local = local_name(e.name().as_ref()).to_vec();
                    if local == b"CipherReference" {
                        for attr in e.attributes().flatten() {
                            if local_name(attr.key.as_ref()) == b"URI"
                                && let Ok(uri) = String::from_utf8(attr.value.to_vec())
                            {
                                let decoded = percent_encoding::percent_decode_str(&uri).decode_utf8_lossy().into_owned();
                                encrypted.insert(normalize_path(&decoded));
                            }
                        }
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(Error::Xml(e)),
                _ => {}
            }
        }

        Ok(Self { encrypted })
    }
}

/// The product of one `read_book` call: the parsed metadata record, the
/// populated text/contents models, and a couple of summary facts the plugin
/// registry's lighter-weight capability accessors also need.
pub struct ReadResult {
    pub book: Book,
    pub model: BookModel,
    pub cover_image_name: Option<String>,
}

type Archive = ZipArchive<ByteSourceCursor>;

fn open_archive(book_path: &Path) -> Result<Archive> {
    let file = std::fs::File::open(book_path)?;
    let source: Arc<dyn ByteSource> = Arc::new(FileSource::new(file)?);
    let cursor = ByteSourceCursor::new(source);
    Ok(ZipArchive::new(cursor)?)
}

/// Steps 1-2 of §4.7: open the container, read the encryption sidecar, and
/// parse the OPF. Shared by `read_book` and the plugin registry's lighter
/// metainfo/uids/annotation/cover accessors, none of which need a full
/// spine-and-TOC pass.
struct ParsedContainer {
    archive: Archive,
    opf: OpfDocument,
    opf_content: String,
    opf_dir: String,
    encryption: EncryptionMap,
}

fn parse_container(book_path: &Path) -> Result<ParsedContainer> {
    let mut archive = open_archive(book_path)?;

    let opf_path = find_opf_path(&mut archive)?;
    let opf_dir = dir_name(&opf_path);
    let encryption = match read_archive_file(&mut archive, "META-INF/encryption.xml") {
        Ok(content) => EncryptionMap::parse(&content)?,
        Err(_) => EncryptionMap::empty(),
    };

    let opf_content = read_archive_file(&mut archive, &opf_path)?;
    let mut opf = parse_opf(&opf_content, book_path)?;
    supplement_nav_landmarks(&mut archive, &mut opf, &opf_dir);
    if opf.book.title.is_empty() {
        let fallback = book_path.file_stem().map(|s| s.to_string_lossy().into_owned());
        apply_metadata(&mut opf.book, fallback, None);
    }

    Ok(ParsedContainer { archive, opf, opf_content, opf_dir, encryption })
}

/// Reads an EPUB file at `book_path` into a [`ReadResult`], following the six
/// pipeline steps of §4.7.
pub fn read_book(book_path: &Path, config: &ReaderConfig) -> Result<ReadResult> {
    let ParsedContainer { mut archive, opf, opf_dir, encryption, .. } = parse_container(book_path)?;

    let mut model = BookModel::new(book_path, false, &config.cache_dir, config.block_size);

    let alias_table = build_alias_table(&opf, &opf_dir);

    // Step 4: parse the NCX, if named, and collect the filenames its
    // nav-points reference (for end-of-section insertion in step 5).
    let navigation_map = read_navigation_map(&mut archive, &opf, &opf_dir);
    let ncx_referenced = referenced_filenames(&navigation_map, &opf_dir);

    let cover = resolve_cover_classification(&opf, &opf_dir);
    let cover_image_name = cover
        .full_path
        .as_deref()
        .filter(|_| cover.is_single_image)
        .map(|path| path.rsplit('/').next().unwrap_or(path).to_string());

    // Step 3 + 5: walk the spine in order.
    read_spine(&mut archive, &opf, &opf_dir, &alias_table, &cover, &ncx_referenced, &encryption, &mut model, config)?;

    // Step 6: generate the TOC.
    generate_toc(&mut model, &navigation_map, &opf, &opf_dir, &alias_table);

    model.flush()?;
    Ok(ReadResult { book: opf.book, model, cover_image_name })
}

/// §4.9's `readMetainfo(book) -> bool` capability: parses the OPF metadata
/// without walking the spine or building a text model.
pub fn read_metainfo(book_path: &Path) -> Result<Book> {
    Ok(parse_container(book_path)?.opf.book)
}

/// §4.9's `readUids(book)` capability.
pub fn read_uids(book_path: &Path) -> Result<Vec<(String, String)>> {
    Ok(parse_container(book_path)?.opf.book.unique_ids)
}

/// §4.9's `readEncryptionInfos(book) -> [EncryptionInfo]` capability. An
/// `EncryptionInfo` here is just the archive path the host would need to
/// exclude or flag; actual cipher metadata is never modeled since this
/// crate never attempts decryption.
pub fn read_encryption_infos(book_path: &Path) -> Result<Vec<String>> {
    Ok(parse_container(book_path)?.encryption.paths())
}

/// §4.9's `readAnnotation(file) -> string` capability: the OPF's
/// `<dc:description>`, if present.
pub fn read_annotation(book_path: &Path) -> Result<Option<String>> {
    let parsed = parse_container(book_path)?;
    Ok(extract_description(&parsed.opf_content)?)
}

fn extract_description(opf_content: &str) -> Result<Option<String>> {
    let mut reader = Reader::from_str(opf_content);
    reader.config_mut().trim_text(true);
    let mut in_description = false;
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if local_name(e.name().as_ref()) == b"description" => in_description = true,
            Ok(Event::End(e)) if local_name(e.name().as_ref()) == b"description" => {
                if !text.is_empty() {
                    return Ok(Some(text));
                }
                in_description = false;
            }
            Ok(Event::Text(e)) if in_description => text.push_str(&e.unescape()?),
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::Xml(e)),
            _ => {}
        }
    }
    Ok(None)
}

/// §4.9's `readLanguageAndEncoding(book) -> bool` capability: falls back to
/// the [`crate::lang::LanguageDetector`] over the first readable spine
/// item's raw bytes when the OPF declared no `dc:language`.
pub fn read_language_and_encoding(book_path: &Path, threshold: f64) -> Result<Option<(String, String)>> {
    let mut parsed = parse_container(book_path)?;
    if let Some(language) = parsed.opf.book.language.clone() {
        return Ok(Some((language, parsed.opf.book.encoding.clone().unwrap_or_else(|| "UTF-8".to_string()))));
    }
    let Some(first_id) = parsed.opf.spine.first().cloned() else { return Ok(None) };
    let Some(item) = parsed.opf.manifest.get(&first_id).cloned() else { return Ok(None) };
    let full_path = normalize_path(&resolve_path(&parsed.opf_dir, &item.href));
    let Ok(bytes) = read_archive_file_bytes(&mut parsed.archive, &full_path) else { return Ok(None) };
    Ok(crate::lang::LanguageDetector::new().find_info(&bytes, threshold))
}

/// §4.9's `coverImage(file) -> image | null` capability: the raw bytes of
/// the classified cover image, when the book's cover resolves to a single
/// standalone image rather than an XHTML cover page.
pub fn cover_image_bytes(book_path: &Path) -> Result<Option<Vec<u8>>> {
    let mut parsed = parse_container(book_path)?;
    let cover = resolve_cover_classification(&parsed.opf, &parsed.opf_dir);
    if !cover.is_single_image {
        return Ok(None);
    }
    let Some(full_path) = cover.full_path else { return Ok(None) };
    match read_archive_file_bytes(&mut parsed.archive, &full_path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(_) => Ok(None),
    }
}

struct CoverClassification {
    full_path: Option<String>,
    is_single_image: bool,
}

/// §4.7's cover-classification rule: a guide/tour reference of type `cover`
/// or `other.ms-coverimage-standard` matching the resolved cover href decides
/// between a single-image cover and an XHTML cover page; absent such a
/// reference, the manifest media type decides.
fn resolve_cover_classification(opf: &OpfDocument, opf_dir: &str) -> CoverClassification {
    let Some(cover_href) = &opf.cover_href else {
        return CoverClassification { full_path: None, is_single_image: false };
    };
    let full_path = normalize_path(&resolve_path(opf_dir, cover_href));

    for entry in opf.guide.iter().chain(opf.tour.iter()) {
        if normalize_path(&resolve_path(opf_dir, &entry.href)) != full_path {
            continue;
        }
        if entry.kind == "other.ms-coverimage-standard" {
            return CoverClassification { full_path: Some(full_path), is_single_image: true };
        }
        if entry.kind == "cover" {
            let is_image = opf
                .manifest
                .values()
                .find(|item| item.href == *cover_href)
                .map(|item| item.media_type.starts_with("image/"))
                .unwrap_or(false);
            return CoverClassification { full_path: Some(full_path), is_single_image: is_image };
        }
    }

    let is_image = opf
        .manifest
        .values()
        .find(|item| item.href == *cover_href)
        .map(|item| item.media_type.starts_with("image/"))
        .unwrap_or(false);
    CoverClassification { full_path: Some(full_path), is_single_image: is_image }
}

fn build_alias_table(opf: &OpfDocument, opf_dir: &str) -> HashMap<String, String> {
    let mut table = HashMap::new();
    for (i, id) in opf.spine.iter().enumerate() {
        if let Some(item) = opf.manifest.get(id) {
            let full_path = normalize_path(&resolve_path(opf_dir, &item.href));
            table.insert(full_path, i.to_string());
        }
    }
    table
}

fn read_navigation_map<R: std::io::Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    opf: &OpfDocument,
    opf_dir: &str,
) -> BTreeMap<i32, NavPoint> {
    let Some(toc_id) = &opf.toc_id else { return BTreeMap::new() };
    let Some(item) = opf.manifest.get(toc_id) else { return BTreeMap::new() };
    let ncx_path = normalize_path(&resolve_path(opf_dir, &item.href));
    let Ok(content) = read_archive_file(archive, &ncx_path) else { return BTreeMap::new() };
    match parse_ncx(&content) {
        Ok(map) => map,
        Err(e) => {
            log::warn!("failed to parse NCX {ncx_path}: {e}");
            BTreeMap::new()
        }
    }
}

fn referenced_filenames(navigation_map: &BTreeMap<i32, NavPoint>, opf_dir: &str) -> HashSet<String> {
    navigation_map
        .values()
        .map(|p| {
            let file_part = p.content_href.split('#').next().unwrap_or(&p.content_href);
            normalize_path(&resolve_path(opf_dir, file_part))
        })
        .collect()
}

fn supplement_nav_landmarks<R: std::io::Read + std::io::Seek>(archive: &mut ZipArchive<R>, opf: &mut OpfDocument, opf_dir: &str) {
    if !opf.guide.is_empty() {
        return;
    }
    let Some(nav_href) = opf.nav_href.clone() else { return };
    let nav_path = normalize_path(&resolve_path(opf_dir, &nav_href));
    let Ok(content) = read_archive_file(archive, &nav_path) else { return };
    match parse_nav_landmarks(&content) {
        Ok(landmarks) if !landmarks.is_empty() => opf.guide = landmarks,
        Ok(_) => {}
        Err(e) => log::warn!("failed to parse nav landmarks {nav_path}: {e}"),
    }
}

#[allow(clippy::too_many_arguments)]
fn read_spine<R: std::io::Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    opf: &OpfDocument,
    opf_dir: &str,
    alias_table: &HashMap<String, String>,
    cover: &CoverClassification,
    ncx_referenced: &HashSet<String>,
    encryption: &EncryptionMap,
    model: &mut BookModel,
    config: &ReaderConfig,
) -> Result<()> {
    let mut stylesheet = Stylesheet::empty();

    for (i, id) in opf.spine.iter().enumerate() {
        let Some(item) = opf.manifest.get(id) else { continue };
        let full_path = normalize_path(&resolve_path(opf_dir, &item.href));
        let alias = i.to_string();

        let mut mark_first_image_as_cover = false;
        if i == 0 {
            if cover.full_path.as_deref() == Some(full_path.as_str()) {
                if cover.is_single_image {
                    emit_cover_image(model, &full_path);
                    continue;
                }
                mark_first_image_as_cover = true;
            } else {
                emit_cover_image(model, cover.full_path.as_deref().unwrap_or(""));
            }
        } else if ncx_referenced.contains(&full_path) {
            BookReader::new(model).insert_end_of_section_paragraph();
        }

        if encryption.is_encrypted(&full_path) {
            if config.skip_encrypted {
                continue;
            }
            BookReader::new(model).insert_encrypted_section_paragraph();
            continue;
        }

        let Ok(content) = read_archive_file(archive, &full_path) else {
            BookReader::new(model).insert_encrypted_section_paragraph();
            continue;
        };

        let reference_dir = dir_name(&full_path);
        let mut xhtml = XhtmlReader::new(
            alias,
            reference_dir,
            alias_table.clone(),
            std::mem::replace(&mut stylesheet, Stylesheet::empty()),
            mark_first_image_as_cover,
            BookReader::new(model),
        );
        let mut sheet_loader = |path: &str| -> Option<String> {
            let normalized = normalize_path(path);
            read_archive_file(archive, &normalized).ok()
        };
        let ok = xhtml.read_document(&content, &mut sheet_loader).unwrap_or(false);
        stylesheet = xhtml.into_stylesheet();
        if !ok {
            BookReader::new(model).insert_encrypted_section_paragraph();
        }
    }

    Ok(())
}

fn emit_cover_image(model: &mut BookModel, full_path: &str) {
    if full_path.is_empty() {
        return;
    }
    let name = full_path.rsplit('/').next().unwrap_or(full_path).to_string();
    let mut reader = BookReader::new(model);
    reader.set_main_text_model();
    reader.begin_paragraph(ParagraphKind::Regular);
    reader.add_image(&name);
    reader.add_image_reference(&name, 0, true);
    reader.end_paragraph();
    reader.insert_end_of_section_paragraph();
}

/// §4.8: walks the navigation map maintaining an open-levels counter,
/// falling back to the guide/tour TOC when the navigation map is empty.
/// Grounded in `OEBBookReader::generateTOC`: `level` starts at 0, and the
/// level-open loop's pre-increment happens on every condition check, not
/// only when its body runs — replicated here with an explicit `loop`.
fn generate_toc(
    model: &mut BookModel,
    navigation_map: &BTreeMap<i32, NavPoint>,
    opf: &OpfDocument,
    opf_dir: &str,
    alias_table: &HashMap<String, String>,
) {
    if !navigation_map.is_empty() {
        let resolved: Vec<(i64, i32, String)> = navigation_map
            .values()
            .map(|point| {
                let normalized = normalized_reference(&point.content_href, opf_dir, "", alias_table);
                let index = model.label_paragraph_number(&normalized);
                (point.level as i64, index, point.label.clone())
            })
            .collect();

        let mut reader = BookReader::new(model);
        let mut level: i64 = 0;
        for (point_level, index, label) in &resolved {
            while level > *point_level {
                reader.end_contents_paragraph();
                level -= 1;
            }
            loop {
                level += 1;
                if level > *point_level {
                    break;
                }
                reader.begin_contents_paragraph(BookReader::synthetic_reference());
                reader.add_contents_data("...");
            }
            reader.begin_contents_paragraph(*index);
            reader.add_contents_data(label);
        }
        while level > 0 {
            reader.end_contents_paragraph();
            level -= 1;
        }
        return;
    }

    // Fallback: tour wins over guide when both are present (grounded in
    // `OEBBookReader::generateTOC`'s `myTourTOC.empty() ? myGuideTOC :
    // myTourTOC`, which SPEC_FULL.md's prose inverted).
    let toc = if !opf.tour.is_empty() { &opf.tour } else { &opf.guide };
    let resolved: Vec<(i32, String)> = toc
        .iter()
        .map(|entry| {
            let normalized = normalized_reference(&entry.href, opf_dir, "", alias_table);
            (model.label_paragraph_number(&normalized), entry.title.clone())
        })
        .collect();

    let mut reader = BookReader::new(model);
    for (index, title) in resolved {
        if index != -1 {
            reader.begin_contents_paragraph(index);
            reader.add_contents_data(&title);
            reader.end_contents_paragraph();
        }
    }
}

fn find_opf_path<R: std::io::Read + std::io::Seek>(archive: &mut ZipArchive<R>) -> Result<String> {
    let container = read_archive_file(archive, "META-INF/container.xml")?;
    let mut reader = Reader::from_str(&container);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event() {
            Ok(Event::Empty(e)) | Ok(Event::Start(e)) if local_name(e.name().as_ref()) == b"rootfile" => {
                for attr in e.attributes().flatten() {
                    if local_name(attr.key.as_ref()) == b"full-path" {
                        return Ok(String::from_utf8(attr.value.to_vec())?);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::Xml(e)),
            _ => {}
        }
    }

    Err(Error::InvalidEpub("no rootfile found in container.xml".into()))
}

fn read_archive_file<R: std::io::Read + std::io::Seek>(archive: &mut ZipArchive<R>, path: &str) -> Result<String> {
    let bytes = read_archive_file_bytes(archive, path)?;
    Ok(String::from_utf8(strip_bom(&bytes).to_vec())?)
}

fn read_archive_file_bytes<R: std::io::Read + std::io::Seek>(archive: &mut ZipArchive<R>, path: &str) -> Result<Vec<u8>> {
    match archive.by_name(path) {
        Ok(mut file) => {
            let mut contents = Vec::new();
            std::io::Read::read_to_end(&mut file, &mut contents)?;
            return Ok(contents);
        }
        Err(zip::result::ZipError::FileNotFound) => {}
        Err(e) => return Err(e.into()),
    }

    let decoded = percent_encoding::percent_decode_str(path)
        .decode_utf8()
        .map_err(|_| Error::InvalidEpub(format!("invalid UTF-8 in path: {path}")))?;
    let mut file = archive.by_name(&decoded)?;
    let mut contents = Vec::new();
    std::io::Read::read_to_end(&mut file, &mut contents)?;
    Ok(contents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn build_epub(files: &[(&str, &str)]) -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut zip = zip::ZipWriter::new(file.reopen().unwrap());
        let options = SimpleFileOptions::default();
        zip.start_file("META-INF/container.xml", options).unwrap();
        zip.write_all(
            br#"<?xml version="1.0"?><container><rootfiles><rootfile full-path="OEBPS/content.opf"/></rootfiles></container>"#,
        )
        .unwrap();
        for (name, content) in files {
            zip.start_file(format!("OEBPS/{name}"), options).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
        file
    }

    #[test]
    fn minimal_epub_yields_one_paragraph_and_empty_toc() {
        let opf = r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0">
  <metadata><dc:title xmlns:dc="http://purl.org/dc/elements/1.1/">Test</dc:title></metadata>
  <manifest><item id="a" href="a.xhtml" media-type="application/xhtml+xml"/></manifest>
  <spine><itemref idref="a"/></spine>
</package>"#;
        let a_xhtml = r#"<html><body><p>hello</p></body></html>"#;
        let epub = build_epub(&[("content.opf", opf), ("a.xhtml", a_xhtml)]);
        let cache = tempfile::tempdir().unwrap();
        let config = ReaderConfig::new(cache.path());
        let result = read_book(epub.path(), &config).unwrap();
        assert_eq!(result.book.title, "Test");
        assert_eq!(result.model.main_text_model.paragraph_count(), 1);
        assert!(result.model.contents_root.is_empty());
    }

    #[test]
    fn cover_from_guide_emits_leading_image_paragraph() {
        let opf = r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0">
  <metadata><dc:title xmlns:dc="http://purl.org/dc/elements/1.1/">Test</dc:title></metadata>
  <manifest>
    <item id="c" href="c.png" media-type="image/png"/>
    <item id="a" href="a.xhtml" media-type="application/xhtml+xml"/>
  </manifest>
  <spine><itemref idref="a"/></spine>
  <guide><reference type="cover" title="Cover" href="c.png"/></guide>
</package>"#;
        let a_xhtml = r#"<html><body><p>hello</p></body></html>"#;
        let epub = build_epub(&[("content.opf", opf), ("a.xhtml", a_xhtml)]);
        let cache = tempfile::tempdir().unwrap();
        let config = ReaderConfig::new(cache.path());
        let result = read_book(epub.path(), &config).unwrap();
        // cover paragraph + section-end + the body paragraph
        assert_eq!(result.model.main_text_model.paragraph_count(), 3);
    }

    #[test]
    fn ncx_with_level_skip_builds_nested_contents_tree() {
        let opf = r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0">
  <metadata><dc:title xmlns:dc="http://purl.org/dc/elements/1.1/">Test</dc:title></metadata>
  <manifest>
    <item id="a" href="a.xhtml" media-type="application/xhtml+xml"/>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
  </manifest>
  <spine toc="ncx"><itemref idref="a"/></spine>
</package>"#;
        let a_xhtml = r#"<html><body><p id="p1">Part I</p><p id="p2">Deep</p></body></html>"#;
        let ncx = r#"<navMap>
            <navPoint playOrder="1"><navLabel><text>Part I</text></navLabel><content src="a.xhtml#p1"/></navPoint>
            <navPoint playOrder="2"><navLabel><text>Deep</text></navLabel><content src="a.xhtml#p2"/>
                <navPoint playOrder="3"><navLabel><text>Deeper</text></navLabel><content src="a.xhtml#p2"/></navPoint>
            </navPoint>
        </navMap>"#;
        let epub = build_epub(&[("content.opf", opf), ("a.xhtml", a_xhtml), ("toc.ncx", ncx)]);
        let cache = tempfile::tempdir().unwrap();
        let config = ReaderConfig::new(cache.path());
        let result = read_book(epub.path(), &config).unwrap();
        assert_eq!(result.model.contents_root.len(), 1);
        assert_eq!(result.model.contents_root[0].text, "Part I");
        assert_eq!(result.model.contents_root[0].children[0].text, "Deep");
        assert_eq!(result.model.contents_root[0].children[0].children[0].text, "Deeper");
    }

    #[test]
    fn encrypted_spine_item_yields_encrypted_section_paragraph() {
        let opf = r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0">
  <metadata><dc:title xmlns:dc="http://purl.org/dc/elements/1.1/">Test</dc:title></metadata>
  <manifest><item id="a" href="a.xhtml" media-type="application/xhtml+xml"/></manifest>
  <spine><itemref idref="a"/></spine>
</package>"#;
        let encryption = r#"<encryption xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <EncryptedData xmlns="http://www.w3.org/2001/04/xmlenc#">
    <CipherData><CipherReference URI="OEBPS/a.xhtml"/></CipherData>
  </EncryptedData>
</encryption>"#;
        let a_xhtml = r#"<html><body><p>secret</p></body></html>"#;
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut zip = zip::ZipWriter::new(file.reopen().unwrap());
        let options = SimpleFileOptions::default();
        zip.start_file("META-INF/container.xml", options).unwrap();
        zip.write_all(
            br#"<?xml version="1.0"?><container><rootfiles><rootfile full-path="OEBPS/content.opf"/></rootfiles></container>"#,
        )
        .unwrap();
        zip.start_file("META-INF/encryption.xml", options).unwrap();
        zip.write_all(encryption.as_bytes()).unwrap();
        zip.start_file("OEBPS/content.opf", options).unwrap();
        zip.write_all(opf.as_bytes()).unwrap();
        zip.start_file("OEBPS/a.xhtml", options).unwrap();
        zip.write_all(a_xhtml.as_bytes()).unwrap();
        zip.finish().unwrap();

        let cache = tempfile::tempdir().unwrap();
        let config = ReaderConfig::new(cache.path());
        let result = read_book(file.path(), &config).unwrap();
        assert_eq!(result.model.main_text_model.paragraph_count(), 1);
        use crate::text_model::ParagraphKind;
        assert_eq!(result.model.main_text_model.paragraph_kind(0), ParagraphKind::EncryptedSection);
    }
}
