//! OPF package-document reader (§4.7): manifest, spine, guide/tour, and the
//! metadata fields that populate a [`Book`].

use std::collections::HashMap;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::book_model::{Author, Book};
use crate::error::{Error, Result};
use crate::xml_util::{local_name, resolve_entity};

#[derive(Debug, Clone, Default)]
pub struct ManifestItem {
    pub href: String,
    pub media_type: String,
    pub properties: Vec<String>,
}

impl ManifestItem {
    fn has_property(&self, name: &str) -> bool {
        self.properties.iter().any(|p| p == name)
    }
}

#[derive(Debug, Clone)]
pub struct GuideRef {
    pub kind: String,
    pub title: String,
    pub href: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    None,
    Metadata,
    Manifest,
    Spine,
    Guide,
    Tour,
}

#[derive(Debug, Default)]
pub struct OpfDocument {
    pub book: Book,
    pub manifest: HashMap<String, ManifestItem>,
    /// Manifest ids in spine order.
    pub spine: Vec<String>,
    /// Manifest id of the NCX document, from `<spine toc="...">`.
    pub toc_id: Option<String>,
    pub guide: Vec<GuideRef>,
    pub tour: Vec<GuideRef>,
    /// EPUB3 nav document href (`properties="nav"`), used to pull landmarks
    /// when no `<guide>` is present.
    pub nav_href: Option<String>,
    pub cover_href: Option<String>,
}

impl OpfDocument {
    /// §4.7 cover-classification rule: prefer an EPUB3
    /// `properties="cover-image"` manifest item; otherwise fall back to the
    /// EPUB2 `<meta name="cover" content="ID">` indirection.
    fn resolve_cover(&mut self, epub2_cover_id: Option<&str>) {
        if let Some(href) = self
            .manifest
            .values()
            .find(|item| item.has_property("cover-image"))
            .map(|item| item.href.clone())
        {
            self.cover_href = Some(href);
            return;
        }
        if let Some(id) = epub2_cover_id
            && let Some(item) = self.manifest.get(id)
        {
            self.cover_href = Some(item.href.clone());
        }
    }
}

pub fn parse_opf(content: &str, file_ref: &std::path::Path) -> Result<OpfDocument> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut doc = OpfDocument { book: Book::new(file_ref), ..Default::default() };
    let mut state = State::None;
    let mut current_dc_element: Option<String> = None;
    let mut buf_text = String::new();
    let mut epub2_cover_id: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let local = local_name(e.name().as_ref()).to_vec();
                match local.as_slice() {
                    b"metadata" => state = State::Metadata,
                    b"manifest" => state = State::Manifest,
                    b"spine" => {
                        state = State::Spine;
                        for attr in e.attributes().flatten() {
                            if attr.key.as_ref() == b"toc"
                                && let Ok(v) = String::from_utf8(attr.value.to_vec())
                            {
                                doc.toc_id = Some(v);
                            }
                        }
                    }
                    b"guide" => state = State::Guide,
                    b"tours" => state = State::Tour,
                    b"title" | b"creator" | b"language" | b"identifier" | b"description"
                        if state == State::Metadata =>
                    {
                        current_dc_element = Some(String::from_utf8_lossy(&local).into_owned());
                        buf_text.clear();
                    }
                    b"meta" if state == State::Metadata => {
                        let mut name = None;
                        let mut content = None;
                        for attr in e.attributes().flatten() {
                            match attr.key.as_ref() {
                                b"name" => name = String::from_utf8(attr.value.to_vec()).ok(),
                                b"content" => content = String::from_utf8(attr.value.to_vec()).ok(),
                                _ => {}
                            }
                        }
                        if name.as_deref() == Some("cover")
                            && let Some(id) = content
                        {
                            epub2_cover_id = Some(id);
                        }
                    }
                    b"item" if state == State::Manifest => {
                        let mut id = String::new();
                        let mut href = String::new();
                        let mut media_type = String::new();
                        let mut properties = Vec::new();
                        for attr in e.attributes().flatten() {
                            match attr.key.as_ref() {
                                b"id" => id = String::from_utf8(attr.value.to_vec()).unwrap_or_default(),
                                b"href" => href = String::from_utf8(attr.value.to_vec()).unwrap_or_default(),
                                b"media-type" => {
                                    media_type = String::from_utf8(attr.value.to_vec()).unwrap_or_default()
                                }
                                b"properties" => {
                                    properties = String::from_utf8(attr.value.to_vec())
                                        .unwrap_or_default()
                                        .split_ascii_whitespace()
                                        .map(str::to_string)
                                        .collect();
                                }
                                _ => {}
                            }
                        }
                        if properties.iter().any(|p| p == "nav") {
                            doc.nav_href = Some(href.clone());
                        }
                        if !id.is_empty() {
                            doc.manifest.insert(id, ManifestItem { href, media_type, properties });
                        }
                    }
                    b"itemref" if state == State::Spine => {
                        for attr in e.attributes().flatten() {
                            if attr.key.as_ref() == b"idref"
                                && let Ok(v) = String::from_utf8(attr.value.to_vec())
                            {
                                doc.spine.push(v);
                            }
                        }
                    }
                    b"reference" if state == State::Guide => {
                        push_guide_entry(&e, &mut doc.guide);
                    }
                    b"site" if state == State::Tour => {
                        push_guide_entry(&e, &mut doc.tour);
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(e)) => {
                if current_dc_element.is_some() {
                    buf_text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if current_dc_element.is_some()
                    && let Some(resolved) = resolve_entity(&String::from_utf8_lossy(e.as_ref()))
                {
                    buf_text.push_str(&resolved);
                }
            }
            Ok(Event::End(e)) => {
                let local = local_name(e.name().as_ref()).to_vec();
                match local.as_slice() {
                    b"metadata" => state = State::None,
                    b"manifest" | b"spine" | b"guide" | b"tours" => state = State::None,
                    _ => {}
                }
                if let Some(elem) = current_dc_element.take() {
                    let text = std::mem::take(&mut buf_text);
                    match elem.as_str() {
                        "title" => doc.book.title = text,
                        "creator" => doc.book.authors.push(Author { display_name: text, sort_key: String::new() }),
                        "language" => doc.book.language = Some(text),
                        "identifier" if doc.book.unique_ids.is_empty() => {
                            doc.book.unique_ids.push(("identifier".to_string(), text));
                        }
                        "description" => {}
                        _ => {}
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::Xml(e)),
            _ => {}
        }
    }

    doc.resolve_cover(epub2_cover_id.as_deref());
    Ok(doc)
}

fn push_guide_entry(e: &quick_xml::events::BytesStart, out: &mut Vec<GuideRef>) {
    let mut kind = String::new();
    let mut title = String::new();
    let mut href = String::new();
    for attr in e.attributes().flatten() {
        match attr.key.as_ref() {
            b"type" => kind = String::from_utf8(attr.value.to_vec()).unwrap_or_default(),
            b"title" => title = String::from_utf8(attr.value.to_vec()).unwrap_or_default(),
            b"href" => href = String::from_utf8(attr.value.to_vec()).unwrap_or_default(),
            _ => {}
        }
    }
    if !href.is_empty() {
        out.push(GuideRef { kind, title, href });
    }
}

/// Supplemental EPUB3 landmark reader (§4.7), used only when the package
/// has no `<guide>`: scans a nav document's `epub:type="landmarks"` list and
/// maps it onto the same [`GuideRef`] shape the OPF guide uses.
pub fn parse_nav_landmarks(content: &str) -> Result<Vec<GuideRef>> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut landmarks = Vec::new();
    let mut in_landmarks_nav = false;
    let mut in_anchor = false;
    let mut current_href = String::new();
    let mut current_type = String::new();
    let mut current_label = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let local = local_name(e.name().as_ref()).to_vec();
                match local.as_slice() {
                    b"nav" => {
                        for attr in e.attributes().flatten() {
                            if local_name(attr.key.as_ref()) == b"type"
                                && String::from_utf8_lossy(&attr.value)
                                    .split_ascii_whitespace()
                                    .any(|v| v == "landmarks")
                            {
                                in_landmarks_nav = true;
                            }
                        }
                    }
                    b"a" if in_landmarks_nav => {
                        in_anchor = true;
                        current_label.clear();
                        current_href.clear();
                        current_type.clear();
                        for attr in e.attributes().flatten() {
                            match local_name(attr.key.as_ref()) {
                                b"href" => current_href = String::from_utf8(attr.value.to_vec()).unwrap_or_default(),
                                b"type" => current_type = String::from_utf8(attr.value.to_vec()).unwrap_or_default(),
                                _ => {}
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(e)) => {
                if in_anchor {
                    current_label.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Ok(Event::End(e)) => {
                let local = local_name(e.name().as_ref()).to_vec();
                match local.as_slice() {
                    b"nav" => in_landmarks_nav = false,
                    b"a" if in_anchor => {
                        in_anchor = false;
                        if !current_href.is_empty() && !current_type.is_empty() {
                            landmarks.push(GuideRef {
                                kind: current_type.clone(),
                                title: current_label.clone(),
                                href: current_href.clone(),
                            });
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::Xml(e)),
            _ => {}
        }
    }

    Ok(landmarks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn metadata_and_manifest_parse() {
        let opf = r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>Test Book</dc:title>
    <dc:creator>Author One</dc:creator>
    <dc:language>en</dc:language>
  </metadata>
  <manifest>
    <item id="ch1" href="ch1.xhtml" media-type="application/xhtml+xml"/>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
  </manifest>
  <spine toc="ncx"><itemref idref="ch1"/></spine>
</package>"#;
        let doc = parse_opf(opf, Path::new("book.epub")).unwrap();
        assert_eq!(doc.book.title, "Test Book");
        assert_eq!(doc.book.authors[0].display_name, "Author One");
        assert_eq!(doc.book.language.as_deref(), Some("en"));
        assert_eq!(doc.spine, vec!["ch1"]);
        assert_eq!(doc.toc_id.as_deref(), Some("ncx"));
    }

    #[test]
    fn epub3_cover_image_property_wins_over_epub2_meta() {
        let opf = r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0">
  <metadata><dc:title xmlns:dc="http://purl.org/dc/elements/1.1/">Book</dc:title>
    <meta name="cover" content="legacy-cover"/>
  </metadata>
  <manifest>
    <item id="legacy-cover" href="legacy.jpg" media-type="image/jpeg"/>
    <item id="cover-img" href="cover.jpg" media-type="image/jpeg" properties="cover-image"/>
    <item id="ch1" href="ch1.xhtml" media-type="application/xhtml+xml"/>
  </manifest>
  <spine><itemref idref="ch1"/></spine>
</package>"#;
        let doc = parse_opf(opf, Path::new("book.epub")).unwrap();
        assert_eq!(doc.cover_href.as_deref(), Some("cover.jpg"));
    }

    #[test]
    fn epub2_cover_meta_used_when_no_epub3_property() {
        let opf = r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0">
  <metadata><dc:title xmlns:dc="http://purl.org/dc/elements/1.1/">Book</dc:title>
    <meta name="cover" content="cover-id"/>
  </metadata>
  <manifest>
    <item id="cover-id" href="cover.png" media-type="image/png"/>
  </manifest>
  <spine><itemref idref="ch1"/></spine>
</package>"#;
        let doc = parse_opf(opf, Path::new("book.epub")).unwrap();
        assert_eq!(doc.cover_href.as_deref(), Some("cover.png"));
    }

    #[test]
    fn nav_href_captured_when_properties_nav_present() {
        let opf = r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0">
  <metadata><dc:title xmlns:dc="http://purl.org/dc/elements/1.1/">Book</dc:title></metadata>
  <manifest>
    <item id="nav" href="toc.xhtml" media-type="application/xhtml+xml" properties="nav"/>
    <item id="ch1" href="ch1.xhtml" media-type="application/xhtml+xml"/>
  </manifest>
  <spine><itemref idref="ch1"/></spine>
</package>"#;
        let doc = parse_opf(opf, Path::new("book.epub")).unwrap();
        assert_eq!(doc.nav_href.as_deref(), Some("toc.xhtml"));
    }

    #[test]
    fn nav_landmarks_skip_unknown_types_and_toc_nav() {
        let nav = r#"<?xml version="1.0"?>
<html xmlns:epub="http://www.idpf.org/2007/ops">
  <body>
    <nav epub:type="toc"><ol><li><a href="ch1.xhtml">Chapter 1</a></li></ol></nav>
    <nav epub:type="landmarks">
      <ol>
        <li><a href="cover.xhtml" epub:type="cover">Cover</a></li>
        <li><a href="weird.xhtml" epub:type="something-custom">Weird</a></li>
      </ol>
    </nav>
  </body>
</html>"#;
        let landmarks = parse_nav_landmarks(nav).unwrap();
        assert_eq!(landmarks.len(), 2);
        assert_eq!(landmarks[0].href, "cover.xhtml");
    }

    #[test]
    fn guide_references_are_collected_in_order() {
        let opf = r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0">
  <metadata><dc:title xmlns:dc="http://purl.org/dc/elements/1.1/">Book</dc:title></metadata>
  <manifest><item id="ch1" href="ch1.xhtml" media-type="application/xhtml+xml"/></manifest>
  <spine><itemref idref="ch1"/></spine>
  <guide>
    <reference type="cover" title="Cover" href="cover.xhtml"/>
    <reference type="toc" title="Table of Contents" href="toc.xhtml"/>
  </guide>
</package>"#;
        let doc = parse_opf(opf, Path::new("book.epub")).unwrap();
        assert_eq!(doc.guide.len(), 2);
        assert_eq!(doc.guide[0].kind, "cover");
        assert_eq!(doc.guide[1].href, "toc.xhtml");
    }
}
