//! XHTML reader (§4.5): drives the quick-xml push parser over a single
//! spine document, dispatches tags to their actions, applies matched CSS,
//! and emits paragraph entries into a [`BookReader`].

use std::collections::HashMap;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::book_reader::BookReader;
use crate::css::{Frame, StyleEntry, Stylesheet};
use crate::error::{Error, Result};
use crate::text_model::{HyperlinkType, ParagraphKind, TextKind};
use crate::xml_util::{local_name, resolve_entity, resolve_path};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadingState {
    Nothing,
    Style,
    Body,
    Video,
}

fn control_kind(tag: &str) -> Option<TextKind> {
    match tag {
        "b" => Some(TextKind::Bold),
        "strong" => Some(TextKind::Strong),
        "i" => Some(TextKind::Italic),
        "em" => Some(TextKind::Emphasis),
        "sup" => Some(TextKind::Superscript),
        "sub" => Some(TextKind::Subscript),
        "code" => Some(TextKind::Code),
        "cite" => Some(TextKind::Citation),
        "strike" | "s" | "del" => Some(TextKind::Strike),
        "u" => Some(TextKind::Underline),
        "small" => Some(TextKind::Small),
        _ => None,
    }
}

fn is_heading(tag: &str) -> bool {
    matches!(tag, "h1" | "h2" | "h3" | "h4" | "h5" | "h6")
}

/// Collapses `href`/`src`-style path segments against a directory prefix,
/// removing `.`/`..` the way the cache's alias table keys are normalized.
pub(crate) fn normalize_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

/// Resolves an `href` into the model's cross-file anchor form
/// `"<alias>#<fragment>"`. A bare `#fragment` resolves against the file
/// currently being read.
pub fn normalized_reference(
    href: &str,
    reference_dir: &str,
    current_alias: &str,
    alias_table: &HashMap<String, String>,
) -> String {
    if let Some(frag) = href.strip_prefix('#') {
        return format!("{current_alias}#{frag}");
    }
    let (file_part, frag) = match href.split_once('#') {
        Some((f, fr)) => (f, Some(fr)),
        None => (href, None),
    };
    let resolved = normalize_path(&resolve_path(reference_dir, file_part));
    match (alias_table.get(&resolved), frag) {
        (Some(alias), Some(f)) => format!("{alias}#{f}"),
        (Some(alias), None) => alias.clone(),
        (None, _) => href.to_string(),
    }
}

struct TagFrame {
    suppressed: bool,
    pushed_kind: Option<TextKind>,
    is_paragraph_tag: bool,
    had_style_entry: bool,
}

/// Drives a single XHTML document read. Constructed fresh per spine file;
/// the style table and alias table persist across files via the caller.
pub struct XhtmlReader<'m> {
    alias: String,
    reference_dir: String,
    alias_table: HashMap<String, String>,
    stylesheet: Stylesheet,
    state: ReadingState,
    state_before_style_or_video: ReadingState,
    body_counter: u32,
    list_stack: Vec<u32>,
    mark_next_image_as_cover: bool,
    ancestor_stack: Vec<(String, Option<String>, Vec<String>, Vec<(String, String)>)>,
    tag_stack: Vec<TagFrame>,
    preformatted_depth: u32,
    style_buffer: String,
    video_sources: Vec<String>,
    at_paragraph_start: bool,
    reader: BookReader<'m>,
}

impl<'m> XhtmlReader<'m> {
    pub fn new(
        alias: String,
        reference_dir: String,
        alias_table: HashMap<String, String>,
        stylesheet: Stylesheet,
        mark_next_image_as_cover: bool,
        reader: BookReader<'m>,
    ) -> Self {
        Self {
            alias,
            reference_dir,
            alias_table,
            stylesheet,
            state: ReadingState::Nothing,
            state_before_style_or_video: ReadingState::Nothing,
            body_counter: 0,
            list_stack: Vec::new(),
            mark_next_image_as_cover,
            ancestor_stack: Vec::new(),
            tag_stack: Vec::new(),
            preformatted_depth: 0,
            style_buffer: String::new(),
            video_sources: Vec::new(),
            at_paragraph_start: false,
            reader,
        }
    }

    pub fn into_stylesheet(self) -> Stylesheet {
        self.stylesheet
    }

    /// Reads one XHTML document into the book reader. Returns `Ok(true)` if
    /// any content was emitted, `Ok(false)` on a parse failure with nothing
    /// emitted (per §4.5 point 4: non-fatal, the caller decides how to
    /// proceed — e.g. an encrypted-section marker).
    pub fn read_document(&mut self, content: &str, sheet_loader: &mut dyn FnMut(&str) -> Option<String>) -> Result<bool> {
        let mut reader = Reader::from_str(content);
        reader.config_mut().trim_text(false);
        let mut emitted = false;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let local = String::from_utf8_lossy(local_name(e.name().as_ref())).into_owned();
                    let attrs = collect_attrs(&e);
                    self.handle_start(&local, &attrs, sheet_loader);
                    emitted = true;
                }
                Ok(Event::Empty(e)) => {
                    let local = String::from_utf8_lossy(local_name(e.name().as_ref())).into_owned();
                    let attrs = collect_attrs(&e);
                    self.handle_start(&local, &attrs, sheet_loader);
                    self.handle_end(&local);
                    emitted = true;
                }
                Ok(Event::Text(e)) => {
                    let raw = String::from_utf8_lossy(e.as_ref()).into_owned();
                    self.handle_text(&raw);
                }
                Ok(Event::GeneralRef(e)) => {
                    if let Some(resolved) = resolve_entity(&String::from_utf8_lossy(e.as_ref())) {
                        self.handle_text(&resolved);
                    }
                }
                Ok(Event::End(e)) => {
                    let local = String::from_utf8_lossy(local_name(e.name().as_ref())).into_owned();
                    self.handle_end(&local);
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    log::warn!("xhtml parse error in {}: {e}", self.alias);
                    return Ok(emitted);
                }
                _ => {}
            }
        }

        Ok(emitted)
    }

    fn suppressed(&self) -> bool {
        self.tag_stack.iter().any(|f| f.suppressed)
    }

    fn handle_start(&mut self, local: &str, attrs: &[(String, String)], sheet_loader: &mut dyn FnMut(&str) -> Option<String>) {
        match local {
            "body" => {
                if self.body_counter == 0 {
                    self.state = ReadingState::Body;
                } else {
                    self.reader.insert_end_of_section_paragraph();
                }
                self.body_counter += 1;
                self.tag_stack.push(TagFrame {
                    suppressed: false,
                    pushed_kind: None,
                    is_paragraph_tag: false,
                    had_style_entry: false,
                });
                return;
            }
            "style" => {
                self.state_before_style_or_video = self.state;
                self.state = ReadingState::Style;
                self.style_buffer.clear();
                self.tag_stack.push(TagFrame {
                    suppressed: false,
                    pushed_kind: None,
                    is_paragraph_tag: false,
                    had_style_entry: false,
                });
                return;
            }
            "link" => {
                let rel = attr(attrs, "rel").unwrap_or_default();
                let kind = attr(attrs, "type").unwrap_or_default();
                if rel.eq_ignore_ascii_case("stylesheet") && (kind.is_empty() || kind == "text/css")
                    && let Some(href) = attr(attrs, "href")
                    && let Some(css) = sheet_loader(&resolve_path(&self.reference_dir, &href))
                {
                    let imported = Stylesheet::parse(&css, sheet_loader);
                    self.stylesheet.merge(imported);
                }
                self.tag_stack.push(TagFrame {
                    suppressed: false,
                    pushed_kind: None,
                    is_paragraph_tag: false,
                    had_style_entry: false,
                });
                return;
            }
            "video" => {
                self.state_before_style_or_video = self.state;
                self.state = ReadingState::Video;
                self.video_sources.clear();
            }
            "source" if self.state == ReadingState::Video => {
                if let Some(src) = attr(attrs, "src") {
                    self.video_sources.push(resolve_path(&self.reference_dir, &src));
                }
                self.tag_stack.push(TagFrame {
                    suppressed: false,
                    pushed_kind: None,
                    is_paragraph_tag: false,
                    had_style_entry: false,
                });
                return;
            }
            _ => {}
        }

        if self.state != ReadingState::Body {
            self.tag_stack.push(TagFrame {
                suppressed: false,
                pushed_kind: None,
                is_paragraph_tag: false,
                had_style_entry: false,
            });
            return;
        }

        if self.suppressed() {
            self.tag_stack.push(TagFrame {
                suppressed: true,
                pushed_kind: None,
                is_paragraph_tag: false,
                had_style_entry: false,
            });
            return;
        }

        let id = attr(attrs, "id");
        let classes: Vec<String> = attr(attrs, "class")
            .map(|c| c.split_ascii_whitespace().map(str::to_string).collect())
            .unwrap_or_default();
        self.ancestor_stack.push((local.to_string(), id.clone(), classes, attrs.to_vec()));

        let style = self.resolve_style(attrs);
        let suppress = style.display == Some(crate::css::Display::None);

        let opened_block_mid_paragraph = !suppress
            && style.display == Some(crate::css::Display::Block)
            && self.reader.is_paragraph_open()
            && !matches!(local, "p" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6");
        if opened_block_mid_paragraph {
            self.reader.end_paragraph();
        }

        let had_style_entry = !suppress && !style.is_empty();
        if had_style_entry {
            self.reader.add_style_entry(&style);
        }

        let mut pushed_kind = None;
        let mut is_paragraph_tag = false;

        if !suppress {
            if local == "p" || is_heading(local) {
                self.reader.begin_paragraph(ParagraphKind::Regular);
                self.at_paragraph_start = true;
                is_paragraph_tag = true;
            } else if let Some(kind) = control_kind(local) {
                self.reader.push_kind(kind);
                pushed_kind = Some(kind);
            } else if local == "a" {
                self.handle_anchor_start(attrs);
            } else if matches!(local, "img" | "image") {
                self.handle_image(attrs);
            } else if local == "ol" {
                self.list_stack.push(1);
            } else if local == "ul" {
                self.list_stack.push(0);
            } else if local == "li" {
                if let Some(n) = self.list_stack.last_mut()
                    && *n > 0
                {
                    let prefix = format!("{n}. ");
                    *n += 1;
                    self.reader.add_text(&prefix);
                }
            } else if local == "pre" {
                self.preformatted_depth += 1;
            }

            if let Some(id) = &id
                && self.reader.is_paragraph_open()
            {
                self.reader.add_hyperlink_label(&format!("{}#{}", self.alias, id));
            }
        }

        self.tag_stack.push(TagFrame {
            suppressed: suppress,
            pushed_kind,
            is_paragraph_tag,
            had_style_entry,
        });
    }

    fn handle_anchor_start(&mut self, attrs: &[(String, String)]) {
        let Some(href) = attr(attrs, "href") else { return };
        let is_internal = href.starts_with('#') || href.contains('#');
        let label = normalized_reference(&href, &self.reference_dir, &self.alias, &self.alias_table);
        let link_type = if is_internal { HyperlinkType::Internal } else { HyperlinkType::External };
        self.reader.add_hyperlink_control(TextKind::Underline, link_type, &label);
    }

    fn handle_image(&mut self, attrs: &[(String, String)]) {
        let src = attr(attrs, "src").or_else(|| attr(attrs, "xlink:href"));
        let Some(src) = src else { return };
        let resolved = normalize_path(&resolve_path(&self.reference_dir, &src));
        self.reader.add_image(&resolved);
        let is_cover = self.mark_next_image_as_cover;
        if is_cover {
            self.mark_next_image_as_cover = false;
        }
        self.reader.add_image_reference(&resolved, 0, is_cover);
    }

    fn resolve_style(&self, attrs: &[(String, String)]) -> StyleEntry {
        let frames: Vec<Frame> = self
            .ancestor_stack
            .iter()
            .map(|(tag, id, classes, attrs)| Frame {
                tag: tag.as_str(),
                id: id.as_deref(),
                classes: classes.as_slice(),
                attrs: attrs.as_slice(),
            })
            .collect();
        let mut style = self.stylesheet.resolve(&frames);
        if let Some(inline) = attr(attrs, "style") {
            style.merge(&Stylesheet::parse_inline(&inline));
        }
        style
    }

    fn handle_text(&mut self, text: &str) {
        match self.state {
            ReadingState::Nothing | ReadingState::Video => return,
            ReadingState::Style => {
                self.style_buffer.push_str(text);
                return;
            }
            ReadingState::Body => {}
        }
        if self.suppressed() {
            return;
        }
        if self.preformatted_depth > 0 {
            if !text.is_empty() {
                self.reader.add_text(text);
                self.at_paragraph_start = false;
            }
            return;
        }
        let collapsed = collapse_whitespace(text);
        let collapsed = if self.at_paragraph_start { collapsed.trim_start().to_string() } else { collapsed };
        if collapsed.is_empty() {
            return;
        }
        self.reader.add_text(&collapsed);
        self.at_paragraph_start = false;
    }

    fn handle_end(&mut self, local: &str) {
        match local {
            "body" => {
                self.tag_stack.pop();
                return;
            }
            "style" => {
                self.tag_stack.pop();
                let parsed = Stylesheet::parse(&self.style_buffer, &mut |_| None);
                self.stylesheet.merge(parsed);
                self.style_buffer.clear();
                self.state = self.state_before_style_or_video;
                return;
            }
            "link" => {
                self.tag_stack.pop();
                return;
            }
            "video" => {
                if !self.video_sources.is_empty() {
                    self.reader.add_video_entry(&self.video_sources);
                }
                self.video_sources.clear();
                self.state = self.state_before_style_or_video;
                return;
            }
            "source" => {
                self.tag_stack.pop();
                return;
            }
            _ => {}
        }

        let Some(frame) = self.tag_stack.pop() else { return };
        if frame.suppressed {
            return;
        }
        if self.state != ReadingState::Body {
            return;
        }

        match local {
            "ol" | "ul" => {
                self.list_stack.pop();
            }
            _ => {}
        }

        if frame.pushed_kind.is_some() {
            self.reader.pop_kind();
        }
        if frame.is_paragraph_tag {
            self.reader.end_paragraph();
            self.at_paragraph_start = false;
        }
        if frame.had_style_entry {
            self.reader.add_style_close_entry();
        }
        self.ancestor_stack.pop();
    }
}

fn collect_attrs(e: &quick_xml::events::BytesStart) -> Vec<(String, String)> {
    e.attributes()
        .flatten()
        .map(|a| {
            let key = String::from_utf8_lossy(local_name(a.key.as_ref())).into_owned();
            let value = String::from_utf8_lossy(&a.value).into_owned();
            (key, value)
        })
        .collect()
}

fn attr(attrs: &[(String, String)], name: &str) -> Option<String> {
    attrs.iter().find(|(k, _)| k == name).map(|(_, v)| v.clone())
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_was_space = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(c);
            last_was_space = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book_model::BookModel;
    use std::path::Path;

    fn fixture() -> (tempfile::TempDir, BookModel) {
        let dir = tempfile::tempdir().unwrap();
        let model = BookModel::new(Path::new("book.epub"), false, dir.path(), 131_072);
        (dir, model)
    }

    #[test]
    fn paragraph_and_bold_control_round_trip() {
        let (_dir, mut model) = fixture();
        let reader = BookReader::new(&mut model);
        let mut xhtml = XhtmlReader::new(
            "0".to_string(),
            String::new(),
            HashMap::new(),
            Stylesheet::empty(),
            false,
            reader,
        );
        let ok = xhtml
            .read_document("<html><body><p>Hello <b>world</b>!</p></body></html>", &mut |_| None)
            .unwrap();
        assert!(ok);
    }

    #[test]
    fn whitespace_collapses_to_single_space() {
        let (_dir, mut model) = fixture();
        let reader = BookReader::new(&mut model);
        let mut xhtml = XhtmlReader::new(
            "0".to_string(),
            String::new(),
            HashMap::new(),
            Stylesheet::empty(),
            false,
            reader,
        );
        xhtml
            .read_document("<html><body><p>a   b\n\tc</p></body></html>", &mut |_| None)
            .unwrap();
        assert_eq!(model.main_text_model.paragraph_count(), 1);
        assert_eq!(model.main_text_model.paragraph_length(0), 1);
        // "a   b\n\tc" collapses every internal whitespace run to one space.
        assert_eq!(model.main_text_model.text_size(0), "a b c".len() as u32);
    }

    #[test]
    fn ordered_list_emits_incrementing_prefix_unordered_emits_none() {
        let (_dir, mut model) = fixture();
        let reader = BookReader::new(&mut model);
        let mut xhtml = XhtmlReader::new(
            "0".to_string(),
            String::new(),
            HashMap::new(),
            Stylesheet::empty(),
            false,
            reader,
        );
        xhtml
            .read_document(
                "<html><body><p><ol><li>first</li><li>second</li></ol></p><p><ul><li>bullet</li></ul></p></body></html>",
                &mut |_| None,
            )
            .unwrap();
        assert_eq!(model.main_text_model.paragraph_count(), 2);
        // ordered: two "N. " prefix entries plus the two item texts.
        assert_eq!(model.main_text_model.paragraph_length(0), 4);
        assert_eq!(model.main_text_model.text_size(0), "1. first2. second".len() as u32);
        // unordered: no prefix entry, just the item text itself.
        assert_eq!(model.main_text_model.paragraph_length(1), 1);
        let bullet_only = "bullet".len() as u32;
        assert_eq!(model.main_text_model.text_size(1) - model.main_text_model.text_size(0), bullet_only);
    }

    #[test]
    fn internal_anchor_registers_and_links_via_fragment() {
        let (_dir, mut model) = fixture();
        let reader = BookReader::new(&mut model);
        let mut xhtml = XhtmlReader::new("0".to_string(), String::new(), HashMap::new(), Stylesheet::empty(), false, reader);
        xhtml
            .read_document(
                r#"<html><body><p>jump to <a href="#target">here</a></p><p id="target">Target</p></body></html>"#,
                &mut |_| None,
            )
            .unwrap();
        // the <a href="#target"> link resolves through the same-file fragment
        // path in `normalized_reference` to the id-bearing paragraph below.
        assert_eq!(model.label_paragraph_number("0#target"), 1);
        // "jump to " text, the hyperlink control, and "here" text.
        assert_eq!(model.main_text_model.paragraph_length(0), 3);
        assert_eq!(model.main_text_model.text_size(0), "jump to here".len() as u32);
    }

    #[test]
    fn normalized_reference_resolves_same_file_fragment_against_current_alias() {
        let table = HashMap::new();
        let result = normalized_reference("#note1", "", "3", &table);
        assert_eq!(result, "3#note1");
    }

    #[test]
    fn normalized_reference_resolves_cross_file_href_via_alias_table() {
        let mut table = HashMap::new();
        table.insert("chapters/ch2.xhtml".to_string(), "2".to_string());
        let result = normalized_reference("ch2.xhtml#sec1", "chapters", "0", &table);
        assert_eq!(result, "2#sec1");
    }

    #[test]
    fn display_none_suppresses_nested_text() {
        let (_dir, mut model) = fixture();
        let reader = BookReader::new(&mut model);
        let stylesheet = Stylesheet::parse("span.hidden { display: none; }", &mut |_| None);
        let mut xhtml = XhtmlReader::new("0".to_string(), String::new(), HashMap::new(), stylesheet, false, reader);
        xhtml
            .read_document(
                r#"<html><body><p>before <span class="hidden">invisible</span> after</p></body></html>"#,
                &mut |_| None,
            )
            .unwrap();
        // "before " and " after" are kept, "invisible" never reaches add_text.
        assert_eq!(model.main_text_model.paragraph_length(0), 2);
        assert_eq!(model.main_text_model.text_size(0), "before after".len() as u32 + 1);
    }
}
