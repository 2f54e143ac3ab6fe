//! Book reader: the writer side of the text model. A stateful façade over
//! a [`BookModel`] that tag actions push into while a spine file is being
//! read.

use crate::book_model::{Book, BookModel, ContentsNode, Label, ModelRef, SYNTHETIC_REFERENCE};
use crate::css::StyleEntry;
use crate::text_model::{HyperlinkType, ParagraphKind, TextKind};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Target {
    Main,
    Footnote,
}

/// One entry in the open-contents-node stack built while walking NCX/guide
/// output (see §4.8): tracks the node and its declared depth.
struct OpenContentsNode {
    node: ContentsNode,
}

/// A stateful writer over a [`BookModel`] for the duration of one read.
///
/// Owns nothing the model doesn't also own — it borrows the model mutably
/// and is discarded when the read completes, per the "owned graphs with
/// back-references" redesign: no struct here stores an owning handle back
/// into the model.
pub struct BookReader<'m> {
    model: &'m mut BookModel,
    target: Target,
    current_footnote: Option<String>,
    kind_stack: Vec<TextKind>,
    paragraph_open: bool,
    registered_image_names: Vec<String>,
    contents_stack: Vec<OpenContentsNode>,
}

impl<'m> BookReader<'m> {
    pub fn new(model: &'m mut BookModel) -> Self {
        Self {
            model,
            target: Target::Main,
            current_footnote: None,
            kind_stack: Vec::new(),
            paragraph_open: false,
            registered_image_names: Vec::new(),
            contents_stack: Vec::new(),
        }
    }

    pub fn set_main_text_model(&mut self) {
        self.target = Target::Main;
        self.current_footnote = None;
    }

    pub fn set_footnote_model(&mut self, id: &str) {
        self.target = Target::Footnote;
        self.current_footnote = Some(id.to_string());
        self.model.footnote_model_mut(id);
    }

    fn with_current_model<R>(&mut self, f: impl FnOnce(&mut crate::text_model::TextModel) -> R) -> R {
        match (self.target, &self.current_footnote) {
            (Target::Main, _) => f(&mut self.model.main_text_model),
            (Target::Footnote, Some(id)) => f(self.model.footnote_model_mut(id)),
            (Target::Footnote, None) => f(&mut self.model.main_text_model),
        }
    }

    pub fn push_kind(&mut self, kind: TextKind) {
        self.kind_stack.push(kind);
        self.with_current_model(|m| m.add_control(kind, true));
    }

    /// Unmatched pop is a programming error: it means a tag action popped a
    /// kind nothing pushed, which signals a broken tag-action registration
    /// rather than malformed input.
    pub fn pop_kind(&mut self) {
        let kind = self.kind_stack.pop().expect("pop_kind called with an empty stack");
        self.with_current_model(|m| m.add_control(kind, false));
    }

    pub fn begin_paragraph(&mut self, kind: ParagraphKind) {
        self.with_current_model(|m| m.begin_paragraph(kind));
        self.paragraph_open = true;
        // Re-open every control currently on the stack so a paragraph that
        // restarts mid-span still carries its enclosing styles.
        let reopen: Vec<TextKind> = self.kind_stack.clone();
        for kind in reopen {
            self.with_current_model(|m| m.add_control(kind, true));
        }
    }

    pub fn end_paragraph(&mut self) {
        let reopen: Vec<TextKind> = self.kind_stack.clone();
        for kind in reopen.iter().rev() {
            self.with_current_model(|m| m.add_control(*kind, false));
        }
        self.with_current_model(|m| m.end_paragraph());
        self.paragraph_open = false;
    }

    /// Equivalent to `end_paragraph` + `begin_paragraph(Regular)`, preserving
    /// the open style stack. `add_empty_line` inserts exactly one synthetic
    /// blank regular paragraph between the two.
    pub fn restart_paragraph(&mut self, add_empty_line: bool) {
        self.end_paragraph();
        if add_empty_line {
            self.begin_paragraph(ParagraphKind::Regular);
            self.end_paragraph();
        }
        self.begin_paragraph(ParagraphKind::Regular);
    }

    pub fn is_paragraph_open(&self) -> bool {
        self.paragraph_open
    }

    pub fn add_text(&mut self, text: &str) {
        self.with_current_model(|m| m.add_text(text));
    }

    pub fn add_style_entry(&mut self, entry: &StyleEntry) {
        if entry.is_empty() {
            return;
        }
        self.with_current_model(|m| m.add_style_entry(entry));
    }

    pub fn add_style_close_entry(&mut self) {
        self.with_current_model(|m| m.add_style_close_entry());
    }

    pub fn add_fixed_hspace(&mut self, count: u16) {
        self.with_current_model(|m| m.add_fixed_hspace(count));
    }

    pub fn add_bidi_reset(&mut self) {
        self.with_current_model(|m| m.add_bidi_reset());
    }

    pub fn add_video_entry(&mut self, sources: &[String]) {
        if !sources.is_empty() {
            self.with_current_model(|m| m.add_video_entry(sources));
        }
    }

    pub fn insert_end_of_section_paragraph(&mut self) {
        self.with_current_model(|m| {
            m.begin_paragraph(ParagraphKind::SectionEnd);
            m.end_paragraph();
        });
    }

    pub fn insert_encrypted_section_paragraph(&mut self) {
        self.with_current_model(|m| {
            m.begin_paragraph(ParagraphKind::EncryptedSection);
            m.end_paragraph();
        });
    }

    pub fn insert_end_of_text_paragraph(&mut self) {
        self.with_current_model(|m| {
            m.begin_paragraph(ParagraphKind::EndOfText);
            m.end_paragraph();
        });
    }

    /// Registers an image blob with the model, deduplicated by name.
    pub fn add_image(&mut self, name: &str) {
        if !self.registered_image_names.iter().any(|n| n == name) {
            self.registered_image_names.push(name.to_string());
        }
    }

    pub fn add_image_reference(&mut self, name: &str, v_offset: i16, is_cover: bool) {
        self.with_current_model(|m| m.add_image(name, v_offset, is_cover));
    }

    pub fn add_hyperlink_control(&mut self, kind: TextKind, link_type: HyperlinkType, label: &str) {
        self.with_current_model(|m| m.add_hyperlink_control(kind, link_type, label));
    }

    /// Records `label -> (current model, current paragraph index)` in the
    /// book model's internal-hyperlink map. The paragraph index is the one
    /// about to be opened/just opened — callers register after
    /// `begin_paragraph` so the index is defined.
    pub fn add_hyperlink_label(&mut self, label: &str) {
        let model_ref = match (self.target, &self.current_footnote) {
            (Target::Main, _) => ModelRef::Main,
            (Target::Footnote, Some(id)) => ModelRef::Footnote(id.clone()),
            (Target::Footnote, None) => ModelRef::Main,
        };
        let paragraph_number = match (self.target, &self.current_footnote) {
            (Target::Main, _) => self.model.main_text_model.paragraph_count() as i32,
            (Target::Footnote, Some(id)) => self.model.footnote_model_mut(id).paragraph_count() as i32,
            (Target::Footnote, None) => self.model.main_text_model.paragraph_count() as i32,
        };
        self.model.internal_hyperlinks.insert(
            label.to_string(),
            Label { model: Some(model_ref), paragraph_number },
        );
    }

    pub fn begin_contents_paragraph(&mut self, reference: i32) {
        self.contents_stack.push(OpenContentsNode { node: ContentsNode::new(reference) });
    }

    pub fn add_contents_data(&mut self, text: &str) {
        if let Some(top) = self.contents_stack.last_mut() {
            top.node.text.push_str(text);
        }
    }

    pub fn end_contents_paragraph(&mut self) {
        let Some(finished) = self.contents_stack.pop() else { return };
        match self.contents_stack.last_mut() {
            Some(parent) => parent.node.children.push(finished.node),
            None => self.model.contents_root.push(finished.node),
        }
    }

    pub fn synthetic_reference() -> i32 {
        SYNTHETIC_REFERENCE
    }

    /// Looks up a previously registered internal-hyperlink label's paragraph
    /// number, -1 if unresolved. Used while generating the contents tree,
    /// which needs to read labels registered earlier in the same pass.
    pub fn label_paragraph_number(&self, anchor: &str) -> i32 {
        self.model.label_paragraph_number(anchor)
    }
}

/// Seeds a book model's metadata record alongside its text content; kept
/// here rather than in `book_model` since population happens incrementally
/// as the pipeline reads the OPF `<metadata>` block.
pub fn apply_metadata(book: &mut Book, title: Option<String>, language: Option<String>) {
    if let Some(title) = title {
        book.title = title;
    }
    if let Some(language) = language {
        book.language = Some(language);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book_model::BookModel;
    use std::path::Path;

    fn reader_fixture() -> (tempfile::TempDir, BookModel) {
        let dir = tempfile::tempdir().unwrap();
        let model = BookModel::new(Path::new("book.epub"), false, dir.path(), 131_072);
        (dir, model)
    }

    #[test]
    fn paragraph_restart_preserves_open_kinds() {
        let (_dir, mut model) = reader_fixture();
        let mut reader = BookReader::new(&mut model);
        reader.begin_paragraph(ParagraphKind::Regular);
        reader.push_kind(TextKind::Bold);
        reader.add_text("one");
        reader.restart_paragraph(false);
        reader.add_text("two");
        reader.pop_kind();
        reader.end_paragraph();
        model.main_text_model.flush().unwrap();
        assert_eq!(model.main_text_model.paragraph_count(), 2);
    }

    #[test]
    fn restart_with_empty_line_inserts_one_blank_paragraph() {
        let (_dir, mut model) = reader_fixture();
        let mut reader = BookReader::new(&mut model);
        reader.begin_paragraph(ParagraphKind::Regular);
        reader.add_text("one");
        reader.restart_paragraph(true);
        reader.add_text("two");
        reader.end_paragraph();
        model.main_text_model.flush().unwrap();
        // one, blank, two
        assert_eq!(model.main_text_model.paragraph_count(), 3);
        assert_eq!(model.main_text_model.paragraph_length(1), 0);
    }

    #[test]
    fn hyperlink_label_records_current_paragraph() {
        let (_dir, mut model) = reader_fixture();
        let mut reader = BookReader::new(&mut model);
        reader.begin_paragraph(ParagraphKind::Regular);
        reader.add_text("intro");
        reader.add_hyperlink_label("0#intro");
        reader.end_paragraph();
        assert_eq!(model.label_paragraph_number("0#intro"), 0);
    }

    #[test]
    fn contents_tree_nests_children_under_parent() {
        let (_dir, mut model) = reader_fixture();
        let mut reader = BookReader::new(&mut model);
        reader.begin_contents_paragraph(0);
        reader.add_contents_data("Part I");
        reader.begin_contents_paragraph(SYNTHETIC_REFERENCE);
        reader.add_contents_data("...");
        reader.end_contents_paragraph();
        reader.end_contents_paragraph();
        assert_eq!(model.contents_root.len(), 1);
        assert_eq!(model.contents_root[0].children.len(), 1);
        assert_eq!(model.contents_root[0].children[0].text, "...");
    }

    #[test]
    #[should_panic(expected = "pop_kind called with an empty stack")]
    fn unmatched_pop_kind_panics() {
        let (_dir, mut model) = reader_fixture();
        let mut reader = BookReader::new(&mut model);
        reader.pop_kind();
    }
}
