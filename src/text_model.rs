//! Paragraph text model: an append-only sequence of paragraphs, each a
//! sequence of typed entries, persisted through a [`BlockAllocator`].

use crate::allocator::{write_i16_le, write_u16_le, BlockAllocator};
use crate::css::StyleEntry;
use crate::error::Result;

/// Tag byte identifying an entry's shape inside the packed block stream.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryType {
    Text = 0,
    ControlStart = 1,
    ControlEnd = 2,
    Image = 3,
    HyperlinkControl = 4,
    Style = 5,
    StyleClose = 6,
    FixedHSpace = 7,
    BidiReset = 8,
    Video = 9,
}

/// Which text-decoration kind a control or hyperlink-control entry opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TextKind {
    Bold = 0,
    Italic = 1,
    Emphasis = 2,
    Strong = 3,
    Superscript = 4,
    Subscript = 5,
    Code = 6,
    Citation = 7,
    Strike = 8,
    Underline = 9,
    Small = 10,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HyperlinkType {
    Internal = 0,
    External = 1,
}

/// A tag describing a paragraph's role, carried alongside its entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ParagraphKind {
    Regular = 0,
    SectionEnd = 1,
    EncryptedSection = 2,
    ExternalHyperlink = 3,
    InternalHyperlink = 4,
    BookSynopsis = 5,
    EndOfText = 6,
}

fn ucs2(s: &str) -> Vec<u16> {
    s.encode_utf16().collect()
}

/// An append-only sequence of paragraphs backed by a cached block allocator.
///
/// Mirrors the C-struct-of-arrays shape a reader UI walks directly: parallel
/// vectors indexed by paragraph number rather than a `Vec<Paragraph>`.
pub struct TextModel {
    allocator: BlockAllocator,
    start_entry_index: Vec<u32>,
    start_entry_offset: Vec<u32>,
    paragraph_length: Vec<u32>,
    text_size: Vec<u32>,
    paragraph_kind: Vec<ParagraphKind>,

    current_entries: u32,
    current_text_size: u32,
    paragraph_open: bool,
    flushed: bool,
}

impl TextModel {
    pub fn new(allocator: BlockAllocator) -> Self {
        Self {
            allocator,
            start_entry_index: Vec::new(),
            start_entry_offset: Vec::new(),
            paragraph_length: Vec::new(),
            text_size: Vec::new(),
            paragraph_kind: Vec::new(),
            current_entries: 0,
            current_text_size: 0,
            paragraph_open: false,
            flushed: false,
        }
    }

    pub fn paragraph_count(&self) -> usize {
        self.paragraph_length.len()
    }

    pub fn paragraph_kind(&self, index: usize) -> ParagraphKind {
        self.paragraph_kind[index]
    }

    pub fn paragraph_length(&self, index: usize) -> u32 {
        self.paragraph_length[index]
    }

    pub fn text_size(&self, index: usize) -> u32 {
        self.text_size[index]
    }

    pub fn is_flushed(&self) -> bool {
        self.flushed
    }

    pub fn begin_paragraph(&mut self, kind: ParagraphKind) {
        debug_assert!(!self.paragraph_open, "begin_paragraph called while a paragraph is open");
        let (entry, _) = self.allocator.allocate(0);
        self.start_entry_index.push(entry.block_index);
        self.start_entry_offset.push(entry.offset);
        self.paragraph_kind.push(kind);
        self.current_entries = 0;
        self.paragraph_open = true;
    }

    pub fn end_paragraph(&mut self) {
        debug_assert!(self.paragraph_open, "end_paragraph called with no open paragraph");
        self.paragraph_length.push(self.current_entries);
        self.text_size.push(self.current_text_size);
        self.paragraph_open = false;
    }

    fn note_entry(&mut self) {
        self.current_entries += 1;
    }

    pub fn add_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let units = ucs2(text);
        let len = units.len() as u16;
        let byte_len = 1 + 2 + units.len() * 2;
        let (_, buf) = self.allocator.allocate(byte_len);
        buf[0] = EntryType::Text as u8;
        write_u16_le(buf, 1, len);
        for (i, unit) in units.iter().enumerate() {
            write_u16_le(buf, 3 + i * 2, *unit);
        }
        self.current_text_size += units.len() as u32;
        self.note_entry();
    }

    pub fn add_control(&mut self, kind: TextKind, is_start: bool) {
        let entry_type = if is_start { EntryType::ControlStart } else { EntryType::ControlEnd };
        let (_, buf) = self.allocator.allocate(2);
        buf[0] = entry_type as u8;
        buf[1] = kind as u8;
        self.note_entry();
    }

    pub fn add_hyperlink_control(&mut self, kind: TextKind, link_type: HyperlinkType, label: &str) {
        let units = ucs2(label);
        let byte_len = 1 + 1 + 1 + 2 + units.len() * 2;
        let (_, buf) = self.allocator.allocate(byte_len);
        buf[0] = EntryType::HyperlinkControl as u8;
        buf[1] = kind as u8;
        buf[2] = link_type as u8;
        write_u16_le(buf, 3, units.len() as u16);
        for (i, unit) in units.iter().enumerate() {
            write_u16_le(buf, 5 + i * 2, *unit);
        }
        self.note_entry();
    }

    pub fn add_image(&mut self, name: &str, v_offset: i16, is_cover: bool) {
        let units = ucs2(name);
        let byte_len = 1 + 2 + units.len() * 2 + 2 + 1;
        let (_, buf) = self.allocator.allocate(byte_len);
        buf[0] = EntryType::Image as u8;
        write_u16_le(buf, 1, units.len() as u16);
        for (i, unit) in units.iter().enumerate() {
            write_u16_le(buf, 3 + i * 2, *unit);
        }
        let after_name = 3 + units.len() * 2;
        write_i16_le(buf, after_name, v_offset);
        buf[after_name + 2] = is_cover as u8;
        self.note_entry();
    }

    pub fn add_style_entry(&mut self, entry: &StyleEntry) {
        let encoded = entry.encode();
        let byte_len = 1 + encoded.len();
        let (_, buf) = self.allocator.allocate(byte_len);
        buf[0] = EntryType::Style as u8;
        buf[1..].copy_from_slice(&encoded);
        self.note_entry();
    }

    pub fn add_style_close_entry(&mut self) {
        let (_, buf) = self.allocator.allocate(1);
        buf[0] = EntryType::StyleClose as u8;
        self.note_entry();
    }

    pub fn add_fixed_hspace(&mut self, count: u16) {
        let (_, buf) = self.allocator.allocate(3);
        buf[0] = EntryType::FixedHSpace as u8;
        write_u16_le(buf, 1, count);
        self.note_entry();
    }

    pub fn add_bidi_reset(&mut self) {
        let (_, buf) = self.allocator.allocate(1);
        buf[0] = EntryType::BidiReset as u8;
        self.note_entry();
    }

    pub fn add_video_entry(&mut self, sources: &[String]) {
        let mut byte_len = 1 + 2;
        let encoded_sources: Vec<Vec<u16>> = sources.iter().map(|s| ucs2(s)).collect();
        for src in &encoded_sources {
            byte_len += 2 + src.len() * 2;
        }
        let (_, buf) = self.allocator.allocate(byte_len);
        buf[0] = EntryType::Video as u8;
        write_u16_le(buf, 1, encoded_sources.len() as u16);
        let mut pos = 3;
        for src in &encoded_sources {
            write_u16_le(buf, pos, src.len() as u16);
            pos += 2;
            for unit in src {
                write_u16_le(buf, pos, *unit);
                pos += 2;
            }
        }
        self.note_entry();
    }

    pub fn flush(&mut self) -> Result<()> {
        self.allocator.flush()?;
        self.flushed = true;
        Ok(())
    }

    pub fn allocator_failed(&self) -> bool {
        self.allocator.failed()
    }
}

impl StyleEntry {
    /// Bit layout matches the order fields are listed in; see `src/css.rs`.
    fn encode(&self) -> Vec<u8> {
        let mut mask: u16 = 0;
        let mut body = Vec::new();

        macro_rules! bit {
            ($idx:expr, $cond:expr, $write:expr) => {
                if $cond {
                    mask |= 1 << $idx;
                    $write(&mut body);
                }
            };
        }

        bit!(0, self.margin_top.is_some(), |b: &mut Vec<u8>| b.extend(self.margin_top.unwrap().to_le_bytes()));
        bit!(1, self.margin_bottom.is_some(), |b: &mut Vec<u8>| b.extend(self.margin_bottom.unwrap().to_le_bytes()));
        bit!(2, self.margin_left.is_some(), |b: &mut Vec<u8>| b.extend(self.margin_left.unwrap().to_le_bytes()));
        bit!(3, self.margin_right.is_some(), |b: &mut Vec<u8>| b.extend(self.margin_right.unwrap().to_le_bytes()));
        bit!(4, self.text_indent.is_some(), |b: &mut Vec<u8>| b.extend(self.text_indent.unwrap().to_le_bytes()));
        bit!(5, self.text_align.is_some(), |b: &mut Vec<u8>| b.push(self.text_align.unwrap() as u8));
        if let Some(family) = &self.font_family {
            mask |= 1 << 6;
            let units = ucs2(family);
            body.extend((units.len() as u16).to_le_bytes());
            for u in units {
                body.extend(u.to_le_bytes());
            }
        }
        bit!(7, self.font_weight.is_some(), |b: &mut Vec<u8>| b.push(self.font_weight.unwrap() as u8));
        bit!(8, self.font_style.is_some(), |b: &mut Vec<u8>| b.push(self.font_style.unwrap() as u8));
        bit!(9, self.font_size.is_some(), |b: &mut Vec<u8>| b.extend(self.font_size.unwrap().to_le_bytes()));
        bit!(10, self.display.is_some(), |b: &mut Vec<u8>| b.push(self.display.unwrap() as u8));
        bit!(11, self.page_break_before.is_some(), |b: &mut Vec<u8>| b.push(self.page_break_before.unwrap() as u8));
        bit!(12, self.page_break_after.is_some(), |b: &mut Vec<u8>| b.push(self.page_break_after.unwrap() as u8));
        bit!(13, self.vertical_align.is_some(), |b: &mut Vec<u8>| b.push(self.vertical_align.unwrap() as u8));
        bit!(14, self.line_height.is_some(), |b: &mut Vec<u8>| b.extend(self.line_height.unwrap().to_le_bytes()));

        let mut out = Vec::with_capacity(2 + body.len());
        out.extend(mask.to_le_bytes());
        out.extend(body);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> (tempfile::TempDir, TextModel) {
        let dir = tempfile::tempdir().unwrap();
        let alloc = BlockAllocator::new(dir.path(), "book", "ncache", "data", 131_072);
        (dir, TextModel::new(alloc))
    }

    #[test]
    fn single_paragraph_with_text_run() {
        let (_dir, mut m) = model();
        m.begin_paragraph(ParagraphKind::Regular);
        m.add_text("hello");
        m.end_paragraph();
        m.flush().unwrap();

        assert_eq!(m.paragraph_count(), 1);
        assert_eq!(m.paragraph_length(0), 1);
        assert_eq!(m.text_size(0), 5);
        assert_eq!(m.paragraph_kind(0), ParagraphKind::Regular);
    }

    #[test]
    fn text_size_is_monotonic_across_paragraphs() {
        let (_dir, mut m) = model();
        m.begin_paragraph(ParagraphKind::Regular);
        m.add_text("abc");
        m.end_paragraph();
        m.begin_paragraph(ParagraphKind::Regular);
        m.add_text("de");
        m.end_paragraph();
        m.flush().unwrap();

        assert_eq!(m.text_size(0), 3);
        assert_eq!(m.text_size(1), 5);
    }

    #[test]
    fn zero_entry_paragraph_kinds_carry_no_text() {
        let (_dir, mut m) = model();
        m.begin_paragraph(ParagraphKind::SectionEnd);
        m.end_paragraph();
        m.flush().unwrap();
        assert_eq!(m.paragraph_length(0), 0);
        assert_eq!(m.text_size(0), 0);
    }

    #[test]
    fn flush_twice_is_equivalent_to_once() {
        let (_dir, mut m) = model();
        m.begin_paragraph(ParagraphKind::Regular);
        m.add_text("x");
        m.end_paragraph();
        m.flush().unwrap();
        m.flush().unwrap();
        assert!(m.is_flushed());
    }
}
