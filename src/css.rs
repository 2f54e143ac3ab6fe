//! CSS subset: selectors, declarations, and a specificity-ordered table
//! matched against the XHTML reader's ancestor stack.
//!
//! Selector parsing is hand-rolled (descendant-combinator matching against
//! an explicit frame stack, not a DOM — the `selectors`/`kuchiki` crates
//! assume the latter and don't fit here). Declaration *values* are tokenized
//! with `cssparser`, which is exactly the layer it's meant for.

use cssparser::{Parser, ParserInput, Token};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Length {
    pub value: f32,
    pub unit: LengthUnit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LengthUnit {
    Px = 0,
    Pt = 1,
    Em = 2,
    Percent = 3,
}

impl Length {
    pub(crate) fn write_le(&self, body: &mut Vec<u8>) {
        body.push(self.unit as u8);
        body.extend(self.value.to_bits().to_le_bytes());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TextAlign {
    Left = 0,
    Right = 1,
    Center = 2,
    Justify = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FontWeight {
    Normal = 0,
    Bold = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FontStyleProp {
    Normal = 0,
    Italic = 1,
    Oblique = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Display {
    Inline = 0,
    Block = 1,
    ListItem = 2,
    None = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PageBreak {
    Auto = 0,
    Always = 1,
    Avoid = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum VerticalAlign {
    Baseline = 0,
    Sub = 1,
    Super = 2,
    Top = 3,
    Bottom = 4,
    Middle = 5,
}

/// The computed declarations that apply to one tag, ready to be packed into
/// a text-model style entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StyleEntry {
    pub margin_top: Option<Length>,
    pub margin_bottom: Option<Length>,
    pub margin_left: Option<Length>,
    pub margin_right: Option<Length>,
    pub text_indent: Option<Length>,
    pub text_align: Option<TextAlign>,
    pub font_family: Option<String>,
    pub font_weight: Option<FontWeight>,
    pub font_style: Option<FontStyleProp>,
    pub font_size: Option<Length>,
    pub display: Option<Display>,
    pub page_break_before: Option<PageBreak>,
    pub page_break_after: Option<PageBreak>,
    pub vertical_align: Option<VerticalAlign>,
    pub line_height: Option<Length>,
}

impl StyleEntry {
    pub fn is_empty(&self) -> bool {
        *self == StyleEntry::default()
    }

    /// Overlays `other` on top of `self`: fields `other` sets win.
    pub fn merge(&self, other: &StyleEntry) -> StyleEntry {
        StyleEntry {
            margin_top: other.margin_top.or(self.margin_top),
            margin_bottom: other.margin_bottom.or(self.margin_bottom),
            margin_left: other.margin_left.or(self.margin_left),
            margin_right: other.margin_right.or(self.margin_right),
            text_indent: other.text_indent.or(self.text_indent),
            text_align: other.text_align.or(self.text_align),
            font_family: other.font_family.clone().or_else(|| self.font_family.clone()),
            font_weight: other.font_weight.or(self.font_weight),
            font_style: other.font_style.or(self.font_style),
            font_size: other.font_size.or(self.font_size),
            display: other.display.or(self.display),
            page_break_before: other.page_break_before.or(self.page_break_before),
            page_break_after: other.page_break_after.or(self.page_break_after),
            vertical_align: other.vertical_align.or(self.vertical_align),
            line_height: other.line_height.or(self.line_height),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AttrCond {
    Has(String),
    Equals(String, String),
}

#[derive(Debug, Clone, Default)]
struct SelectorComponent {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrCond>,
}

#[derive(Debug, Clone)]
pub struct Selector {
    components: Vec<SelectorComponent>,
}

impl Selector {
    /// (id count, class+attribute count, tag count), compared lexicographically.
    fn specificity(&self) -> (u32, u32, u32) {
        let mut s = (0, 0, 0);
        for c in &self.components {
            if c.id.is_some() {
                s.0 += 1;
            }
            s.1 += (c.classes.len() + c.attrs.len()) as u32;
            if c.tag.is_some() {
                s.2 += 1;
            }
        }
        s
    }
}

/// One frame of the XHTML reader's open-tag ancestor stack.
pub struct Frame<'a> {
    pub tag: &'a str,
    pub id: Option<&'a str>,
    pub classes: &'a [String],
    pub attrs: &'a [(String, String)],
}

fn component_matches(c: &SelectorComponent, frame: &Frame) -> bool {
    if let Some(tag) = &c.tag
        && !tag.eq_ignore_ascii_case(frame.tag)
    {
        return false;
    }
    if let Some(id) = &c.id && Some(id.as_str()) != frame.id {
        return false;
    }
    if !c.classes.iter().all(|want| frame.classes.iter().any(|have| have == want)) {
        return false;
    }
    for attr in &c.attrs {
        let found = match attr {
            AttrCond::Has(name) => frame.attrs.iter().any(|(k, _)| k == name),
            AttrCond::Equals(name, value) => {
                frame.attrs.iter().any(|(k, v)| k == name && v == value)
            }
        };
        if !found {
            return false;
        }
    }
    true
}

/// Descendant-combinator match: the rightmost component must match the
/// innermost frame; every earlier component must match some strictly
/// earlier ancestor, in order.
fn selector_matches(selector: &Selector, stack: &[Frame]) -> bool {
    let Some((last, rest)) = selector.components.split_last() else {
        return false;
    };
    let Some((innermost, ancestors)) = stack.split_last() else {
        return false;
    };
    if !component_matches(last, innermost) {
        return false;
    }
    let mut remaining = rest;
    let mut search_within = ancestors;
    while let Some((comp, earlier)) = remaining.split_last() {
        let mut matched_at = None;
        for i in (0..search_within.len()).rev() {
            if component_matches(comp, &search_within[i]) {
                matched_at = Some(i);
                break;
            }
        }
        match matched_at {
            Some(i) => {
                search_within = &search_within[..i];
                remaining = earlier;
            }
            None => return false,
        }
    }
    true
}

#[derive(Debug, Clone)]
struct Rule {
    selector: Selector,
    declarations: StyleEntry,
    specificity: (u32, u32, u32),
}

#[derive(Debug, Clone, Default)]
pub struct Stylesheet {
    rules: Vec<Rule>,
}

impl Stylesheet {
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Appends another sheet's rules in document order (used by the XHTML
    /// reader to fold in `<style>` blocks and `<link rel=stylesheet>` sheets
    /// as they're encountered).
    pub fn merge(&mut self, other: Stylesheet) {
        self.rules.extend(other.rules);
    }

    /// Parses a whole stylesheet. `resolve_import` maps an `@import` URL to
    /// its contents (or `None` if it can't be loaded, per the degrade-not-
    /// abort error policy).
    pub fn parse(css: &str, resolve_import: &mut dyn FnMut(&str) -> Option<String>) -> Self {
        let mut rules = Vec::new();
        let text = strip_comments(css);
        let mut i = 0;
        let s = text.as_str();

        while i < s.len() {
            let rest = &s[i..];
            let trimmed_lead = rest.len() - rest.trim_start().len();
            i += trimmed_lead;
            if i >= s.len() {
                break;
            }
            let rest = &s[i..];

            if let Some(after_at) = rest.strip_prefix("@import") {
                match rest.find(';') {
                    Some(semi) => {
                        let stmt = &after_at[..semi - "@import".len()];
                        if let Some(url) = extract_import_url(stmt)
                            && let Some(imported_css) = resolve_import(&url)
                        {
                            rules.extend(Stylesheet::parse(&imported_css, resolve_import).rules);
                        }
                        i += semi + 1;
                    }
                    None => break,
                }
                continue;
            }

            if rest.starts_with('@') {
                // Unknown at-rule (e.g. @media): skip its block or statement.
                if let Some(brace) = rest.find('{') {
                    let body_start = i + brace + 1;
                    match find_matching_close(&s[body_start..]) {
                        Some(close_rel) => i = body_start + close_rel + 1,
                        None => break,
                    }
                } else if let Some(semi) = rest.find(';') {
                    i += semi + 1;
                } else {
                    break;
                }
                continue;
            }

            let Some(brace) = rest.find('{') else { break };
            let selector_text = &rest[..brace];
            let body_start = i + brace + 1;
            let Some(close_rel) = find_matching_close(&s[body_start..]) else { break };
            let body = &s[body_start..body_start + close_rel];
            let declarations = parse_declaration_block(body);

            for sel_str in selector_text.split(',') {
                if let Some(selector) = parse_selector(sel_str.trim()) {
                    let specificity = selector.specificity();
                    rules.push(Rule { selector, declarations: declarations.clone(), specificity });
                }
            }
            i = body_start + close_rel + 1;
        }

        Self { rules }
    }

    /// Parses a single `style="..."` attribute value (no selector).
    pub fn parse_inline(declarations: &str) -> StyleEntry {
        parse_declaration_block(declarations)
    }

    /// Computes the merged declarations for the innermost frame of `stack`,
    /// applying matching rules in ascending specificity order so a later,
    /// more specific rule wins ties in the usual cascade sense.
    pub fn resolve(&self, stack: &[Frame]) -> StyleEntry {
        let mut matched: Vec<&Rule> =
            self.rules.iter().filter(|r| selector_matches(&r.selector, stack)).collect();
        matched.sort_by_key(|r| r.specificity);
        let mut result = StyleEntry::default();
        for rule in matched {
            result = result.merge(&rule.declarations);
        }
        result
    }
}

fn strip_comments(css: &str) -> String {
    let mut out = String::with_capacity(css.len());
    let mut chars = css.char_indices().peekable();
    while let Some((_, c)) = chars.next() {
        if c == '/' && chars.peek().map(|(_, n)| *n) == Some('*') {
            chars.next();
            while let Some((_, c)) = chars.next() {
                if c == '*' && chars.peek().map(|(_, n)| *n) == Some('/') {
                    chars.next();
                    break;
                }
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn find_matching_close(s: &str) -> Option<usize> {
    let mut depth = 1i32;
    for (i, c) in s.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn extract_import_url(stmt: &str) -> Option<String> {
    let stmt = stmt.trim();
    if let Some(rest) = stmt.strip_prefix("url(") {
        let rest = rest.trim_end_matches(')').trim();
        return Some(strip_quotes(rest).to_string());
    }
    Some(strip_quotes(stmt).to_string()).filter(|s| !s.is_empty())
}

fn strip_quotes(s: &str) -> &str {
    s.trim_matches(|c| c == '"' || c == '\'').trim()
}

/// Splits a selector string like `div.chapter > p#intro[lang]` into a
/// descendant-combinator component list. `>` (child) is treated the same
/// as whitespace (descendant) — the spec subset doesn't distinguish them.
fn parse_selector(s: &str) -> Option<Selector> {
    if s.is_empty() {
        return None;
    }
    let normalized = s.replace('>', " ");
    let mut components = Vec::new();
    for token in normalized.split_whitespace() {
        components.push(parse_selector_component(token)?);
    }
    if components.is_empty() {
        None
    } else {
        Some(Selector { components })
    }
}

fn parse_selector_component(token: &str) -> Option<SelectorComponent> {
    let mut comp = SelectorComponent::default();
    let mut rest = token;
    // Leading tag name, if any.
    let tag_end = rest
        .find(['.', '#', '['])
        .unwrap_or(rest.len());
    if tag_end > 0 {
        comp.tag = Some(rest[..tag_end].to_string());
    }
    rest = &rest[tag_end..];

    while !rest.is_empty() {
        match rest.chars().next().unwrap() {
            '.' => {
                let end = rest[1..].find(['.', '#', '[']).map(|i| i + 1).unwrap_or(rest.len());
                comp.classes.push(rest[1..end].to_string());
                rest = &rest[end..];
            }
            '#' => {
                let end = rest[1..].find(['.', '#', '[']).map(|i| i + 1).unwrap_or(rest.len());
                comp.id = Some(rest[1..end].to_string());
                rest = &rest[end..];
            }
            '[' => {
                let end = rest.find(']')?;
                let inner = &rest[1..end];
                comp.attrs.push(match inner.split_once('=') {
                    Some((name, value)) => {
                        AttrCond::Equals(name.trim().to_string(), strip_quotes(value.trim()).to_string())
                    }
                    None => AttrCond::Has(inner.trim().to_string()),
                });
                rest = &rest[end + 1..];
            }
            _ => return None,
        }
    }
    Some(comp)
}

fn parse_declaration_block(body: &str) -> StyleEntry {
    let mut entry = StyleEntry::default();
    for decl in split_top_level(body, ';') {
        let Some((prop, value)) = decl.split_once(':') else { continue };
        apply_declaration(&mut entry, prop.trim(), value.trim());
    }
    entry
}

/// Splits on `sep` but not inside `(...)`, so `url(a;b)`-style values
/// (not expected in this subset, but cheap to guard) don't get cut apart.
fn split_top_level(s: &str, sep: char) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            c if c == sep && depth == 0 => {
                out.push(s[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let tail = s[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}

fn apply_declaration(entry: &mut StyleEntry, prop: &str, value: &str) {
    match prop.to_ascii_lowercase().as_str() {
        "margin-top" => entry.margin_top = parse_length(value),
        "margin-bottom" => entry.margin_bottom = parse_length(value),
        "margin-left" => entry.margin_left = parse_length(value),
        "margin-right" => entry.margin_right = parse_length(value),
        "text-indent" => entry.text_indent = parse_length(value),
        "text-align" => {
            entry.text_align = match value.to_ascii_lowercase().as_str() {
                "left" => Some(TextAlign::Left),
                "right" => Some(TextAlign::Right),
                "center" => Some(TextAlign::Center),
                "justify" => Some(TextAlign::Justify),
                _ => None,
            };
        }
        "font-family" => entry.font_family = parse_font_family(value),
        "font-weight" => {
            entry.font_weight = match value.to_ascii_lowercase().as_str() {
                "bold" | "bolder" => Some(FontWeight::Bold),
                "normal" => Some(FontWeight::Normal),
                other => other.parse::<u32>().ok().map(|w| {
                    if w >= 600 { FontWeight::Bold } else { FontWeight::Normal }
                }),
            };
        }
        "font-style" => {
            entry.font_style = match value.to_ascii_lowercase().as_str() {
                "italic" => Some(FontStyleProp::Italic),
                "oblique" => Some(FontStyleProp::Oblique),
                "normal" => Some(FontStyleProp::Normal),
                _ => None,
            };
        }
        "font-size" => entry.font_size = parse_length(value),
        "display" => {
            entry.display = match value.to_ascii_lowercase().as_str() {
                "inline" => Some(Display::Inline),
                "block" => Some(Display::Block),
                "list-item" => Some(Display::ListItem),
                "none" => Some(Display::None),
                _ => None,
            };
        }
        "page-break-before" => entry.page_break_before = parse_page_break(value),
        "page-break-after" => entry.page_break_after = parse_page_break(value),
        "vertical-align" => {
            entry.vertical_align = match value.to_ascii_lowercase().as_str() {
                "baseline" => Some(VerticalAlign::Baseline),
                "sub" => Some(VerticalAlign::Sub),
                "super" => Some(VerticalAlign::Super),
                "top" => Some(VerticalAlign::Top),
                "bottom" => Some(VerticalAlign::Bottom),
                "middle" => Some(VerticalAlign::Middle),
                _ => None,
            };
        }
        "line-height" => entry.line_height = parse_length(value),
        _ => {
            log::debug!("css: ignoring unknown property {prop:?}");
        }
    }
}

fn parse_page_break(value: &str) -> Option<PageBreak> {
    match value.to_ascii_lowercase().as_str() {
        "auto" => Some(PageBreak::Auto),
        "always" => Some(PageBreak::Always),
        "avoid" => Some(PageBreak::Avoid),
        _ => None,
    }
}

fn parse_font_family(value: &str) -> Option<String> {
    value.split(',').next().map(|first| strip_quotes(first.trim()).to_string())
}

/// Tokenizes a single value with `cssparser` to pull out a dimension,
/// percentage, or bare number.
fn parse_length(value: &str) -> Option<Length> {
    let mut input = ParserInput::new(value);
    let mut parser = Parser::new(&mut input);
    match parser.next() {
        Ok(Token::Dimension { value, unit, .. }) => {
            let unit = match unit.to_ascii_lowercase().as_str() {
                "px" => LengthUnit::Px,
                "pt" => LengthUnit::Pt,
                "em" | "rem" => LengthUnit::Em,
                _ => return None,
            };
            Some(Length { value: *value, unit })
        }
        Ok(Token::Percentage { unit_value, .. }) => {
            Some(Length { value: *unit_value * 100.0, unit: LengthUnit::Percent })
        }
        Ok(Token::Number { value, .. }) => Some(Length { value: *value, unit: LengthUnit::Px }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tag_class_id_selector() {
        let comp = parse_selector_component("p.chapter#intro").unwrap();
        assert_eq!(comp.tag.as_deref(), Some("p"));
        assert_eq!(comp.classes, vec!["chapter".to_string()]);
        assert_eq!(comp.id.as_deref(), Some("intro"));
    }

    #[test]
    fn descendant_selector_matches_non_immediate_ancestor() {
        let sheet = Stylesheet::parse("div p { text-align: center; }", &mut |_| None);
        let attrs: Vec<(String, String)> = Vec::new();
        let classes: Vec<String> = Vec::new();
        let stack = vec![
            Frame { tag: "div", id: None, classes: &classes, attrs: &attrs },
            Frame { tag: "section", id: None, classes: &classes, attrs: &attrs },
            Frame { tag: "p", id: None, classes: &classes, attrs: &attrs },
        ];
        let resolved = sheet.resolve(&stack);
        assert_eq!(resolved.text_align, Some(TextAlign::Center));
    }

    #[test]
    fn higher_specificity_wins_on_conflict() {
        let sheet = Stylesheet::parse(
            "p { text-align: left; } p#special { text-align: right; }",
            &mut |_| None,
        );
        let attrs: Vec<(String, String)> = Vec::new();
        let classes: Vec<String> = Vec::new();
        let stack = vec![Frame { tag: "p", id: Some("special"), classes: &classes, attrs: &attrs }];
        let resolved = sheet.resolve(&stack);
        assert_eq!(resolved.text_align, Some(TextAlign::Right));
    }

    #[test]
    fn unknown_property_is_ignored_not_fatal() {
        let entry = Stylesheet::parse_inline("color: red; display: none");
        assert_eq!(entry.display, Some(Display::None));
    }

    #[test]
    fn import_is_inlined_before_own_rules() {
        let mut resolver = |url: &str| -> Option<String> {
            assert_eq!(url, "base.css");
            Some("p { text-align: left; }".to_string())
        };
        let sheet = Stylesheet::parse(
            "@import url(\"base.css\"); p { text-align: right; }",
            &mut resolver,
        );
        let attrs: Vec<(String, String)> = Vec::new();
        let classes: Vec<String> = Vec::new();
        let stack = vec![Frame { tag: "p", id: None, classes: &classes, attrs: &attrs }];
        // Equal specificity: the importing sheet's own rule (declared later) wins.
        assert_eq!(sheet.resolve(&stack).text_align, Some(TextAlign::Right));
    }
}
