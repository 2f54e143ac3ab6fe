//! NCX reader: drives the navigation-map state machine described in the
//! component design (§4.6) and produces an ordered play-order -> NavPoint
//! map.

use std::collections::BTreeMap;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{Error, Result};
use crate::xml_util::{local_name, resolve_entity};

/// Starting value of the play-order counter, matching the source's initial
/// `myPlayIndex`. Every `<navPoint>` gets the next counter value in document
/// order; any `playOrder` attribute the document declares is ignored.
const DEFAULT_FIRST_PLAY_ORDER: i32 = -65535;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavPoint {
    pub play_order: i32,
    pub level: u32,
    pub label: String,
    pub content_href: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    None,
    Map,
    Point,
    Label,
    Text,
}

struct OpenPoint {
    play_order: i32,
    level: u32,
    label: String,
    content_href: String,
}

/// Parses an NCX document into an ordered `playOrder -> NavPoint` map.
///
/// `play_order` is always assigned from a counter incremented once per
/// `<navPoint>` encountered, in document order — never read from a
/// `playOrder` attribute, matching the source reader exactly (it never
/// looks at that attribute either). Declared `playOrder` values that
/// disagree with document order (duplicates, gaps, out-of-order numbering)
/// must not reorder the resulting map.
///
/// The end-tag handling is one explicit `match` arm per state with no
/// fallthrough between `Point` and `Label` — closing `</navPoint>` always
/// pops exactly one point no matter what the source's `<navLabel>` nesting
/// looked like; a label left open when `</navPoint>` arrives is simply
/// discarded rather than carried into the next point.
pub fn parse_ncx(content: &str) -> Result<BTreeMap<i32, NavPoint>> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut state = State::None;
    let mut stack: Vec<OpenPoint> = Vec::new();
    let mut next_play_order = DEFAULT_FIRST_PLAY_ORDER;
    let mut points: BTreeMap<i32, NavPoint> = BTreeMap::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let local = local_name(e.name().as_ref()).to_vec();
                match local.as_slice() {
                    b"navMap" if state == State::None => state = State::Map,
                    b"navPoint" if matches!(state, State::Map | State::Point) => {
                        let level = stack.len() as u32;
                        let play_order = next_play_order;
                        next_play_order += 1;
                        stack.push(OpenPoint {
                            play_order,
                            level,
                            label: String::new(),
                            content_href: String::new(),
                        });
                        state = State::Point;
                    }
                    b"navLabel" if state == State::Point => state = State::Label,
                    b"text" if state == State::Label => state = State::Text,
                    b"content" => {
                        if let Some(top) = stack.last_mut() {
                            for attr in e.attributes().flatten() {
                                if attr.key.as_ref() == b"src"
                                    && let Ok(src) = String::from_utf8(attr.value.to_vec())
                                {
                                    top.content_href =
                                        percent_encoding::percent_decode_str(&src)
                                            .decode_utf8_lossy()
                                            .into_owned();
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(e)) => {
                if state == State::Text
                    && let Some(top) = stack.last_mut()
                {
                    top.label.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if state == State::Text
                    && let Some(top) = stack.last_mut()
                    && let Some(resolved) = resolve_entity(&String::from_utf8_lossy(e.as_ref()))
                {
                    top.label.push_str(&resolved);
                }
            }
            Ok(Event::End(e)) => {
                let local = local_name(e.name().as_ref()).to_vec();
                match local.as_slice() {
                    b"text" if state == State::Text => state = State::Label,
                    b"navLabel" if state == State::Label => state = State::Point,
                    b"navPoint" if state == State::Point => {
                        if let Some(mut point) = stack.pop() {
                            if point.label.trim().is_empty() {
                                point.label = "...".to_string();
                            }
                            points.insert(
                                point.play_order,
                                NavPoint {
                                    play_order: point.play_order,
                                    level: point.level,
                                    label: point.label,
                                    content_href: point.content_href,
                                },
                            );
                        }
                        state = if stack.is_empty() { State::Map } else { State::Point };
                    }
                    b"navMap" => state = State::None,
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::Xml(e)),
            _ => {}
        }
    }

    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_navpoints_get_sequential_levels_zero() {
        let xml = r#"<navMap>
            <navPoint playOrder="1"><navLabel><text>One</text></navLabel><content src="a.xhtml"/></navPoint>
            <navPoint playOrder="2"><navLabel><text>Two</text></navLabel><content src="b.xhtml"/></navPoint>
        </navMap>"#;
        let points = parse_ncx(xml).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[&1].level, 0);
        assert_eq!(points[&2].level, 0);
        assert_eq!(points[&1].label, "One");
        assert_eq!(points[&2].content_href, "b.xhtml");
    }

    #[test]
    fn nested_navpoint_gets_incremented_level() {
        let xml = r#"<navMap>
            <navPoint playOrder="1">
                <navLabel><text>Part I</text></navLabel><content src="a.xhtml"/>
                <navPoint playOrder="2"><navLabel><text>Deep</text></navLabel><content src="a.xhtml#p2"/></navPoint>
            </navPoint>
        </navMap>"#;
        let points = parse_ncx(xml).unwrap();
        assert_eq!(points[&1].level, 0);
        assert_eq!(points[&2].level, 1);
    }

    #[test]
    fn missing_playorder_preserves_document_order_via_default_counter() {
        let xml = r#"<navMap>
            <navPoint><navLabel><text>A</text></navLabel><content src="a.xhtml"/></navPoint>
            <navPoint><navLabel><text>B</text></navLabel><content src="b.xhtml"/></navPoint>
        </navMap>"#;
        let points = parse_ncx(xml).unwrap();
        let mut keys: Vec<i32> = points.keys().copied().collect();
        keys.sort();
        assert_eq!(keys, vec![DEFAULT_FIRST_PLAY_ORDER, DEFAULT_FIRST_PLAY_ORDER + 1]);
        assert_eq!(points[&keys[0]].label, "A");
    }

    #[test]
    fn empty_label_is_replaced_with_ellipsis() {
        let xml = r#"<navMap>
            <navPoint playOrder="1"><navLabel><text></text></navLabel><content src="a.xhtml"/></navPoint>
        </navMap>"#;
        let points = parse_ncx(xml).unwrap();
        assert_eq!(points[&1].label, "...");
    }

    #[test]
    fn navpoint_closing_while_label_left_open_still_pops_exactly_one_point() {
        // Malformed: <navLabel> never closes before </navPoint>. The explicit
        // state machine must not fall through into double-popping or corrupting
        // the stack; it should just discard the half-open label state.
        let xml = r#"<navMap>
            <navPoint playOrder="1"><navLabel><text>One</text>
            </navPoint>
            <navPoint playOrder="2"><navLabel><text>Two</text></navLabel><content src="b.xhtml"/></navPoint>
        </navMap>"#;
        let points = parse_ncx(xml).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[&2].label, "Two");
    }
}
