//! Language/encoding detection (§4.10): a naive BOM/UTF-8 sniffer feeding a
//! pluggable n-gram statistical matcher. The matcher interface is the
//! prescribed contract; the shipped matchers are a minimal fixture set, not
//! a production language-pattern corpus (that statistical model is out of
//! scope per §1).

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NaiveEncoding {
    Ascii,
    Utf8,
    Utf16Le,
    Utf16Be,
}

/// Step 1 of §4.10: BOM check, then a strict UTF-8 continuation-byte walk.
/// A buffer that truncates mid-sequence is indeterminate (`None`), not
/// UTF-8 — the stricter reimplementation called for by the Open Question
/// resolution recorded in DESIGN.md.
pub fn naive_detect(bytes: &[u8]) -> Option<NaiveEncoding> {
    if bytes.starts_with(&[0xFF, 0xFE]) {
        return Some(NaiveEncoding::Utf16Le);
    }
    if bytes.starts_with(&[0xFE, 0xFF]) {
        return Some(NaiveEncoding::Utf16Be);
    }

    let mut all_ascii = true;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b < 0x80 {
            i += 1;
            continue;
        }
        all_ascii = false;
        let extra = if b & 0xE0 == 0xC0 {
            1
        } else if b & 0xF0 == 0xE0 {
            2
        } else if b & 0xF8 == 0xF0 {
            3
        } else {
            return None;
        };
        if i + extra >= bytes.len() {
            return None;
        }
        for k in 1..=extra {
            if bytes[i + k] & 0xC0 != 0x80 {
                return None;
            }
        }
        i += extra + 1;
    }
    Some(if all_ascii { NaiveEncoding::Ascii } else { NaiveEncoding::Utf8 })
}

/// Byte-sequence frequency statistics for one n-gram length, computed once
/// per buffer and shared across every matcher that declares the same
/// `n_gram_length()`.
pub struct Stats {
    counts: HashMap<Vec<u8>, u32>,
    total: u32,
}

impl Stats {
    fn collect(bytes: &[u8], n: usize) -> Self {
        let mut counts = HashMap::new();
        let mut total = 0u32;
        if n > 0 && bytes.len() >= n {
            for window in bytes.windows(n) {
                *counts.entry(window.to_vec()).or_insert(0) += 1;
                total += 1;
            }
        }
        Self { counts, total }
    }

    pub fn frequency(&self, gram: &[u8]) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.counts.get(gram).copied().unwrap_or(0) as f64 / self.total as f64
    }
}

/// A registered (language, encoding) pattern matcher.
pub trait Matcher: Send + Sync {
    fn language(&self) -> &str;
    fn encoding(&self) -> &str;
    fn n_gram_length(&self) -> usize;
    fn criterion(&self, stats: &Stats) -> f64;
}

/// A fixture matcher scoring on a fixed table of weighted n-grams. Not a
/// real statistical model — just enough to exercise the detector's shape.
struct FrequencyMatcher {
    language: &'static str,
    encoding: &'static str,
    n: usize,
    grams: &'static [(&'static str, f64)],
}

impl Matcher for FrequencyMatcher {
    fn language(&self) -> &str {
        self.language
    }

    fn encoding(&self) -> &str {
        self.encoding
    }

    fn n_gram_length(&self) -> usize {
        self.n
    }

    fn criterion(&self, stats: &Stats) -> f64 {
        self.grams.iter().map(|(gram, weight)| stats.frequency(gram.as_bytes()) * weight).sum()
    }
}

fn builtin_matchers() -> Vec<Box<dyn Matcher>> {
    vec![
        Box::new(FrequencyMatcher {
            language: "en",
            encoding: "UTF-8",
            n: 2,
            grams: &[("th", 1.0), ("he", 1.0), ("in", 0.8), ("er", 0.8), ("an", 0.6), ("re", 0.6)],
        }),
        Box::new(FrequencyMatcher {
            language: "fr",
            encoding: "UTF-8",
            n: 2,
            grams: &[("es", 1.0), ("le", 0.9), ("de", 0.9), ("en", 0.7), ("on", 0.7), ("qu", 0.6)],
        }),
        Box::new(FrequencyMatcher {
            language: "de",
            encoding: "UTF-8",
            n: 2,
            grams: &[("en", 1.0), ("er", 0.9), ("ch", 0.9), ("ei", 0.7), ("ie", 0.7), ("nd", 0.6)],
        }),
    ]
}

/// Loads its matcher set once at construction and answers `find_info`
/// queries read-only thereafter (§5: initialized once, read-only after).
pub struct LanguageDetector {
    matchers: Vec<Box<dyn Matcher>>,
}

impl LanguageDetector {
    pub fn new() -> Self {
        Self { matchers: builtin_matchers() }
    }

    pub fn with_matchers(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self { matchers }
    }

    /// §4.10's three-step algorithm. Registration order breaks ties: only a
    /// strictly greater score replaces the running best.
    pub fn find_info(&self, bytes: &[u8], threshold: f64) -> Option<(String, String)> {
        let naive = naive_detect(bytes);
        if matches!(naive, Some(NaiveEncoding::Utf16Le) | Some(NaiveEncoding::Utf16Be)) {
            return Some((String::new(), "UTF-16".to_string()));
        }
        let encoding_filter = match naive {
            Some(NaiveEncoding::Ascii) | Some(NaiveEncoding::Utf8) => Some("UTF-8"),
            None => None,
        };

        let mut cache: HashMap<usize, Stats> = HashMap::new();
        let mut best: Option<&dyn Matcher> = None;
        let mut best_score = threshold;

        for matcher in &self.matchers {
            if let Some(filter) = encoding_filter
                && matcher.encoding() != filter
            {
                continue;
            }
            let n = matcher.n_gram_length();
            let stats = cache.entry(n).or_insert_with(|| Stats::collect(bytes, n));
            let score = matcher.criterion(stats);
            if score > best_score {
                best_score = score;
                best = Some(matcher.as_ref());
            }
        }

        best.map(|m| (m.language().to_string(), m.encoding().to_string()))
    }
}

impl Default for LanguageDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf16_bom_detected_naively() {
        assert_eq!(naive_detect(&[0xFF, 0xFE, b'a', 0]), Some(NaiveEncoding::Utf16Le));
        assert_eq!(naive_detect(&[0xFE, 0xFF, 0, b'a']), Some(NaiveEncoding::Utf16Be));
    }

    #[test]
    fn ascii_only_buffer_is_ascii() {
        assert_eq!(naive_detect(b"hello world"), Some(NaiveEncoding::Ascii));
    }

    #[test]
    fn valid_multibyte_utf8_is_detected() {
        assert_eq!(naive_detect("caf\u{e9}".as_bytes()), Some(NaiveEncoding::Utf8));
    }

    #[test]
    fn truncated_continuation_sequence_is_indeterminate() {
        // 0xC3 starts a two-byte sequence but the buffer ends right there.
        assert_eq!(naive_detect(&[b'a', 0xC3]), None);
    }

    #[test]
    fn invalid_continuation_byte_is_indeterminate() {
        assert_eq!(naive_detect(&[0xC3, 0x20]), None);
    }

    #[test]
    fn english_text_scores_highest_among_builtin_matchers() {
        let detector = LanguageDetector::new();
        let text = "the theater on the river then other weather gather whether".repeat(4);
        let result = detector.find_info(text.as_bytes(), 0.0);
        assert_eq!(result.as_ref().map(|(lang, _)| lang.as_str()), Some("en"));
    }

    #[test]
    fn score_below_threshold_returns_none() {
        let detector = LanguageDetector::new();
        let result = detector.find_info(b"the the the", 1000.0);
        assert!(result.is_none());
    }

    #[test]
    fn tie_break_prefers_first_registered_matcher() {
        struct AlwaysOne;
        impl Matcher for AlwaysOne {
            fn language(&self) -> &str {
                "first"
            }
            fn encoding(&self) -> &str {
                "UTF-8"
            }
            fn n_gram_length(&self) -> usize {
                1
            }
            fn criterion(&self, _stats: &Stats) -> f64 {
                1.0
            }
        }
        struct AlsoOne;
        impl Matcher for AlsoOne {
            fn language(&self) -> &str {
                "second"
            }
            fn encoding(&self) -> &str {
                "UTF-8"
            }
            fn n_gram_length(&self) -> usize {
                1
            }
            fn criterion(&self, _stats: &Stats) -> f64 {
                1.0
            }
        }
        let detector = LanguageDetector::with_matchers(vec![Box::new(AlwaysOne), Box::new(AlsoOne)]);
        let result = detector.find_info(b"anything", 0.0);
        assert_eq!(result.as_ref().map(|(lang, _)| lang.as_str()), Some("first"));
    }
}
