//! `Accept` header parsing and media range matching.
//!
//! Quality values are kept as thousandths so ranges stay ordered and
//! comparable without floating point noise. Parsing is deliberately lenient:
//! `Accept` is advisory, so malformed entries are skipped instead of failing
//! the whole request.

use crate::http::types::MediaType;

const DEFAULT_QUALITY: u16 = 1000;

/// One media range from an `Accept` header, e.g. `text/*;q=0.8`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRange {
    primary: String,
    subtype: String,
    quality: u16,
}

impl MediaRange {
    pub fn primary(&self) -> &str {
        &self.primary
    }

    pub fn subtype(&self) -> &str {
        &self.subtype
    }

    /// Quality weight in thousandths, `1000` meaning `q=1.0`.
    pub const fn quality(&self) -> u16 {
        self.quality
    }

    pub fn matches(&self, media: &MediaType) -> bool {
        (self.primary == "*" || self.primary == media.primary())
            && (self.subtype == "*" || self.subtype == media.subtype())
    }

    fn parse(entry: &str) -> Option<Self> {
        let mut parts = entry.split(';');
        let essence = parts.next()?.trim();
        let (primary, subtype) = essence.split_once('/')?;
        if primary.is_empty() || subtype.is_empty() {
            return None;
        }

        let mut quality = DEFAULT_QUALITY;
        for param in parts {
            if let Some((name, raw)) = param.split_once('=') {
                if name.trim().eq_ignore_ascii_case("q") {
                    quality = parse_quality(raw.trim())?;
                }
            }
        }

        Some(Self {
            primary: primary.trim().to_ascii_lowercase(),
            subtype: subtype.trim().to_ascii_lowercase(),
            quality,
        })
    }
}

fn parse_quality(raw: &str) -> Option<u16> {
    let value: f32 = raw.parse().ok()?;
    if !(0.0..=1.0).contains(&value) {
        return None;
    }
    Some((value * 1000.0).round() as u16)
}

/// The parsed, weight-ordered `Accept` header of a request.
///
/// Ranges are sorted by quality, highest first; ranges with equal quality
/// keep their order of appearance. An empty list means the client sent no
/// usable `Accept` header and accepts anything.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AcceptList {
    ranges: Vec<MediaRange>,
}

impl AcceptList {
    /// Parses an `Accept` header value. Malformed entries are dropped.
    pub fn parse(value: &str) -> Self {
        let mut ranges: Vec<MediaRange> = value
            .split(',')
            .filter_map(MediaRange::parse)
            .collect();
        ranges.sort_by(|a, b| b.quality.cmp(&a.quality));

        Self { ranges }
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Ranges in negotiation order, zero-quality entries excluded.
    pub fn ranges(&self) -> impl Iterator<Item = &MediaRange> {
        self.ranges.iter().filter(|r| r.quality > 0)
    }

    /// Whether the client accepts the given media type at any positive
    /// quality. An empty list accepts everything.
    pub fn accepts(&self, media: &MediaType) -> bool {
        self.is_empty() || self.ranges().any(|r| r.matches(media))
    }

    pub(crate) fn accepts_essence(&self, primary: &str, subtype: &str) -> bool {
        self.accepts(&MediaType::new(primary, subtype))
    }
}

#[cfg(test)]
mod accept_self {
    use super::*;

    #[test]
    fn parse_orders_by_quality() {
        let list = AcceptList::parse("text/html;q=0.5, application/json, text/*;q=0.8");
        let order: Vec<_> = list
            .ranges()
            .map(|r| (format!("{}/{}", r.primary(), r.subtype()), r.quality()))
            .collect();

        assert_eq!(
            order,
            [
                ("application/json".to_string(), 1000),
                ("text/*".to_string(), 800),
                ("text/html".to_string(), 500),
            ]
        );
    }

    #[test]
    fn equal_quality_keeps_appearance_order() {
        let list = AcceptList::parse("application/xml, application/json");
        let order: Vec<_> = list.ranges().map(|r| r.subtype().to_string()).collect();
        assert_eq!(order, ["xml", "json"]);
    }

    #[test]
    fn wildcard_matching() {
        let json = MediaType::new("application", "json");
        let html = MediaType::new("text", "html");

        let any = AcceptList::parse("*/*");
        assert!(any.accepts(&json));
        assert!(any.accepts(&html));

        let text_only = AcceptList::parse("text/*");
        assert!(text_only.accepts(&html));
        assert!(!text_only.accepts(&json));
    }

    #[test]
    fn zero_quality_excludes() {
        let list = AcceptList::parse("application/json;q=0, text/plain");
        assert!(!list.accepts(&MediaType::new("application", "json")));
        assert!(list.accepts(&MediaType::new("text", "plain")));
    }

    #[test]
    fn empty_list_accepts_everything() {
        let list = AcceptList::parse("");
        assert!(list.is_empty());
        assert!(list.accepts(&MediaType::new("application", "json")));
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let list = AcceptList::parse("garbage, text/plain, also-garbage;q=zzz");
        let kept: Vec<_> = list.ranges().map(|r| r.subtype().to_string()).collect();
        assert_eq!(kept, ["plain"]);
    }
}
