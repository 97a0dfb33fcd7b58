//! Standoff markup reconstruction
//!
//! The legacy store keeps rich text as a plain string plus annotation ranges
//! addressed by character offsets. Ranges may overlap without nesting
//! (`bold[0,10)` and `italic[5,15)`), which inline markup cannot express
//! directly. Reconstruction walks start/end events with an explicit stack of
//! open ranges; when a range ends below the top of the stack, everything
//! above it is closed, the range is closed, and the interrupted ranges are
//! reopened with their original payloads.
//!
//! Offsets count Unicode scalar values, matching the legacy export.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::id::RecordId;

#[derive(Debug, Error, PartialEq)]
pub enum MarkupError {
    #[error("Annotation '{tag}' starts at {start}, after its end {end}")]
    InvertedRange { tag: Tag, start: usize, end: usize },

    #[error("Annotation '{tag}' ends at {end}, beyond the text length {len}")]
    OutOfBounds { tag: Tag, end: usize, len: usize },

    #[error("Unknown annotation tag: '{0}'")]
    UnknownTag(String),

    #[error("Invalid annotation offset: '{0}'")]
    InvalidOffset(String),

    #[error("Link annotation at {start}..{end} has neither href nor resid")]
    MissingLinkTarget { start: usize, end: usize },

    #[error("Invalid internal link target: '{0}'")]
    InvalidLinkTarget(String),

    #[error("End of '{tag}' at {position} has no matching open annotation")]
    UnmatchedEnd { tag: Tag, position: usize },

    #[error("Failed to parse annotation attributes: {0}")]
    Attributes(String),
}

/// Inline constructs the destination markup supports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Tag {
    Strong,
    Emphasis,
    Underline,
    Strike,
    LineBreak,
    OrderedList,
    UnorderedList,
    ListItem,
    Superscript,
    Subscript,
    Paragraph,
    H1,
    H2,
    H3,
    H4,
    H5,
    H6,
    Link,
    Span,
}

impl Tag {
    /// Element name used in the output markup
    pub fn element(&self) -> &'static str {
        match self {
            Tag::Strong => "strong",
            Tag::Emphasis => "em",
            Tag::Underline => "u",
            Tag::Strike => "strike",
            Tag::LineBreak => "br",
            Tag::OrderedList => "ol",
            Tag::UnorderedList => "ul",
            Tag::ListItem => "li",
            Tag::Superscript => "sup",
            Tag::Subscript => "sub",
            Tag::Paragraph => "p",
            Tag::H1 => "h1",
            Tag::H2 => "h2",
            Tag::H3 => "h3",
            Tag::H4 => "h4",
            Tag::H5 => "h5",
            Tag::H6 => "h6",
            Tag::Link => "a",
            Tag::Span => "span",
        }
    }

    /// Void tags mark a position, not a span
    pub fn is_void(&self) -> bool {
        matches!(self, Tag::LineBreak)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tag::Link => "link",
            other => other.element(),
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tag {
    type Err = MarkupError;

    /// Accepts both the output element names and the legacy attribute keys
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = match s {
            "strong" | "bold" => Tag::Strong,
            "em" | "italic" => Tag::Emphasis,
            "u" | "underline" => Tag::Underline,
            "strike" | "strikethrough" => Tag::Strike,
            "br" | "linebreak" => Tag::LineBreak,
            "ol" => Tag::OrderedList,
            "ul" => Tag::UnorderedList,
            "li" => Tag::ListItem,
            "sup" => Tag::Superscript,
            "sub" => Tag::Subscript,
            "p" => Tag::Paragraph,
            "h1" => Tag::H1,
            "h2" => Tag::H2,
            "h3" => Tag::H3,
            "h4" => Tag::H4,
            "h5" => Tag::H5,
            "h6" => Tag::H6,
            "link" | "_link" | "a" => Tag::Link,
            "span" | "style" => Tag::Span,
            other => return Err(MarkupError::UnknownTag(other.to_string())),
        };
        Ok(tag)
    }
}

impl TryFrom<String> for Tag {
    type Error = MarkupError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Tag> for String {
    fn from(tag: Tag) -> Self {
        tag.as_str().to_string()
    }
}

/// Extra data attached to an annotation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Hyperlink to an external URI
    External(String),
    /// Link to another migrated record
    Internal(RecordId),
    /// Free-form CSS style
    Style(String),
}

/// One stand-off annotation over `[start, end)`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "AnnotationDescriptor")]
pub struct AnnotationRange {
    pub tag: Tag,
    pub start: usize,
    pub end: usize,
    pub payload: Option<Payload>,
}

impl AnnotationRange {
    pub fn new(tag: Tag, start: usize, end: usize) -> Self {
        Self {
            tag,
            start,
            end,
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Builds a range from the legacy descriptor fields
    ///
    /// Links take `resid` over `href`; spans take `style`. Other tags ignore
    /// the optional fields.
    fn from_parts(
        tag: Tag,
        start: &RawOffset,
        end: &RawOffset,
        href: Option<&str>,
        resid: Option<&str>,
        style: Option<&str>,
    ) -> Result<Self, MarkupError> {
        let start = start.value()?;
        let end = end.value()?;
        let (href, resid, style) = (non_blank(href), non_blank(resid), non_blank(style));
        let payload = match tag {
            Tag::Link => match (resid, href) {
                (Some(resid), _) => Some(Payload::Internal(
                    resid
                        .parse()
                        .map_err(|_| MarkupError::InvalidLinkTarget(resid.to_string()))?,
                )),
                (None, Some(href)) => Some(Payload::External(href.to_string())),
                (None, None) => return Err(MarkupError::MissingLinkTarget { start, end }),
            },
            Tag::Span => style.map(|s| Payload::Style(s.to_string())),
            _ => None,
        };
        Ok(Self {
            tag,
            start,
            end,
            payload,
        })
    }

    fn open_marker(&self, out: &mut String) {
        match (&self.tag, &self.payload) {
            (Tag::Link, Some(Payload::Internal(id))) => {
                out.push_str("<a class=\"salsah-link\" href=\"IRI:");
                push_escaped_attr(out, id.as_str());
                out.push_str(":IRI\">");
            }
            (Tag::Link, Some(Payload::External(href))) => {
                out.push_str("<a href=\"");
                push_escaped_attr(out, href);
                out.push_str("\">");
            }
            (Tag::Span, Some(Payload::Style(style))) => {
                out.push_str("<span style=\"");
                push_escaped_attr(out, style);
                out.push_str("\">");
            }
            (tag, _) if tag.is_void() => {
                out.push('<');
                out.push_str(tag.element());
                out.push_str("/>");
            }
            (tag, _) => {
                out.push('<');
                out.push_str(tag.element());
                out.push('>');
            }
        }
    }

    fn close_marker(&self, out: &mut String) {
        out.push_str("</");
        out.push_str(self.tag.element());
        out.push('>');
    }
}

/// Blank descriptor fields in legacy exports mean "not set"
fn non_blank(field: Option<&str>) -> Option<&str> {
    field.filter(|s| !s.trim().is_empty())
}

/// Offsets arrive as numbers or numeric strings depending on the export
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawOffset {
    Number(usize),
    Text(String),
}

impl RawOffset {
    fn value(&self) -> Result<usize, MarkupError> {
        match self {
            RawOffset::Number(n) => Ok(*n),
            RawOffset::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| MarkupError::InvalidOffset(s.clone())),
        }
    }
}

/// Self-describing annotation, as accepted by the `markup` command
#[derive(Debug, Clone, Deserialize)]
struct AnnotationDescriptor {
    tag: String,
    start: RawOffset,
    end: RawOffset,
    href: Option<String>,
    resid: Option<String>,
    style: Option<String>,
}

impl TryFrom<AnnotationDescriptor> for AnnotationRange {
    type Error = MarkupError;

    fn try_from(d: AnnotationDescriptor) -> Result<Self, Self::Error> {
        AnnotationRange::from_parts(
            d.tag.parse()?,
            &d.start,
            &d.end,
            d.href.as_deref(),
            d.resid.as_deref(),
            d.style.as_deref(),
        )
    }
}

/// Annotation entry of the legacy `textattr` object; the tag is the map key
#[derive(Debug, Clone, Deserialize)]
pub struct LegacyAnnotation {
    start: RawOffset,
    end: RawOffset,
    #[serde(default)]
    href: Option<String>,
    #[serde(default)]
    resid: Option<String>,
    #[serde(default)]
    style: Option<String>,
}

/// The legacy `textattr` field: tag name → annotations with that tag
///
/// Older exports store the object JSON-encoded inside a string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TextAttributes {
    Decoded(IndexMap<String, Vec<LegacyAnnotation>>),
    Encoded(String),
}

impl TextAttributes {
    pub fn decode(&self) -> Result<IndexMap<String, Vec<LegacyAnnotation>>, MarkupError> {
        match self {
            TextAttributes::Decoded(map) => Ok(map.clone()),
            TextAttributes::Encoded(s) if s.trim().is_empty() => Ok(IndexMap::new()),
            TextAttributes::Encoded(s) => {
                serde_json::from_str(s).map_err(|e| MarkupError::Attributes(e.to_string()))
            }
        }
    }
}

/// Rule for ordering events that share an offset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Ends before starts; the most recently opened range closes first;
    /// longer ranges open first; then supplied order
    #[default]
    Nesting,
    /// Supplied order only, as the legacy exporter did
    Supplied,
}

/// Reconstructed markup for one text value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarkupResult {
    pub markup: String,
    /// Internal link targets, distinct, in order of first appearance
    pub links: Vec<RecordId>,
}

/// Plain text plus stand-off annotations
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AnnotatedText {
    pub text: String,
    #[serde(default)]
    pub ranges: Vec<AnnotationRange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventKind {
    Start,
    End,
}

#[derive(Debug, Clone, Copy)]
struct Event {
    position: usize,
    kind: EventKind,
    /// Index into the supplied ranges
    range: usize,
}

impl AnnotatedText {
    pub fn new(text: impl Into<String>, ranges: Vec<AnnotationRange>) -> Self {
        Self {
            text: text.into(),
            ranges,
        }
    }

    /// Builds annotated text from the legacy `textattr` structure
    ///
    /// Supplied order is map key order, then list order within a key.
    pub fn from_legacy(
        text: impl Into<String>,
        attributes: &IndexMap<String, Vec<LegacyAnnotation>>,
    ) -> Result<Self, MarkupError> {
        let mut ranges = Vec::new();
        for (name, annotations) in attributes {
            let tag: Tag = name.parse()?;
            for a in annotations {
                ranges.push(AnnotationRange::from_parts(
                    tag,
                    &a.start,
                    &a.end,
                    a.href.as_deref(),
                    a.resid.as_deref(),
                    a.style.as_deref(),
                )?);
            }
        }
        Ok(Self::new(text, ranges))
    }

    /// Rebuilds properly nested markup from the ranges
    pub fn reconstruct(&self, tie_break: TieBreak) -> Result<MarkupResult, MarkupError> {
        let chars: Vec<char> = self.text.chars().collect();
        let events = self.events(chars.len(), tie_break)?;

        let mut markup = String::with_capacity(self.text.len() + events.len() * 8);
        let mut links: Vec<RecordId> = Vec::new();
        let mut stack: Vec<usize> = Vec::new();
        let mut cursor = 0;

        for event in &events {
            if event.position > cursor {
                push_escaped(&mut markup, &chars[cursor..event.position]);
                cursor = event.position;
            }

            let range = &self.ranges[event.range];
            match event.kind {
                EventKind::Start => {
                    range.open_marker(&mut markup);
                    if let Some(Payload::Internal(id)) = &range.payload {
                        if !links.contains(id) {
                            links.push(id.clone());
                        }
                    }
                    if !range.tag.is_void() {
                        stack.push(event.range);
                    }
                }
                EventKind::End => {
                    let depth = stack
                        .iter()
                        .rposition(|&open| open == event.range)
                        .ok_or(MarkupError::UnmatchedEnd {
                            tag: range.tag,
                            position: event.position,
                        })?;

                    // Bottom-to-top order of the ranges opened inside this one
                    let interrupted: Vec<usize> = stack.drain(depth + 1..).collect();
                    for &open in interrupted.iter().rev() {
                        self.ranges[open].close_marker(&mut markup);
                    }
                    stack.pop();
                    range.close_marker(&mut markup);
                    for &open in &interrupted {
                        self.ranges[open].open_marker(&mut markup);
                        stack.push(open);
                    }
                }
            }
        }

        push_escaped(&mut markup, &chars[cursor..]);

        Ok(MarkupResult { markup, links })
    }

    /// Expands ranges into sorted events, validating offsets
    fn events(&self, len: usize, tie_break: TieBreak) -> Result<Vec<Event>, MarkupError> {
        let mut events = Vec::with_capacity(self.ranges.len() * 2);

        for (index, range) in self.ranges.iter().enumerate() {
            if range.start > range.end {
                return Err(MarkupError::InvertedRange {
                    tag: range.tag,
                    start: range.start,
                    end: range.end,
                });
            }
            if range.end > len {
                return Err(MarkupError::OutOfBounds {
                    tag: range.tag,
                    end: range.end,
                    len,
                });
            }

            if range.tag.is_void() {
                events.push(Event {
                    position: range.start,
                    kind: EventKind::Start,
                    range: index,
                });
                continue;
            }

            if range.start == range.end {
                tracing::debug!(tag = %range.tag, at = range.start, "dropping zero-length annotation");
                continue;
            }

            events.push(Event {
                position: range.start,
                kind: EventKind::Start,
                range: index,
            });
            events.push(Event {
                position: range.end,
                kind: EventKind::End,
                range: index,
            });
        }

        match tie_break {
            // Stable: equal offsets keep supplied order
            TieBreak::Supplied => events.sort_by_key(|e| e.position),
            TieBreak::Nesting => events.sort_by(|a, b| {
                a.position
                    .cmp(&b.position)
                    .then_with(|| self.nesting_order(a, b))
            }),
        }

        Ok(events)
    }

    fn nesting_order(&self, a: &Event, b: &Event) -> Ordering {
        let ra = &self.ranges[a.range];
        let rb = &self.ranges[b.range];
        match (a.kind, b.kind) {
            (EventKind::End, EventKind::Start) => Ordering::Less,
            (EventKind::Start, EventKind::End) => Ordering::Greater,
            (EventKind::Start, EventKind::Start) => {
                rb.end.cmp(&ra.end).then(a.range.cmp(&b.range))
            }
            // Reverse of opening order, so no interrupted range is closed here
            (EventKind::End, EventKind::End) => {
                rb.start.cmp(&ra.start).then(b.range.cmp(&a.range))
            }
        }
    }
}

/// Reconstructs markup with the default tie-break rule
pub fn reconstruct(text: &str, ranges: &[AnnotationRange]) -> Result<String, MarkupError> {
    AnnotatedText::new(text, ranges.to_vec())
        .reconstruct(TieBreak::default())
        .map(|result| result.markup)
}

/// Escapes characters that would corrupt the markup structure
pub fn escape_markup(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    push_escaped(&mut out, &chars);
    out
}

fn push_escaped(out: &mut String, chars: &[char]) {
    for &c in chars {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
}

fn push_escaped_attr(out: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
}
