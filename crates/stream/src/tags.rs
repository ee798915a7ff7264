//! Inline-tag extraction — splits a chunked text stream into user-visible
//! content and embedded pseudo-XML reasoning tags.
//!
//! Models demarcate reasoning inside the text stream with loose tags:
//! `<NAME [KEY="VALUE" …]>body</NAME>` or self-closing `<NAME/>`. The
//! extractor is a byte-at-a-time state machine that tolerates chunk
//! boundaries at any position: bytes that cannot yet be classified (a
//! partial `<ta` at the end of a chunk) sit in a pending buffer until a
//! disambiguating byte arrives or the stream completes.
//!
//! Anything that fails to parse as a tag degrades to content, verbatim.
//! The extractor itself never errors.
//!
//! Whitespace policy:
//! - runs between two adjacent tags are dropped;
//! - runs immediately before or after a tag are dropped;
//! - trailing whitespace after a final tag is dropped;
//! - whitespace inside content or a tag body is preserved byte-for-byte.

use aw_domain::event::{AttrValue, Attributes};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Output types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A completed inline tag. `content` is `None` for self-closing tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub name: String,
    pub attributes: Attributes,
    pub content: Option<String>,
}

/// One output item of the extractor, in source order.
#[derive(Debug, Clone, PartialEq)]
pub enum TagEvent {
    /// A chunk of user-visible text.
    Content(String),
    /// A tag that just completed.
    Tag(Tag),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// State machine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Plain content.
    Text,
    /// Just saw `<`; not yet known whether a tag follows.
    OpenLt,
    /// Reading the tag name.
    OpenName,
    /// Between attributes, or reading an attribute key.
    OpenAttrs,
    /// Key and `=` consumed; expecting the opening quote.
    OpenAttrQuote,
    /// Inside a quoted attribute value.
    OpenAttrValue,
    /// Saw `/` inside an open tag; expecting `>`.
    SelfClose,
    /// Inside a paired tag's body.
    Body,
    /// Saw `<` inside a body; not yet known whether it closes the tag.
    BodyLt,
    /// Saw `</` inside a body; reading the closing name.
    CloseName,
    /// Saw `</` at top level with no open tag; discarding to `>`.
    OrphanClose,
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':')
}

/// Streaming splitter of text into content and inline tags.
#[derive(Debug)]
pub struct TagExtractor {
    state: State,
    /// Whitespace run trailing emitted content; held because the next
    /// byte may open a tag (in which case the run is dropped).
    ws_run: String,
    /// Raw bytes of the construct being parsed, since its `<`. Replayed
    /// verbatim as content when the construct fails to be a tag.
    raw: String,
    /// Set after a tag emission: following whitespace is dropped eagerly.
    after_tag: bool,

    name: String,
    attributes: Attributes,
    attr_key: String,
    attr_value: String,
    body: String,
    close_name: String,
}

impl Default for TagExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl TagExtractor {
    pub fn new() -> Self {
        Self {
            state: State::Text,
            ws_run: String::new(),
            raw: String::new(),
            after_tag: false,
            name: String::new(),
            attributes: Attributes::new(),
            attr_key: String::new(),
            attr_value: String::new(),
            body: String::new(),
            close_name: String::new(),
        }
    }

    /// Feed one chunk. Returns completed output items in source order:
    /// content runs of this chunk (not coalesced across chunks) and any
    /// tags that completed within it.
    pub fn push(&mut self, chunk: &str) -> Vec<TagEvent> {
        let mut out = Vec::new();
        let mut text = String::new();

        for c in chunk.chars() {
            self.step(c, &mut text, &mut out);
        }

        if !text.is_empty() {
            out.push(TagEvent::Content(text));
        }
        out
    }

    /// The upstream completed. Pending bytes that never became a tag are
    /// emitted as content verbatim; whitespace held after a final tag is
    /// dropped. Resets the extractor.
    pub fn finish(&mut self) -> Vec<TagEvent> {
        let mut out = Vec::new();

        match self.state {
            State::Text => {
                // Trailing whitespace after content is genuine content;
                // after a tag it was already dropped eagerly.
                if !self.ws_run.is_empty() {
                    out.push(TagEvent::Content(std::mem::take(&mut self.ws_run)));
                }
            }
            _ => {
                let mut text = std::mem::take(&mut self.ws_run);
                text.push_str(&self.raw);
                if !text.is_empty() {
                    out.push(TagEvent::Content(text));
                }
            }
        }

        *self = Self::new();
        out
    }

    // ── per-character transition ────────────────────────────────────

    fn step(&mut self, c: char, text: &mut String, out: &mut Vec<TagEvent>) {
        match self.state {
            State::Text => {
                if c == '<' {
                    self.raw.clear();
                    self.raw.push('<');
                    self.state = State::OpenLt;
                } else if c.is_whitespace() {
                    if !self.after_tag {
                        self.ws_run.push(c);
                    }
                    // After a tag the run is dropped byte by byte.
                } else {
                    self.after_tag = false;
                    if !self.ws_run.is_empty() {
                        text.push_str(&self.ws_run);
                        self.ws_run.clear();
                    }
                    text.push(c);
                }
            }

            State::OpenLt => {
                self.raw.push(c);
                if is_name_start(c) {
                    self.name.clear();
                    self.name.push(c);
                    self.state = State::OpenName;
                } else if c == '/' {
                    // Orphan closing tag: the held whitespace is ordinary
                    // content (no tag opened), the tag text is discarded.
                    if !self.ws_run.is_empty() {
                        text.push_str(&self.ws_run);
                        self.ws_run.clear();
                    }
                    self.state = State::OrphanClose;
                } else {
                    self.bail(text);
                }
            }

            State::OpenName => {
                self.raw.push(c);
                if is_name_char(c) {
                    self.name.push(c);
                } else if c.is_whitespace() {
                    self.attr_key.clear();
                    self.state = State::OpenAttrs;
                } else if c == '/' {
                    self.state = State::SelfClose;
                } else if c == '>' {
                    self.body.clear();
                    self.state = State::Body;
                } else {
                    self.bail(text);
                }
            }

            State::OpenAttrs => {
                self.raw.push(c);
                if self.attr_key.is_empty() {
                    if c.is_whitespace() {
                        // skip
                    } else if c == '/' {
                        self.state = State::SelfClose;
                    } else if c == '>' {
                        self.body.clear();
                        self.state = State::Body;
                    } else if is_name_start(c) {
                        self.attr_key.push(c);
                    } else {
                        self.bail(text);
                    }
                } else if is_name_char(c) {
                    self.attr_key.push(c);
                } else if c == '=' {
                    self.state = State::OpenAttrQuote;
                } else {
                    self.bail(text);
                }
            }

            State::OpenAttrQuote => {
                self.raw.push(c);
                if c == '"' {
                    self.attr_value.clear();
                    self.state = State::OpenAttrValue;
                } else {
                    self.bail(text);
                }
            }

            State::OpenAttrValue => {
                self.raw.push(c);
                if c == '"' {
                    self.insert_attribute();
                    self.state = State::OpenAttrs;
                } else {
                    // Any byte is legal inside a quoted value, including
                    // `>` and newlines. `\"` is not recognized as an
                    // escape; the quote terminates the value.
                    self.attr_value.push(c);
                }
            }

            State::SelfClose => {
                self.raw.push(c);
                if c == '>' {
                    self.emit_tag(None, text, out);
                } else {
                    self.bail(text);
                }
            }

            State::Body => {
                self.raw.push(c);
                if c == '<' {
                    self.state = State::BodyLt;
                } else {
                    self.body.push(c);
                }
            }

            State::BodyLt => {
                self.raw.push(c);
                if c == '/' {
                    self.close_name.clear();
                    self.state = State::CloseName;
                } else if c == '<' {
                    // The previous `<` was body text; this one restarts
                    // the checkpoint.
                    self.body.push('<');
                } else {
                    self.body.push('<');
                    self.body.push(c);
                    self.state = State::Body;
                }
            }

            State::CloseName => {
                self.raw.push(c);
                if c == '>' {
                    if self.close_name.trim() == self.name {
                        let body = std::mem::take(&mut self.body);
                        self.emit_tag(Some(body), text, out);
                    } else {
                        // Mismatched closing name: the whole construct
                        // was never a tag.
                        self.bail(text);
                    }
                } else {
                    self.close_name.push(c);
                }
            }

            State::OrphanClose => {
                self.raw.push(c);
                if c == '>' {
                    self.raw.clear();
                    self.state = State::Text;
                }
            }
        }
    }

    // ── helpers ─────────────────────────────────────────────────────

    /// The construct in `raw` is not a tag: replay it (and any held
    /// whitespace) as content. If the offending byte was `<`, it may
    /// itself open a tag, so parsing restarts there.
    fn bail(&mut self, text: &mut String) {
        text.push_str(&self.ws_run);
        self.ws_run.clear();
        self.after_tag = false;
        self.reset_tag_state();

        if self.raw.len() > 1 && self.raw.ends_with('<') {
            self.raw.pop();
            text.push_str(&self.raw);
            self.raw.clear();
            self.raw.push('<');
            self.state = State::OpenLt;
        } else {
            text.push_str(&self.raw);
            self.raw.clear();
            self.state = State::Text;
        }
    }

    fn insert_attribute(&mut self) {
        let key = std::mem::take(&mut self.attr_key);
        let value = std::mem::take(&mut self.attr_value);
        match self.attributes.entry(key) {
            std::collections::btree_map::Entry::Occupied(mut entry) => {
                entry.get_mut().push(value);
            }
            std::collections::btree_map::Entry::Vacant(entry) => {
                entry.insert(AttrValue::One(value));
            }
        }
    }

    fn emit_tag(&mut self, content: Option<String>, text: &mut String, out: &mut Vec<TagEvent>) {
        // Content preceding the tag goes out first; the whitespace run
        // between that content and the tag is dropped.
        if !text.is_empty() {
            out.push(TagEvent::Content(std::mem::take(text)));
        }
        self.ws_run.clear();

        out.push(TagEvent::Tag(Tag {
            name: std::mem::take(&mut self.name),
            attributes: std::mem::take(&mut self.attributes),
            content,
        }));

        self.reset_tag_state();
        self.raw.clear();
        self.after_tag = true;
        self.state = State::Text;
    }

    fn reset_tag_state(&mut self) {
        self.name.clear();
        self.attributes = Attributes::new();
        self.attr_key.clear();
        self.attr_value.clear();
        self.body.clear();
        self.close_name.clear();
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    /// Run chunks through a fresh extractor, including the final flush.
    fn run(chunks: &[&str]) -> Vec<TagEvent> {
        let mut extractor = TagExtractor::new();
        let mut out = Vec::new();
        for chunk in chunks {
            out.extend(extractor.push(chunk));
        }
        out.extend(extractor.finish());
        out
    }

    /// Collapse adjacent content events (for chunk-split comparisons).
    fn coalesce(events: Vec<TagEvent>) -> Vec<TagEvent> {
        let mut out: Vec<TagEvent> = Vec::new();
        for event in events {
            match (out.last_mut(), event) {
                (Some(TagEvent::Content(acc)), TagEvent::Content(next)) => {
                    acc.push_str(&next);
                }
                (_, event) => out.push(event),
            }
        }
        out
    }

    fn contents(events: &[TagEvent]) -> Vec<&str> {
        events
            .iter()
            .filter_map(|e| match e {
                TagEvent::Content(c) => Some(c.as_str()),
                _ => None,
            })
            .collect()
    }

    fn tags(events: &[TagEvent]) -> Vec<&Tag> {
        events
            .iter()
            .filter_map(|e| match e {
                TagEvent::Tag(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn plain_text_passes_through() {
        let events = run(&["hello world"]);
        assert_eq!(events, vec![TagEvent::Content("hello world".into())]);
    }

    #[test]
    fn tag_split_across_chunks() {
        let events = run(&[
            "Hello ",
            "<thou",
            "ght>analyzing...",
            "</thought>",
            " The answer is 42.",
        ]);

        assert_eq!(contents(&events), vec!["Hello", "The answer is 42."]);
        let found = tags(&events);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "thought");
        assert_eq!(found[0].content.as_deref(), Some("analyzing..."));
        assert!(found[0].attributes.is_empty());
    }

    #[test]
    fn whitespace_between_tags_dropped() {
        let events = run(&["<t1/>", "   ", "<t2/>", "   ", "content"]);
        assert_eq!(contents(&events), vec!["content"]);
        let found = tags(&events);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].name, "t1");
        assert_eq!(found[1].name, "t2");
        assert!(found[0].content.is_none());
    }

    #[test]
    fn self_closing_with_space_before_slash() {
        let events = run(&["<note />"]);
        assert_eq!(
            events,
            vec![TagEvent::Tag(Tag {
                name: "note".into(),
                attributes: Attributes::new(),
                content: None,
            })]
        );
    }

    #[test]
    fn attributes_parsed() {
        let events = run(&[r#"<step id="1" phase="plan">body</step>"#]);
        let found = tags(&events);
        assert_eq!(found.len(), 1);
        assert_eq!(
            found[0].attributes.get("id"),
            Some(&AttrValue::One("1".into()))
        );
        assert_eq!(
            found[0].attributes.get("phase"),
            Some(&AttrValue::One("plan".into()))
        );
        assert_eq!(found[0].content.as_deref(), Some("body"));
    }

    #[test]
    fn duplicate_attribute_keys_collapse_to_array() {
        let events = run(&[r#"<cite src="a" src="b" src="c"/>"#]);
        let found = tags(&events);
        assert_eq!(
            found[0].attributes.get("src"),
            Some(&AttrValue::Many(vec!["a".into(), "b".into(), "c".into()]))
        );
    }

    #[test]
    fn attribute_value_may_contain_gt_and_whitespace() {
        let events = run(&["<t msg=\"a > b\nline\"/>"]);
        let found = tags(&events);
        assert_eq!(
            found[0].attributes.get("msg"),
            Some(&AttrValue::One("a > b\nline".into()))
        );
    }

    #[test]
    fn orphan_closing_tag_discarded() {
        let events = run(&["before </ghost> after"]);
        assert_eq!(coalesce(events), vec![TagEvent::Content("before  after".into())]);
    }

    #[test]
    fn incomplete_tag_at_stream_end_is_content() {
        let events = run(&["text <unfin"]);
        assert_eq!(coalesce(events), vec![TagEvent::Content("text <unfin".into())]);
    }

    #[test]
    fn unclosed_paired_tag_at_stream_end_is_content() {
        let events = run(&["<thought>never closed"]);
        assert_eq!(
            coalesce(events),
            vec![TagEvent::Content("<thought>never closed".into())]
        );
    }

    #[test]
    fn mismatched_closing_name_degrades_to_content() {
        let events = run(&["<a>inner</b>tail"]);
        assert_eq!(
            coalesce(events),
            vec![TagEvent::Content("<a>inner</b>tail".into())]
        );
    }

    #[test]
    fn lone_angle_bracket_is_content() {
        let events = run(&["3 < 5 and 7 > 2"]);
        assert_eq!(
            coalesce(events),
            vec![TagEvent::Content("3 < 5 and 7 > 2".into())]
        );
    }

    #[test]
    fn double_lt_rescans_second_bracket() {
        let events = run(&["a <<b/>"]);
        let coalesced = coalesce(events);
        assert_eq!(coalesced.len(), 2);
        assert_eq!(coalesced[0], TagEvent::Content("a <".into()));
        assert!(matches!(&coalesced[1], TagEvent::Tag(t) if t.name == "b"));
    }

    #[test]
    fn body_may_contain_angle_brackets() {
        let events = run(&["<t>x < y <z> w</t>"]);
        let found = tags(&events);
        assert_eq!(found[0].content.as_deref(), Some("x < y <z> w"));
    }

    #[test]
    fn interior_whitespace_preserved() {
        let events = run(&["a  \t b\n\nc"]);
        assert_eq!(coalesce(events), vec![TagEvent::Content("a  \t b\n\nc".into())]);
    }

    #[test]
    fn whitespace_before_tag_dropped_after_content() {
        let events = run(&["word   <t/>"]);
        let coalesced = coalesce(events);
        assert_eq!(coalesced[0], TagEvent::Content("word".into()));
        assert!(matches!(&coalesced[1], TagEvent::Tag(t) if t.name == "t"));
    }

    #[test]
    fn trailing_whitespace_after_final_tag_dropped() {
        let events = run(&["<t/>", "  \n "]);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], TagEvent::Tag(t) if t.name == "t"));
    }

    #[test]
    fn trailing_whitespace_after_content_preserved() {
        let events = run(&["hello  "]);
        assert_eq!(coalesce(events), vec![TagEvent::Content("hello  ".into())]);
    }

    #[test]
    fn empty_body_yields_empty_content() {
        let events = run(&["<t></t>"]);
        let found = tags(&events);
        assert_eq!(found[0].content.as_deref(), Some(""));
    }

    #[test]
    fn content_not_coalesced_across_chunks() {
        let mut extractor = TagExtractor::new();
        let first = extractor.push("ab");
        let second = extractor.push("cd");
        assert_eq!(first, vec![TagEvent::Content("ab".into())]);
        assert_eq!(second, vec![TagEvent::Content("cd".into())]);
    }

    #[test]
    fn pending_bytes_not_emitted_early() {
        let mut extractor = TagExtractor::new();
        // "<ta" could still become a tag, so nothing may be emitted yet.
        assert!(extractor.push("<ta").is_empty());
        // Disambiguated: not a tag open, replay as content. The trailing
        // space stays pending (it could precede a tag).
        let events = extractor.push("! ");
        assert_eq!(events, vec![TagEvent::Content("<ta!".into())]);
        assert_eq!(extractor.finish(), vec![TagEvent::Content(" ".into())]);
    }

    #[test]
    fn attribute_split_across_chunks() {
        let events = run(&["<s", "tep i", "d=\"4", "2\">ok</s", "tep>"]);
        let found = tags(&events);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "step");
        assert_eq!(
            found[0].attributes.get("id"),
            Some(&AttrValue::One("42".into()))
        );
        assert_eq!(found[0].content.as_deref(), Some("ok"));
    }

    #[test]
    fn malformed_attribute_degrades_to_content() {
        // Unquoted value, outside the grammar.
        let events = run(&["<t key=value/>"]);
        assert_eq!(
            coalesce(events),
            vec![TagEvent::Content("<t key=value/>".into())]
        );
    }

    #[test]
    fn every_split_point_yields_identical_output() {
        let input = "pre <tag a=\"1\" a=\"2\">body text</tag> post <x/>";
        let whole = coalesce(run(&[input]));

        for split in 1..input.len() {
            if !input.is_char_boundary(split) {
                continue;
            }
            let (left, right) = input.split_at(split);
            let split_events = coalesce(run(&[left, right]));
            assert_eq!(split_events, whole, "split at byte {split}");
        }
    }

    #[test]
    fn reconstruction_modulo_whitespace_policy() {
        // Concatenating content and re-rendered tags reproduces the
        // input once boundary whitespace (dropped by policy) is ignored.
        let input = "alpha <t k=\"v\">inner</t> beta";
        let events = run(&[input]);

        let mut rebuilt = String::new();
        for event in &events {
            match event {
                TagEvent::Content(c) => rebuilt.push_str(c),
                TagEvent::Tag(tag) => {
                    rebuilt.push('<');
                    rebuilt.push_str(&tag.name);
                    for (key, value) in &tag.attributes {
                        match value {
                            AttrValue::One(v) => {
                                rebuilt.push_str(&format!(" {key}=\"{v}\""));
                            }
                            AttrValue::Many(vs) => {
                                for v in vs {
                                    rebuilt.push_str(&format!(" {key}=\"{v}\""));
                                }
                            }
                        }
                    }
                    match &tag.content {
                        Some(body) => {
                            rebuilt.push('>');
                            rebuilt.push_str(body);
                            rebuilt.push_str(&format!("</{}>", tag.name));
                        }
                        None => rebuilt.push_str("/>"),
                    }
                }
            }
        }

        let strip_ws = |s: &str| s.chars().filter(|c| !c.is_whitespace()).collect::<String>();
        assert_eq!(strip_ws(&rebuilt), strip_ws(input));
    }

    #[test]
    fn multiple_tags_emitted_in_order() {
        let events = run(&["<a/>one<b/>two"]);
        let mut names = Vec::new();
        let mut texts = Vec::new();
        for event in &events {
            match event {
                TagEvent::Tag(t) => names.push(t.name.clone()),
                TagEvent::Content(c) => texts.push(c.clone()),
            }
        }
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(texts, vec!["one", "two"]);
    }

    #[test]
    fn orphan_close_split_across_chunks() {
        let events = run(&["x </gh", "ost> y"]);
        assert_eq!(coalesce(events), vec![TagEvent::Content("x  y".into())]);
    }

    #[test]
    fn orphan_close_unterminated_at_eof_is_content() {
        let events = run(&["x </ghost"]);
        assert_eq!(coalesce(events), vec![TagEvent::Content("x </ghost".into())]);
    }

    #[test]
    fn tag_name_charset() {
        let events = run(&["<a-b.c:d_1>x</a-b.c:d_1>"]);
        let found = tags(&events);
        assert_eq!(found[0].name, "a-b.c:d_1");

        // A digit cannot start a name.
        let events = run(&["<1abc>"]);
        assert_eq!(coalesce(events), vec![TagEvent::Content("<1abc>".into())]);
    }

    #[test]
    fn extractor_reusable_after_finish() {
        let mut extractor = TagExtractor::new();
        extractor.push("<t>partial");
        extractor.finish();

        let events: Vec<TagEvent> = extractor
            .push("<u/>")
            .into_iter()
            .chain(extractor.finish())
            .collect();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], TagEvent::Tag(t) if t.name == "u"));
    }

    #[test]
    fn unicode_content_preserved() {
        let events = run(&["héllo <t>wörld ✓</t> 終"]);
        let found = tags(&events);
        assert_eq!(found[0].content.as_deref(), Some("wörld ✓"));
        assert_eq!(contents(&coalesce(run(&["héllo 終"]))), vec!["héllo 終"]);
    }
}
