use std::sync::LazyLock;

use regex::Regex;

static CLOZE_SPAN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{([^:{}]*)::([^{}]*)\}\}").expect("static cloze regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClozeSpan {
    pub id: String,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemType {
    Qa,
    Cloze,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedBody {
    Qa,
    Cloze(Vec<ClozeSpan>),
}

impl ItemType {
    pub fn parse(self, content: &str) -> ParsedBody {
        match self {
            ItemType::Qa => ParsedBody::Qa,
            ItemType::Cloze => {
                let mut seen = Vec::new();
                for caps in CLOZE_SPAN_RE.captures_iter(content) {
                    let id = caps[1].to_string();
                    let text = caps[2].to_string();
                    if !id.is_empty() && seen.iter().any(|s: &ClozeSpan| s.id == id) {
                        continue;
                    }
                    seen.push(ClozeSpan { id, text });
                }
                ParsedBody::Cloze(seen)
            }
        }
    }

    pub fn cards(self, parsed: &ParsedBody) -> usize {
        match parsed {
            ParsedBody::Qa => 1,
            ParsedBody::Cloze(spans) => spans.len(),
        }
    }
}

// Used by the snapshotter, which never recorded an item's original type.
pub fn infer_item_type(content: &str) -> ItemType {
    if CLOZE_SPAN_RE.is_match(content) {
        ItemType::Cloze
    } else {
        ItemType::Qa
    }
}

pub fn mint_cloze_id(span_text: &str) -> String {
    format!("{:016x}", xxhash_rust::xxh3::xxh3_64(span_text.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qa_always_yields_one_card() {
        let parsed = ItemType::Qa.parse("anything at all");
        assert_eq!(ItemType::Qa.cards(&parsed), 1);
    }

    #[test]
    fn cloze_counts_distinct_ids() {
        let parsed = ItemType::Cloze.parse("The {{c1::a}} and {{c3::b}}.");
        assert_eq!(ItemType::Cloze.cards(&parsed), 2);
        let ParsedBody::Cloze(spans) = parsed else { panic!("expected cloze") };
        assert_eq!(spans[0].id, "c1");
        assert_eq!(spans[1].id, "c3");
    }

    #[test]
    fn cloze_ignores_body_with_no_spans() {
        let parsed = ItemType::Cloze.parse("plain text, no markers");
        assert_eq!(ItemType::Cloze.cards(&parsed), 0);
    }

    #[test]
    fn cloze_deduplicates_repeated_ids() {
        let parsed = ItemType::Cloze.parse("{{c1::a}} ... {{c1::a again}}");
        assert_eq!(ItemType::Cloze.cards(&parsed), 1);
    }

    #[test]
    fn mint_cloze_id_is_deterministic() {
        let a = mint_cloze_id("{{::new text}}");
        let b = mint_cloze_id("{{::new text}}");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn mint_cloze_id_differs_for_different_spans() {
        let a = mint_cloze_id("{{::one}}");
        let b = mint_cloze_id("{{::two}}");
        assert_ne!(a, b);
    }

    #[test]
    fn infers_cloze_type_from_a_span_marker() {
        assert_eq!(infer_item_type("The {{c1::a}} thing."), ItemType::Cloze);
    }

    #[test]
    fn infers_qa_type_when_no_span_marker_is_present() {
        assert_eq!(infer_item_type("What is Rust?"), ItemType::Qa);
    }
}
