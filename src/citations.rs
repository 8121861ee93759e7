//! Citation normalization.
//!
//! Web-search-capable providers report sources in three unrelated
//! shapes: Google grounds the text with offset-free pre-cut segments,
//! the Responses API annotates character ranges, and Anthropic embeds
//! bracketed markers in the text itself. This module folds all of them
//! into one schema a renderer can consume without knowing the provider.

use regex::{Regex, Replacer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::provider::ProviderKind;

/// How the text relates to the citations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CitationMode {
    /// `text_segments` partition the text; cited spans carry ids.
    Segments,
    /// The text carries sequential `[N]` markers inline.
    Inline,
}

/// One cited source. Ids are 1-based and unique per response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub id: u32,
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// One span of response text and the citations backing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSegment {
    pub text: String,
    pub citation_ids: Vec<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub queries: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rendered_content: Option<String>,
}

impl SearchMetadata {
    fn is_empty(&self) -> bool {
        self.query.is_none() && self.queries.is_empty() && self.rendered_content.is_none()
    }
}

/// Normalized citation payload for one response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitationData {
    pub mode: CitationMode,
    pub citations: Vec<Citation>,
    /// In segments mode, concatenating these reconstructs `text`.
    pub text_segments: Vec<TextSegment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_metadata: Option<SearchMetadata>,
    /// The message text, rewritten only in inline mode.
    pub text: String,
}

/// Normalize one provider's grounding metadata against the response
/// text. Returns `None` when the metadata holds nothing citable.
pub fn normalize(provider: ProviderKind, metadata: &Value, text: &str) -> Option<CitationData> {
    match provider {
        ProviderKind::Google => normalize_google(metadata, text),
        ProviderKind::Anthropic => normalize_anthropic(metadata, text),
        ProviderKind::OpenAiResponses => normalize_responses(metadata, text),
        ProviderKind::OpenAi | ProviderKind::Gwdg => None,
    }
}

fn normalize_google(metadata: &Value, text: &str) -> Option<CitationData> {
    let mut citations = Vec::new();
    if let Some(chunks) = metadata.get("groundingChunks").and_then(Value::as_array) {
        for (index, chunk) in chunks.iter().enumerate() {
            if let Some(web) = chunk.get("web") {
                citations.push(Citation {
                    id: index as u32 + 1,
                    title: str_field(web, "title"),
                    url: str_field(web, "uri"),
                    snippet: str_field(web, "snippet"),
                });
            }
        }
    }

    // Grounding supports arrive pre-segmented; chunk indices are
    // 0-based on the wire.
    let mut segments = Vec::new();
    if let Some(supports) = metadata.get("groundingSupports").and_then(Value::as_array) {
        for support in supports {
            let Some(segment_text) = support
                .get("segment")
                .and_then(|s| s.get("text"))
                .and_then(Value::as_str)
            else {
                continue;
            };
            let Some(indices) = support
                .get("groundingChunkIndices")
                .and_then(Value::as_array)
            else {
                continue;
            };
            segments.push(TextSegment {
                text: segment_text.to_string(),
                citation_ids: indices
                    .iter()
                    .filter_map(Value::as_u64)
                    .map(|i| i as u32 + 1)
                    .collect(),
            });
        }
    }

    let mut search_metadata = SearchMetadata::default();
    if let Some(entry) = metadata.get("searchEntryPoint") {
        let query = str_field(entry, "searchQuery");
        if !query.is_empty() {
            search_metadata.query = Some(query);
        }
        let rendered = str_field(entry, "renderedContent");
        if !rendered.is_empty() {
            search_metadata.rendered_content = Some(rendered);
        }
    }
    if let Some(queries) = metadata.get("webSearchQueries").and_then(Value::as_array) {
        search_metadata.queries = queries
            .iter()
            .filter_map(Value::as_str)
            .map(String::from)
            .collect();
    }

    if citations.is_empty() && segments.is_empty() && search_metadata.is_empty() {
        return None;
    }

    let mode = if segments.is_empty() {
        CitationMode::Inline
    } else {
        CitationMode::Segments
    };
    Some(CitationData {
        mode,
        citations,
        text_segments: segments,
        search_metadata: (!search_metadata.is_empty()).then_some(search_metadata),
        text: text.to_string(),
    })
}

fn normalize_anthropic(metadata: &Value, text: &str) -> Option<CitationData> {
    let sources = metadata.get("citations").and_then(Value::as_array)?;
    let (citations, _) = dedup_citations(sources);
    if citations.is_empty() {
        return None;
    }

    // The model already wrote [N] markers; the text passes through.
    Some(CitationData {
        mode: CitationMode::Inline,
        citations,
        text_segments: Vec::new(),
        search_metadata: None,
        text: text.to_string(),
    })
}

fn normalize_responses(metadata: &Value, text: &str) -> Option<CitationData> {
    let annotations = metadata.get("annotations").and_then(Value::as_array);

    let mut search_metadata = SearchMetadata::default();
    if let Some(queries) = metadata.get("webSearchQueries").and_then(Value::as_array) {
        search_metadata.queries = queries
            .iter()
            .filter_map(Value::as_str)
            .map(String::from)
            .collect();
        if !search_metadata.queries.is_empty() {
            search_metadata.query = Some(search_metadata.queries.join("; "));
        }
    }

    let Some(annotations) = annotations.filter(|a| !a.is_empty()) else {
        if search_metadata.is_empty() {
            return None;
        }
        return Some(CitationData {
            mode: CitationMode::Inline,
            citations: Vec::new(),
            text_segments: Vec::new(),
            search_metadata: Some(search_metadata),
            text: text.to_string(),
        });
    };

    let (citations, id_by_key) = dedup_citations(annotations);

    let has_offsets = annotations
        .iter()
        .any(|a| a.get("start_index").is_some() && a.get("end_index").is_some());

    if has_offsets {
        let segments = offset_segments(annotations, &id_by_key, text);
        Some(CitationData {
            mode: CitationMode::Segments,
            citations,
            text_segments: segments,
            search_metadata: (!search_metadata.is_empty()).then_some(search_metadata),
            text: text.to_string(),
        })
    } else {
        Some(CitationData {
            mode: CitationMode::Inline,
            citations,
            text_segments: Vec::new(),
            search_metadata: (!search_metadata.is_empty()).then_some(search_metadata),
            text: rewrite_inline_citations(text),
        })
    }
}

/// Assign 1-based ids in arrival order, collapsing duplicates that
/// share url and title.
fn dedup_citations(sources: &[Value]) -> (Vec<Citation>, BTreeMap<String, u32>) {
    let mut citations = Vec::new();
    let mut id_by_key = BTreeMap::new();

    for source in sources {
        let url = str_field(source, "url");
        let title = str_field(source, "title");
        let key = format!("{url}|{title}");
        if id_by_key.contains_key(&key) {
            continue;
        }
        let id = citations.len() as u32 + 1;
        id_by_key.insert(key, id);
        citations.push(Citation {
            id,
            title,
            url,
            snippet: str_field(source, "snippet"),
        });
    }

    (citations, id_by_key)
}

/// Expand offset annotations into a gap-filling segment list whose
/// concatenation reproduces `text` exactly.
fn offset_segments(
    annotations: &[Value],
    id_by_key: &BTreeMap<String, u32>,
    text: &str,
) -> Vec<TextSegment> {
    // Group by span; several annotations may cite the same range.
    let mut grouped: BTreeMap<(usize, usize), Vec<u32>> = BTreeMap::new();
    for annotation in annotations {
        let (Some(start), Some(end)) = (
            annotation.get("start_index").and_then(Value::as_u64),
            annotation.get("end_index").and_then(Value::as_u64),
        ) else {
            continue;
        };
        let key = format!(
            "{}|{}",
            str_field(annotation, "url"),
            str_field(annotation, "title")
        );
        let Some(&id) = id_by_key.get(&key) else {
            continue;
        };
        let ids = grouped.entry((start as usize, end as usize)).or_default();
        if !ids.contains(&id) {
            ids.push(id);
        }
    }

    // Offsets count characters, not bytes.
    let byte_offsets: Vec<usize> = text
        .char_indices()
        .map(|(byte, _)| byte)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_len = byte_offsets.len() - 1;
    let slice = |from: usize, to: usize| -> &str {
        let from = from.min(char_len);
        let to = to.clamp(from, char_len);
        &text[byte_offsets[from]..byte_offsets[to]]
    };

    let mut segments = Vec::new();
    let mut last_end = 0usize;
    for ((start, end), ids) in grouped {
        if start > last_end {
            segments.push(TextSegment {
                text: slice(last_end, start).to_string(),
                citation_ids: Vec::new(),
            });
        }
        segments.push(TextSegment {
            text: slice(start, end).to_string(),
            citation_ids: ids,
        });
        last_end = end;
    }
    if last_end < char_len {
        segments.push(TextSegment {
            text: slice(last_end, char_len).to_string(),
            citation_ids: Vec::new(),
        });
    }

    segments
}

/// Rewrite inline source references as sequential `[N]` markers.
///
/// Passes run most-specific first so a parenthesized markdown link is
/// not re-matched by the bare-link pattern: `([text](url))`, then
/// `[text](url)`, then `(domain.tld ...)`.
fn rewrite_inline_citations(text: &str) -> String {
    static PARENTHESIZED_LINK: OnceLock<Regex> = OnceLock::new();
    static BARE_LINK: OnceLock<Regex> = OnceLock::new();
    static DOMAIN_MENTION: OnceLock<Regex> = OnceLock::new();

    let parenthesized =
        PARENTHESIZED_LINK.get_or_init(|| Regex::new(r"\(\[([^\]]+)\]\(([^)]+)\)\)").unwrap());
    let bare = BARE_LINK.get_or_init(|| Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").unwrap());
    let domain =
        DOMAIN_MENTION.get_or_init(|| Regex::new(r"\(([a-zA-Z0-9.-]+\.[a-zA-Z]{2,})[^)]*\)").unwrap());

    let mut counter = 0u32;
    let mut marker = |_: &regex::Captures| -> String {
        counter += 1;
        format!("[{counter}]")
    };

    let text = parenthesized.replace_all(text, marker.by_ref()).into_owned();
    let text = bare.replace_all(&text, marker.by_ref()).into_owned();
    domain.replace_all(&text, marker.by_ref()).into_owned()
}

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
