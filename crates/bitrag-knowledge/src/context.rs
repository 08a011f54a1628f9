//! Context assembly and prompt rendering.

use bitrag_core::config::CitationPolicy;
use bitrag_core::error::{BitRagError, Result};
use serde::Serialize;

use crate::store::RankedMatch;

/// Placed between consecutive match texts.
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Prefix of the line appended to generated answers.
pub const CITATION_MARKER: &str = "Citation:";

const CONTEXT_SLOT: &str = "{context}";
const QUERY_SLOT: &str = "{query}";

/// Context text plus the deduplicated citation labels it was built from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AssembledContext {
    pub context: String,
    pub citations: Vec<String>,
}

impl AssembledContext {
    pub fn is_empty(&self) -> bool {
        self.context.is_empty() && self.citations.is_empty()
    }
}

/// Turns ranked matches into a single context string and citation list.
#[derive(Debug, Clone, Default)]
pub struct ContextAssembler;

impl ContextAssembler {
    pub fn new() -> Self {
        Self
    }

    /// Join match texts in rank order and collect citation labels.
    ///
    /// Texts are never deduplicated; labels keep their first occurrence.
    pub fn assemble(&self, matches: &[RankedMatch]) -> AssembledContext {
        let context = matches
            .iter()
            .map(|m| m.item.text.as_str())
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR);

        let mut citations: Vec<String> = Vec::new();
        for m in matches {
            let label = m.item.citation_label();
            if !citations.contains(&label) {
                citations.push(label);
            }
        }
        AssembledContext { context, citations }
    }
}

/// Render `"\n\nCitation: a, b"` for non-empty citations.
pub fn citation_line(citations: &[String]) -> Option<String> {
    if citations.is_empty() {
        return None;
    }
    Some(format!("\n\n{} {}", CITATION_MARKER, citations.join(", ")))
}

/// Append the citation line to a generated answer according to `policy`.
pub fn append_citations(answer: &str, citations: &[String], policy: CitationPolicy) -> String {
    let Some(line) = citation_line(citations) else {
        return answer.to_string();
    };
    let already_cited = match policy {
        CitationPolicy::Exact => answer.contains(line.trim_start()),
        CitationPolicy::Marker => answer.contains(CITATION_MARKER),
        CitationPolicy::Always => false,
    };
    if already_cited {
        answer.to_string()
    } else {
        format!("{answer}{line}")
    }
}

/// Answer prompt with `{context}` and `{query}` slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    pub const DEFAULT: &'static str = "CONTEXT: {context}\n\
        ---------------------\n\
        Given the context information above I want you to think step by step to answer the user's query in a crisp and concise manner. \
        In case you don't know the answer simply say 'I don't know!'. Don't try to make up an answer. Only answer based on facts and contextual information.\n\
        IMPORTANT: Always include the citation information provided in the context at the end of your response. \
        If citation information is present in the context, you must include it exactly as provided.\n\
        QUERY: {query}\n\
        ANSWER: ";

    /// Custom template; both slots are required.
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        for slot in [CONTEXT_SLOT, QUERY_SLOT] {
            if !template.contains(slot) {
                return Err(BitRagError::Config(format!(
                    "prompt template is missing the {slot} slot"
                )));
            }
        }
        Ok(Self { template })
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Substitute both slots in one pass, so slot-like text inside the
    /// context or query is left alone.
    pub fn render(&self, context: &str, query: &str) -> String {
        let mut out = String::with_capacity(self.template.len() + context.len() + query.len());
        let mut rest = self.template.as_str();
        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let tail = &rest[start..];
            if let Some(after) = tail.strip_prefix(CONTEXT_SLOT) {
                out.push_str(context);
                rest = after;
            } else if let Some(after) = tail.strip_prefix(QUERY_SLOT) {
                out.push_str(query);
                rest = after;
            } else {
                out.push('{');
                rest = &tail[1..];
            }
        }
        out.push_str(rest);
        out
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            template: Self::DEFAULT.to_string(),
        }
    }
}
