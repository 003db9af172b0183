//! Structured article documents
//!
//! [`ArticleDocument`] is what providers are asked to produce and what the
//! translation engine splits. It has a single canonical markdown form:
//!
//! ```text
//! # Title
//!
//! **Meta Description:** ...
//!
//! **Keywords:** a, b, c
//!
//! intro paragraphs
//!
//! ## Section heading
//!
//! section body
//!
//! **Summary:** ...
//!
//! ## FAQ
//!
//! **Q:** question
//! **A:** answer
//! ```
//!
//! The `## FAQ` heading and the `**Label:**` prefixes are structural markers
//! and are never translated.

mod parse;

pub use parse::{parse_document, strip_code_fences};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Literal heading of the FAQ block
pub const FAQ_HEADING: &str = "## FAQ";
pub const META_DESCRIPTION_LABEL: &str = "**Meta Description:**";
pub const KEYWORDS_LABEL: &str = "**Keywords:**";
pub const SUMMARY_LABEL: &str = "**Summary:**";
pub const QUESTION_LABEL: &str = "**Q:**";
pub const ANSWER_LABEL: &str = "**A:**";

/// Markers the translation prompt must keep verbatim
pub const STRUCTURAL_MARKERS: [&str; 6] = [
    FAQ_HEADING,
    META_DESCRIPTION_LABEL,
    KEYWORDS_LABEL,
    SUMMARY_LABEL,
    QUESTION_LABEL,
    ANSWER_LABEL,
];

/// Document parsing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    #[error("document is empty")]
    Empty,

    #[error("document does not start with a '# ' title line")]
    MissingTitle,

    #[error("document has no '## ' sections")]
    NoSections,

    #[error("FAQ entry {index} has a question without an answer")]
    IncompleteFaq { index: usize },
}

/// One `## heading` block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub heading: String,
    pub body: String,
}

/// One FAQ question/answer pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaqEntry {
    pub question: String,
    pub answer: String,
}

/// Structured master article
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleDocument {
    pub title: String,
    pub meta_description: String,
    pub intro: String,
    pub sections: Vec<Section>,
    pub summary: String,
    pub faq: Vec<FaqEntry>,
    pub keywords: Vec<String>,
}

/// Counts that must survive translation unchanged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skeleton {
    pub sections: usize,
    pub faq_entries: usize,
    pub keywords: usize,
}

impl ArticleDocument {
    /// Parse provider output into a document
    pub fn parse(text: &str) -> Result<Self, DocumentError> {
        parse_document(text)
    }

    /// Structural skeleton used for the post-translation check
    pub fn skeleton(&self) -> Skeleton {
        Skeleton {
            sections: self.sections.len(),
            faq_entries: self.faq.len(),
            keywords: self.keywords.len(),
        }
    }

    /// Canonical segments in document order; empty segments are omitted
    ///
    /// Segments are the natural split boundaries for translation chunks.
    pub fn segments(&self) -> Vec<String> {
        let mut segments = Vec::with_capacity(self.sections.len() + 4);

        let mut header = format!("# {}", self.title.trim());
        header.push_str("\n\n");
        header.push_str(META_DESCRIPTION_LABEL);
        push_value(&mut header, &self.meta_description);
        header.push_str("\n\n");
        header.push_str(KEYWORDS_LABEL);
        push_value(&mut header, &self.keywords.join(", "));
        segments.push(header);

        if !self.intro.trim().is_empty() {
            segments.push(self.intro.trim().to_string());
        }

        for section in &self.sections {
            let mut block = format!("## {}", section.heading.trim());
            if !section.body.trim().is_empty() {
                block.push_str("\n\n");
                block.push_str(section.body.trim());
            }
            segments.push(block);
        }

        if !self.summary.trim().is_empty() {
            let mut block = String::from(SUMMARY_LABEL);
            push_value(&mut block, &self.summary);
            segments.push(block);
        }

        if !self.faq.is_empty() {
            let entries: Vec<String> = self
                .faq
                .iter()
                .map(|entry| {
                    format!(
                        "{QUESTION_LABEL} {}\n{ANSWER_LABEL} {}",
                        entry.question.trim(),
                        entry.answer.trim()
                    )
                })
                .collect();
            segments.push(format!("{FAQ_HEADING}\n\n{}", entries.join("\n\n")));
        }

        segments
    }

    /// Canonical markdown serialization
    pub fn to_markdown(&self) -> String {
        let mut out = self.segments().join("\n\n");
        out.push('\n');
        out
    }

    /// Word count of the rendered body
    pub fn word_count(&self) -> usize {
        self.to_markdown().split_whitespace().count()
    }
}

fn push_value(buf: &mut String, value: &str) {
    let value = value.trim();
    if !value.is_empty() {
        buf.push(' ');
        buf.push_str(value);
    }
}
