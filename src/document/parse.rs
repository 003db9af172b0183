//! Line-oriented parser from provider text to [`ArticleDocument`]

use super::{
    ArticleDocument, DocumentError, FaqEntry, Section, ANSWER_LABEL, FAQ_HEADING,
    KEYWORDS_LABEL, META_DESCRIPTION_LABEL, QUESTION_LABEL, SUMMARY_LABEL,
};

/// Field the next plain line is appended to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Intro,
    Meta,
    Keywords,
    Section(usize),
    Summary,
    Question(usize),
    Answer(usize),
    Discard,
}

impl Field {
    /// Single-paragraph fields end at the first blank line
    fn ends_at_blank(self) -> bool {
        matches!(self, Field::Meta | Field::Keywords)
    }
}

#[derive(Default)]
struct Builder {
    title: String,
    intro: String,
    meta: String,
    keywords: String,
    sections: Vec<(String, String)>,
    summary: String,
    faq: Vec<(String, String)>,
}

impl Builder {
    fn buffer(&mut self, field: Field) -> Option<&mut String> {
        match field {
            Field::Intro => Some(&mut self.intro),
            Field::Meta => Some(&mut self.meta),
            Field::Keywords => Some(&mut self.keywords),
            Field::Section(i) => self.sections.get_mut(i).map(|(_, body)| body),
            Field::Summary => Some(&mut self.summary),
            Field::Question(i) => self.faq.get_mut(i).map(|(q, _)| q),
            Field::Answer(i) => self.faq.get_mut(i).map(|(_, a)| a),
            Field::Discard => None,
        }
    }

    fn append(&mut self, field: Field, text: &str) {
        if let Some(buf) = self.buffer(field) {
            if !buf.is_empty() || !text.is_empty() {
                buf.push('\n');
            }
            buf.push_str(text);
        }
    }

    fn finish(self) -> Result<ArticleDocument, DocumentError> {
        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err(DocumentError::MissingTitle);
        }
        if self.sections.is_empty() {
            return Err(DocumentError::NoSections);
        }

        let mut faq = Vec::with_capacity(self.faq.len());
        for (index, (question, answer)) in self.faq.into_iter().enumerate() {
            let answer = answer.trim().to_string();
            if answer.is_empty() {
                return Err(DocumentError::IncompleteFaq { index });
            }
            faq.push(FaqEntry {
                question: question.trim().to_string(),
                answer,
            });
        }

        Ok(ArticleDocument {
            title,
            meta_description: self.meta.trim().to_string(),
            intro: self.intro.trim().to_string(),
            sections: self
                .sections
                .into_iter()
                .map(|(heading, body)| Section {
                    heading: heading.trim().to_string(),
                    body: body.trim().to_string(),
                })
                .collect(),
            summary: self.summary.trim().to_string(),
            faq,
            keywords: self
                .keywords
                .split([',', '\n'])
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(String::from)
                .collect(),
        })
    }
}

/// Remove a surrounding markdown code fence if the provider added one
pub fn strip_code_fences(text: &str) -> &str {
    let mut body = text.trim();

    if body.starts_with("```") {
        body = match body.find('\n') {
            Some(pos) => &body[pos + 1..],
            None => "",
        };
        if let Some(stripped) = body.trim_end().strip_suffix("```") {
            body = stripped;
        }
    }

    body
}

fn is_title(line: &str) -> bool {
    line.starts_with("# ")
}

fn is_faq_heading(line: &str) -> bool {
    line.trim().eq_ignore_ascii_case(FAQ_HEADING)
}

/// Parse provider output into a document
///
/// Text before the first `# ` line is ignored. Unknown lines are appended to
/// whichever field is open, so blank lines inside bodies are preserved.
pub fn parse_document(text: &str) -> Result<ArticleDocument, DocumentError> {
    let body = strip_code_fences(text);
    if body.trim().is_empty() {
        return Err(DocumentError::Empty);
    }

    let mut lines = body.lines().map(str::trim_end);
    let mut builder = Builder::default();

    let title_line = lines
        .by_ref()
        .find(|line| is_title(line.trim_start()))
        .ok_or(DocumentError::MissingTitle)?;
    builder.title = title_line.trim_start()[2..].to_string();

    let mut current = Field::Intro;
    // Body field to return to once a single-paragraph field closes
    let mut resume = Field::Intro;
    let mut in_faq = false;

    for line in lines {
        let marker = line.trim_start();

        if line.is_empty() {
            if current.ends_at_blank() {
                current = resume;
            }
            builder.append(current, "");
            continue;
        }

        if let Some(rest) = marker.strip_prefix(META_DESCRIPTION_LABEL) {
            if !current.ends_at_blank() {
                resume = current;
            }
            current = Field::Meta;
            builder.append(current, rest.trim());
        } else if let Some(rest) = marker.strip_prefix(KEYWORDS_LABEL) {
            if !current.ends_at_blank() {
                resume = current;
            }
            current = Field::Keywords;
            builder.append(current, rest.trim());
        } else if is_faq_heading(marker) {
            in_faq = true;
            current = Field::Discard;
            resume = Field::Discard;
        } else if let Some(heading) = marker.strip_prefix("## ") {
            in_faq = false;
            builder.sections.push((heading.to_string(), String::new()));
            current = Field::Section(builder.sections.len() - 1);
            resume = current;
        } else if let Some(rest) = marker.strip_prefix(SUMMARY_LABEL) {
            in_faq = false;
            current = Field::Summary;
            resume = current;
            builder.append(current, rest.trim());
        } else if let (true, Some(rest)) = (in_faq, marker.strip_prefix(QUESTION_LABEL)) {
            builder.faq.push((rest.trim().to_string(), String::new()));
            current = Field::Question(builder.faq.len() - 1);
            resume = current;
        } else if let (true, Some(rest)) = (in_faq, marker.strip_prefix(ANSWER_LABEL)) {
            current = match builder.faq.len() {
                0 => Field::Discard,
                n => Field::Answer(n - 1),
            };
            resume = current;
            builder.append(current, rest.trim());
        } else {
            builder.append(current, line);
        }
    }

    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```markdown\n# T\n```"), "# T\n");
        assert_eq!(strip_code_fences("  # T  "), "# T");
    }

    #[test]
    fn test_parse_with_preamble_and_fence() {
        let raw = "```markdown\nSure! Here is the article:\n\n# Title\n\n## One\n\nBody\n```";
        let doc = parse_document(raw).unwrap();
        assert_eq!(doc.title, "Title");
        assert_eq!(doc.sections.len(), 1);
        assert_eq!(doc.sections[0].body, "Body");
    }

    #[test]
    fn test_meta_after_intro_resumes_intro() {
        let raw = "# T\n\nFirst.\n**Meta Description:** M\n\nSecond.\n\n## S\n\nB";
        let doc = parse_document(raw).unwrap();
        assert_eq!(doc.meta_description, "M");
        assert_eq!(doc.intro, "First.\n\nSecond.");
    }

    #[test]
    fn test_subheadings_stay_in_body() {
        let raw = "# T\n\n## S\n\n### Detail\n\nText";
        let doc = parse_document(raw).unwrap();
        assert_eq!(doc.sections.len(), 1);
        assert_eq!(doc.sections[0].body, "### Detail\n\nText");
    }

    #[test]
    fn test_faq_multiline_answer() {
        let raw = "# T\n\n## S\n\nB\n\n## FAQ\n\n**Q:** Why?\n**A:** Because.\nAlso this.\n\n**Q:** How?\n**A:** Slowly.";
        let doc = parse_document(raw).unwrap();
        assert_eq!(doc.faq.len(), 2);
        assert_eq!(doc.faq[0].answer, "Because.\nAlso this.");
        assert_eq!(doc.faq[1].question, "How?");
    }

    #[test]
    fn test_section_after_faq_is_not_faq() {
        let raw = "# T\n\n## S\n\nB\n\n## FAQ\n\n**Q:** a\n**A:** b\n\n## Later\n\nMore";
        let doc = parse_document(raw).unwrap();
        assert_eq!(doc.sections.len(), 2);
        assert_eq!(doc.faq.len(), 1);
    }

    #[test]
    fn test_errors() {
        assert_eq!(parse_document("   "), Err(DocumentError::Empty));
        assert_eq!(
            parse_document("no title here"),
            Err(DocumentError::MissingTitle)
        );
        assert_eq!(parse_document("# T\n\nintro"), Err(DocumentError::NoSections));
        assert_eq!(
            parse_document("# T\n\n## S\n\n## FAQ\n\n**Q:** dangling"),
            Err(DocumentError::IncompleteFaq { index: 0 })
        );
    }

    #[test]
    fn test_keywords_split() {
        let raw = "# T\n\n**Keywords:** a, b ,, c\n\n## S";
        let doc = parse_document(raw).unwrap();
        assert_eq!(doc.keywords, vec!["a", "b", "c"]);
    }
}
