//! Prompt Catalog
//!
//! Prompts are handlebars templates. Each category can override the system
//! and user templates from configuration; anything not overridden uses the
//! built-in defaults below.

use handlebars::{no_escape, Handlebars};
use serde::Serialize;
use std::collections::HashMap;

use crate::config::PromptOverride;
use crate::document::STRUCTURAL_MARKERS;
use crate::models::Category;

const MASTER_SYSTEM: &str = "You are an experienced editor writing original, accurate, \
well-structured articles in {{language_name}}. You always follow the requested output format exactly.";

const MASTER_USER: &str = r#"Write one complete, original article for the "{{category_name}}" category.
{{#if web_search}}Ground the article in current, verifiable information from the web.
{{/if}}
Use exactly this markdown layout and nothing else:

# <title>

**Meta Description:** <one sentence, at most 155 characters>

**Keywords:** <5 to 8 comma separated keywords>

<two or three introduction paragraphs>

## <section heading>

<section body>

(write 4 to 6 sections like the one above)

**Summary:** <two or three sentences>

## FAQ

**Q:** <question>
**A:** <answer>

(write 3 to 5 question and answer pairs)"#;

const TRANSLATION_SYSTEM: &str = "You are a professional translator. Translate markdown from \
{{source_name}} into {{target_name}}. Keep the markdown structure, line breaks and the number of \
headings, questions and keywords exactly as in the input.";

const TRANSLATION_USER: &str = r#"Translate the following text (part {{part}} of {{total}}) into {{target_name}}.
Keep these markers exactly as written, untranslated: {{markers}}
Translate the text after each marker. Return only the translated text.

{{chunk}}"#;

/// Rendered system and user prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

#[derive(Serialize)]
struct MasterContext<'a> {
    category_slug: &'a str,
    category_name: &'a str,
    language_name: &'a str,
    web_search: bool,
}

#[derive(Serialize)]
struct TranslationContext<'a> {
    source_name: &'a str,
    target_name: &'a str,
    part: usize,
    total: usize,
    markers: String,
    chunk: &'a str,
}

/// Category prompts and the translation prompt
pub struct PromptCatalog {
    registry: Handlebars<'static>,
    source_language: String,
}

impl PromptCatalog {
    /// Register built-in templates plus per-category overrides
    pub fn new(
        overrides: &HashMap<String, PromptOverride>,
        source_language: impl Into<String>,
    ) -> Result<Self, handlebars::TemplateError> {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(no_escape);

        registry.register_template_string("master.system", MASTER_SYSTEM)?;
        registry.register_template_string("master.user", MASTER_USER)?;
        registry.register_template_string("translation.system", TRANSLATION_SYSTEM)?;
        registry.register_template_string("translation.user", TRANSLATION_USER)?;

        for (slug, prompt) in overrides {
            if let Some(system) = &prompt.system {
                registry.register_template_string(&override_name(slug, "system"), system)?;
            }
            if let Some(user) = &prompt.user {
                registry.register_template_string(&override_name(slug, "user"), user)?;
            }
        }

        Ok(Self {
            registry,
            source_language: source_language.into(),
        })
    }

    pub fn source_language(&self) -> &str {
        &self.source_language
    }

    /// Prompt for a master article in `category`
    pub fn prompt_for(
        &self,
        category: &Category,
        web_search: bool,
    ) -> Result<Prompt, handlebars::RenderError> {
        let ctx = MasterContext {
            category_slug: &category.slug,
            category_name: &category.display_name,
            language_name: language_name(&self.source_language),
            web_search,
        };

        Ok(Prompt {
            system: self
                .registry
                .render(&self.template_name(&category.slug, "system"), &ctx)?,
            user: self
                .registry
                .render(&self.template_name(&category.slug, "user"), &ctx)?,
        })
    }

    /// Prompt for one translation chunk (`index` is 0-based)
    pub fn translation_prompt(
        &self,
        target_language: &str,
        chunk: &str,
        index: usize,
        total: usize,
    ) -> Result<Prompt, handlebars::RenderError> {
        let ctx = TranslationContext {
            source_name: language_name(&self.source_language),
            target_name: language_name(target_language),
            part: index + 1,
            total,
            markers: STRUCTURAL_MARKERS.join(", "),
            chunk,
        };

        Ok(Prompt {
            system: self.registry.render("translation.system", &ctx)?,
            user: self.registry.render("translation.user", &ctx)?,
        })
    }

    fn template_name(&self, slug: &str, part: &str) -> String {
        let name = override_name(slug, part);
        if self.registry.has_template(&name) {
            name
        } else {
            format!("master.{part}")
        }
    }
}

// Overrides live in their own namespace so a category slug can never
// replace a built-in template
fn override_name(slug: &str, part: &str) -> String {
    format!("category.{slug}.{part}")
}

/// English display name for common language codes
pub fn language_name(code: &str) -> &str {
    match code.to_ascii_lowercase().as_str() {
        "en" => "English",
        "es" => "Spanish",
        "fr" => "French",
        "de" => "German",
        "it" => "Italian",
        "pt" | "pt-br" => "Portuguese",
        "nl" => "Dutch",
        "pl" => "Polish",
        "ru" => "Russian",
        "tr" => "Turkish",
        "ar" => "Arabic",
        "hi" => "Hindi",
        "ja" => "Japanese",
        "ko" => "Korean",
        "zh" | "zh-hans" | "zh-hant" => "Chinese",
        _ => code,
    }
}
