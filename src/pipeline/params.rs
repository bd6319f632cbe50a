//! Request parameter resolution.
//!
//! Each option is resolved field by field, most specific first:
//!
//! 1. the item's own `options` override;
//! 2. the batch-wide [`ParseOptions`] in [`BatchConfig`];
//! 3. the profile default.
//!
//! Fields are independent; there is no cross-field validation.

use crate::config::{Base64Category, BatchConfig, Language, OcrMode, OutputFormat, ParseOptions, Profile};
use crate::item::InputItem;
use tracing::debug;

/// Model identifier used when none is declared.
pub const DEFAULT_MODEL: &str = "document-parse";

/// Resolved, immutable request parameters for one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterBag {
    pub language: Language,
    pub model: String,
    pub output_formats: Vec<OutputFormat>,
    pub base64_encoding: Vec<Base64Category>,
    pub ocr: OcrMode,
    pub coordinates: bool,
}

impl ParameterBag {
    /// Defaults for a protocol profile.
    pub fn defaults(profile: Profile) -> Self {
        match profile {
            Profile::DocumentDigitization => Self {
                language: Language::En,
                model: DEFAULT_MODEL.to_string(),
                output_formats: vec![OutputFormat::Html, OutputFormat::Text],
                base64_encoding: vec![Base64Category::Table],
                ocr: OcrMode::Auto,
                coordinates: true,
            },
            Profile::LegacyDocumentParsing => Self {
                language: Language::Ko,
                model: DEFAULT_MODEL.to_string(),
                output_formats: vec![OutputFormat::Text],
                base64_encoding: Vec::new(),
                ocr: OcrMode::Auto,
                coordinates: true,
            },
        }
    }

    /// `output_formats` as JSON array text, e.g. `["html","text"]`.
    pub fn output_formats_json(&self) -> String {
        json_array(self.output_formats.iter().map(|f| f.as_str()))
    }

    /// `base64_encoding` as JSON array text, e.g. `["table"]`.
    pub fn base64_encoding_json(&self) -> String {
        json_array(self.base64_encoding.iter().map(|c| c.as_str()))
    }
}

fn json_array<'a>(values: impl Iterator<Item = &'a str>) -> String {
    serde_json::Value::Array(values.map(|v| serde_json::Value::String(v.to_string())).collect()).to_string()
}

/// Resolves a [`ParameterBag`] per item against one batch configuration.
#[derive(Debug, Clone, Copy)]
pub struct ParameterResolver<'a> {
    profile: Profile,
    declared: &'a ParseOptions,
}

impl<'a> ParameterResolver<'a> {
    pub fn new(config: &'a BatchConfig) -> Self {
        Self {
            profile: config.profile,
            declared: &config.options,
        }
    }

    /// Resolve the parameters for item `index`.
    pub fn resolve(&self, index: usize, item: &InputItem) -> ParameterBag {
        let defaults = ParameterBag::defaults(self.profile);
        let overrides = item.options.as_ref();
        let declared = self.declared;

        macro_rules! pick {
            ($field:ident) => {
                overrides
                    .and_then(|o| o.$field.clone())
                    .or_else(|| declared.$field.clone())
            };
        }

        let bag = ParameterBag {
            language: pick!(language).unwrap_or(defaults.language),
            model: pick!(model)
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .unwrap_or(defaults.model),
            output_formats: pick!(output_formats)
                .map(dedup)
                .unwrap_or(defaults.output_formats),
            base64_encoding: pick!(base64_encoding)
                .map(dedup)
                .unwrap_or(defaults.base64_encoding),
            ocr: pick!(ocr).unwrap_or(defaults.ocr),
            coordinates: pick!(coordinates).unwrap_or(defaults.coordinates),
        };

        debug!(
            item = index,
            profile = %self.profile,
            language = %bag.language,
            model = %bag.model,
            output_formats = %bag.output_formats_json(),
            base64_encoding = %bag.base64_encoding_json(),
            ocr = %bag.ocr,
            coordinates = bag.coordinates,
            "Resolved request parameters"
        );
        bag
    }
}

/// Remove repeats, keeping the first occurrence of each value.
fn dedup<T: PartialEq>(values: Vec<T>) -> Vec<T> {
    let mut out: Vec<T> = Vec::with_capacity(values.len());
    for v in values {
        if !out.contains(&v) {
            out.push(v);
        }
    }
    out
}
