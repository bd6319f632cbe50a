//! Configuration types for a batch upload run.
//!
//! All run-wide behaviour is controlled through [`BatchConfig`], built via its
//! [`BatchConfigBuilder`]. The declared parse options live in
//! [`ParseOptions`]; every field is optional so the resolver in
//! [`crate::pipeline::params`] can layer item overrides, batch options and
//! profile defaults on top of each other.

use crate::error::ConnectorError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Current document-digitization endpoint.
pub const DIGITIZATION_ENDPOINT: &str = "https://api.upstage.ai/v1/document-digitization";

/// Legacy console document-parsing endpoint.
pub const LEGACY_PARSING_ENDPOINT: &str =
    "https://console.upstage.ai/api/document-digitization/document-parsing";

/// Configuration for one batch run.
///
/// # Example
/// ```rust
/// use upstage_parse::{BatchConfig, OutputFormat, Profile};
///
/// let config = BatchConfig::builder()
///     .profile(Profile::DocumentDigitization)
///     .output_formats(vec![OutputFormat::Markdown])
///     .continue_on_failure(true)
///     .build()
///     .unwrap();
/// assert!(config.continue_on_failure);
/// ```
#[derive(Clone, Default)]
pub struct BatchConfig {
    /// Which protocol profile (URL + field set) to speak. Default: current.
    pub profile: Profile,

    /// Endpoint URL override. If None, uses the profile's endpoint.
    pub endpoint: Option<String>,

    /// Declared parse options shared by every item.
    pub options: ParseOptions,

    /// Record failures and keep going instead of aborting the run. Default: false.
    pub continue_on_failure: bool,

    /// Only upload this binary property of each item. If None, uploads all.
    pub binary_property: Option<String>,

    /// Optional per-file progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl fmt::Debug for BatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchConfig")
            .field("profile", &self.profile)
            .field("endpoint", &self.endpoint)
            .field("options", &self.options)
            .field("continue_on_failure", &self.continue_on_failure)
            .field("binary_property", &self.binary_property)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl BatchConfig {
    /// Create a new builder for `BatchConfig`.
    pub fn builder() -> BatchConfigBuilder {
        BatchConfigBuilder {
            config: Self::default(),
        }
    }

    /// The URL every upload of this run is posted to.
    pub fn endpoint_url(&self) -> &str {
        self.endpoint
            .as_deref()
            .unwrap_or_else(|| self.profile.endpoint())
    }
}

/// Builder for [`BatchConfig`].
#[derive(Debug)]
pub struct BatchConfigBuilder {
    config: BatchConfig,
}

impl BatchConfigBuilder {
    pub fn profile(mut self, profile: Profile) -> Self {
        self.config.profile = profile;
        self
    }

    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.endpoint = Some(url.into());
        self
    }

    pub fn options(mut self, options: ParseOptions) -> Self {
        self.config.options = options;
        self
    }

    pub fn language(mut self, language: Language) -> Self {
        self.config.options.language = Some(language);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.options.model = Some(model.into());
        self
    }

    pub fn output_formats(mut self, formats: Vec<OutputFormat>) -> Self {
        self.config.options.output_formats = Some(formats);
        self
    }

    pub fn base64_encoding(mut self, categories: Vec<Base64Category>) -> Self {
        self.config.options.base64_encoding = Some(categories);
        self
    }

    pub fn ocr(mut self, mode: OcrMode) -> Self {
        self.config.options.ocr = Some(mode);
        self
    }

    pub fn coordinates(mut self, v: bool) -> Self {
        self.config.options.coordinates = Some(v);
        self
    }

    pub fn continue_on_failure(mut self, v: bool) -> Self {
        self.config.continue_on_failure = v;
        self
    }

    pub fn binary_property(mut self, name: impl Into<String>) -> Self {
        self.config.binary_property = Some(name.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<BatchConfig, ConnectorError> {
        let c = &self.config;
        if let Some(ref url) = c.endpoint {
            let parsed = reqwest::Url::parse(url).map_err(|e| {
                ConnectorError::InvalidConfig(format!("endpoint '{url}' is not a valid URL: {e}"))
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ConnectorError::InvalidConfig(format!(
                    "endpoint '{url}' must use http or https"
                )));
            }
        }
        if let Some(ref name) = c.binary_property {
            if name.trim().is_empty() {
                return Err(ConnectorError::InvalidConfig(
                    "binary property name must not be empty".into(),
                ));
            }
        }
        Ok(self.config)
    }
}

// ── Parse options ────────────────────────────────────────────────────────

/// Declared parse options. Unset fields fall back to the next layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<Language>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_formats: Option<Vec<OutputFormat>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base64_encoding: Option<Vec<Base64Category>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocr: Option<OcrMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<bool>,
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Wire protocol spoken with the parsing service.
///
/// The two profiles use different URLs and different form fields; a single
/// request never mixes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Profile {
    /// `POST /v1/document-digitization` with `document`, `model`,
    /// `output_formats`, `base64_encoding`, `ocr`, `coordinates`, `language`. (default)
    #[default]
    DocumentDigitization,
    /// Console `document-parsing` endpoint with `file` and `language` only.
    LegacyDocumentParsing,
}

impl Profile {
    /// Default endpoint URL for this profile.
    pub fn endpoint(self) -> &'static str {
        match self {
            Profile::DocumentDigitization => DIGITIZATION_ENDPOINT,
            Profile::LegacyDocumentParsing => LEGACY_PARSING_ENDPOINT,
        }
    }

    /// Name of the multipart field carrying the file.
    pub fn document_field(self) -> &'static str {
        match self {
            Profile::DocumentDigitization => "document",
            Profile::LegacyDocumentParsing => "file",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Profile::DocumentDigitization => "document-digitization",
            Profile::LegacyDocumentParsing => "document-parsing",
        }
    }
}

/// Document language hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Ko,
    En,
}

impl Language {
    pub fn as_str(self) -> &'static str {
        match self {
            Language::Ko => "ko",
            Language::En => "en",
        }
    }
}

/// Output representation requested from the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Text,
    Html,
    Json,
    Markdown,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Text => "text",
            OutputFormat::Html => "html",
            OutputFormat::Json => "json",
            OutputFormat::Markdown => "markdown",
        }
    }
}

/// Element categories the parser returns as base64 images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Base64Category {
    Table,
}

impl Base64Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Base64Category::Table => "table",
        }
    }
}

/// OCR mode. Serialised as `"auto"`, `"true"` or `"false"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OcrMode {
    #[default]
    #[serde(rename = "auto")]
    Auto,
    #[serde(rename = "true")]
    Force,
    #[serde(rename = "false")]
    Off,
}

impl OcrMode {
    pub fn as_str(self) -> &'static str {
        match self {
            OcrMode::Auto => "auto",
            OcrMode::Force => "true",
            OcrMode::Off => "false",
        }
    }
}

macro_rules! str_enum {
    ($ty:ty, $what:literal, [$($text:literal => $variant:expr),+ $(,)?]) => {
        impl FromStr for $ty {
            type Err = ConnectorError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok($variant),)+
                    other => Err(ConnectorError::InvalidConfig(format!(
                        concat!("unknown ", $what, " '{}' (expected one of: {})"),
                        other,
                        [$($text),+].join(", ")
                    ))),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(Profile, "profile", [
    "document-digitization" => Profile::DocumentDigitization,
    "document-parsing" => Profile::LegacyDocumentParsing,
]);
str_enum!(Language, "language", ["ko" => Language::Ko, "en" => Language::En]);
str_enum!(OutputFormat, "output format", [
    "text" => OutputFormat::Text,
    "html" => OutputFormat::Html,
    "json" => OutputFormat::Json,
    "markdown" => OutputFormat::Markdown,
]);
str_enum!(Base64Category, "base64 category", ["table" => Base64Category::Table]);
str_enum!(OcrMode, "ocr mode", [
    "auto" => OcrMode::Auto,
    "true" => OcrMode::Force,
    "false" => OcrMode::Off,
]);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_targets_current_endpoint() {
        let config = BatchConfig::default();
        assert_eq!(config.profile, Profile::DocumentDigitization);
        assert_eq!(config.endpoint_url(), DIGITIZATION_ENDPOINT);
        assert!(!config.continue_on_failure);
    }

    #[test]
    fn legacy_profile_uses_console_endpoint() {
        let config = BatchConfig::builder()
            .profile(Profile::LegacyDocumentParsing)
            .build()
            .unwrap();
        assert_eq!(config.endpoint_url(), LEGACY_PARSING_ENDPOINT);
        assert_eq!(config.profile.document_field(), "file");
    }

    #[test]
    fn endpoint_override_wins() {
        let config = BatchConfig::builder()
            .endpoint("http://127.0.0.1:9000/parse")
            .build()
            .unwrap();
        assert_eq!(config.endpoint_url(), "http://127.0.0.1:9000/parse");
    }

    #[test]
    fn invalid_endpoint_rejected() {
        let err = BatchConfig::builder().endpoint("not a url").build().unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidConfig(_)));

        let err = BatchConfig::builder()
            .endpoint("ftp://example.com/x")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("http or https"));
    }

    #[test]
    fn blank_binary_property_rejected() {
        let err = BatchConfig::builder().binary_property("  ").build().unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidConfig(_)));
    }

    #[test]
    fn enums_parse_from_str() {
        assert_eq!("KO".parse::<Language>().unwrap(), Language::Ko);
        assert_eq!("markdown".parse::<OutputFormat>().unwrap(), OutputFormat::Markdown);
        assert_eq!("true".parse::<OcrMode>().unwrap(), OcrMode::Force);
        assert_eq!(
            "document-parsing".parse::<Profile>().unwrap(),
            Profile::LegacyDocumentParsing
        );
        let err = "pdf".parse::<OutputFormat>().unwrap_err();
        assert!(err.to_string().contains("text, html, json, markdown"));
    }

    #[test]
    fn parse_options_deserialise_camel_case() {
        let opts: ParseOptions = serde_json::from_str(
            r#"{"language":"en","outputFormats":["markdown"],"ocr":"false","coordinates":false}"#,
        )
        .unwrap();
        assert_eq!(opts.language, Some(Language::En));
        assert_eq!(opts.output_formats, Some(vec![OutputFormat::Markdown]));
        assert_eq!(opts.ocr, Some(OcrMode::Off));
        assert_eq!(opts.coordinates, Some(false));
        assert_eq!(opts.model, None);
    }
}
