//! Publication Metadata Module
//!
//! This module holds the descriptive metadata of a publication: title,
//! author, identifiers, dates and related fields. Metadata is built
//! once from a [MetadataConfig] and is immutable afterwards.
//!
//! The package-unique identifier deserves care because the font
//! obfuscation key is derived from it: when the caller does not supply
//! one, an [IdentifierProvider] generates it. The default provider
//! draws a random UUID; tests inject fixed providers to get
//! reproducible packages.

use chrono::{SecondsFormat, Utc};
use uuid::Uuid;

use crate::types::EpubVersion;

/// Source of package-unique identifiers
///
/// Passed into metadata construction so that identifier generation is
/// an explicit dependency rather than ambient global state.
pub trait IdentifierProvider {
    /// Produce one fresh identifier string
    fn generate(&self) -> String;
}

/// The default identifier provider, backed by random UUIDs (version 4)
pub struct RandomIdentifier;

impl IdentifierProvider for RandomIdentifier {
    fn generate(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Configuration for the publication metadata
///
/// Every field except the format version is optional; absent fields are
/// either omitted from the rendered package or substituted at render
/// time with the documented default.
#[derive(Debug, Default, Clone)]
pub struct MetadataConfig {
    /// Format version of the publication; defaults to 2.0
    pub version: EpubVersion,

    pub publisher: Option<String>,

    /// Rights statement; omitted from the package when absent
    pub rights: Option<String>,

    /// Language tag; rendered as "en" when absent
    pub language: Option<String>,

    pub author: Option<String>,

    /// Sort-key form of the author name (e.g. "Doe, Jane")
    pub author_sortname: Option<String>,

    pub title: Option<String>,

    /// URI of the cover image inside the package, when one is declared
    pub cover: Option<String>,

    /// Publication date; the current time is used at render when absent
    pub date: Option<String>,

    /// Package-unique identifier; freshly generated when absent
    pub identifier: Option<String>,

    pub subject: Option<String>,
}

/// Descriptive metadata of a publication
///
/// Constructed once from a [MetadataConfig]; there are no setters. The
/// identifier is always present after construction, every other
/// optional field stays optional until render time.
#[derive(Debug, Clone)]
pub struct Metadata {
    pub version: EpubVersion,
    pub publisher: Option<String>,
    pub rights: Option<String>,
    pub language: Option<String>,
    pub author: Option<String>,
    pub author_sortname: Option<String>,
    pub title: Option<String>,
    pub cover: Option<String>,
    pub date: Option<String>,
    pub identifier: String,
    pub subject: Option<String>,
}

impl Metadata {
    /// Build metadata from a configuration, generating a random
    /// identifier when the configuration does not carry one
    pub fn from_config(config: MetadataConfig) -> Self {
        Self::with_provider(config, &RandomIdentifier)
    }

    /// Build metadata from a configuration with an explicit identifier
    /// provider
    ///
    /// The provider is only consulted when `config.identifier` is
    /// absent.
    pub fn with_provider(config: MetadataConfig, provider: &dyn IdentifierProvider) -> Self {
        let identifier = config.identifier.unwrap_or_else(|| provider.generate());

        Metadata {
            version: config.version,
            publisher: config.publisher,
            rights: config.rights,
            language: config.language,
            author: config.author,
            author_sortname: config.author_sortname,
            title: config.title,
            cover: config.cover,
            date: config.date,
            identifier,
            subject: config.subject,
        }
    }

    /// The language tag to render, falling back to "en"
    pub fn language_or_default(&self) -> &str {
        self.language.as_deref().unwrap_or("en")
    }

    /// The publication date to render, falling back to the current time
    pub fn date_or_now(&self) -> String {
        self.date
            .clone()
            .unwrap_or_else(|| Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true))
    }
}

#[cfg(test)]
mod tests {
    use super::{IdentifierProvider, Metadata, MetadataConfig};
    use crate::types::EpubVersion;

    struct FixedIdentifier(&'static str);

    impl IdentifierProvider for FixedIdentifier {
        fn generate(&self) -> String {
            self.0.to_string()
        }
    }

    #[test]
    fn test_defaults() {
        let metadata = Metadata::from_config(MetadataConfig::default());

        assert_eq!(metadata.version, EpubVersion::Version2_0);
        assert_eq!(metadata.language_or_default(), "en");
        assert!(metadata.publisher.is_none());
        assert!(metadata.title.is_none());
        assert!(!metadata.identifier.is_empty());
    }

    #[test]
    fn test_explicit_identifier_wins_over_provider() {
        let config = MetadataConfig {
            identifier: Some("abc-123".to_string()),
            ..Default::default()
        };

        let metadata = Metadata::with_provider(config, &FixedIdentifier("never-used"));
        assert_eq!(metadata.identifier, "abc-123");
    }

    #[test]
    fn test_injected_provider() {
        let metadata =
            Metadata::with_provider(MetadataConfig::default(), &FixedIdentifier("fixed-id"));
        assert_eq!(metadata.identifier, "fixed-id");
    }

    #[test]
    fn test_generated_identifiers_are_unique() {
        let first = Metadata::from_config(MetadataConfig::default());
        let second = Metadata::from_config(MetadataConfig::default());
        assert_ne!(first.identifier, second.identifier);
    }

    #[test]
    fn test_explicit_date_is_kept() {
        let config = MetadataConfig {
            date: Some("2020-01-01T00:00:00+00:00".to_string()),
            ..Default::default()
        };

        let metadata = Metadata::from_config(config);
        assert_eq!(metadata.date_or_now(), "2020-01-01T00:00:00+00:00");
    }
}
