//! Error Type Definition Module
//!
//! This module defines the error types that may be encountered while
//! rendering and packaging an EPUB publication. Fatal conditions are
//! uniformly wrapped in the [EpubError] enumeration; recoverable
//! per-item conditions are expressed as [BuildWarning] values and
//! accumulated in the build report instead of aborting the build.

use thiserror::Error;

/// Types of fatal errors that can occur during an EPUB build
///
/// An error of this type aborts the current build invocation. Per-item
/// problems (a missing chapter source, an unreadable resource) are not
/// errors; they are collected as [BuildWarning] values.
#[derive(Debug, Error)]
pub enum EpubError {
    /// ZIP archive related errors
    ///
    /// Errors occur when writing the final EPUB container, such as an
    /// invalid entry name or an underlying write failure.
    #[error("Archive error: {source}")]
    ArchiveError { source: zip::result::ZipError },

    #[error("IO error: {source}")]
    IOError { source: std::io::Error },

    /// Obfuscation key derivation failure
    ///
    /// Raised when resources are flagged for obfuscation but the key
    /// material cannot be located in the rendered package documents.
    /// Packaging unmasked resources under an encryption manifest would
    /// produce a package that lies about its own content, so this is
    /// fatal rather than a warning.
    #[error("Key derivation error: {source}")]
    KeyDerivation { source: KeyError },

    /// XML parsing failure error
    ///
    /// This error occurs when a rendered package file cannot be parsed
    /// back into an element tree, which means the file on disk was
    /// damaged or replaced between rendering and packaging.
    #[error("Malformed XML: The \"{file}\" file has no usable root element.")]
    MalformedXml { file: String },

    /// QuickXml error
    ///
    /// This error occurs when writing or parsing XML data using the QuickXml library.
    #[error("QuickXml error: {source}")]
    QuickXmlError { source: quick_xml::Error },

    /// UTF-8 decoding error
    ///
    /// This error occurs when a rendered package file does not contain
    /// valid UTF-8 while being read back for key derivation.
    #[error("Decode error: {source}")]
    Utf8DecodeError { source: std::string::FromUtf8Error },

    /// WalkDir error
    ///
    /// This error occurs when traversing the rendered output tree.
    #[error("WalkDir error: {source}")]
    WalkDirError { source: walkdir::Error },
}

impl From<zip::result::ZipError> for EpubError {
    fn from(value: zip::result::ZipError) -> Self {
        EpubError::ArchiveError { source: value }
    }
}

impl From<std::io::Error> for EpubError {
    fn from(value: std::io::Error) -> Self {
        EpubError::IOError { source: value }
    }
}

impl From<KeyError> for EpubError {
    fn from(value: KeyError) -> Self {
        EpubError::KeyDerivation { source: value }
    }
}

impl From<quick_xml::Error> for EpubError {
    fn from(value: quick_xml::Error) -> Self {
        EpubError::QuickXmlError { source: value }
    }
}

impl From<std::string::FromUtf8Error> for EpubError {
    fn from(value: std::string::FromUtf8Error) -> Self {
        EpubError::Utf8DecodeError { source: value }
    }
}

impl From<walkdir::Error> for EpubError {
    fn from(value: walkdir::Error) -> Self {
        EpubError::WalkDirError { source: value }
    }
}

/// Reasons the obfuscation key cannot be derived
///
/// The key is derived from the unique identifiers declared by the
/// rendered package documents. Each variant names the first link of
/// that chain that could not be followed.
#[derive(Debug, Error)]
#[cfg_attr(test, derive(PartialEq))]
pub enum KeyError {
    /// The whole identifier string is empty once every identifier has
    /// been stripped of surrounding whitespace.
    #[error("The concatenated identifier string is empty.")]
    EmptyIdentifier,

    /// The `unique-identifier` attribute is missing from the `package` element.
    #[error("The package document '{package}' declares no unique-identifier attribute.")]
    MissingIdentifierName { package: String },

    /// No identifier element carries the id named by the `unique-identifier` attribute.
    #[error("No identifier with id '{id}' was found in the package document '{package}'.")]
    MissingIdentifierValue { id: String, package: String },

    /// The container descriptor declares no `rootfile` path.
    #[error("No package document path is declared by the container descriptor.")]
    MissingPackagePath,
}

/// Recoverable problems observed during a build
///
/// Warnings are logged as they occur and accumulated in the
/// [BuildReport](crate::types::BuildReport) returned by the build. The
/// affected item is skipped or rendered in a degraded form; the rest of
/// the build is unaffected.
#[derive(Debug, Error)]
#[cfg_attr(test, derive(PartialEq))]
pub enum BuildWarning {
    /// A chapter declared a source file that does not exist; the
    /// chapter document was not written.
    #[error("Chapter source not found: '{path}' (chapter '{chapter}').")]
    ChapterSourceNotFound { chapter: String, path: String },

    /// The cover image source file does not exist; the image was not copied.
    #[error("Cover image not found: '{path}'.")]
    CoverSourceNotFound { path: String },

    /// The cover was declared without its display size; the cover page
    /// was rendered without a fixed viewport, which some readers reject.
    #[error("Cover width and height are not set; the package may be rejected by readers.")]
    MissingCoverSize,

    /// No metadata was set before rendering; defaults were substituted.
    #[error("Metadata was not set before rendering; defaults were substituted.")]
    MissingMetadata,

    /// A resource listed in the encryption manifest was not present in
    /// the rendered tree, so it could not be masked.
    #[error("Obfuscation target '{uri}' is missing from the rendered tree.")]
    ObfuscationTargetMissing { uri: String },

    /// A resource declared a source file that does not exist; the
    /// resource was not copied into the tree.
    #[error("Resource source not found: '{path}' (uri '{uri}').")]
    ResourceSourceNotFound { uri: String, path: String },

    /// A file in the rendered tree could not be read back while the
    /// archive was being written; its entry was skipped.
    #[error("Could not read '{path}' while packaging; the entry was skipped.")]
    UnreadableEntry { path: String },
}
