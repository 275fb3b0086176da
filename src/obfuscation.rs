//! Font Obfuscation Module
//!
//! Implements the IDPF font obfuscation algorithm
//! (http://www.idpf.org/2008/embedding) over a rendered package tree.
//! The masking key is an SHA-1 digest of the publication's unique
//! identifiers, located by following the chain the specification
//! prescribes: container descriptor, package document paths,
//! `unique-identifier` attribute, identifier element text.
//!
//! Masking XORs the first 1040 bytes of a resource with the key. XOR is
//! involutive (A XOR B XOR B = A), so obfuscation and de-obfuscation
//! are the same operation, and the algorithm is independent of any
//! particular font format.
//!
//! The set of files to mask is read back from the rendered encryption
//! manifest rather than from the document model: what the package
//! declares encrypted is exactly what gets masked.

use std::{cmp::min, collections::HashMap, fs, path::Path};

use log::warn;
use sha1::{Digest, Sha1};

use crate::{
    error::{BuildWarning, EpubError, KeyError},
    render,
    utils::{XmlElement, XmlReader},
};

/// Algorithm URI declared in the encryption manifest for IDPF font
/// obfuscation
pub const IDPF_ALGORITHM: &str = "http://www.idpf.org/2008/embedding";

/// Number of leading bytes the mask covers; the rest of the file is
/// written unchanged
const OBFUSCATION_SPAN: usize = 1040;

/// A derived obfuscation key: the 20 bytes of an SHA-1 digest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObfuscationKey([u8; 20]);

impl ObfuscationKey {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Derive the obfuscation key from a rendered package tree
///
/// Follows the declaration chain of the rendered files: every
/// `rootfile` path in the container descriptor names a package
/// document; each package document names its unique-identifier element,
/// whose text joins the key material in declaration order.
///
/// # Parameters
/// - `tree_root`: Root of the rendered package tree
///
/// # Return
/// - `Ok(ObfuscationKey)`: The derived 20-byte key
/// - `Err(EpubError)`: A link of the declaration chain is missing, or
///   a rendered file could not be read back
pub fn derive_key<P: AsRef<Path>>(tree_root: P) -> Result<ObfuscationKey, EpubError> {
    let tree_root = tree_root.as_ref();
    let container = parse_xml_file(&tree_root.join(render::CONTAINER_PATH))?;

    let package_paths: Vec<String> = container
        .descendants("rootfile")
        .iter()
        .filter_map(|rootfile| rootfile.attr("full-path"))
        .map(str::to_string)
        .collect();
    if package_paths.is_empty() {
        return Err(KeyError::MissingPackagePath.into());
    }

    let mut identifiers = Vec::with_capacity(package_paths.len());
    for path in package_paths {
        let package = parse_xml_file(&tree_root.join(&path))?;
        identifiers.push(unique_identifier(&package, &path)?);
    }

    Ok(key_from_identifiers(&identifiers)?)
}

/// Extract the text of the unique-identifier element of one package
/// document
fn unique_identifier(package: &XmlElement, path: &str) -> Result<String, KeyError> {
    let id_name = package
        .attr("unique-identifier")
        .ok_or_else(|| KeyError::MissingIdentifierName {
            package: path.to_string(),
        })?
        .to_string();

    let identifier = package
        .descendants("identifier")
        .into_iter()
        .find(|element| element.attr("id") == Some(id_name.as_str()))
        .map(XmlElement::text_content)
        .filter(|text| !text.is_empty())
        .ok_or_else(|| KeyError::MissingIdentifierValue {
            id: id_name.clone(),
            package: path.to_string(),
        })?;

    Ok(identifier)
}

/// Compute the masking key from an ordered list of identifier strings
///
/// Each identifier is stripped of leading and trailing whitespace
/// (space, tab, carriage return, line feed; ends only, interior
/// whitespace stays), the results are joined with single spaces, the
/// whole string is trimmed again, and the SHA-1 digest of its UTF-8
/// bytes is the key. The key is a pure function of the identifier
/// sequence: same identifiers in the same order, same key.
pub fn key_from_identifiers(identifiers: &[String]) -> Result<ObfuscationKey, KeyError> {
    let is_ocf_whitespace = |c: char| matches!(c, ' ' | '\t' | '\r' | '\n');

    let joined = identifiers
        .iter()
        .map(|identifier| identifier.trim_matches(is_ocf_whitespace))
        .collect::<Vec<_>>()
        .join(" ");
    let joined = joined.trim_matches(is_ocf_whitespace);

    if joined.is_empty() {
        return Err(KeyError::EmptyIdentifier);
    }

    let mut hasher = Sha1::new();
    hasher.update(joined.as_bytes());

    Ok(ObfuscationKey(hasher.finalize().into()))
}

/// Apply the reversible byte mask to a resource
///
/// XORs each of the first `min(len, 1040)` bytes with
/// `key[i % key_len]`; bytes beyond offset 1040 are left unmodified.
/// Applying the mask twice with the same key recovers the original
/// bytes.
pub fn mask_bytes(data: &[u8], key: &[u8]) -> Vec<u8> {
    if data.is_empty() || key.is_empty() {
        return data.to_vec();
    }

    let mut masked = data.to_vec();
    for index in 0..min(OBFUSCATION_SPAN, data.len()) {
        masked[index] ^= key[index % key.len()];
    }

    masked
}

/// The set of container-relative URIs declared for obfuscation
///
/// Read from the rendered encryption manifest; an absent manifest means
/// an empty set. Only entries declaring the IDPF algorithm are masked.
pub fn obfuscation_targets<P: AsRef<Path>>(tree_root: P) -> Result<Vec<String>, EpubError> {
    let manifest_path = tree_root.as_ref().join(render::ENCRYPTION_PATH);
    if !manifest_path.is_file() {
        return Ok(Vec::new());
    }

    let root = parse_xml_file(&manifest_path)?;

    let mut targets = Vec::new();
    for data in root.descendants("EncryptedData") {
        let idpf = data
            .descendants("EncryptionMethod")
            .iter()
            .any(|method| method.attr("Algorithm") == Some(IDPF_ALGORITHM));
        if !idpf {
            continue;
        }

        for reference in data.descendants("CipherReference") {
            if let Some(uri) = reference.attr("URI") {
                targets.push(uri.to_string());
            }
        }
    }

    Ok(targets)
}

/// Mask every declared obfuscation target of a rendered tree
///
/// Returns the mapping of container-relative paths to masked bytes the
/// packager substitutes at archive-write time. When nothing is
/// declared, no key is derived and the map is empty. When targets are
/// declared but the key cannot be derived, the build fails: packaging
/// an encryption manifest whose targets were never masked would
/// corrupt the publication silently.
///
/// A declared target missing from the tree is reported as a warning
/// and skipped.
pub fn mask_tree<P: AsRef<Path>>(
    tree_root: P,
    warnings: &mut Vec<BuildWarning>,
) -> Result<HashMap<String, Vec<u8>>, EpubError> {
    let tree_root = tree_root.as_ref();

    let targets = obfuscation_targets(tree_root)?;
    if targets.is_empty() {
        return Ok(HashMap::new());
    }

    let key = derive_key(tree_root)?;

    let mut masked = HashMap::with_capacity(targets.len());
    for uri in targets {
        match fs::read(tree_root.join(&uri)) {
            Ok(data) => {
                masked.insert(uri, mask_bytes(&data, key.as_bytes()));
            }
            Err(_) => {
                let warning = BuildWarning::ObfuscationTargetMissing { uri };
                warn!("{}", warning);
                warnings.push(warning);
            }
        }
    }

    Ok(masked)
}

fn parse_xml_file(path: &Path) -> Result<XmlElement, EpubError> {
    let bytes = fs::read(path)?;
    XmlReader::parse_bytes(bytes, &path.to_string_lossy())
}

#[cfg(test)]
mod tests {
    use std::{env, fs};

    use sha1::{Digest, Sha1};

    use super::{
        derive_key, key_from_identifiers, mask_bytes, mask_tree, obfuscation_targets,
    };
    use crate::{
        error::{EpubError, KeyError},
        utils::local_time,
    };

    fn identifiers(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_masking_is_involutive() {
        let key = key_from_identifiers(&identifiers(&["abc-123"])).unwrap();
        let data: Vec<u8> = (0..2000u32).map(|i| (i % 251) as u8).collect();

        let masked = mask_bytes(&data, key.as_bytes());
        assert_ne!(masked[..20], data[..20]);

        let unmasked = mask_bytes(&masked, key.as_bytes());
        assert_eq!(unmasked, data);
    }

    #[test]
    fn test_masking_leaves_tail_beyond_1040_unchanged() {
        let key = key_from_identifiers(&identifiers(&["abc-123"])).unwrap();
        let data = vec![0xAAu8; 2048];

        let masked = mask_bytes(&data, key.as_bytes());
        assert_eq!(masked[1040..], data[1040..]);
        assert_ne!(masked[..1040], data[..1040]);
    }

    #[test]
    fn test_masking_short_input_and_short_key() {
        // any key of length >= 1 works; the mask cycles through it
        let data = [0x0Fu8, 0xF0, 0x55];
        let masked = mask_bytes(&data, &[0xFF]);
        assert_eq!(masked, [0xF0, 0x0F, 0xAA]);
        assert_eq!(mask_bytes(&masked, &[0xFF]), data);

        assert!(mask_bytes(&[], &[0xFF]).is_empty());
    }

    #[test]
    fn test_key_is_pure_function_of_identifier_order() {
        let one = key_from_identifiers(&identifiers(&["first", "second"])).unwrap();
        let two = key_from_identifiers(&identifiers(&["first", "second"])).unwrap();
        let reordered = key_from_identifiers(&identifiers(&["second", "first"])).unwrap();

        assert_eq!(one, two);
        assert_ne!(one, reordered);
    }

    #[test]
    fn test_key_strips_each_identifier_at_the_ends_only() {
        let padded = key_from_identifiers(&identifiers(&["\t abc-123 \r\n", "  def "])).unwrap();
        let plain = key_from_identifiers(&identifiers(&["abc-123", "def"])).unwrap();
        assert_eq!(padded, plain);

        // interior whitespace is key material
        let interior = key_from_identifiers(&identifiers(&["abc 123", "def"])).unwrap();
        assert_ne!(interior, plain);
    }

    #[test]
    fn test_key_matches_reference_digest() {
        // SHA-1("abc-123"), fixed by the algorithm
        let key = key_from_identifiers(&identifiers(&["abc-123"])).unwrap();

        let mut hasher = Sha1::new();
        hasher.update(b"abc-123");
        let expected: [u8; 20] = hasher.finalize().into();

        assert_eq!(key.as_bytes(), expected);
    }

    #[test]
    fn test_empty_identifiers_fail() {
        let result = key_from_identifiers(&identifiers(&["  ", "\t"]));
        assert_eq!(result.unwrap_err(), KeyError::EmptyIdentifier);

        let result = key_from_identifiers(&[]);
        assert_eq!(result.unwrap_err(), KeyError::EmptyIdentifier);
    }

    #[test]
    fn test_derive_key_from_rendered_tree() {
        let root = env::temp_dir().join(local_time());
        fs::create_dir_all(root.join("META-INF")).unwrap();
        fs::create_dir_all(root.join("OEBPS")).unwrap();

        fs::write(
            root.join("META-INF/container.xml"),
            r#"<?xml version="1.0"?>
            <container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
                <rootfiles>
                    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
                </rootfiles>
            </container>"#,
        )
        .unwrap();
        fs::write(
            root.join("OEBPS/content.opf"),
            r#"<package unique-identifier="pub-id" version="2.0">
                <metadata>
                    <dc:identifier id="pub-id" opf:scheme="uuid"> abc-123 </dc:identifier>
                </metadata>
            </package>"#,
        )
        .unwrap();

        let derived = derive_key(&root).unwrap();
        let expected = key_from_identifiers(&identifiers(&["abc-123"])).unwrap();
        assert_eq!(derived, expected);

        fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn test_derive_key_fails_without_identifier_declaration() {
        let root = env::temp_dir().join(local_time());
        fs::create_dir_all(root.join("META-INF")).unwrap();
        fs::create_dir_all(root.join("OEBPS")).unwrap();

        fs::write(
            root.join("META-INF/container.xml"),
            r#"<container><rootfiles>
                <rootfile full-path="OEBPS/content.opf"/>
            </rootfiles></container>"#,
        )
        .unwrap();
        fs::write(
            root.join("OEBPS/content.opf"),
            r#"<package version="2.0"><metadata/></package>"#,
        )
        .unwrap();

        let result = derive_key(&root);
        assert!(matches!(
            result,
            Err(EpubError::KeyDerivation {
                source: KeyError::MissingIdentifierName { .. }
            })
        ));

        fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn test_targets_empty_when_manifest_absent() {
        let root = env::temp_dir().join(local_time());
        fs::create_dir_all(root.join("META-INF")).unwrap();

        assert!(obfuscation_targets(&root).unwrap().is_empty());

        let mut warnings = Vec::new();
        let masked = mask_tree(&root, &mut warnings).unwrap();
        assert!(masked.is_empty());
        assert!(warnings.is_empty());

        fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn test_mask_tree_reports_missing_target() {
        let root = env::temp_dir().join(local_time());
        fs::create_dir_all(root.join("META-INF")).unwrap();
        fs::create_dir_all(root.join("OEBPS")).unwrap();

        fs::write(
            root.join("META-INF/container.xml"),
            r#"<container><rootfiles>
                <rootfile full-path="OEBPS/content.opf"/>
            </rootfiles></container>"#,
        )
        .unwrap();
        fs::write(
            root.join("OEBPS/content.opf"),
            r#"<package unique-identifier="pub-id" version="2.0">
                <metadata><dc:identifier id="pub-id">abc-123</dc:identifier></metadata>
            </package>"#,
        )
        .unwrap();
        fs::write(
            root.join("META-INF/encryption.xml"),
            r#"<encryption xmlns:enc="http://www.w3.org/2001/04/xmlenc#">
                <enc:EncryptedData>
                    <enc:EncryptionMethod Algorithm="http://www.idpf.org/2008/embedding"/>
                    <enc:CipherData>
                        <enc:CipherReference URI="OEBPS/fonts/ghost.otf"/>
                    </enc:CipherData>
                </enc:EncryptedData>
            </encryption>"#,
        )
        .unwrap();

        let mut warnings = Vec::new();
        let masked = mask_tree(&root, &mut warnings).unwrap();

        assert!(masked.is_empty());
        assert_eq!(warnings.len(), 1);

        fs::remove_dir_all(root).unwrap();
    }
}
