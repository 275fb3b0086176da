//! Packager Module
//!
//! Walks a rendered package tree and writes it into a single EPUB
//! archive. The `mimetype` marker is written first and uncompressed,
//! as the container format requires; every other entry is deflated.
//! Masked-byte overrides produced by the obfuscation subsystem replace
//! the on-disk content of their entries; the archive never contains
//! both forms of a file.

use std::{
    collections::HashMap,
    fs::{self, File},
    io::Write,
    path::Path,
};

use log::warn;
use walkdir::WalkDir;
use zip::{CompressionMethod, ZipWriter, write::FileOptions};

use crate::{
    error::{BuildWarning, EpubError},
    render,
};

/// Write the rendered tree at `tree_root` into an archive at
/// `output_path`
///
/// # Parameters
/// - `tree_root`: Root of the rendered package tree
/// - `overrides`: Mapping of tree-relative paths to masked bytes; an
///   entry found here is written from the map instead of from disk
/// - `output_path`: Path of the archive to create
/// - `warnings`: Accumulator for per-file problems
///
/// # Return
/// - `Ok(())`: The archive was written and closed
/// - `Err(EpubError)`: The archive target could not be created or
///   written; no open handle is retained on this path
pub fn package_tree<P, Q>(
    tree_root: P,
    overrides: &HashMap<String, Vec<u8>>,
    output_path: Q,
    warnings: &mut Vec<BuildWarning>,
) -> Result<(), EpubError>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let tree_root = tree_root.as_ref();
    let output_path = output_path.as_ref();

    if let Some(parent) = output_path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    let file = File::create(output_path)?;
    let mut zip = ZipWriter::new(file);

    let stored = FileOptions::<()>::default().compression_method(CompressionMethod::Stored);
    let deflated = FileOptions::<()>::default().compression_method(CompressionMethod::Deflated);

    // The mimetype marker must be the first entry and must not be
    // compressed, so readers can sniff it at a fixed offset.
    zip.start_file("mimetype", stored)?;
    zip.write_all(render::EPUB_MEDIA_TYPE.as_bytes())?;

    for entry in WalkDir::new(tree_root) {
        let entry = entry?;
        let path = entry.path();

        if !path.is_file() {
            continue;
        }
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }

        let Ok(relative) = path.strip_prefix(tree_root) else {
            continue;
        };
        let entry_name = relative.to_string_lossy().replace('\\', "/");

        if entry_name == "mimetype" {
            continue;
        }

        let bytes = match overrides.get(&entry_name) {
            Some(masked) => masked.clone(),
            None => match fs::read(path) {
                Ok(bytes) => bytes,
                Err(_) => {
                    let warning = BuildWarning::UnreadableEntry { path: entry_name };
                    warn!("{}", warning);
                    warnings.push(warning);
                    continue;
                }
            },
        };

        zip.start_file(entry_name, deflated)?;
        zip.write_all(&bytes)?;
    }

    zip.finish()?;
    Ok(())
}
