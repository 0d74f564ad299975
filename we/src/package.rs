use std::path::Path;

use anyhow::{Context, Result};
use flate2::{write::GzEncoder, Compression};
use ignore::WalkBuilder;
use wedeploy_common::descriptors::ServiceDescriptor;

/// Gzipped tarball of a service directory.
///
/// Honors `.gitignore` and `.ignore` files, skips `.git` and any nested
/// directory holding a service of its own.
pub fn make_bundle(service_dir: &Path) -> Result<Vec<u8>> {
    let enc = GzEncoder::new(Vec::new(), Compression::fast());
    let mut tar = tar::Builder::new(enc);

    let walker = WalkBuilder::new(service_dir)
        .hidden(false)
        .require_git(false)
        .filter_entry(|entry| {
            if entry.file_name() == ".git" {
                return false;
            }
            let is_nested_service = entry.depth() > 0
                && entry.file_type().is_some_and(|t| t.is_dir())
                && ServiceDescriptor::exists_in(entry.path());
            !is_nested_service
        })
        .build();

    for dir_entry in walker {
        let dir_entry = dir_entry.context("failed to walk the service directory")?;

        if dir_entry.file_type().map_or(true, |t| t.is_dir()) {
            continue;
        }

        let name = dir_entry
            .path()
            .strip_prefix(service_dir)
            .context("walked outside of the service directory")?;
        tar.append_path_with_name(dir_entry.path(), name)
            .with_context(|| format!("failed to add {} to the bundle", name.display()))?;
    }

    let enc = tar.into_inner().context("failed to finish the bundle")?;
    let bytes = enc.finish().context("failed to compress the bundle")?;

    Ok(bytes)
}
