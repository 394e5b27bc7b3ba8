// Dataset discovery: classify raw-directory entries and pair photos with
// their *_mask siblings.

use std::collections::BTreeMap;
use std::path::Path;
use walkdir::WalkDir;

pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tif", "tiff", "bmp"];

const MASK_SUFFIX: &str = "_mask";

fn stem_and_extension(filename: &str) -> (&str, Option<String>) {
    let path = Path::new(filename);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    (stem, extension)
}

/// A filename is usable iff its extension is supported (case-insensitive)
/// and its stem does not carry the reserved mask suffix.
pub fn is_valid_filename(filename: &str, supported_extensions: &[&str]) -> bool {
    let (stem, extension) = stem_and_extension(filename);
    matches!(extension.as_deref(), Some(ext) if supported_extensions.contains(&ext))
        && !stem.ends_with(MASK_SUFFIX)
}

/// Split directory entries into usable photos and rejects. Pure
/// classification; callers must not rely on any particular input order.
pub fn classify(entries: Vec<String>, supported_extensions: &[&str]) -> (Vec<String>, Vec<String>) {
    let mut accepted = Vec::new();
    let mut rejected = Vec::new();
    for entry in entries {
        if is_valid_filename(&entry, supported_extensions) {
            accepted.push(entry);
        } else {
            rejected.push(entry);
        }
    }
    (accepted, rejected)
}

/// List the dataset directory and classify its files. Entries are sorted
/// lexicographically so downstream behavior (manifest order, mask-index
/// collisions) is stable across filesystems.
pub fn scan(dir: &Path) -> Result<(Vec<String>, Vec<String>), walkdir::Error> {
    let entries = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .collect::<Result<Vec<_>, _>>()?;

    let mut names: Vec<String> = entries
        .into_iter()
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .collect();
    names.sort();

    Ok(classify(names, SUPPORTED_EXTENSIONS))
}

/// Build the stem -> mask-filename lookup table from rejected entries.
/// When two rejects share a stem, the later entry wins; `scan` feeds entries
/// in sorted order, so the policy is deterministic.
pub fn build_mask_index(
    rejected: &[String],
    supported_extensions: &[&str],
) -> BTreeMap<String, String> {
    let mut index = BTreeMap::new();
    for name in rejected {
        let (stem, extension) = stem_and_extension(name);
        let supported =
            matches!(extension.as_deref(), Some(ext) if supported_extensions.contains(&ext));
        if supported {
            if let Some(key) = stem.strip_suffix(MASK_SUFFIX) {
                index.insert(key.to_string(), name.clone());
            }
        }
    }
    index
}

/// Resolve the mask paired with a photo, if any. Mask filenames containing
/// spaces are dropped with a warning; the downstream metadata tooling cannot
/// consume them.
pub fn resolve_mask<'a>(
    photo_filename: &str,
    index: &'a BTreeMap<String, String>,
) -> Option<&'a str> {
    let (stem, _) = stem_and_extension(photo_filename);
    let mask = index.get(stem)?;
    if mask.contains(' ') {
        tracing::warn!(
            "Image mask {} has a space. Spaces are currently not supported for image masks.",
            mask
        );
        return None;
    }
    Some(mask)
}
