use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::models::config::StaticConfig;
use crate::services::{ServiceError, ServiceResult};

/// File written next to the collected assets, mapping names to hashed names.
pub const MANIFEST_NAME: &str = "staticfiles.json";

const MANIFEST_VERSION: &str = "1.0";

/// Hex digits of the content hash embedded in collected file names.
const HASH_LEN: usize = 12;

/// Outcome of a static asset collection run.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CollectReport {
    pub copied: usize,
    pub unchanged: usize,
}

/// Mapping from asset paths to their content-hashed copies.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct StaticManifest {
    version: String,
    paths: BTreeMap<String, String>,
}

impl StaticManifest {
    /// Read the manifest from a static root. `None` when nothing was collected.
    pub fn load(root: &Path) -> ServiceResult<Option<Self>> {
        let path = root.join(MANIFEST_NAME);
        if !path.is_file() {
            return Ok(None);
        }
        let raw = fs::read(&path).map_err(ServiceError::ReadManifest)?;
        let manifest = serde_json::from_slice(&raw).map_err(ServiceError::InvalidManifest)?;
        Ok(Some(manifest))
    }

    /// Hashed name of `path`, or `path` itself when it was not collected.
    pub fn resolve<'a>(&'a self, path: &'a str) -> &'a str {
        let key = path.trim_start_matches('/');
        self.paths.get(key).map(String::as_str).unwrap_or(path)
    }

    fn save(&self, root: &Path) -> ServiceResult<()> {
        let json = serde_json::to_vec_pretty(self).map_err(ServiceError::InvalidManifest)?;
        fs::write(root.join(MANIFEST_NAME), json).map_err(ServiceError::WriteManifest)
    }
}

/// Copy every file under the configured source directories into the static
/// root, keeping relative paths, and write a content-hashed copy of each one
/// plus the manifest that maps between them.
///
/// When two source directories contain the same relative path, the first
/// directory wins. Files already present with the same size and a modification
/// time at least as recent as the source are left alone. Missing source
/// directories are skipped. Symlinked files and directories are followed.
pub fn collect_static(config: &StaticConfig) -> ServiceResult<CollectReport> {
    fs::create_dir_all(&config.root).map_err(ServiceError::OutputSetup)?;

    let mut seen = HashSet::new();
    let mut report = CollectReport::default();
    let mut manifest = StaticManifest {
        version: MANIFEST_VERSION.to_string(),
        paths: BTreeMap::new(),
    };

    for source in &config.source_dirs {
        if !source.is_dir() {
            log::warn!("Static source {} does not exist, skipping", source.display());
            continue;
        }

        for relative in list_files(source)? {
            if !seen.insert(relative.clone()) {
                continue;
            }
            let from = source.join(&relative);
            let contents = fs::read(&from).map_err(ServiceError::ReadSource)?;
            let hashed = hashed_name(&relative, &contents);
            let to = config.root.join(&relative);
            let hashed_to = config.root.join(&hashed);

            manifest
                .paths
                .insert(url_path(&relative), url_path(&hashed));

            if is_up_to_date(&from, &to) && hashed_to.is_file() {
                report.unchanged += 1;
                continue;
            }
            if let Some(parent) = to.parent() {
                fs::create_dir_all(parent).map_err(ServiceError::OutputSetup)?;
            }
            fs::copy(&from, &to).map_err(ServiceError::CopyAsset)?;
            fs::write(&hashed_to, &contents).map_err(ServiceError::CopyAsset)?;
            log::debug!("Collected {} as {}", relative.display(), hashed.display());
            report.copied += 1;
        }
    }

    manifest.save(&config.root)?;
    log::info!(
        "Collected static files into {}: {} copied, {} unchanged",
        config.root.display(),
        report.copied,
        report.unchanged
    );
    Ok(report)
}

/// Relative paths of all files below `root`, sorted.
///
/// Symlinks are resolved, so a linked directory is walked like a real one.
/// Directories already visited through another link are not walked twice.
fn list_files(root: &Path) -> ServiceResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut visited = HashSet::new();
    let mut pending = vec![PathBuf::new()];

    while let Some(dir) = pending.pop() {
        let absolute = root.join(&dir);
        let canonical = fs::canonicalize(&absolute).map_err(ServiceError::ReadSource)?;
        if !visited.insert(canonical) {
            continue;
        }
        for entry in fs::read_dir(&absolute).map_err(ServiceError::ReadSource)? {
            let entry = entry.map_err(ServiceError::ReadSource)?;
            let relative = dir.join(entry.file_name());
            let metadata = match fs::metadata(entry.path()) {
                Ok(metadata) => metadata,
                Err(err) => {
                    log::warn!("Skipping broken static entry {}: {}", relative.display(), err);
                    continue;
                }
            };
            if metadata.is_dir() {
                pending.push(relative);
            } else {
                files.push(relative);
            }
        }
    }

    files.sort();
    Ok(files)
}

/// `css/site.css` becomes `css/site.<hash>.css`.
fn hashed_name(relative: &Path, contents: &[u8]) -> PathBuf {
    let digest = Sha256::digest(contents);
    let hash: String = digest
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect::<String>()[..HASH_LEN]
        .to_string();

    let stem = relative
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = match relative.extension() {
        Some(ext) => format!("{stem}.{hash}.{}", ext.to_string_lossy()),
        None => format!("{stem}.{hash}"),
    };
    relative.with_file_name(file_name)
}

/// Relative path with `/` separators, as used in URLs and the manifest.
fn url_path(relative: &Path) -> String {
    relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn is_up_to_date(from: &Path, to: &Path) -> bool {
    let (Ok(source), Ok(target)) = (fs::metadata(from), fs::metadata(to)) else {
        return false;
    };
    if source.len() != target.len() {
        return false;
    }
    match (source.modified(), target.modified()) {
        (Ok(source), Ok(target)) => target >= source,
        _ => false,
    }
}
