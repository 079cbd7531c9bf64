use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use pinflow_config::{MANIFEST_FILE_NAME, SourceFormat, parse_flow, parse_manifest};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::ResolveError;

/// Directory that holds installed packages, next to the flows using them.
const PACKAGES_DIR: &str = "packages";

/// An installed package: the flow files its manifest exposes, keyed by the
/// root id each of them exports.
///
/// Packages are stored in a directory structure:
/// ```text
/// {project}/
/// └── packages/
///     └── @acme/text/
///         ├── pinflow.json
///         └── flows/
///             └── upper.flow.yaml
/// ```
#[derive(Debug, Clone)]
pub(crate) struct PackageIndex {
  pub name: String,
  pub exports: BTreeMap<String, PathBuf>,
}

/// Find `packages/<name>` starting at `from` and walking up.
pub(crate) fn find_package_dir(from: &Path, name: &str) -> Option<PathBuf> {
  from
    .ancestors()
    .map(|dir| dir.join(PACKAGES_DIR).join(name))
    .find(|candidate| candidate.join(MANIFEST_FILE_NAME).is_file())
}

/// Read a package manifest and index the flows it exposes.
pub(crate) fn load_package(dir: &Path) -> Result<PackageIndex, ResolveError> {
  let manifest_path = dir.join(MANIFEST_FILE_NAME);
  let content = read(&manifest_path)?;
  let manifest = parse_manifest(&content).map_err(|source| ResolveError::Parse {
    path: manifest_path.clone(),
    source,
  })?;

  let exposed = exposes_set(&manifest.name, &manifest.exposes)?;

  let mut exports = BTreeMap::new();
  // Symlinks are not followed, so a link cycle cannot trap the walk.
  for entry in WalkDir::new(dir).sort_by_file_name() {
    let entry = entry.map_err(|e| ResolveError::Io {
      path: e.path().unwrap_or(dir).to_path_buf(),
      source: io::Error::from(e),
    })?;
    if !entry.file_type().is_file() {
      continue;
    }
    let Ok(relative) = entry.path().strip_prefix(dir) else {
      continue;
    };
    if !exposed.is_match(relative) {
      continue;
    }

    let path = entry.into_path();
    let flow = parse_flow(&read(&path)?, SourceFormat::from_path(&path))
      .map_err(|source| ResolveError::Parse {
        path: path.clone(),
        source,
      })?;
    if exports.insert(flow.id.clone(), path).is_some() {
      return Err(ResolveError::DuplicateExport {
        flow: manifest.name.clone(),
        name: flow.id,
      });
    }
  }

  debug!(
    package = %manifest.name,
    exports = exports.len(),
    "package_indexed"
  );

  Ok(PackageIndex {
    name: manifest.name,
    exports,
  })
}

pub(crate) fn read(path: &Path) -> Result<String, ResolveError> {
  fs::read_to_string(path).map_err(|source| ResolveError::Io {
    path: path.to_path_buf(),
    source,
  })
}

/// Compile `exposes` patterns. `*` and `?` stay within one path segment,
/// `**` spans segments; a leading `./` is ignored.
fn exposes_set(package: &str, patterns: &[String]) -> Result<GlobSet, ResolveError> {
  let mut builder = GlobSetBuilder::new();
  for pattern in patterns {
    let glob = GlobBuilder::new(pattern.trim_start_matches("./"))
      .literal_separator(true)
      .build()
      .map_err(|e| ResolveError::InvalidExposePattern {
        package: package.to_string(),
        pattern: pattern.clone(),
        message: e.to_string(),
      })?;
    builder.add(glob);
  }
  builder.build().map_err(|e| ResolveError::InvalidExposePattern {
    package: package.to_string(),
    pattern: patterns.join(", "),
    message: e.to_string(),
  })
}
