//! Overlay access: tracked package list and recipe versions

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[cfg(test)]
use mockall::automock;
use tracing::{debug, warn};

use crate::config::PACKAGES_FILE;
use crate::version::error::OverlayError;
use crate::version::gentoo::highest_release;
use crate::version::types::PackageUpdateSpec;

const RECIPE_EXTENSION: &str = ".ebuild";

/// Source of package configuration and recipe metadata
#[cfg_attr(test, automock)]
pub trait OverlaySource: Send + Sync {
    /// All packages tracked for updates
    fn load_packages(&self) -> Result<Vec<PackageUpdateSpec>, OverlayError>;

    /// Versions of every recipe present for `package`
    fn recipe_versions(&self, package: &str) -> Result<Vec<String>, OverlayError>;
}

/// Highest version among non-live recipes
pub fn resolve_current_version(versions: &[String]) -> Option<String> {
    highest_release(versions.iter().map(String::as_str)).map(str::to_string)
}

/// Split `category/name`
pub fn split_package_id(package: &str) -> Result<(&str, &str), OverlayError> {
    match package.split_once('/') {
        Some((category, name))
            if !category.is_empty() && !name.is_empty() && !name.contains('/') =>
        {
            Ok((category, name))
        }
        _ => Err(OverlayError::InvalidPackageId(package.to_string())),
    }
}

/// Version encoded in a `<name>-<version>.ebuild` filename
fn recipe_version<'a>(file_name: &'a str, name: &str) -> Option<&'a str> {
    let version = file_name
        .strip_suffix(RECIPE_EXTENSION)?
        .strip_prefix(name)?
        .strip_prefix('-')?;
    version
        .starts_with(|c: char| c.is_ascii_digit())
        .then_some(version)
}

/// Overlay checked out on the local filesystem
pub struct OverlayDir {
    root: PathBuf,
}

impl OverlayDir {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn packages_file(&self) -> PathBuf {
        self.root.join(PACKAGES_FILE)
    }
}

impl OverlaySource for OverlayDir {
    fn load_packages(&self) -> Result<Vec<PackageUpdateSpec>, OverlayError> {
        let path = self.packages_file();
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("No package list at {:?}", path);
                return Ok(Vec::new());
            }
            Err(source) => return Err(OverlayError::Io { path, source }),
        };

        let specs: BTreeMap<String, PackageUpdateSpec> = serde_json::from_slice(&bytes)
            .map_err(|source| OverlayError::PackageList {
                path: path.clone(),
                source,
            })?;

        specs
            .into_iter()
            .map(|(key, mut spec)| {
                if spec.package.is_empty() {
                    spec.package = key;
                }
                split_package_id(&spec.package)?;
                Ok(spec)
            })
            .collect()
    }

    fn recipe_versions(&self, package: &str) -> Result<Vec<String>, OverlayError> {
        let (category, name) = split_package_id(package)?;
        let dir = self.root.join(category).join(name);
        let entries = std::fs::read_dir(&dir).map_err(|source| OverlayError::Io {
            path: dir.clone(),
            source,
        })?;

        let mut versions = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| OverlayError::Io {
                path: dir.clone(),
                source,
            })?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if let Some(version) = recipe_version(file_name, name) {
                versions.push(version.to_string());
            }
        }
        versions.sort();
        debug!("Found {} recipes for {}", versions.len(), package);
        Ok(versions)
    }
}
