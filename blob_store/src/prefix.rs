//! Longest-prefix routing from virtual paths to backend locations.

use crate::{BlobError, BlobResult, PrefixMappingConfig};

/// A virtual-path prefix bound to a container, immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixMapping {
    url_prefix: String,
    container: String,
    blob_prefix: String,
    ignore_prefix_case: bool,
    lowercase_blob_path: bool,
}

impl PrefixMapping {
    /// Normalizes `url_prefix` to `/x/` form. Fails on a prefix that is
    /// empty once slashes are trimmed, or an empty container.
    pub fn new(config: &PrefixMappingConfig) -> BlobResult<Self> {
        let trimmed = config.url_prefix.trim().trim_matches('/');
        if trimmed.is_empty() {
            return Err(BlobError::invalid_config(format!(
                "url prefix {:?} is empty after trimming slashes",
                config.url_prefix
            )));
        }
        if config.container.trim().is_empty() {
            return Err(BlobError::invalid_config(format!(
                "mapping for /{}/ has no container",
                trimmed
            )));
        }

        Ok(Self {
            url_prefix: format!("/{}/", trimmed),
            container: config.container.trim().to_string(),
            blob_prefix: config.blob_prefix.trim_matches('/').to_string(),
            ignore_prefix_case: config.ignore_prefix_case,
            lowercase_blob_path: config.lowercase_blob_path,
        })
    }

    pub fn url_prefix(&self) -> &str {
        &self.url_prefix
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn blob_prefix(&self) -> &str {
        &self.blob_prefix
    }

    pub fn matches(&self, virtual_path: &str) -> bool {
        let Some(head) = virtual_path.get(..self.url_prefix.len()) else {
            return false;
        };
        if self.ignore_prefix_case {
            head.eq_ignore_ascii_case(&self.url_prefix)
        } else {
            head == self.url_prefix
        }
    }

    /// Backend key for a path this mapping matches.
    fn key_for(&self, virtual_path: &str) -> String {
        let rest = virtual_path[self.url_prefix.len()..].trim_start_matches('/');
        let rest = if self.lowercase_blob_path {
            rest.to_lowercase()
        } else {
            rest.to_string()
        };
        if self.blob_prefix.is_empty() {
            rest
        } else {
            format!("{}/{}", self.blob_prefix, rest)
        }
    }
}

/// Where a virtual path lives in the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath<'a> {
    pub mapping: &'a PrefixMapping,
    pub key: String,
}

/// Mappings sorted by descending prefix length, so the most specific one
/// wins on overlap.
#[derive(Debug, Clone, Default)]
pub struct PrefixRouter {
    mappings: Vec<PrefixMapping>,
}

impl PrefixRouter {
    pub fn new(configs: &[PrefixMappingConfig]) -> BlobResult<Self> {
        let mut mappings = configs
            .iter()
            .map(PrefixMapping::new)
            .collect::<BlobResult<Vec<_>>>()?;
        // Stable sort keeps configuration order among equal lengths.
        mappings.sort_by(|a, b| b.url_prefix.len().cmp(&a.url_prefix.len()));
        Ok(Self { mappings })
    }

    pub fn mappings(&self) -> &[PrefixMapping] {
        &self.mappings
    }

    pub fn prefixes(&self) -> Vec<String> {
        self.mappings.iter().map(|m| m.url_prefix.clone()).collect()
    }

    pub fn supports_path(&self, virtual_path: &str) -> bool {
        self.mappings.iter().any(|m| m.matches(virtual_path))
    }

    pub fn resolve(&self, virtual_path: &str) -> Option<ResolvedPath<'_>> {
        self.mappings
            .iter()
            .find(|m| m.matches(virtual_path))
            .map(|mapping| ResolvedPath {
                key: mapping.key_for(virtual_path),
                mapping,
            })
    }
}
