//! Storage key scheme for preview artifacts.

use std::fmt;

use crate::{Error, Result};

/// Validated storage key for a preview artifact.
///
/// Renders as `preview/{source_id}/{source_checksum}/{source_id}.pdf`. The
/// mapping is deterministic and must stay stable across versions; changing it
/// would orphan every artifact already deposited under the old shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PreviewKey {
    source_id: String,
    source_checksum: String,
    key: String,
}

impl PreviewKey {
    /// Builds the key for the given source package identity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] if either component is empty or contains
    /// a path separator, which would change the key shape.
    pub fn new(source_id: impl Into<String>, source_checksum: impl Into<String>) -> Result<Self> {
        let source_id = source_id.into();
        let source_checksum = source_checksum.into();

        validate_component("source id", &source_id)?;
        validate_component("source checksum", &source_checksum)?;

        let key = format!("preview/{source_id}/{source_checksum}/{source_id}.pdf");
        Ok(Self {
            source_id,
            source_checksum,
            key,
        })
    }

    /// Returns the source package identifier.
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Returns the checksum of the source package this preview renders.
    pub fn source_checksum(&self) -> &str {
        &self.source_checksum
    }

    /// Returns the rendered storage key.
    pub fn as_str(&self) -> &str {
        &self.key
    }

    /// Consumes the key, returning the rendered storage key.
    pub fn into_string(self) -> String {
        self.key
    }
}

impl fmt::Display for PreviewKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

impl AsRef<str> for PreviewKey {
    fn as_ref(&self) -> &str {
        &self.key
    }
}

fn validate_component(label: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::invalid_key(format!("{label} is empty")));
    }
    if value.contains('/') {
        return Err(Error::invalid_key(format!(
            "{label} `{value}` contains a path separator"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_stable_key_shape() {
        let key = PreviewKey::new("1234", "foochex==").unwrap();
        assert_eq!(key.as_str(), "preview/1234/foochex==/1234.pdf");
        assert_eq!(key.to_string(), key.as_str());
        assert_eq!(key.source_id(), "1234");
        assert_eq!(key.source_checksum(), "foochex==");
    }

    #[test]
    fn accepts_url_safe_base64_checksums() {
        let key = PreviewKey::new("2401.00123", "uW94u_u4xfDA3lcVd354ng==").unwrap();
        assert_eq!(
            key.as_str(),
            "preview/2401.00123/uW94u_u4xfDA3lcVd354ng==/2401.00123.pdf"
        );
    }

    #[test]
    fn rejects_empty_components() {
        assert!(PreviewKey::new("", "foochex==").is_err());
        assert!(PreviewKey::new("1234", "").is_err());
    }

    #[test]
    fn rejects_path_separators() {
        let error = PreviewKey::new("12/34", "foochex==").unwrap_err();
        assert!(matches!(error, Error::InvalidKey(_)));
        assert!(PreviewKey::new("1234", "foo/chex").is_err());
    }

    #[test]
    fn identical_identities_hash_identically() {
        use std::collections::HashSet;

        let mut keys = HashSet::new();
        keys.insert(PreviewKey::new("1234", "foochex==").unwrap());
        keys.insert(PreviewKey::new("1234", "foochex==").unwrap());
        keys.insert(PreviewKey::new("1234", "barchex==").unwrap());
        assert_eq!(keys.len(), 2);
    }
}
