//! Common types used throughout Nexus Vault.

use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroize;

/// A logical path within a vault, independent of where its bytes are stored.
///
/// Paths are '/'-delimited and case-sensitive. Leading and trailing
/// separators are ignored, so `"/docs/a.txt"` and `"docs/a.txt"` name the
/// same entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VaultPath {
    components: Vec<String>,
}

impl VaultPath {
    /// Create a root path.
    pub fn root() -> Self {
        Self {
            components: Vec::new(),
        }
    }

    /// Create a path from string components.
    ///
    /// # Errors
    /// - Returns error if any component is empty, is `.` or `..`, or contains
    ///   a separator
    pub fn from_components(components: Vec<String>) -> crate::Result<Self> {
        for comp in &components {
            if comp.is_empty() {
                return Err(crate::Error::InvalidInput(
                    "Path component cannot be empty".to_string(),
                ));
            }
            if comp == "." || comp == ".." {
                return Err(crate::Error::InvalidInput(format!(
                    "Path component cannot be {:?}",
                    comp
                )));
            }
            if comp.contains('/') || comp.contains('\\') {
                return Err(crate::Error::InvalidInput(
                    "Path component cannot contain separators".to_string(),
                ));
            }
        }
        Ok(Self { components })
    }

    /// Parse a path string into VaultPath.
    pub fn parse(path: &str) -> crate::Result<Self> {
        let path = path.trim_start_matches('/').trim_end_matches('/');
        if path.is_empty() {
            return Ok(Self::root());
        }

        let components: Vec<String> = path.split('/').map(String::from).collect();
        Self::from_components(components)
    }

    /// Parse a path that must name a file or folder, not the root.
    pub fn parse_entry(path: &str) -> crate::Result<Self> {
        let parsed = Self::parse(path)?;
        if parsed.is_root() {
            return Err(crate::Error::InvalidInput(
                "Vault path cannot be empty".to_string(),
            ));
        }
        Ok(parsed)
    }

    /// Check if this is the root path.
    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    /// Get the parent path, if any.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            None
        } else {
            let mut components = self.components.clone();
            components.pop();
            Some(Self { components })
        }
    }

    /// Get the file/folder name (last component).
    pub fn name(&self) -> Option<&str> {
        self.components.last().map(|s| s.as_str())
    }

    /// Get the path components.
    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// The key under which this path is stored in a vault index.
    pub fn to_key(&self) -> String {
        self.components.join("/")
    }

    /// Convert to a string representation.
    pub fn to_string_path(&self) -> String {
        format!("/{}", self.components.join("/"))
    }
}

impl fmt::Display for VaultPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_path())
    }
}

/// Sensitive data wrapper that zeroizes on drop.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct SensitiveBytes(Vec<u8>);

impl SensitiveBytes {
    /// Create new sensitive bytes.
    pub fn new(data: Vec<u8>) -> Self {
        Self(data)
    }

    /// Get a reference to the inner bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Get the length.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for SensitiveBytes {
    fn from(value: &str) -> Self {
        Self(value.as_bytes().to_vec())
    }
}

impl fmt::Debug for SensitiveBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SensitiveBytes([REDACTED; {} bytes])", self.0.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_vault_path_root() {
        let path = VaultPath::root();
        assert!(path.is_root());
        assert_eq!(path.to_string_path(), "/");
        assert_eq!(path.to_key(), "");
    }

    #[test]
    fn test_vault_path_parse() {
        let path = VaultPath::parse("/foo/bar/baz").unwrap();
        assert_eq!(path.components(), &["foo", "bar", "baz"]);
        assert_eq!(path.to_key(), "foo/bar/baz");
    }

    #[test]
    fn test_leading_slash_is_irrelevant() {
        assert_eq!(
            VaultPath::parse("docs/a.txt").unwrap(),
            VaultPath::parse("/docs/a.txt/").unwrap()
        );
    }

    #[test]
    fn test_case_sensitive() {
        assert_ne!(
            VaultPath::parse("Docs/A.txt").unwrap(),
            VaultPath::parse("docs/a.txt").unwrap()
        );
    }

    #[test]
    fn test_empty_component_rejected() {
        assert!(VaultPath::parse("docs//a.txt").is_err());
    }

    #[test]
    fn test_dot_components_rejected() {
        for bad in ["docs/..", "../a.txt", "./a.txt", "docs/./a.txt", ".."] {
            assert!(VaultPath::parse(bad).is_err(), "{:?} accepted", bad);
        }
        assert!(VaultPath::parse("docs/.hidden").is_ok());
        assert!(VaultPath::parse("docs/a..b").is_ok());
    }

    #[test]
    fn test_parse_entry_rejects_root() {
        assert!(VaultPath::parse_entry("/").is_err());
        assert!(VaultPath::parse_entry("").is_err());
    }

    #[test]
    fn test_vault_path_parent_and_name() {
        let path = VaultPath::parse("/foo/bar").unwrap();
        assert_eq!(path.name(), Some("bar"));
        assert_eq!(path.parent().unwrap().to_string_path(), "/foo");
    }

    #[test]
    fn test_sensitive_bytes_debug_is_redacted() {
        let secret = SensitiveBytes::from("hunter2");
        assert!(!format!("{:?}", secret).contains("hunter2"));
    }

    proptest! {
        #[test]
        fn prop_key_reparses(parts in proptest::collection::vec("[a-zA-Z0-9._-]{1,8}", 1..5)) {
            prop_assume!(parts.iter().all(|p| p != "." && p != ".."));
            let path = VaultPath::from_components(parts).unwrap();
            prop_assert_eq!(VaultPath::parse(&path.to_key()).unwrap(), path);
        }
    }
}
