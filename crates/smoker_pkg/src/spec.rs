//! Package manager requests and resolved specs.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use semver::Version;
use serde::Serialize;
use thiserror::Error;

/// The version token that asks for the host's package manager.
pub const SYSTEM: &str = "system";

/// The version assumed when a request names only a package manager.
pub const DEFAULT_VERSION: &str = "latest";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Package manager request is empty")]
    Empty,
    #[error("Invalid package manager request format: {0}")]
    InvalidFormat(String),
}

/// What a user asked for, before resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DesiredPkgManager {
    /// `name@version`, `name@range` or `name@tag`.
    Explicit { name: String, version: String },
    /// `name@system`, or bare `system` when `name` is `None`.
    System { name: Option<String> },
}

impl DesiredPkgManager {
    /// Parses a `packageManager` field value (`name@version+sha...`).
    pub fn from_package_manager_field(value: &str) -> Result<Self, ParseError> {
        let without_hash = value.split('+').next().unwrap_or(value);
        let desired: Self = without_hash.parse()?;
        match desired {
            Self::Explicit { .. } if without_hash.contains('@') => Ok(desired),
            _ => Err(ParseError::InvalidFormat(value.to_string())),
        }
    }

    /// The package manager name, if any.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Explicit { name, .. } => Some(name),
            Self::System { name } => name.as_deref(),
        }
    }
}

impl FromStr for DesiredPkgManager {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ParseError::Empty);
        }
        if s.eq_ignore_ascii_case(SYSTEM) {
            return Ok(Self::System { name: None });
        }

        // Scoped names are not valid package managers, so the first `@` splits.
        let (name, version) = match s.split_once('@') {
            Some((name, version)) => {
                let version = version.trim();
                if version.is_empty() || version.contains('@') {
                    return Err(ParseError::InvalidFormat(s.to_string()));
                }
                (name.trim(), version)
            }
            None => (s, DEFAULT_VERSION),
        };

        if name.is_empty() || name.contains(char::is_whitespace) || name.contains('/') {
            return Err(ParseError::InvalidFormat(s.to_string()));
        }

        let name = name.to_ascii_lowercase();
        if version.eq_ignore_ascii_case(SYSTEM) {
            Ok(Self::System { name: Some(name) })
        } else {
            Ok(Self::Explicit {
                name,
                version: version.to_string(),
            })
        }
    }
}

impl fmt::Display for DesiredPkgManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Explicit { name, version } => write!(f, "{name}@{version}"),
            Self::System { name: Some(name) } => write!(f, "{name}@{SYSTEM}"),
            Self::System { name: None } => f.write_str(SYSTEM),
        }
    }
}

/// A concrete, resolved package manager.
///
/// Identity (equality and hashing) is `name`, `version` and `is_system`;
/// `requested_as` and `bin` are informational.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PkgManagerSpec {
    pub name: String,
    pub bin: String,
    pub version: Version,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_as: Option<String>,
    pub is_system: bool,
    label: String,
}

impl PkgManagerSpec {
    /// Creates a spec for a version chosen from a catalog.
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        let name = name.into();
        let label = format!("{name}@{version}");
        Self {
            bin: name.clone(),
            name,
            version,
            requested_as: None,
            is_system: false,
            label,
        }
    }

    /// Creates a spec for a binary probed from the host.
    pub fn system(name: impl Into<String>, bin: impl Into<String>, version: Version) -> Self {
        let name = name.into();
        let label = format!("{name}@{version} ({SYSTEM})");
        Self {
            name,
            bin: bin.into(),
            version,
            requested_as: None,
            is_system: true,
            label,
        }
    }

    /// Records the request this spec was resolved from.
    pub fn with_requested_as(mut self, requested: impl Into<String>) -> Self {
        self.requested_as = Some(requested.into());
        self
    }

    /// `name@version`, with a `(system)` suffix for host binaries.
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl PartialEq for PkgManagerSpec {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.version == other.version && self.is_system == other.is_system
    }
}

impl Eq for PkgManagerSpec {}

impl Hash for PkgManagerSpec {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.version.hash(state);
        self.is_system.hash(state);
    }
}

impl fmt::Display for PkgManagerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn explicit(name: &str, version: &str) -> DesiredPkgManager {
        DesiredPkgManager::Explicit {
            name: name.to_string(),
            version: version.to_string(),
        }
    }

    #[test]
    fn test_parse_explicit() {
        assert_eq!("npm@9".parse(), Ok(explicit("npm", "9")));
        assert_eq!("pnpm@^8.1.0".parse(), Ok(explicit("pnpm", "^8.1.0")));
        assert_eq!("NPM@latest".parse(), Ok(explicit("npm", "latest")));
    }

    #[test]
    fn test_parse_bare_name_defaults_to_latest() {
        assert_eq!("npm".parse(), Ok(explicit("npm", "latest")));
    }

    #[test]
    fn test_parse_system() {
        assert_eq!(
            "npm@system".parse(),
            Ok(DesiredPkgManager::System {
                name: Some("npm".to_string())
            })
        );
        assert_eq!(
            "system".parse(),
            Ok(DesiredPkgManager::System { name: None })
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!("".parse::<DesiredPkgManager>(), Err(ParseError::Empty));
        assert!("npm@".parse::<DesiredPkgManager>().is_err());
        assert!("npm@   ".parse::<DesiredPkgManager>().is_err());
        assert!("@9".parse::<DesiredPkgManager>().is_err());
        assert!("npm@9@10".parse::<DesiredPkgManager>().is_err());
        assert!("owner/npm@9".parse::<DesiredPkgManager>().is_err());
    }

    #[test]
    fn test_package_manager_field_strips_hash() {
        let desired =
            DesiredPkgManager::from_package_manager_field("pnpm@8.15.9+sha256.abcdef").unwrap();
        assert_eq!(desired, explicit("pnpm", "8.15.9"));
    }

    #[test]
    fn test_package_manager_field_requires_version() {
        assert!(DesiredPkgManager::from_package_manager_field("pnpm").is_err());
        assert!(DesiredPkgManager::from_package_manager_field("pnpm@system").is_err());
    }

    #[test]
    fn test_display_round_trips_request() {
        assert_eq!(explicit("npm", "9").to_string(), "npm@9");
        assert_eq!(DesiredPkgManager::System { name: None }.to_string(), "system");
    }

    #[test]
    fn test_spec_identity_ignores_requested_as() {
        let version = Version::parse("9.8.1").unwrap();
        let a = PkgManagerSpec::new("npm", version.clone()).with_requested_as("npm@9");
        let b = PkgManagerSpec::new("npm", version.clone()).with_requested_as("npm@latest");
        let c = PkgManagerSpec::system("npm", "/usr/bin/npm", version);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_spec_label() {
        let version = Version::parse("10.0.0").unwrap();
        assert_eq!(PkgManagerSpec::new("npm", version.clone()).label(), "npm@10.0.0");
        assert_eq!(
            PkgManagerSpec::system("npm", "npm", version).to_string(),
            "npm@10.0.0 (system)"
        );
    }
}
