//! Version resolution against known-versions catalogs.
//!
//! A query is tried, in order, as an exact known version, as a range and
//! as a dist-tag. The first interpretation that yields a version wins, so a
//! string that is both a known version and a valid range always resolves to
//! that exact version.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use semver::{Version, VersionReq};

use crate::error::{ResolveError, VersionError};

/// How a query string is interpreted when it does not resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Version,
    Range,
    Tag,
}

/// Classifies a query by shape alone.
pub fn classify_query(query: &str) -> QueryKind {
    if parse_exact(query).is_some() {
        QueryKind::Version
    } else if Range::parse(query).is_some() {
        QueryKind::Range
    } else {
        QueryKind::Tag
    }
}

/// Parses an exact version, tolerating a leading `v` or `=`.
pub fn parse_exact(value: &str) -> Option<Version> {
    let trimmed = value.trim();
    let trimmed = trimmed
        .strip_prefix('=')
        .unwrap_or(trimmed)
        .trim_start_matches('v');
    Version::parse(trimmed).ok()
}

/// An npm-style range: one or more `||` alternatives.
#[derive(Debug, Clone)]
pub struct Range {
    alternatives: Vec<VersionReq>,
}

impl Range {
    /// Parses an npm-style range.
    ///
    /// Whitespace-separated comparators, hyphen ranges and partial versions
    /// (`9`, `9.8`) are rewritten into `semver` syntax first.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }

        let mut alternatives = Vec::new();
        for alternative in value.split("||") {
            let normalized = normalize_comparators(alternative)?;
            alternatives.push(VersionReq::parse(&normalized).ok()?);
        }

        Some(Self { alternatives })
    }

    /// Returns whether `version` satisfies any alternative.
    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|req| req.matches(version))
    }
}

fn normalize_comparators(alternative: &str) -> Option<String> {
    let mut tokens: Vec<String> = Vec::new();
    let mut pending_op: Option<String> = None;

    for token in alternative.split_whitespace() {
        if token.chars().all(|c| matches!(c, '<' | '>' | '=' | '~' | '^')) {
            pending_op = Some(token.to_string());
            continue;
        }
        let token = match pending_op.take() {
            Some(op) => format!("{op}{token}"),
            None => token.to_string(),
        };
        tokens.push(token);
    }
    if pending_op.is_some() {
        return None;
    }

    // `a - b` hyphen range
    if tokens.len() == 3 && tokens[1] == "-" {
        return Some(format!(">={}, <={}", tokens[0], tokens[2]));
    }

    if tokens.is_empty() {
        return Some("*".to_string());
    }

    let comparators: Vec<String> = tokens.iter().map(|t| normalize_comparator(t)).collect();
    Some(comparators.join(", "))
}

fn normalize_comparator(token: &str) -> String {
    let token = token.trim_start_matches('v');
    let starts_with_op = token.starts_with(['<', '>', '=', '~', '^']);
    // Only the numeric core can hold a wildcard; `x` in `-next.1` is a letter.
    let core = token.split(['-', '+']).next().unwrap_or(token);
    let has_wildcard = core
        .split('.')
        .any(|part| matches!(part, "*" | "x" | "X"));
    if starts_with_op || has_wildcard {
        return token.to_string();
    }

    // npm reads a bare `9` as `9.x` and a bare `9.8.1` as exactly that version.
    match core.matches('.').count() {
        0 | 1 => format!("{token}.*"),
        _ => format!("={token}"),
    }
}

/// The versions and dist-tags known for one package manager.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnownVersions {
    versions: BTreeSet<Version>,
    tags: BTreeMap<String, Version>,
}

impl KnownVersions {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a catalog from version strings and `(tag, version)` pairs.
    ///
    /// Tagged versions are added to the version set as well.
    pub fn parse<'a>(
        versions: impl IntoIterator<Item = &'a str>,
        tags: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, VersionError> {
        let mut known = Self::new();
        for value in versions {
            known.versions.insert(parse_catalog_version(value)?);
        }
        for (tag, value) in tags {
            let version = parse_catalog_version(value)?;
            known.versions.insert(version.clone());
            known.tags.insert(tag.to_string(), version);
        }
        Ok(known)
    }

    /// Returns whether `version` is in the catalog.
    pub fn contains(&self, version: &Version) -> bool {
        self.versions.contains(version)
    }

    /// Returns the version a tag points to.
    pub fn tag(&self, name: &str) -> Option<&Version> {
        self.tags.get(name)
    }

    /// Iterates over known versions in ascending order.
    pub fn versions(&self) -> impl Iterator<Item = &Version> {
        self.versions.iter()
    }

    /// Iterates over `(tag, version)` pairs.
    pub fn tags(&self) -> impl Iterator<Item = (&str, &Version)> {
        self.tags.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns the greatest known version satisfying `range`.
    pub fn max_satisfying(&self, range: &Range) -> Option<&Version> {
        self.versions.iter().rev().find(|v| range.matches(v))
    }

    /// Resolves a query to a concrete known version.
    pub fn resolve(&self, query: &str) -> Result<Version, VersionError> {
        let query = query.trim();

        if let Some(version) = parse_exact(query)
            && self.contains(&version)
        {
            return Ok(version);
        }

        if let Some(range) = Range::parse(query)
            && let Some(version) = self.max_satisfying(&range)
        {
            return Ok(version.clone());
        }

        if let Some(version) = self.tag(query) {
            return Ok(version.clone());
        }

        Err(VersionError::unmatched(query))
    }
}

fn parse_catalog_version(value: &str) -> Result<Version, VersionError> {
    Version::parse(value).map_err(|e| VersionError::Invalid {
        value: value.to_string(),
        message: e.to_string(),
    })
}

/// Resolves queries for every package manager with known-versions data.
///
/// Results are memoized per `(package manager, query)`; the resolver is
/// owned by whoever builds the catalog, so each run gets its own cache.
#[derive(Debug, Default)]
pub struct VersionResolver {
    catalogs: HashMap<String, KnownVersions>,
    memo: Mutex<HashMap<(String, String), Option<Version>>>,
}

impl VersionResolver {
    /// Creates a resolver with no catalogs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers known versions for a package manager.
    pub fn with_catalog(mut self, name: impl Into<String>, known: KnownVersions) -> Self {
        self.catalogs
            .insert(name.into().to_ascii_lowercase(), known);
        self
    }

    /// Returns the known versions for a package manager.
    pub fn catalog(&self, name: &str) -> Option<&KnownVersions> {
        self.catalogs.get(&name.to_ascii_lowercase())
    }

    /// Resolves a query, treating an unresolved query as "no match".
    ///
    /// Only an unknown package manager is an error.
    pub fn resolve(&self, name: &str, query: &str) -> Result<Option<Version>, ResolveError> {
        match self.normalize(name, query) {
            Ok(version) => Ok(Some(version)),
            Err(ResolveError::Version { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Resolves a query, reporting why it did not resolve.
    pub fn normalize(&self, name: &str, query: &str) -> Result<Version, ResolveError> {
        let key_name = name.to_ascii_lowercase();
        let known =
            self.catalogs
                .get(&key_name)
                .ok_or_else(|| ResolveError::UnsupportedPackageManager {
                    name: name.to_string(),
                })?;

        let key = (key_name, query.trim().to_string());
        let cached = self.memo.lock().get(&key).cloned();
        let resolved = match cached {
            Some(resolved) => resolved,
            None => {
                let resolved = known.resolve(query).ok();
                self.memo.lock().insert(key, resolved.clone());
                resolved
            }
        };

        resolved.ok_or_else(|| ResolveError::Version {
            name: name.to_string(),
            source: VersionError::unmatched(query.trim()),
        })
    }
}

/// Shared `accepts` logic for package manager adapters.
///
/// Catalog resolution comes first. A concrete version that is not in the
/// catalog (typically one reported by a binary on the host) is accepted
/// when it falls inside the adapter's supported range.
#[derive(Debug, Clone)]
pub struct VersionAcceptor {
    name: String,
    resolver: Arc<VersionResolver>,
    supported: Range,
}

impl VersionAcceptor {
    /// Creates an acceptor for `name` limited to the `supported` range.
    pub fn new(
        name: impl Into<String>,
        resolver: Arc<VersionResolver>,
        supported: &str,
    ) -> Result<Self, VersionError> {
        let supported =
            Range::parse(supported).ok_or_else(|| VersionError::UnknownRange(supported.into()))?;
        Ok(Self {
            name: name.into(),
            resolver,
            supported,
        })
    }

    /// Returns the concrete version `value` maps to, if supported.
    pub fn accepts(&self, value: &str) -> Option<Version> {
        if let Ok(Some(version)) = self.resolver.resolve(&self.name, value) {
            return self.supported.matches(&version).then_some(version);
        }

        let version = parse_exact(value)?;
        self.supported.matches(&version).then_some(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn npm_known() -> KnownVersions {
        KnownVersions::parse(["9.8.1", "8.0.0"], [("latest", "9.8.1")]).unwrap()
    }

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[rstest]
    #[case::major_range("9", "9.8.1")]
    #[case::exact("9.8.1", "9.8.1")]
    #[case::older_major("8", "8.0.0")]
    #[case::tag("latest", "9.8.1")]
    #[case::caret("^8.0.0", "8.0.0")]
    #[case::comparator_set(">=8 <9.8.1", "8.0.0")]
    #[case::alternatives("7 || 8", "8.0.0")]
    #[case::wildcard("*", "9.8.1")]
    #[case::x_range("9.x", "9.8.1")]
    #[case::hyphen("8.0.0 - 9.0.0", "8.0.0")]
    #[case::spaced_operator(">= 9", "9.8.1")]
    fn test_resolve_known(#[case] query: &str, #[case] expected: &str) {
        assert_eq!(npm_known().resolve(query).unwrap(), v(expected));
    }

    #[test]
    fn test_resolve_unknown_range() {
        assert_eq!(
            npm_known().resolve("7"),
            Err(VersionError::UnknownRange("7".to_string()))
        );
    }

    #[test]
    fn test_resolve_unknown_version() {
        assert_eq!(
            npm_known().resolve("9.8.2"),
            Err(VersionError::UnknownVersion("9.8.2".to_string()))
        );
    }

    #[rstest]
    #[case::prerelease_with_x("9.0.0-next.1")]
    fn test_exact_version_with_letter_x_is_not_a_wildcard(#[case] query: &str) {
        let range = Range::parse(query).unwrap();
        assert!(!range.matches(&v("9.8.1")));
        assert!(matches!(
            npm_known().resolve(query),
            Err(VersionError::UnknownVersion(_))
        ));
    }

    #[test]
    fn test_resolve_unknown_tag() {
        assert_eq!(
            npm_known().resolve("next"),
            Err(VersionError::UnknownDistTag("next".to_string()))
        );
    }

    #[test]
    fn test_exact_version_takes_precedence_over_range() {
        // As a semver range "1.0.0" would be "^1.0.0" and pick 1.5.0.
        let known = KnownVersions::parse(["1.0.0", "1.5.0"], []).unwrap();
        assert_eq!(known.resolve("1.0.0").unwrap(), v("1.0.0"));
    }

    #[test]
    fn test_range_takes_precedence_over_tag() {
        let known = KnownVersions::parse(["2.0.0", "3.1.0"], [("3", "2.0.0")]).unwrap();
        assert_eq!(known.resolve("3").unwrap(), v("3.1.0"));
    }

    #[test]
    fn test_prerelease_excluded_unless_requested() {
        let known = KnownVersions::parse(["9.0.0", "10.0.0-beta.1"], []).unwrap();
        assert_eq!(known.resolve(">=9").unwrap(), v("9.0.0"));
        assert_eq!(known.resolve("10.0.0-beta.1").unwrap(), v("10.0.0-beta.1"));
        assert_eq!(known.resolve(">=10.0.0-beta.0").unwrap(), v("10.0.0-beta.1"));
    }

    #[test]
    fn test_parse_rejects_invalid_catalog_version() {
        let result = KnownVersions::parse(["not-a-version"], []);
        assert!(matches!(result, Err(VersionError::Invalid { .. })));
    }

    #[test]
    fn test_classify_query() {
        assert_eq!(classify_query("1.2.3"), QueryKind::Version);
        assert_eq!(classify_query("v1.2.3"), QueryKind::Version);
        assert_eq!(classify_query("^1"), QueryKind::Range);
        assert_eq!(classify_query("latest"), QueryKind::Tag);
    }

    #[test]
    fn test_resolver_unknown_pkg_manager_is_error() {
        let resolver = VersionResolver::new().with_catalog("npm", npm_known());
        assert_eq!(
            resolver.resolve("bun", "1"),
            Err(ResolveError::UnsupportedPackageManager {
                name: "bun".to_string()
            })
        );
    }

    #[test]
    fn test_resolver_no_match_is_soft() {
        let resolver = VersionResolver::new().with_catalog("npm", npm_known());
        assert_eq!(resolver.resolve("npm", "7"), Ok(None));
        assert_eq!(resolver.resolve("NPM", "9"), Ok(Some(v("9.8.1"))));
    }

    #[test]
    fn test_resolver_normalize_reports_reason() {
        let resolver = VersionResolver::new().with_catalog("npm", npm_known());
        let err = resolver.normalize("npm", "next").unwrap_err();
        assert_eq!(
            err,
            ResolveError::Version {
                name: "npm".to_string(),
                source: VersionError::UnknownDistTag("next".to_string()),
            }
        );
    }

    #[test]
    fn test_resolver_memoizes_consistently() {
        let resolver = VersionResolver::new().with_catalog("npm", npm_known());
        let first = resolver.resolve("npm", "9").unwrap();
        let second = resolver.resolve("npm", "9").unwrap();
        assert_eq!(first, second);
        assert_eq!(resolver.memo.lock().len(), 1);
    }

    #[test]
    fn test_resolver_concurrent_use() {
        let resolver = Arc::new(VersionResolver::new().with_catalog("npm", npm_known()));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let resolver = Arc::clone(&resolver);
                std::thread::spawn(move || resolver.resolve("npm", "latest").unwrap())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), Some(v("9.8.1")));
        }
    }

    #[test]
    fn test_acceptor_accepts_supported_host_version() {
        let resolver = Arc::new(VersionResolver::new().with_catalog("npm", npm_known()));
        let acceptor = VersionAcceptor::new("npm", resolver, ">=7").unwrap();

        assert_eq!(acceptor.accepts("9"), Some(v("9.8.1")));
        assert_eq!(acceptor.accepts("10.0.0"), Some(v("10.0.0")));
        assert_eq!(acceptor.accepts("6.14.0"), None);
        assert_eq!(acceptor.accepts("7"), None);
    }
}
