//! # smoker_pkg
//!
//! Package manager model for smoker.
//!
//! This crate provides:
//! - Version resolution against known-versions catalogs
//! - Package manager descriptors and resolved specs
//! - The `PkgManagerDef` and `Executor` capabilities adapters implement
//! - Workspace discovery
//! - The catalog matcher that turns requests into envelopes
//!
//! ## Example
//!
//! ```rust,ignore
//! use smoker_pkg::{CatalogMatcher, HostProbe};
//!
//! let matcher = CatalogMatcher::new(entries, Arc::new(HostProbe))?;
//! let result = matcher.match_all(&["npm@9".into()], cwd, &workspaces).await;
//! for envelope in result.envelopes {
//!     println!("{}", envelope.spec);
//! }
//! ```

pub mod def;
pub mod error;
pub mod matcher;
pub mod probe;
pub mod spec;
pub mod version;
pub mod workspace;

pub use def::{
    ExecOptions, ExecOutput, Executor, InstallManifest, LifecycleStage, PkgManagerContext,
    PkgManagerDef, RunScriptManifest, RunScriptResult, ScriptFailure,
};
pub use error::{ExecError, MatcherError, PkgManagerError, ResolveError, VersionError};
pub use matcher::{
    CatalogEntry, CatalogMatcher, DEFAULT_SYSTEM_PKG_MANAGER, MatchResult, PkgManagerEnvelope,
    UnsupportedPkgManager,
};
pub use probe::{HostProbe, SystemProbe};
pub use spec::{DesiredPkgManager, ParseError, PkgManagerSpec};
pub use version::{KnownVersions, QueryKind, VersionAcceptor, VersionResolver};
pub use workspace::{WorkspaceError, WorkspaceFilter, WorkspaceInfo, discover_workspaces};

pub use semver::Version;
