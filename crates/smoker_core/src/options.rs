//! Run options and configuration files.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use jsonc_parser::ParseOptions;
use jsonschema::Validator;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use smoker_pkg::WorkspaceFilter;
use smoker_rule::{PlannedRule, Rule, RuleSeverity};
use tracing::debug;

use crate::error::{ConfigError, SmokerError};

const SCHEMA_JSON: &str = include_str!("../../../schemas/v1/config.json");
static CONFIG_SCHEMA: OnceLock<Result<Validator, String>> = OnceLock::new();

/// Config file names, in lookup order.
pub const CONFIG_FILES: &[&str] = &[".smokerrc.jsonc", ".smokerrc.json", "smoker.config.json"];

/// Key holding configuration inside `package.json`.
pub const PACKAGE_JSON_KEY: &str = "smoker";

/// Options for one smoke run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SmokerOptions {
    /// Requested package managers; empty means guess.
    #[serde(deserialize_with = "string_or_list")]
    pub pkg_manager: Vec<String>,
    #[serde(deserialize_with = "string_or_list")]
    pub workspace: Vec<String>,
    pub all: bool,
    pub include_root: bool,
    /// Extra dependencies to install next to the packed workspaces.
    #[serde(deserialize_with = "string_or_list")]
    pub add: Vec<String>,
    #[serde(deserialize_with = "string_or_list")]
    pub script: Vec<String>,
    pub lint: bool,
    /// Skip scripts missing from a package instead of failing.
    pub loose: bool,
    /// Stop running scripts after the first failure.
    pub bail: bool,
    /// Keep temp directories after the run.
    pub linger: bool,
    pub verbose: bool,
    pub json: bool,
    pub rules: BTreeMap<String, RuleSetting>,
    #[serde(deserialize_with = "string_or_list")]
    pub reporter: Vec<String>,
    /// Seconds before the run is aborted.
    pub timeout: Option<u64>,
    #[serde(deserialize_with = "string_or_list")]
    pub plugin: Vec<String>,

    /// Project root. Not read from config files.
    #[serde(skip)]
    pub cwd: PathBuf,
}

impl Default for SmokerOptions {
    fn default() -> Self {
        Self {
            pkg_manager: Vec::new(),
            workspace: Vec::new(),
            all: false,
            include_root: false,
            add: Vec::new(),
            script: Vec::new(),
            lint: true,
            loose: false,
            bail: false,
            linger: false,
            verbose: false,
            json: false,
            rules: BTreeMap::new(),
            reporter: Vec::new(),
            timeout: None,
            plugin: Vec::new(),
            cwd: PathBuf::from("."),
        }
    }
}

fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(value) => vec![value],
        OneOrMany::Many(values) => values,
    })
}

/// Configuration for a single rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleSetting {
    /// `true` enables with the default severity, `false` disables.
    Enabled(bool),
    /// `"error"`, `"warn"` or `"off"`.
    Severity(RuleSeverity),
    /// `[severity, opts]`.
    Tuple(RuleSeverity, Value),
    /// `{ "severity": ..., "opts": {...} }`.
    Detailed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        severity: Option<RuleSeverity>,
        #[serde(default, skip_serializing_if = "Value::is_null")]
        opts: Value,
    },
}

impl RuleSetting {
    /// Effective severity and options, given the rule's default severity.
    pub fn resolve(&self, default: RuleSeverity) -> (RuleSeverity, Value) {
        match self {
            Self::Enabled(true) => (default, Value::Null),
            Self::Enabled(false) => (RuleSeverity::Off, Value::Null),
            Self::Severity(severity) => (*severity, Value::Null),
            Self::Tuple(severity, opts) => (*severity, opts.clone()),
            Self::Detailed { severity, opts } => (severity.unwrap_or(default), opts.clone()),
        }
    }
}

impl SmokerOptions {
    /// Creates default options rooted at `cwd`.
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            ..Self::default()
        }
    }

    /// Loads options from a config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut options = Self::from_jsonc(&content)?;
        if let Some(parent) = path.parent() {
            options.cwd = parent.to_path_buf();
        }
        Ok(options)
    }

    /// Parses options from JSON with comments, validating against the schema.
    pub fn from_jsonc(content: &str) -> Result<Self, ConfigError> {
        let value = jsonc_parser::parse_to_serde_value(content, &ParseOptions::default())
            .map_err(|e| ConfigError::Parse(e.to_string()))?
            .unwrap_or(Value::Object(serde_json::Map::new()));
        Self::from_value(value)
    }

    /// Validates and deserializes a parsed config value.
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        let schema = CONFIG_SCHEMA
            .get_or_init(|| {
                let schema_json: Value = serde_json::from_str(SCHEMA_JSON)
                    .map_err(|e| format!("invalid embedded schema: {e}"))?;
                Validator::new(&schema_json).map_err(|e| format!("invalid embedded schema: {e}"))
            })
            .as_ref()
            .map_err(|e| ConfigError::Validation(e.clone()))?;

        if let Err(e) = schema.validate(&value) {
            return Err(ConfigError::Validation(format!(
                "{} at {}",
                e,
                e.instance_path()
            )));
        }

        serde_json::from_value(value).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Finds and loads configuration for `cwd`.
    ///
    /// Returns defaults rooted at `cwd` when no configuration exists.
    pub fn discover(cwd: &Path) -> Result<(Self, Option<PathBuf>), ConfigError> {
        for name in CONFIG_FILES {
            let path = cwd.join(name);
            if path.is_file() {
                debug!("Using config {}", path.display());
                let mut options = Self::from_file(&path)?;
                options.cwd = cwd.to_path_buf();
                return Ok((options, Some(path)));
            }
        }

        let pkg_json_path = cwd.join("package.json");
        if let Ok(content) = fs::read_to_string(&pkg_json_path)
            && let Ok(pkg_json) = serde_json::from_str::<Value>(&content)
            && let Some(section) = pkg_json.get(PACKAGE_JSON_KEY)
        {
            debug!("Using \"{}\" key of {}", PACKAGE_JSON_KEY, pkg_json_path.display());
            let mut options = Self::from_value(section.clone())?;
            options.cwd = cwd.to_path_buf();
            return Ok((options, Some(pkg_json_path)));
        }

        Ok((Self::new(cwd), None))
    }

    pub fn workspace_filter(&self) -> WorkspaceFilter {
        WorkspaceFilter {
            all: self.all,
            include_root: self.include_root,
            workspaces: self.workspace.clone(),
        }
    }

    /// Reporter names to use; `json` swaps the default console reporter.
    pub fn reporter_names(&self) -> Vec<String> {
        if !self.reporter.is_empty() {
            return self.reporter.clone();
        }
        if self.json {
            vec!["json".to_string()]
        } else {
            vec!["console".to_string()]
        }
    }

    /// Builds the lint plan from the available rules.
    ///
    /// Every available rule is planned at its default severity unless
    /// configured otherwise. Settings naming unknown rules are rejected.
    pub fn rule_plan(&self, rules: &[Arc<dyn Rule>]) -> Result<Vec<PlannedRule>, SmokerError> {
        if let Some(unknown) = self
            .rules
            .keys()
            .find(|name| !rules.iter().any(|r| r.name() == name.as_str()))
        {
            return Err(SmokerError::UnknownRule(unknown.clone()));
        }

        Ok(rules
            .iter()
            .map(|rule| {
                let (severity, opts) = match self.rules.get(rule.name()) {
                    Some(setting) => setting.resolve(rule.default_severity()),
                    None => (rule.default_severity(), Value::Null),
                };
                PlannedRule::new(Arc::clone(rule), severity, opts)
            })
            .filter(|planned| planned.severity != RuleSeverity::Off)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;
    use smoker_rule::builtin_rules;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let options = SmokerOptions::default();
        assert!(options.lint);
        assert!(options.pkg_manager.is_empty());
        assert_eq!(options.reporter_names(), vec!["console"]);
    }

    #[test]
    fn test_from_jsonc_with_comments() {
        let options = SmokerOptions::from_jsonc(
            r#"{
                // test with two package managers
                "pkgManager": ["npm@9", "pnpm@8"],
                "script": "test",
                "all": true,
                "rules": { "no-banned-files": "warn" }
            }"#,
        )
        .unwrap();
        assert_eq!(options.pkg_manager, vec!["npm@9", "pnpm@8"]);
        assert_eq!(options.script, vec!["test"]);
        assert!(options.all);
        assert_eq!(
            options.rules.get("no-banned-files"),
            Some(&RuleSetting::Severity(RuleSeverity::Warn))
        );
    }

    #[rstest]
    #[case::bool_true(json!(true), RuleSeverity::Error, Value::Null)]
    #[case::bool_false(json!(false), RuleSeverity::Off, Value::Null)]
    #[case::severity(json!("warn"), RuleSeverity::Warn, Value::Null)]
    #[case::tuple(json!(["warn", { "allow": [".env"] }]), RuleSeverity::Warn, json!({ "allow": [".env"] }))]
    #[case::detailed(json!({ "opts": { "bin": false } }), RuleSeverity::Error, json!({ "bin": false }))]
    #[case::detailed_severity(json!({ "severity": "off" }), RuleSeverity::Off, Value::Null)]
    fn test_rule_setting_forms(
        #[case] raw: Value,
        #[case] severity: RuleSeverity,
        #[case] opts: Value,
    ) {
        let setting: RuleSetting = serde_json::from_value(raw).unwrap();
        assert_eq!(setting.resolve(RuleSeverity::Error), (severity, opts));
    }

    #[rstest]
    #[case::unknown_property(r#"{ "pkgManagers": [] }"#)]
    #[case::type_mismatch(r#"{ "lint": "yes" }"#)]
    #[case::invalid_severity(r#"{ "rules": { "no-banned-files": "fatal" } }"#)]
    #[case::bad_timeout(r#"{ "timeout": 0 }"#)]
    fn test_config_validation_errors(#[case] json: &str) {
        let err = SmokerOptions::from_jsonc(json).unwrap_err();
        assert!(
            err.to_string().contains("Config validation failed"),
            "Unexpected error: {}",
            err
        );
    }

    #[test]
    fn test_invalid_jsonc() {
        let err = SmokerOptions::from_jsonc("{ \"lint\": ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_discover_prefers_rc_file() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(".smokerrc.json"), r#"{ "bail": true }"#).unwrap();
        fs::write(
            temp.path().join("package.json"),
            r#"{ "name": "x", "smoker": { "loose": true } }"#,
        )
        .unwrap();

        let (options, path) = SmokerOptions::discover(temp.path()).unwrap();
        assert!(options.bail);
        assert!(!options.loose);
        assert_eq!(path, Some(temp.path().join(".smokerrc.json")));
        assert_eq!(options.cwd, temp.path());
    }

    #[test]
    fn test_discover_package_json_key() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("package.json"),
            r#"{ "name": "x", "smoker": { "script": ["test", "build"] } }"#,
        )
        .unwrap();

        let (options, path) = SmokerOptions::discover(temp.path()).unwrap();
        assert_eq!(options.script, vec!["test", "build"]);
        assert_eq!(path, Some(temp.path().join("package.json")));
    }

    #[test]
    fn test_discover_without_config() {
        let temp = TempDir::new().unwrap();
        let (options, path) = SmokerOptions::discover(temp.path()).unwrap();
        assert_eq!(path, None);
        assert_eq!(options, SmokerOptions::new(temp.path()));
    }

    #[test]
    fn test_rule_plan() {
        let mut options = SmokerOptions::default();
        options.rules.insert(
            "no-banned-files".to_string(),
            RuleSetting::Severity(RuleSeverity::Off),
        );
        options.rules.insert(
            "no-missing-exports".to_string(),
            RuleSetting::Severity(RuleSeverity::Warn),
        );

        let plan = options.rule_plan(&builtin_rules()).unwrap();
        let ids: Vec<(&str, RuleSeverity)> = plan.iter().map(|p| (p.id(), p.severity)).collect();
        assert_eq!(
            ids,
            vec![
                ("no-missing-pkg-files", RuleSeverity::Error),
                ("no-missing-entry-point", RuleSeverity::Error),
                ("no-missing-exports", RuleSeverity::Warn),
            ]
        );
    }

    #[test]
    fn test_rule_plan_rejects_unknown_rule() {
        let mut options = SmokerOptions::default();
        options
            .rules
            .insert("no-such-rule".to_string(), RuleSetting::Enabled(true));
        assert!(matches!(
            options.rule_plan(&builtin_rules()),
            Err(SmokerError::UnknownRule(name)) if name == "no-such-rule"
        ));
    }
}
