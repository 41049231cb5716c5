//! Suite files - TOML descriptions of sandbox kinds and lifecycle cases
//!
//! ```toml
//! [provider.aws]
//! not_found = ["*.NotFound"]
//! transient = ["Throttling"]
//!
//! [retry]
//! max_attempts = 3
//! base_delay_ms = 100
//!
//! [[kind]]
//! kind = "aws_launch_configuration"
//! id_attribute = "name"
//! required = ["image_id", "instance_type"]
//! not_found_code = "InvalidLaunchConfiguration.NotFound"
//!
//! [[case]]
//! name = "launch_configuration"
//! require_env = ["AWS_ACCESS_KEY_ID"]
//!
//! [[case.step]]
//! [[case.step.resource]]
//! kind = "aws_launch_configuration"
//! name = "bar"
//! attributes = { name = "foobar-terraform-test", image_id = "ami-fb8e9292" }
//!
//! [[case.step.check]]
//! type = "attr"
//! address = "aws_launch_configuration.bar"
//! key = "image_id"
//! value = "ami-fb8e9292"
//! ```

use anyhow::{Context, Result, bail};
use lifecycle::{
    Check, ClassifierTable, Classifiers, Configuration, Faults, KindRegistry, ProviderContext,
    ResourceDecl, ResourceKind, RetryConfig, SandboxKind, TestCase, TestStep, attr_equals,
    live_attr_equals, resource_exists,
};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use walkdir::WalkDir;

// ============================================================================
// Schema
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SuiteFile {
    /// Error classifier tables keyed by provider name
    #[serde(default)]
    pub provider: BTreeMap<String, ClassifierTable>,
    #[serde(default)]
    pub retry: RetrySpec,
    #[serde(default, rename = "kind")]
    pub kinds: Vec<KindSpec>,
    #[serde(default, rename = "case")]
    pub cases: Vec<CaseSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySpec {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub backoff_factor: f64,
    pub max_delay_ms: u64,
}

impl Default for RetrySpec {
    fn default() -> Self {
        let defaults = RetryConfig::default();
        Self {
            max_attempts: defaults.max_attempts,
            base_delay_ms: defaults.base_delay.as_millis() as u64,
            backoff_factor: defaults.backoff_factor,
            max_delay_ms: defaults.max_delay.as_millis() as u64,
        }
    }
}

impl RetrySpec {
    pub fn to_config(&self) -> Result<RetryConfig> {
        if !self.backoff_factor.is_finite() || self.backoff_factor < 0.0 {
            bail!(
                "retry.backoff_factor must be a non-negative number, got {}",
                self.backoff_factor
            );
        }
        Ok(RetryConfig {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_millis(self.base_delay_ms),
            backoff_factor: self.backoff_factor,
            max_delay: Duration::from_millis(self.max_delay_ms),
        })
    }
}

/// A sandbox resource kind
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KindSpec {
    pub kind: String,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub id_attribute: Option<String>,
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub not_found_code: Option<String>,
    #[serde(default)]
    pub faults: Faults,
}

impl KindSpec {
    fn build(&self) -> SandboxKind {
        let mut kind = SandboxKind::new(&self.kind)
            .required(self.required.iter().cloned())
            .faults(self.faults.clone());
        if let Some(provider) = &self.provider {
            kind = kind.with_provider(provider);
        }
        if let Some(attribute) = &self.id_attribute {
            kind = kind.id_attribute(attribute);
        }
        if let Some(code) = &self.not_found_code {
            kind = kind.not_found_code(code);
        }
        kind
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CaseSpec {
    pub name: String,
    /// Environment variables that must be set and non-empty before anything is created
    #[serde(default)]
    pub require_env: Vec<String>,
    #[serde(default, rename = "step")]
    pub steps: Vec<StepSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepSpec {
    #[serde(default)]
    pub allow_replacement: bool,
    #[serde(default, rename = "resource")]
    pub resources: Vec<ResourceDecl>,
    #[serde(default, rename = "check")]
    pub checks: Vec<CheckSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum CheckSpec {
    Exists {
        address: String,
    },
    Attr {
        address: String,
        key: String,
        value: String,
    },
    LiveAttr {
        address: String,
        key: String,
        value: String,
    },
}

impl CheckSpec {
    pub fn address(&self) -> &str {
        match self {
            Self::Exists { address }
            | Self::Attr { address, .. }
            | Self::LiveAttr { address, .. } => address,
        }
    }

    fn build(&self) -> Check {
        match self {
            Self::Exists { address } => resource_exists(address),
            Self::Attr {
                address,
                key,
                value,
            } => attr_equals(address, key, value),
            Self::LiveAttr {
                address,
                key,
                value,
            } => live_attr_equals(address, key, value),
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

/// A parsed suite file
#[derive(Debug)]
pub struct Suite {
    pub path: PathBuf,
    pub file: SuiteFile,
}

impl Suite {
    pub fn parse(path: impl Into<PathBuf>, content: &str) -> Result<Self> {
        let path = path.into();
        let file: SuiteFile = toml::from_str(content)
            .with_context(|| format!("Invalid suite file {}", path.display()))?;
        Ok(Self { path, file })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        Self::parse(path, &content)
    }

    /// Build a fresh provider context
    ///
    /// Every call creates new sandbox kinds with empty state. Providers
    /// without a table in the file fall back to the built-in one.
    pub fn context(&self) -> Result<ProviderContext> {
        let mut registry = KindRegistry::new();
        for spec in &self.file.kinds {
            registry
                .register(std::sync::Arc::new(spec.build()))
                .with_context(|| format!("In {}", self.path.display()))?;
        }

        let mut classifiers = Classifiers::new();
        for (provider, table) in &self.file.provider {
            classifiers
                .insert(provider, table)
                .with_context(|| format!("Invalid classifier table for provider {provider}"))?;
        }

        let providers: BTreeSet<String> = registry
            .kinds()
            .filter_map(|name| registry.get(name))
            .map(|kind| kind.provider().to_string())
            .collect();
        for provider in providers {
            if classifiers.contains(&provider) {
                continue;
            }
            match ClassifierTable::builtin(&provider) {
                Some(table) => classifiers.insert(&provider, &table)?,
                None => log::warn!(
                    "{}: no error classifier for provider {provider}, all its errors are fatal",
                    self.path.display()
                ),
            }
        }

        Ok(ProviderContext::new(
            registry,
            classifiers,
            self.file
                .retry
                .to_config()
                .with_context(|| format!("In {}", self.path.display()))?,
        ))
    }

    /// Test cases whose name contains `filter`
    pub fn cases(&self, filter: Option<&str>) -> Vec<TestCase> {
        self.file
            .cases
            .iter()
            .filter(|case| filter.is_none_or(|f| case.name.contains(f)))
            .map(build_case)
            .collect()
    }

    /// Check the suite is internally consistent without running anything
    pub fn validate(&self) -> Result<()> {
        let ctx = self.context()?;

        let mut names = BTreeSet::new();
        for case in &self.file.cases {
            if !names.insert(case.name.as_str()) {
                bail!("{}: case {} defined twice", self.path.display(), case.name);
            }

            for (i, step) in case.steps.iter().enumerate() {
                let mut declared = BTreeSet::new();
                for decl in &step.resources {
                    if !ctx.registry.contains(&decl.kind) {
                        bail!(
                            "{}: case {} step {}: unknown resource kind {}",
                            self.path.display(),
                            case.name,
                            i + 1,
                            decl.kind
                        );
                    }
                    if !declared.insert(decl.address()) {
                        bail!(
                            "{}: case {} step {}: {} declared more than once",
                            self.path.display(),
                            case.name,
                            i + 1,
                            decl.address()
                        );
                    }
                }

                for check in &step.checks {
                    if !declared.contains(check.address()) {
                        bail!(
                            "{}: case {} step {}: check refers to undeclared {}",
                            self.path.display(),
                            case.name,
                            i + 1,
                            check.address()
                        );
                    }
                }
            }
        }

        Ok(())
    }
}

fn build_case(spec: &CaseSpec) -> TestCase {
    let mut builder = TestCase::builder(&spec.name);

    if !spec.require_env.is_empty() {
        let vars = spec.require_env.clone();
        builder = builder.precheck(move || require_env(&vars));
    }

    for step in &spec.steps {
        let config = step
            .resources
            .iter()
            .cloned()
            .fold(Configuration::new(), Configuration::resource);
        let mut test_step = step
            .checks
            .iter()
            .fold(TestStep::new(config), |s, check| s.check(check.build()));
        if step.allow_replacement {
            test_step = test_step.allow_replacement();
        }
        builder = builder.step(test_step);
    }

    builder.build()
}

/// Every variable must be set and non-empty
fn require_env(vars: &[String]) -> Result<()> {
    for var in vars {
        match std::env::var(var) {
            Ok(value) if !value.is_empty() => {}
            _ => bail!("{var} must be set for acceptance tests"),
        }
    }
    Ok(())
}

/// Expand paths into suite files; directories are searched for `*.toml`
pub fn discover(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_file() {
            files.push(path.clone());
        } else if path.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(path)
                .follow_links(true)
                .into_iter()
                .filter_map(std::result::Result::ok)
                .filter(|e| e.file_type().is_file())
                .map(walkdir::DirEntry::into_path)
                .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
                .collect();
            found.sort();
            files.extend(found);
        } else {
            bail!("No such file or directory: {}", path.display());
        }
    }

    Ok(files)
}

/// Discover and parse every suite under `paths`
pub fn load_all(paths: &[PathBuf]) -> Result<Vec<Suite>> {
    let files = discover(paths)?;
    if files.is_empty() {
        bail!("No suite files found");
    }
    files.iter().map(|path| Suite::load(path)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lifecycle::{Harness, Outcome};
    use std::sync::Arc;
    use tempfile::TempDir;

    const LAUNCH_CONFIGURATION: &str = r#"
[retry]
max_attempts = 3
base_delay_ms = 1
max_delay_ms = 5

[[kind]]
kind = "aws_launch_configuration"
id_attribute = "name"
required = ["image_id", "instance_type"]
not_found_code = "InvalidLaunchConfiguration.NotFound"

[[case]]
name = "launch_configuration"

[[case.step]]
[[case.step.resource]]
kind = "aws_launch_configuration"
name = "bar"
attributes = { name = "foobar-terraform-test", image_id = "ami-fb8e9292", instance_type = "t1.micro" }

[[case.step.check]]
type = "exists"
address = "aws_launch_configuration.bar"

[[case.step.check]]
type = "attr"
address = "aws_launch_configuration.bar"
key = "image_id"
value = "ami-fb8e9292"

[[case.step.check]]
type = "live_attr"
address = "aws_launch_configuration.bar"
key = "instance_type"
value = "t1.micro"
"#;

    #[test]
    fn test_parse_suite() {
        let suite = Suite::parse("lc.toml", LAUNCH_CONFIGURATION).unwrap();
        assert_eq!(suite.file.kinds.len(), 1);
        assert_eq!(suite.file.cases.len(), 1);
        assert_eq!(suite.file.retry.max_attempts, 3);

        let step = &suite.file.cases[0].steps[0];
        assert_eq!(step.resources[0].address(), "aws_launch_configuration.bar");
        assert_eq!(
            step.checks[1],
            CheckSpec::Attr {
                address: "aws_launch_configuration.bar".to_string(),
                key: "image_id".to_string(),
                value: "ami-fb8e9292".to_string(),
            }
        );
        suite.validate().unwrap();
    }

    #[test]
    fn test_builtin_classifier_fallback() {
        let suite = Suite::parse("lc.toml", LAUNCH_CONFIGURATION).unwrap();
        let ctx = suite.context().unwrap();
        assert!(ctx.classifiers.contains("aws"));
    }

    #[test]
    fn test_suite_runs_end_to_end() {
        let suite = Suite::parse("lc.toml", LAUNCH_CONFIGURATION).unwrap();
        let harness = Harness::new(Arc::new(suite.context().unwrap()));

        let reports = harness.run_all(&suite.cases(None), 1).unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].outcome, Outcome::Passed);
    }

    #[test]
    fn test_leak_fault_from_suite() {
        let content = LAUNCH_CONFIGURATION.replace(
            "not_found_code = \"InvalidLaunchConfiguration.NotFound\"",
            concat!(
                "not_found_code = \"InvalidLaunchConfiguration.NotFound\"\n",
                "faults = { leak_on_destroy = true }",
            ),
        );
        let suite = Suite::parse("leak.toml", &content).unwrap();
        let harness = Harness::new(Arc::new(suite.context().unwrap()));

        let report = harness.run(&suite.cases(None)[0]);
        assert_eq!(report.outcome.label(), "destroy verification failed");
    }

    #[test]
    fn test_require_env_precheck() {
        let content = LAUNCH_CONFIGURATION.replace(
            "name = \"launch_configuration\"",
            "name = \"launch_configuration\"\nrequire_env = [\"ACCTEST_SURELY_UNSET_VARIABLE\"]",
        );
        let suite = Suite::parse("env.toml", &content).unwrap();
        let harness = Harness::new(Arc::new(suite.context().unwrap()));

        let report = harness.run(&suite.cases(None)[0]);
        match report.outcome {
            Outcome::PreconditionFailed { reason } => {
                assert!(reason.contains("ACCTEST_SURELY_UNSET_VARIABLE"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_filter_cases() {
        let suite = Suite::parse("lc.toml", LAUNCH_CONFIGURATION).unwrap();
        assert_eq!(suite.cases(Some("launch")).len(), 1);
        assert!(suite.cases(Some("vpc")).is_empty());
    }

    #[test]
    fn test_validate_rejects_unknown_kind() {
        let content = LAUNCH_CONFIGURATION.replace(
            "kind = \"aws_launch_configuration\"\nname = \"bar\"",
            "kind = \"aws_autoscaling_group\"\nname = \"bar\"",
        );
        let suite = Suite::parse("bad.toml", &content).unwrap();
        let err = suite.validate().unwrap_err();
        assert!(err.to_string().contains("unknown resource kind"));
    }

    #[test]
    fn test_validate_rejects_undeclared_check_address() {
        let content = LAUNCH_CONFIGURATION.replace(
            "type = \"exists\"\naddress = \"aws_launch_configuration.bar\"",
            "type = \"exists\"\naddress = \"aws_launch_configuration.baz\"",
        );
        let suite = Suite::parse("bad.toml", &content).unwrap();
        let err = suite.validate().unwrap_err();
        assert!(err.to_string().contains("undeclared"));
    }

    #[test]
    fn test_negative_backoff_rejected() {
        let content = LAUNCH_CONFIGURATION
            .replace("max_delay_ms = 5", "max_delay_ms = 5\nbackoff_factor = -2.0");
        let suite = Suite::parse("backoff.toml", &content).unwrap();
        assert!(suite.file.retry.backoff_factor < 0.0);

        let err = suite.validate().unwrap_err();
        assert!(format!("{err:#}").contains("backoff_factor"));
        assert!(suite.context().is_err());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let content = "[[case]]\nname = \"x\"\ncolour = \"red\"\n";
        let err = Suite::parse("bad.toml", content).unwrap_err();
        assert!(format!("{err:#}").contains("colour"));
    }

    #[test]
    fn test_demo_suites() {
        let demos = Path::new(env!("CARGO_MANIFEST_DIR")).join("demos");
        let suites = load_all(&[demos]).unwrap();
        assert_eq!(suites.len(), 2);

        for suite in &suites {
            suite.validate().unwrap();
            let harness = Harness::new(Arc::new(suite.context().unwrap()));
            let leaky = suite.path.ends_with("leaked_resource.toml");

            for report in harness.run_all(&suite.cases(None), 4).unwrap() {
                assert_eq!(report.is_success(), !leaky, "{}: {}", report.case, report.outcome);
            }
        }
    }

    #[test]
    fn test_discover_walks_directories() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("aws");
        fs::create_dir_all(&nested).unwrap();
        fs::write(dir.path().join("a.toml"), LAUNCH_CONFIGURATION).unwrap();
        fs::write(nested.join("b.toml"), LAUNCH_CONFIGURATION).unwrap();
        fs::write(dir.path().join("notes.md"), "ignored").unwrap();

        let files = discover(&[dir.path().to_path_buf()]).unwrap();
        assert_eq!(files.len(), 2);

        let suites = load_all(&[dir.path().to_path_buf()]).unwrap();
        assert_eq!(suites.len(), 2);
    }

    #[test]
    fn test_discover_missing_path() {
        let dir = TempDir::new().unwrap();
        assert!(discover(&[dir.path().join("missing.toml")]).is_err());
    }

    #[test]
    fn test_load_all_empty_directory() {
        let dir = TempDir::new().unwrap();
        assert!(load_all(&[dir.path().to_path_buf()]).is_err());
    }
}
