//! Core types for acceptance-test lifecycle management

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Attribute map shared by declarations, records and live resources
pub type Attributes = BTreeMap<String, String>;

/// A single resource as declared in a step's configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDecl {
    /// Resource kind (e.g. "aws_launch_configuration")
    pub kind: String,
    /// Logical name within the configuration (e.g. "bar")
    pub name: String,
    /// Declared attributes
    #[serde(default)]
    pub attributes: Attributes,
}

impl ResourceDecl {
    /// Create a declaration with no attributes
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            attributes: Attributes::new(),
        }
    }

    /// Add an attribute
    pub fn attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Address under which the resource is recorded: `<kind>.<name>`
    pub fn address(&self) -> String {
        format!("{}.{}", self.kind, self.name)
    }
}

/// Desired configuration of one test step
///
/// The harness never looks inside; only the applier interprets it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default, rename = "resource")]
    pub resources: Vec<ResourceDecl>,
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource declaration
    pub fn resource(mut self, decl: ResourceDecl) -> Self {
        self.resources.push(decl);
        self
    }
}

/// What the harness believes it created for one address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub kind: String,
    pub id: String,
    #[serde(default)]
    pub attributes: Attributes,
}

impl ResourceRecord {
    pub fn new(kind: impl Into<String>, id: impl Into<String>, attributes: Attributes) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
            attributes,
        }
    }
}

/// Bookkeeping of created resources, keyed by address
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedState {
    resources: BTreeMap<String, ResourceRecord>,
}

impl RecordedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a record by address
    pub fn get(&self, address: &str) -> Option<&ResourceRecord> {
        self.resources.get(address)
    }

    /// Insert or replace a record
    pub fn insert(&mut self, address: impl Into<String>, record: ResourceRecord) {
        self.resources.insert(address.into(), record);
    }

    /// Remove a record
    pub fn remove(&mut self, address: &str) -> Option<ResourceRecord> {
        self.resources.remove(address)
    }

    /// Iterate over (address, record) pairs in address order
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&String, &ResourceRecord)> {
        self.resources.iter()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// The provider's current view of a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveResource {
    pub id: String,
    #[serde(default)]
    pub attributes: Attributes,
}

impl LiveResource {
    pub fn new(id: impl Into<String>, attributes: Attributes) -> Self {
        Self {
            id: id.into(),
            attributes,
        }
    }
}

/// Retry policy for transient provider errors
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Base delay between retries
    pub base_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_factor: f64,
    /// Maximum delay between retries
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with custom settings.
    pub fn new(max_attempts: u32, base_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff_factor,
            ..Default::default()
        }
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.base_delay.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        // A negative factor gives negative delays on odd attempts; clamp to zero
        let capped = delay.min(self.max_delay.as_secs_f64()).max(0.0);
        Duration::try_from_secs_f64(capped).unwrap_or(self.max_delay)
    }

    /// Create a config that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }
}
