//! Resource kind capability, kind registry and shared provider context
//!
//! These traits keep the harness independent of any concrete cloud
//! client: every kind under test implements [`ResourceKind`] and is looked
//! up by its kind string.

use crate::classify::Classifiers;
use crate::error::{Error, ErrorClass, ProviderError, QueryError, Result};
use crate::types::{LiveResource, ResourceDecl, ResourceRecord, RetryConfig};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A kind of provisionable resource
///
/// # Example
///
/// ```ignore
/// use lifecycle::{
///     LiveResource, ProviderError, QueryError, ResourceDecl, ResourceKind, ResourceRecord,
/// };
///
/// #[derive(Debug)]
/// struct LaunchConfigurations { client: AutoscalingClient }
///
/// impl ResourceKind for LaunchConfigurations {
///     fn kind(&self) -> &str {
///         "aws_launch_configuration"
///     }
///
///     fn apply(
///         &self,
///         decl: &ResourceDecl,
///         _prior: Option<&ResourceRecord>,
///     ) -> Result<ResourceRecord, ProviderError> {
///         let name = self.client.create(&decl.attributes)?;
///         Ok(ResourceRecord::new(self.kind(), name, decl.attributes.clone()))
///     }
///
///     fn query(&self, id: &str) -> Result<Vec<LiveResource>, QueryError> {
///         self.client.describe(&[id])
///     }
///
///     fn destroy(&self, record: &ResourceRecord) -> Result<(), ProviderError> {
///         self.client.delete(&record.id)
///     }
/// }
/// ```
pub trait ResourceKind: Send + Sync + fmt::Debug {
    /// Kind string (e.g. "aws_launch_configuration")
    fn kind(&self) -> &str;

    /// Provider owning this kind, used to pick the error classifier
    ///
    /// Defaults to the kind prefix before the first `_`.
    fn provider(&self) -> &str {
        let kind = self.kind();
        kind.split('_').next().unwrap_or(kind)
    }

    /// Create the declared resource, or update `prior` in place
    fn apply(
        &self,
        decl: &ResourceDecl,
        prior: Option<&ResourceRecord>,
    ) -> std::result::Result<ResourceRecord, ProviderError>;

    /// Describe resources matching `id`
    ///
    /// Exactly one provider round trip. An empty list means no match.
    fn query(&self, id: &str) -> std::result::Result<Vec<LiveResource>, QueryError>;

    /// Destroy a recorded resource
    fn destroy(&self, record: &ResourceRecord) -> std::result::Result<(), ProviderError>;
}

/// A shared resource kind
pub type SharedKind = Arc<dyn ResourceKind>;

/// Resource kinds keyed by kind string
#[derive(Debug, Clone, Default)]
pub struct KindRegistry {
    kinds: BTreeMap<String, SharedKind>,
}

impl KindRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a kind; registering the same kind string twice is an error
    pub fn register(&mut self, kind: SharedKind) -> Result<()> {
        let name = kind.kind().to_string();
        if self.kinds.contains_key(&name) {
            return Err(Error::DuplicateKind(name));
        }
        self.kinds.insert(name, kind);
        Ok(())
    }

    /// Builder-style variant of [`KindRegistry::register`]
    pub fn with(mut self, kind: impl ResourceKind + 'static) -> Result<Self> {
        self.register(Arc::new(kind))?;
        Ok(self)
    }

    pub fn get(&self, kind: &str) -> Option<&SharedKind> {
        self.kinds.get(kind)
    }

    /// Look up a kind, failing if it is not registered
    pub fn require(&self, kind: &str) -> Result<&SharedKind> {
        self.get(kind)
            .ok_or_else(|| Error::UnknownKind(kind.to_string()))
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.kinds.contains_key(kind)
    }

    /// Registered kind strings in order
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.kinds.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

/// Read-only configuration shared by every test case
///
/// Built once per process and passed around behind an `Arc`; nothing
/// mutates it after construction.
#[derive(Debug, Clone, Default)]
pub struct ProviderContext {
    pub registry: KindRegistry,
    pub classifiers: Classifiers,
    pub retry: RetryConfig,
}

impl ProviderContext {
    pub fn new(registry: KindRegistry, classifiers: Classifiers, retry: RetryConfig) -> Self {
        Self {
            registry,
            classifiers,
            retry,
        }
    }

    /// Classify an error raised by a kind
    ///
    /// Unregistered kinds have no provider and are classified as fatal.
    pub fn classify(&self, kind: &str, error: &ProviderError) -> ErrorClass {
        match self.registry.get(kind) {
            Some(k) => self.classifiers.classify(k.provider(), error),
            None => ErrorClass::Fatal,
        }
    }
}
