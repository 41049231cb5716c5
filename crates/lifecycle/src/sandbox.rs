//! In-memory provider
//!
//! [`SandboxKind`] behaves like a remote resource API held in process
//! memory, with injectable faults (throttling, transport errors, leaked
//! deletes). It lets the harness run end to end without cloud credentials.

use crate::error::{ProviderError, QueryError};
use crate::provider::ResourceKind;
use crate::types::{LiveResource, ResourceDecl, ResourceRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Faults a sandbox kind injects into its own behavior
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Faults {
    /// The first N queries fail with a `Throttling` error
    pub throttle_queries: u32,
    /// The first N queries fail before the provider answers
    pub transport_failures: u32,
    /// Every query fails with this code
    pub fatal_query_code: Option<String>,
    /// Destroy reports success but leaves the resource in place
    pub leak_on_destroy: bool,
    /// Every apply fails
    pub fail_apply: bool,
    /// Queries for missing IDs return an empty list instead of an error
    pub empty_on_missing: bool,
}

/// An in-memory resource kind
#[derive(Debug)]
pub struct SandboxKind {
    kind: String,
    provider: Option<String>,
    id_attribute: Option<String>,
    required: Vec<String>,
    not_found_code: String,
    faults: Faults,
    throttles_left: AtomicU32,
    transport_left: AtomicU32,
    next_id: AtomicU64,
    resources: Mutex<BTreeMap<String, LiveResource>>,
}

impl SandboxKind {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            provider: None,
            id_attribute: None,
            required: Vec::new(),
            not_found_code: "NotFound".to_string(),
            faults: Faults::default(),
            throttles_left: AtomicU32::new(0),
            transport_left: AtomicU32::new(0),
            next_id: AtomicU64::new(1),
            resources: Mutex::new(BTreeMap::new()),
        }
    }

    /// Override the provider derived from the kind prefix
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Use this attribute's value as the resource ID instead of a generated one
    pub fn id_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.id_attribute = Some(attribute.into());
        self
    }

    /// Attributes that must be declared for apply to succeed
    pub fn required<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required = attributes.into_iter().map(Into::into).collect();
        self
    }

    /// Error code returned when a queried ID does not exist
    pub fn not_found_code(mut self, code: impl Into<String>) -> Self {
        self.not_found_code = code.into();
        self
    }

    pub fn faults(mut self, faults: Faults) -> Self {
        self.throttles_left = AtomicU32::new(faults.throttle_queries);
        self.transport_left = AtomicU32::new(faults.transport_failures);
        self.faults = faults;
        self
    }

    /// Number of resources currently held
    pub fn live_count(&self) -> usize {
        self.resources.lock().map(|r| r.len()).unwrap_or(0)
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, LiveResource>>, ProviderError> {
        self.resources
            .lock()
            .map_err(|_| ProviderError::new("InternalFailure", "sandbox state lock poisoned"))
    }

    fn resolve_id(&self, decl: &ResourceDecl, prior: Option<&ResourceRecord>) -> String {
        if let Some(record) = prior {
            return record.id.clone();
        }
        if let Some(value) = self
            .id_attribute
            .as_ref()
            .and_then(|attr| decl.attributes.get(attr))
        {
            return value.clone();
        }
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        format!("{}-{n:04}", self.kind)
    }
}

/// Decrement a fault counter, returning true while faults remain
fn take(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl ResourceKind for SandboxKind {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn provider(&self) -> &str {
        match &self.provider {
            Some(p) => p,
            None => self.kind.split('_').next().unwrap_or(&self.kind),
        }
    }

    fn apply(
        &self,
        decl: &ResourceDecl,
        prior: Option<&ResourceRecord>,
    ) -> Result<ResourceRecord, ProviderError> {
        if self.faults.fail_apply {
            return Err(ProviderError::new(
                "ValidationError",
                format!("{} rejected by sandbox", decl.address()),
            ));
        }

        if let Some(missing) = self
            .required
            .iter()
            .find(|attr| !decl.attributes.contains_key(attr.as_str()))
        {
            return Err(ProviderError::new(
                "ValidationError",
                format!("required attribute {missing:?} is not set"),
            ));
        }

        let id = self.resolve_id(decl, prior);
        let mut resources = self.lock()?;

        if prior.is_none() && resources.contains_key(&id) {
            return Err(ProviderError::new(
                "AlreadyExists",
                format!("{} {id} already exists", self.kind),
            ));
        }

        resources.insert(id.clone(), LiveResource::new(&id, decl.attributes.clone()));
        log::debug!("sandbox {}: applied {id}", self.kind);

        Ok(ResourceRecord::new(&self.kind, id, decl.attributes.clone()))
    }

    fn query(&self, id: &str) -> Result<Vec<LiveResource>, QueryError> {
        if take(&self.transport_left) {
            return Err(QueryError::Transport {
                message: "connection reset by peer".to_string(),
            });
        }
        if take(&self.throttles_left) {
            return Err(ProviderError::new("Throttling", "Rate exceeded").into());
        }
        if let Some(code) = &self.faults.fatal_query_code {
            return Err(ProviderError::new(code, "injected failure").into());
        }

        let resources = self.lock()?;
        match resources.get(id) {
            Some(resource) => Ok(vec![resource.clone()]),
            None if self.faults.empty_on_missing => Ok(Vec::new()),
            None => Err(ProviderError::new(
                &self.not_found_code,
                format!("{} {id} not found", self.kind),
            )
            .into()),
        }
    }

    fn destroy(&self, record: &ResourceRecord) -> Result<(), ProviderError> {
        if self.faults.leak_on_destroy {
            log::debug!("sandbox {}: leaking {}", self.kind, record.id);
            return Ok(());
        }

        let mut resources = self.lock()?;
        match resources.remove(&record.id) {
            Some(_) => Ok(()),
            None => Err(ProviderError::new(
                &self.not_found_code,
                format!("{} {} not found", self.kind, record.id),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn launch_configuration() -> SandboxKind {
        SandboxKind::new("aws_launch_configuration")
            .id_attribute("name")
            .required(["image_id", "instance_type"])
            .not_found_code("InvalidLaunchConfiguration.NotFound")
    }

    fn decl() -> ResourceDecl {
        ResourceDecl::new("aws_launch_configuration", "bar")
            .attr("name", "foobar-terraform-test")
            .attr("image_id", "ami-fb8e9292")
            .attr("instance_type", "t1.micro")
    }

    #[test]
    fn test_apply_uses_id_attribute() {
        let kind = launch_configuration();
        let record = kind.apply(&decl(), None).unwrap();
        assert_eq!(record.id, "foobar-terraform-test");
        assert_eq!(kind.live_count(), 1);
    }

    #[test]
    fn test_apply_generates_ids() {
        let kind = SandboxKind::new("aws_instance");
        let a = kind.apply(&ResourceDecl::new("aws_instance", "a"), None).unwrap();
        let b = kind.apply(&ResourceDecl::new("aws_instance", "b"), None).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_apply_requires_attributes() {
        let kind = launch_configuration();
        let mut bad = decl();
        bad.attributes.remove("image_id");

        let err = kind.apply(&bad, None).unwrap_err();
        assert_eq!(err.code, "ValidationError");
        assert!(err.message.contains("image_id"));
    }

    #[test]
    fn test_apply_duplicate_id_rejected() {
        let kind = launch_configuration();
        kind.apply(&decl(), None).unwrap();
        assert_eq!(kind.apply(&decl(), None).unwrap_err().code, "AlreadyExists");
    }

    #[test]
    fn test_update_keeps_id() {
        let kind = launch_configuration();
        let first = kind.apply(&decl(), None).unwrap();
        let changed = decl().attr("instance_type", "t2.micro");

        let second = kind.apply(&changed, Some(&first)).unwrap();
        assert_eq!(second.id, first.id);
        let live = kind.query(&first.id).unwrap();
        assert_eq!(live[0].attributes["instance_type"], "t2.micro");
    }

    #[test]
    fn test_destroy_then_query_not_found() {
        let kind = launch_configuration();
        let record = kind.apply(&decl(), None).unwrap();
        kind.destroy(&record).unwrap();

        match kind.query(&record.id) {
            Err(QueryError::Provider(e)) => {
                assert_eq!(e.code, "InvalidLaunchConfiguration.NotFound")
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_leak_on_destroy() {
        let kind = launch_configuration().faults(Faults {
            leak_on_destroy: true,
            ..Faults::default()
        });
        let record = kind.apply(&decl(), None).unwrap();
        kind.destroy(&record).unwrap();
        assert_eq!(kind.query(&record.id).unwrap().len(), 1);
    }

    #[test]
    fn test_fault_counters_run_out() {
        let kind = launch_configuration().faults(Faults {
            transport_failures: 1,
            throttle_queries: 1,
            empty_on_missing: true,
            ..Faults::default()
        });

        assert!(matches!(kind.query("x"), Err(QueryError::Transport { .. })));
        match kind.query("x") {
            Err(QueryError::Provider(e)) => assert_eq!(e.code, "Throttling"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(kind.query("x").unwrap(), Vec::new());
    }

    #[test]
    fn test_provider_override() {
        assert_eq!(launch_configuration().provider(), "aws");
        assert_eq!(SandboxKind::new("aws_x").with_provider("mock").provider(), "mock");
    }
}
