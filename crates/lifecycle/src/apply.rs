//! Apply component - turns a configuration into recorded state

use crate::error::{ApplyError, DestroyError, DestroyItemError};
use crate::provider::ProviderContext;
use crate::types::{Configuration, RecordedState};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Brings configurations into existence and tears them down
pub trait Applier: Send + Sync {
    /// Converge to `config`, starting from the state of the previous step
    ///
    /// On failure the error carries whatever was created, so the caller
    /// can tear it down.
    fn apply(
        &self,
        config: &Configuration,
        prior: &RecordedState,
    ) -> Result<RecordedState, ApplyError>;

    /// Destroy everything in `state`
    fn destroy_all(&self, state: &RecordedState) -> Result<(), DestroyError>;
}

/// Applier dispatching each declaration to its registered resource kind
#[derive(Debug, Clone)]
pub struct RegistryApplier {
    ctx: Arc<ProviderContext>,
}

impl RegistryApplier {
    pub fn new(ctx: Arc<ProviderContext>) -> Self {
        Self { ctx }
    }
}

impl Applier for RegistryApplier {
    fn apply(
        &self,
        config: &Configuration,
        prior: &RecordedState,
    ) -> Result<RecordedState, ApplyError> {
        let mut state = RecordedState::new();
        let mut declared = BTreeSet::new();

        for decl in &config.resources {
            let address = decl.address();
            if !declared.insert(address.clone()) {
                return Err(ApplyError::new("declared more than once")
                    .at(address)
                    .with_partial(state));
            }

            let Some(kind) = self.ctx.registry.get(&decl.kind) else {
                return Err(ApplyError::new(format!("unknown resource kind {}", decl.kind))
                    .at(address)
                    .with_partial(state));
            };

            let previous = prior.get(&address);
            match kind.apply(decl, previous) {
                Ok(record) => {
                    log::debug!("applied {address} (id {})", record.id);
                    state.insert(address, record);
                }
                Err(e) => {
                    return Err(ApplyError::new(e.to_string())
                        .at(address)
                        .with_partial(state));
                }
            }
        }

        // Resources dropped from the configuration are removed
        let mut orphans = RecordedState::new();
        for (address, record) in prior.iter() {
            if !declared.contains(address) {
                orphans.insert(address.clone(), record.clone());
            }
        }
        if !orphans.is_empty() {
            self.destroy_all(&orphans)
                .map_err(|e| ApplyError::new(e.to_string()).with_partial(state.clone()))?;
        }

        Ok(state)
    }

    fn destroy_all(&self, state: &RecordedState) -> Result<(), DestroyError> {
        let mut failures = Vec::new();

        for (address, record) in state.iter().rev() {
            let Some(kind) = self.ctx.registry.get(&record.kind) else {
                failures.push(DestroyItemError {
                    address: address.clone(),
                    message: format!("unknown resource kind {}", record.kind),
                });
                continue;
            };

            match kind.destroy(record) {
                Ok(()) => log::debug!("destroyed {address} (id {})", record.id),
                Err(e) if self.ctx.classify(&record.kind, &e).is_absence() => {
                    log::debug!("{address} already gone ({})", e.code);
                }
                Err(e) => failures.push(DestroyItemError {
                    address: address.clone(),
                    message: e.to_string(),
                }),
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(DestroyError { failures })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{ClassifierTable, Classifiers};
    use crate::provider::KindRegistry;
    use crate::sandbox::{Faults, SandboxKind};
    use crate::types::{ResourceDecl, RetryConfig};

    fn applier(faults: Faults) -> (RegistryApplier, Arc<SandboxKind>) {
        let kind = Arc::new(
            SandboxKind::new("aws_launch_configuration")
                .id_attribute("name")
                .required(["image_id"])
                .not_found_code("InvalidLaunchConfiguration.NotFound")
                .faults(faults),
        );
        let mut registry = KindRegistry::new();
        registry.register(kind.clone()).unwrap();
        let ctx = ProviderContext::new(
            registry,
            Classifiers::new()
                .with("aws", &ClassifierTable::aws())
                .unwrap(),
            RetryConfig::no_retry(),
        );
        (RegistryApplier::new(Arc::new(ctx)), kind)
    }

    fn lc(name: &str, id: &str) -> ResourceDecl {
        ResourceDecl::new("aws_launch_configuration", name)
            .attr("name", id)
            .attr("image_id", "ami-fb8e9292")
    }

    #[test]
    fn test_apply_records_every_declaration() {
        let (applier, kind) = applier(Faults::default());
        let config = Configuration::new().resource(lc("a", "lc-a")).resource(lc("b", "lc-b"));

        let state = applier.apply(&config, &RecordedState::new()).unwrap();
        assert_eq!(state.len(), 2);
        assert_eq!(state.get("aws_launch_configuration.a").unwrap().id, "lc-a");
        assert_eq!(kind.live_count(), 2);
    }

    #[test]
    fn test_apply_failure_carries_partial_state() {
        let (applier, _kind) = applier(Faults::default());
        let mut broken = lc("b", "lc-b");
        broken.attributes.remove("image_id");
        let config = Configuration::new().resource(lc("a", "lc-a")).resource(broken);

        let err = applier.apply(&config, &RecordedState::new()).unwrap_err();
        assert_eq!(err.address.as_deref(), Some("aws_launch_configuration.b"));
        assert!(err.partial.get("aws_launch_configuration.a").is_some());
    }

    #[test]
    fn test_apply_unknown_kind() {
        let (applier, _kind) = applier(Faults::default());
        let config = Configuration::new().resource(ResourceDecl::new("aws_vpc", "main"));

        let err = applier.apply(&config, &RecordedState::new()).unwrap_err();
        assert!(err.message.contains("unknown resource kind"));
    }

    #[test]
    fn test_duplicate_declaration_rejected() {
        let (applier, _kind) = applier(Faults::default());
        let config = Configuration::new().resource(lc("a", "lc-a")).resource(lc("a", "lc-b"));

        let err = applier.apply(&config, &RecordedState::new()).unwrap_err();
        assert!(err.message.contains("more than once"));
        assert_eq!(err.partial.len(), 1);
    }

    #[test]
    fn test_reapply_removes_dropped_resources() {
        let (applier, kind) = applier(Faults::default());
        let first = Configuration::new().resource(lc("a", "lc-a")).resource(lc("b", "lc-b"));
        let prior = applier.apply(&first, &RecordedState::new()).unwrap();

        let second = Configuration::new().resource(lc("a", "lc-a"));
        let state = applier.apply(&second, &prior).unwrap();

        assert_eq!(state.len(), 1);
        assert_eq!(kind.live_count(), 1);
    }

    #[test]
    fn test_destroy_all_tolerates_missing() {
        let (applier, kind) = applier(Faults::default());
        let config = Configuration::new().resource(lc("a", "lc-a"));
        let state = applier.apply(&config, &RecordedState::new()).unwrap();

        applier.destroy_all(&state).unwrap();
        assert_eq!(kind.live_count(), 0);
        // Second teardown hits NotFound, which counts as already destroyed
        applier.destroy_all(&state).unwrap();
    }

    #[test]
    fn test_destroy_all_collects_failures() {
        let (applier, _kind) = applier(Faults::default());
        let mut state = RecordedState::new();
        state.insert(
            "aws_vpc.main",
            crate::types::ResourceRecord::new("aws_vpc", "vpc-1", Default::default()),
        );

        let err = applier.destroy_all(&state).unwrap_err();
        assert_eq!(err.failures.len(), 1);
        assert_eq!(err.failures[0].address, "aws_vpc.main");
    }
}
