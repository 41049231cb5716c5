//! Post-teardown verification
//!
//! After destroy, every recorded resource of a registered kind must be
//! confirmed absent. Absence is either a successful query with no match or
//! a not-found classified error; a fatal error is never taken as absence.

use crate::accessor::LiveStateAccessor;
use crate::error::{DestroyFailure, FetchError};
use crate::provider::ProviderContext;
use crate::types::RecordedState;

/// Confirms recorded resources no longer exist
#[derive(Debug, Clone, Copy)]
pub struct DestroyVerifier<'a> {
    ctx: &'a ProviderContext,
}

impl<'a> DestroyVerifier<'a> {
    pub fn new(ctx: &'a ProviderContext) -> Self {
        Self { ctx }
    }

    /// Verify every registered-kind record in `state` is gone
    ///
    /// Stops at the first record that cannot be confirmed absent.
    pub fn verify_destroyed(&self, state: &RecordedState) -> Result<(), DestroyFailure> {
        let live = LiveStateAccessor::new(self.ctx);

        for (address, record) in state.iter() {
            if !self.ctx.registry.contains(&record.kind) {
                log::debug!(
                    "skipping destroy check for {address}: kind {} not managed",
                    record.kind
                );
                continue;
            }

            if record.id.is_empty() {
                return Err(DestroyFailure::MissingId {
                    address: address.clone(),
                });
            }

            match live.fetch_with_retry(&record.kind, &record.id) {
                Ok(Some(resource)) if resource.id == record.id => {
                    return Err(DestroyFailure::LifecycleViolation {
                        address: address.clone(),
                        kind: record.kind.clone(),
                        id: record.id.clone(),
                    });
                }
                Ok(_) => log::debug!("{address} confirmed absent (empty result)"),
                Err(FetchError::Provider(error)) => {
                    // Retries already ran inside fetch_with_retry
                    if !self.ctx.classify(&record.kind, &error).is_absence() {
                        return Err(DestroyFailure::ClassificationAmbiguous {
                            address: address.clone(),
                            id: record.id.clone(),
                            error,
                        });
                    }
                    log::debug!("{address} confirmed absent ({})", error.code);
                }
                Err(FetchError::Exhausted { error, attempts }) => {
                    return Err(DestroyFailure::RetriesExhausted {
                        address: address.clone(),
                        id: record.id.clone(),
                        attempts,
                        error,
                    });
                }
                Err(FetchError::EmptyId { .. }) => {
                    return Err(DestroyFailure::MissingId {
                        address: address.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}
