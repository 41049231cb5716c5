//! Live state access
//!
//! Every fetch goes to the provider; nothing is cached between calls, so
//! checks always see current remote state.

use crate::error::{FetchError, ProviderError, QueryError};
use crate::provider::ProviderContext;
use crate::retry::{LogCallback, RetryError, with_retry};
use crate::types::LiveResource;

/// Queries the provider for the current state of a resource by ID
#[derive(Debug, Clone, Copy)]
pub struct LiveStateAccessor<'a> {
    ctx: &'a ProviderContext,
}

impl<'a> LiveStateAccessor<'a> {
    pub fn new(ctx: &'a ProviderContext) -> Self {
        Self { ctx }
    }

    /// The shared context this accessor reads through
    pub fn context(&self) -> &'a ProviderContext {
        self.ctx
    }

    /// Fetch the live resource with the given ID
    ///
    /// Performs exactly one provider round trip. Returns `Ok(None)` when the
    /// provider answers successfully but no returned resource carries `id`.
    /// Transport failures and unregistered kinds come back as a
    /// [`ProviderError`] with code `<kind>.Unknown`.
    pub fn fetch(&self, kind: &str, id: &str) -> Result<Option<LiveResource>, FetchError> {
        if id.is_empty() {
            return Err(FetchError::EmptyId {
                kind: kind.to_string(),
            });
        }

        let Some(resource_kind) = self.ctx.registry.get(kind) else {
            return Err(ProviderError::unknown(kind, "resource kind is not registered").into());
        };

        match resource_kind.query(id) {
            Ok(found) => Ok(found.into_iter().find(|r| r.id == id)),
            Err(QueryError::Provider(e)) => Err(e.into()),
            Err(QueryError::Transport { message }) => {
                Err(ProviderError::unknown(kind, message).into())
            }
        }
    }

    /// Fetch with the context's retry policy
    ///
    /// Only transient-classified errors are retried. A not-found error is
    /// returned as-is so callers can treat it as absence.
    pub fn fetch_with_retry(
        &self,
        kind: &str,
        id: &str,
    ) -> Result<Option<LiveResource>, FetchError> {
        if id.is_empty() {
            return Err(FetchError::EmptyId {
                kind: kind.to_string(),
            });
        }

        let result = with_retry(
            &self.ctx.retry,
            |e| self.ctx.classify(kind, e),
            Some(&LogCallback),
            || match self.fetch(kind, id) {
                Ok(found) => Ok(Ok(found)),
                Err(FetchError::Provider(e)) => Err(e),
                Err(other) => Ok(Err(other)),
            },
        );

        match result {
            Ok(inner) => inner,
            Err(RetryError::Failed { error, .. }) => Err(FetchError::Provider(error)),
            Err(RetryError::Exhausted { error, attempts }) => {
                Err(FetchError::Exhausted { error, attempts })
            }
        }
    }
}
