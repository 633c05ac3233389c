//! Remote metadata provider interface.
//!
//! Providers are lookup backends (web databases and the like) consulted
//! after all local sources. They return candidate field values only; the
//! merge engine decides what sticks. A provider failure is that
//! provider's problem, never the pipeline's: implementations report
//! [`ProviderResponse::NoUpdate`] instead of surfacing errors.

use async_trait::async_trait;

use crate::merge::FieldUpdates;
use crate::model::Movie;

/// Outcome of one provider lookup.
#[derive(Debug, Clone)]
pub enum ProviderResponse {
    /// Candidate values to feed through the merge engine.
    Updates(FieldUpdates),
    /// Nothing found, lookup failed, or the provider is disabled.
    NoUpdate,
}

/// Async interface every remote metadata provider implements.
#[async_trait]
pub trait RemoteMetadataProvider: Send + Sync {
    /// Short lowercase identifier, also used as the merge source name.
    fn name(&self) -> &'static str;

    /// Host the provider talks to, for per-host throttling.
    fn host(&self) -> &str;

    /// False disables the provider for the whole run.
    fn is_available(&self) -> bool {
        true
    }

    /// Look the movie up and propose field values.
    ///
    /// Implementations log their own failures and return `NoUpdate`;
    /// errors never cross this boundary.
    async fn enrich(&self, movie: &Movie) -> ProviderResponse;
}
