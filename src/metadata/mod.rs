//! Remote metadata providers and the enrichment pipeline that drives
//! every source.

pub mod enrichment;
pub mod provider;
pub mod registry;

pub use enrichment::{probe_updates, EnrichmentPipeline};
pub use provider::{ProviderResponse, RemoteMetadataProvider};
pub use registry::ProviderRegistry;
