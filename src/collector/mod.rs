/// Collector module
///
/// This module groups all logic responsible for:
/// - Choosing how a cycle walks the listing (sequential or sampled)
/// - Driving page fetches within a page budget
/// - Feeding continuation tokens into the cursor store
///
/// The collector layer acts as the orchestration layer between:
/// - The page source (HTTP fetcher behind the proxy pool)
/// - The scheduler, which filters and forwards what was collected
///
/// Design notes:
/// - Upstream wire details MUST NOT live here
/// - Failures are absorbed per fetch and never leave this module
pub mod runner;

pub use runner::{CollectMode, CollectOutcome, CollectSettings, Collector};
