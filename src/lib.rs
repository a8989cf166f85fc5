// ------------------------------------------------------------
// Module declarations
// ------------------------------------------------------------
//
// Each module represents a well-defined responsibility:
//
// - config:       Configuration resolved once from the environment
// - schema:       Upstream page and downstream payload definitions
// - util:         Shared helpers (proxy normalization, time)
// - error:        Fetch / forward error taxonomy
// - metrics:      Lock-free runtime counters
// - retry:        Bounded retry policy and failure budget
// - proxy:        Outbound proxy pool and random selection
// - fetcher:      One paginated fetch through a selected proxy
// - cursor_store: Bounded cache of continuation tokens
// - collector:    Page-collection strategy (sequential / sampled)
// - forwarder:    Occupancy filter and downstream POST
// - scheduler:    Fixed-interval cycle loop
// - status:       Read-only HTTP status endpoint
//
pub mod collector;
pub mod config;
pub mod cursor_store;
pub mod error;
pub mod fetcher;
pub mod forwarder;
pub mod metrics;
pub mod proxy;
pub mod retry;
pub mod scheduler;
pub mod schema;
pub mod status;
pub mod util;
