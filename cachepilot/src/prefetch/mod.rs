//! Predictive prefetch.
//!
//! When the user lands on a route, the learned transitions out of that route
//! are ranked by frequency. For the top candidates that were observed often
//! enough, the data types of the destination route are fetched ahead of time
//! with cache-first semantics.
//!
//! ```text
//! record_navigation(from, to)
//!         │
//!         ▼
//! candidates(to) ──► top 3, frequency >= 2
//!         │
//!         ▼
//! ticket (route, data type, subject) ──► spawned prefetch ──► ticket released
//! ```
//!
//! Tickets keep a second trigger from duplicating work that is still running.
//! Low-priority data types are never prefetched.

mod predictive;
mod tickets;

pub use predictive::{
    PredictivePrefetcher, PrefetchBatch, PrefetchConfig, PrefetchSummary, PrefetchTaskResult,
    DEFAULT_MAX_CANDIDATES, DEFAULT_MIN_FREQUENCY,
};
pub use tickets::{PrefetchTicket, PrefetchTickets, TicketKey};
