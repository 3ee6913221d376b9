//! In-flight prefetch tickets.

use std::fmt;
use std::sync::Arc;

use dashmap::DashSet;

/// Composite key of a prefetch: route, data type and subject.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TicketKey {
    /// Route the prefetch was predicted for.
    pub route: String,
    /// Data type being prefetched.
    pub data_type: String,
    /// Subject the data belongs to.
    pub subject_id: String,
}

impl TicketKey {
    /// Create a ticket key.
    pub fn new(
        route: impl Into<String>,
        data_type: impl Into<String>,
        subject_id: impl Into<String>,
    ) -> Self {
        Self {
            route: route.into(),
            data_type: data_type.into(),
            subject_id: subject_id.into(),
        }
    }
}

impl fmt::Display for TicketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.route, self.data_type, self.subject_id)
    }
}

/// Set of outstanding prefetches.
///
/// At most one ticket exists per [`TicketKey`]. A ticket is released when
/// its [`PrefetchTicket`] guard is dropped, whether the prefetch succeeded,
/// failed or was aborted.
#[derive(Debug, Clone, Default)]
pub struct PrefetchTickets {
    outstanding: Arc<DashSet<TicketKey>>,
}

impl PrefetchTickets {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the ticket for `key`, or `None` if it is already taken.
    pub fn try_acquire(&self, key: TicketKey) -> Option<PrefetchTicket> {
        if self.outstanding.insert(key.clone()) {
            Some(PrefetchTicket {
                key,
                outstanding: Arc::clone(&self.outstanding),
            })
        } else {
            None
        }
    }

    /// Whether a ticket for `key` is outstanding.
    pub fn contains(&self, key: &TicketKey) -> bool {
        self.outstanding.contains(key)
    }

    /// Number of outstanding tickets.
    pub fn len(&self) -> usize {
        self.outstanding.len()
    }

    /// Whether no ticket is outstanding.
    pub fn is_empty(&self) -> bool {
        self.outstanding.is_empty()
    }
}

/// An outstanding prefetch. Released on drop.
#[derive(Debug)]
pub struct PrefetchTicket {
    key: TicketKey,
    outstanding: Arc<DashSet<TicketKey>>,
}

impl PrefetchTicket {
    /// The ticket's key.
    pub fn key(&self) -> &TicketKey {
        &self.key
    }
}

impl Drop for PrefetchTicket {
    fn drop(&mut self) {
        self.outstanding.remove(&self.key);
    }
}
