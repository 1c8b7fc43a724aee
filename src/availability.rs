//! Search API availability flag and the health check that drives it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{info, warn};

use crate::booru::danbooru::DanbooruEndpoint;
use crate::booru::SearchTransport;

/// Shared "API is known down" flag. Clones observe the same state.
///
/// Core components only read it; tripping and clearing belong to
/// [`AvailabilityProbe`] and the host.
#[derive(Debug, Clone, Default)]
pub struct AvailabilityGate {
    unavailable: Arc<AtomicBool>,
}

impl AvailabilityGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_unavailable(&self) -> bool {
        self.unavailable.load(Ordering::SeqCst)
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        let previous = self.unavailable.swap(unavailable, Ordering::SeqCst);
        if previous != unavailable {
            if unavailable {
                warn!("Search API marked unavailable; external calls are suspended");
            } else {
                info!("Search API marked available again");
            }
        }
    }
}

/// One-shot health check that trips or clears the gate.
pub struct AvailabilityProbe {
    endpoint: DanbooruEndpoint,
    transport: Arc<dyn SearchTransport>,
}

impl AvailabilityProbe {
    pub fn new(endpoint: DanbooruEndpoint, transport: Arc<dyn SearchTransport>) -> Self {
        Self {
            endpoint,
            transport,
        }
    }

    /// Issues one minimal request. Connection failures and 5xx replies mark
    /// the API unavailable; any other reply clears the flag. Returns whether
    /// the API is considered available afterwards.
    pub fn check(&self, gate: &AvailabilityGate) -> bool {
        let available = match self.transport.get(&self.endpoint.health_url()) {
            Ok(reply) if reply.status >= 500 => {
                warn!("Search API health check returned status {}", reply.status);
                false
            }
            Ok(_) => true,
            Err(error) => {
                warn!("Search API health check failed: {}", error);
                false
            }
        };
        gate.set_unavailable(!available);
        available
    }
}
