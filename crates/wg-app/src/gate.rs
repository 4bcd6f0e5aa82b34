use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::AppError;

/// Single-permit gate around the GPU. A second generation is rejected, not
/// queued, while one is in flight.
#[derive(Debug, Clone)]
pub struct GenerationGate {
    permits: Arc<Semaphore>,
}

impl GenerationGate {
    pub fn new() -> Self {
        Self { permits: Arc::new(Semaphore::new(1)) }
    }

    /// The permit is held for the whole run and released when dropped.
    pub fn try_acquire(&self) -> Result<OwnedSemaphorePermit, AppError> {
        self.permits.clone().try_acquire_owned().map_err(|_| AppError::Busy)
    }

    #[cfg(test)]
    pub fn is_busy(&self) -> bool {
        self.permits.available_permits() == 0
    }
}

impl Default for GenerationGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_is_rejected() {
        let gate = GenerationGate::new();
        let permit = gate.try_acquire().unwrap();
        assert!(gate.is_busy());
        assert!(matches!(gate.clone().try_acquire(), Err(AppError::Busy)));

        drop(permit);
        assert!(!gate.is_busy());
        assert!(gate.try_acquire().is_ok());
    }
}
