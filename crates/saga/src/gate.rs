//! Rendezvous between an external address correction and the blocked run.

use std::time::Duration;

use tokio::sync::watch;

use crate::error::SagaError;

/// Validates a proposed delivery address: non-empty and starting with a digit.
pub fn validate_address(candidate: &str) -> Result<(), SagaError> {
    match candidate.chars().next() {
        Some(first) if first.is_ascii_digit() => Ok(()),
        _ => Err(SagaError::InvalidAddress {
            address: candidate.to_string(),
        }),
    }
}

/// Holds the latest accepted address correction of a run.
///
/// Corrections are accepted at any time and overwrite each other; only the
/// value present when [`wait`](Self::wait) resolves is used.
#[derive(Debug)]
pub struct AddressUpdateGate {
    pending: watch::Sender<Option<String>>,
}

impl Default for AddressUpdateGate {
    fn default() -> Self {
        Self::new()
    }
}

impl AddressUpdateGate {
    pub fn new() -> Self {
        Self {
            pending: watch::Sender::new(None),
        }
    }

    /// Signal form: stores a valid address, logs and drops an invalid one.
    pub fn propose(&self, candidate: &str) {
        tracing::info!(address = candidate, "received update order signal");
        match validate_address(candidate) {
            Ok(()) => self.store(candidate),
            Err(err) => tracing::info!(error = %err, "dropping invalid address signal"),
        }
    }

    /// Update form: stores a valid address and acknowledges it, or rejects it
    /// without changing state.
    pub fn propose_and_acknowledge(&self, candidate: &str) -> Result<String, SagaError> {
        if let Err(err) = validate_address(candidate) {
            tracing::info!(address = candidate, "rejecting order update, invalid address");
            return Err(err);
        }
        tracing::info!(address = candidate, "order update address is valid");
        self.store(candidate);
        Ok(format!("Updated address: {candidate}"))
    }

    fn store(&self, address: &str) {
        self.pending.send_replace(Some(address.to_string()));
    }

    /// The latest accepted address, if any.
    pub fn pending(&self) -> Option<String> {
        self.pending.borrow().clone()
    }

    /// Waits until an address is pending or `timeout` elapses.
    ///
    /// Returns true if an address is available. Expiry is not an error.
    pub async fn wait(&self, timeout: Duration) -> bool {
        let mut rx = self.pending.subscribe();
        matches!(
            tokio::time::timeout(timeout, rx.wait_for(Option::is_some)).await,
            Ok(Ok(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_validate_address() {
        assert!(validate_address("123 Main St").is_ok());
        assert!(validate_address("9").is_ok());
        assert!(validate_address("Main St").is_err());
        assert!(validate_address("").is_err());
        assert!(validate_address(" 12 Main St").is_err());
    }

    #[test]
    fn test_rejected_update_leaves_state_unchanged() {
        let gate = AddressUpdateGate::new();
        let result = gate.propose_and_acknowledge("Main St");
        assert!(matches!(result, Err(SagaError::InvalidAddress { .. })));
        assert_eq!(gate.pending(), None);
    }

    #[test]
    fn test_accepted_update_is_acknowledged() {
        let gate = AddressUpdateGate::new();
        let ack = gate.propose_and_acknowledge("123 Main St").unwrap();
        assert_eq!(ack, "Updated address: 123 Main St");
        assert_eq!(gate.pending().as_deref(), Some("123 Main St"));
    }

    #[test]
    fn test_invalid_signal_is_dropped() {
        let gate = AddressUpdateGate::new();
        gate.propose("1 First Ave");
        gate.propose("Second Ave");
        assert_eq!(gate.pending().as_deref(), Some("1 First Ave"));
    }

    #[test]
    fn test_last_write_wins() {
        let gate = AddressUpdateGate::new();
        gate.propose("1 First Ave");
        gate.propose("2 Second Ave");
        assert_eq!(gate.pending().as_deref(), Some("2 Second Ave"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out_silently() {
        let gate = AddressUpdateGate::new();
        assert!(!gate.wait(Duration::from_secs(60)).await);
        assert_eq!(gate.pending(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_sees_value_stored_before_waiting() {
        let gate = AddressUpdateGate::new();
        gate.propose("77 Early St");
        assert!(gate.wait(Duration::from_secs(60)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_wakes_on_proposal() {
        let gate = Arc::new(AddressUpdateGate::new());
        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.wait(Duration::from_secs(60)).await })
        };
        tokio::task::yield_now().await;
        gate.propose_and_acknowledge("500 Late Rd").unwrap();

        assert!(waiter.await.unwrap());
        assert_eq!(gate.pending().as_deref(), Some("500 Late Rd"));
    }
}
