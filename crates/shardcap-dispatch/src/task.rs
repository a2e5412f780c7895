use shardcap_core::{ErrorRecord, OutputRecord, WorkItem};

use crate::endpoint::Endpoint;

/// Per-item lifecycle. `Succeeded` and `FailedPermanent` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    Pending,
    InFlight { attempt: u32 },
    Succeeded,
    FailedPermanent,
}

impl ItemState {
    /// Transition out of `Pending`: the first attempt goes in-flight.
    pub fn start(self) -> ItemState {
        debug_assert_eq!(self, ItemState::Pending);
        ItemState::InFlight { attempt: 1 }
    }

    /// Transition on a failed attempt: retry while the budget allows,
    /// otherwise the item is permanently failed.
    pub fn after_failure(self, max_attempts: u32) -> ItemState {
        match self {
            ItemState::InFlight { attempt } if attempt < max_attempts => {
                ItemState::InFlight {
                    attempt: attempt + 1,
                }
            }
            ItemState::InFlight { .. } => ItemState::FailedPermanent,
            other => other,
        }
    }
}

/// Terminal result of one item, carrying the record to log.
#[derive(Debug)]
pub enum ItemOutcome {
    Succeeded(OutputRecord),
    FailedPermanent(ErrorRecord),
}

/// Drive one item through its state machine to a terminal state.
///
/// Each in-flight transition is one endpoint attempt. Failures retry the
/// same item until `max_attempts` is exhausted; the item then becomes
/// permanently failed with the last failure reason. Nothing is recorded for
/// an attempt that does not complete — all-or-nothing per item.
pub async fn run_item(
    endpoint: &dyn Endpoint,
    item: &WorkItem,
    max_attempts: u32,
) -> ItemOutcome {
    let mut state = ItemState::Pending.start();

    loop {
        let ItemState::InFlight { attempt } = state else {
            unreachable!("run_item only loops while in-flight");
        };

        let started = tokio::time::Instant::now();
        match endpoint.process(item).await {
            Ok(caption) => {
                let mut record = OutputRecord::new(item.key.clone(), caption.text);
                record.processing_ms = Some(started.elapsed().as_millis() as u64);
                record.attempt = Some(attempt);
                record.usage = caption.usage;
                return ItemOutcome::Succeeded(record);
            }
            Err(failure) => {
                state = state.after_failure(max_attempts);
                match state {
                    ItemState::InFlight { attempt: next } => {
                        tracing::warn!(
                            key = %item.key,
                            attempt,
                            next_attempt = next,
                            "attempt failed, retrying: {failure}"
                        );
                    }
                    ItemState::FailedPermanent => {
                        tracing::error!(
                            key = %item.key,
                            attempts = max_attempts,
                            "item permanently failed: {failure}"
                        );
                        return ItemOutcome::FailedPermanent(ErrorRecord::new(
                            item.key.clone(),
                            failure.reason,
                            max_attempts,
                        ));
                    }
                    _ => unreachable!("failure transition is in-flight or permanent"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_starts_at_attempt_one() {
        assert_eq!(ItemState::Pending.start(), ItemState::InFlight { attempt: 1 });
    }

    #[test]
    fn failure_retries_until_budget_exhausted() {
        let max = 3;
        let mut state = ItemState::Pending.start();

        state = state.after_failure(max);
        assert_eq!(state, ItemState::InFlight { attempt: 2 });
        state = state.after_failure(max);
        assert_eq!(state, ItemState::InFlight { attempt: 3 });
        state = state.after_failure(max);
        assert_eq!(state, ItemState::FailedPermanent);
    }

    #[test]
    fn single_attempt_budget_fails_immediately() {
        let state = ItemState::Pending.start().after_failure(1);
        assert_eq!(state, ItemState::FailedPermanent);
    }

    #[test]
    fn terminal_states_absorb_failures() {
        assert_eq!(
            ItemState::FailedPermanent.after_failure(3),
            ItemState::FailedPermanent
        );
        assert_eq!(ItemState::Succeeded.after_failure(3), ItemState::Succeeded);
    }
}
