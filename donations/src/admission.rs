//! Webhook admission: classify, validate, dedupe, then activate or enqueue.
//!
//! Everything after classification runs under the tenant's lock, so two
//! deliveries for the same tenant cannot both observe an empty active slot.

use crate::metrics_defs::WEBHOOKS_RECEIVED;
use crate::platform::{Donation, Unwrapped, classify_value, unwrap_envelope};
use crate::store::{DonationStore, Enqueued, StoreError};
use serde_json::Value;
use shared::counter;
use tokio::time::Instant;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum AdmissionError {
    #[error("payload does not match any known donation platform")]
    UnrecognizedPayload,
    #[error("donation amount must be greater than zero")]
    InvalidAmount,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, PartialEq)]
pub enum AdmissionOutcome {
    /// The envelope held no donation.
    Empty,
    /// Identical delivery seen moments ago; nothing stored.
    Duplicate(Donation),
    /// Became the active donation right away.
    Activated(Donation),
    Queued { donation: Donation, position: usize },
}

impl AdmissionOutcome {
    fn label(&self) -> &'static str {
        match self {
            AdmissionOutcome::Empty => "empty",
            AdmissionOutcome::Duplicate(_) => "duplicate",
            AdmissionOutcome::Activated(_) => "activated",
            AdmissionOutcome::Queued { .. } => "queued",
        }
    }
}

/// Admits one raw webhook body for `tenant`.
pub fn admit(
    store: &DonationStore,
    tenant: &str,
    body: Value,
    max_queue_size: usize,
) -> Result<AdmissionOutcome, AdmissionError> {
    let payload = match unwrap_envelope(body) {
        Unwrapped::Payload(payload) => payload,
        Unwrapped::Empty => {
            tracing::info!(tenant, "Webhook envelope contained no donations");
            counter!(WEBHOOKS_RECEIVED, "outcome" => "empty", "platform" => "none").increment(1);
            return Ok(AdmissionOutcome::Empty);
        }
    };

    let Some(classification) = classify_value(&payload) else {
        counter!(WEBHOOKS_RECEIVED, "outcome" => "unrecognized", "platform" => "none")
            .increment(1);
        return Err(AdmissionError::UnrecognizedPayload);
    };

    admit_donation(store, tenant, classification.donation, max_queue_size)
}

/// Admits an already classified donation.
pub fn admit_donation(
    store: &DonationStore,
    tenant: &str,
    donation: Donation,
    max_queue_size: usize,
) -> Result<AdmissionOutcome, AdmissionError> {
    let platform = donation.platform.as_str();

    if donation.amount <= 0.0 {
        tracing::info!(tenant, platform, amount = donation.amount, "Rejected donation amount");
        counter!(WEBHOOKS_RECEIVED, "outcome" => "invalid_amount", "platform" => platform)
            .increment(1);
        return Err(AdmissionError::InvalidAmount);
    }

    let dedupe = *store.dedupe();
    let result = store.with_tenant(tenant, |state| {
        let now = Instant::now();

        if state.is_duplicate(&donation, now, &dedupe) {
            return Ok(AdmissionOutcome::Duplicate(donation));
        }
        state.record_received();

        if !state.has_active() {
            state.set_active(donation.clone(), now);
            state.mark_processed(&donation, now, &dedupe);
            return Ok(AdmissionOutcome::Activated(donation));
        }

        match state.enqueue(donation.clone(), max_queue_size, now)? {
            Enqueued::Queued { position } => {
                state.mark_processed(&donation, now, &dedupe);
                Ok(AdmissionOutcome::Queued { donation, position })
            }
            Enqueued::Promoted => {
                state.mark_processed(&donation, now, &dedupe);
                Ok(AdmissionOutcome::Activated(donation))
            }
        }
    });

    match &result {
        Ok(outcome) => {
            match outcome {
                AdmissionOutcome::Duplicate(d) => tracing::info!(
                    tenant,
                    platform,
                    donor = %d.display_name(),
                    amount = d.amount,
                    "Ignored duplicate donation"
                ),
                AdmissionOutcome::Activated(d) => tracing::info!(
                    tenant,
                    platform,
                    donor = %d.display_name(),
                    amount = d.amount,
                    "Donation saved"
                ),
                AdmissionOutcome::Queued { donation: d, position } => tracing::info!(
                    tenant,
                    platform,
                    donor = %d.display_name(),
                    amount = d.amount,
                    queue_position = position,
                    "Donation queued"
                ),
                AdmissionOutcome::Empty => {}
            }
            counter!(WEBHOOKS_RECEIVED, "outcome" => outcome.label(), "platform" => platform)
                .increment(1);
        }
        Err(e) => {
            tracing::warn!(tenant, platform, error = %e, "Donation rejected");
            counter!(WEBHOOKS_RECEIVED, "outcome" => "queue_full", "platform" => platform)
                .increment(1);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Platform;
    use serde_json::json;
    use std::time::Duration;

    const KEY: &str = "AAAA-BBBB-CCCC-DDDD";

    fn trakteer(name: &str, amount: i64) -> Value {
        json!({"type": "trakteer", "supporter_name": name, "amount": amount})
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_donation_is_activated() {
        let store = DonationStore::default();
        let outcome = admit(&store, KEY, trakteer("A", 1000), 5).unwrap();
        assert!(matches!(outcome, AdmissionOutcome::Activated(_)));
        assert_eq!(store.get_active(KEY).unwrap().donor_name, "A");
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_positive_amounts_are_rejected_for_every_platform() {
        let store = DonationStore::default();
        for amount in [json!(0), json!(-5), json!("abc"), json!(null)] {
            let bodies = [
                json!({"version": "1", "donator_name": "A", "amount_raw": amount}),
                json!({"supporter": "A", "currency": "IDR", "amount": amount}),
                json!({"type": "trakteer", "supporter_name": "A", "amount": amount}),
                json!({"type": "tako", "supporter_name": "A", "amount": amount}),
                json!({"name": "A", "amount": amount, "is_verified": true, "is_anonymous": false}),
            ];
            for body in bodies {
                assert_eq!(
                    admit(&store, KEY, body, 5),
                    Err(AdmissionError::InvalidAmount)
                );
            }
        }
        assert!(!store.has_active(KEY));
        assert!(store.snapshot(KEY).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_primary_amount_does_not_fall_back_to_alias() {
        let store = DonationStore::default();
        for raw in [json!(-5), json!("abc")] {
            let body = json!({"version": "1.0", "donator_name": "A", "amount_raw": raw, "amount": 100});
            assert_eq!(
                admit(&store, KEY, body, 5),
                Err(AdmissionError::InvalidAmount)
            );
        }
        assert!(!store.has_active(KEY));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrecognized_payload() {
        let store = DonationStore::default();
        assert_eq!(
            admit(&store, KEY, json!({"hello": "world"}), 5),
            Err(AdmissionError::UnrecognizedPayload)
        );
        assert_eq!(
            admit(&store, KEY, json!("text"), 5),
            Err(AdmissionError::UnrecognizedPayload)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_envelope_is_a_noop() {
        let store = DonationStore::default();
        let outcome = admit(&store, KEY, json!({"data": []}), 5).unwrap();
        assert_eq!(outcome, AdmissionOutcome::Empty);
        assert!(store.snapshot(KEY).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_envelope_donation_is_admitted() {
        let store = DonationStore::default();
        let body = json!({"data": [{
            "name": "Citra", "amount": 2000, "is_verified": null, "is_anonymous": false
        }]});
        let outcome = admit(&store, KEY, body, 5).unwrap();
        let AdmissionOutcome::Activated(donation) = outcome else {
            panic!("expected activation");
        };
        assert_eq!(donation.platform, Platform::Bagibagi);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicates_within_window_are_ignored() {
        let store = DonationStore::default();
        admit(&store, KEY, trakteer("Bob", 5000), 5).unwrap();

        tokio::time::advance(Duration::from_secs(1)).await;
        let outcome = admit(&store, KEY, trakteer("Bob", 5000), 5).unwrap();
        assert!(matches!(outcome, AdmissionOutcome::Duplicate(_)));

        let snapshot = store.snapshot(KEY).unwrap();
        assert_eq!(snapshot.queue_size, 0);
        assert_eq!(snapshot.stats.total_received, 1);

        // Past the exact-match window the same donation counts again.
        tokio::time::advance(Duration::from_secs(4)).await;
        let outcome = admit(&store, KEY, trakteer("Bob", 5000), 5).unwrap();
        assert_eq!(
            outcome,
            AdmissionOutcome::Queued {
                donation: store.get_active(KEY).unwrap(),
                position: 1
            }
        );
        assert_eq!(store.snapshot(KEY).unwrap().stats.total_received, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_does_not_displace_queued_donation() {
        let store = DonationStore::default();
        admit(&store, KEY, trakteer("Active", 1), 5).unwrap();
        admit(&store, KEY, trakteer("Queued", 2), 5).unwrap();
        let outcome = admit(&store, KEY, trakteer("Queued", 2), 5).unwrap();
        assert!(matches!(outcome, AdmissionOutcome::Duplicate(_)));

        let snapshot = store.snapshot(KEY).unwrap();
        assert_eq!(snapshot.queue_size, 1);
        assert_eq!(snapshot.stats.total_queued, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fifo_across_clears() {
        let store = DonationStore::default();
        admit(&store, KEY, trakteer("Active", 1), 10).unwrap();
        for (i, name) in ["D1", "D2", "D3"].into_iter().enumerate() {
            let outcome = admit(&store, KEY, trakteer(name, 10), 10).unwrap();
            assert!(matches!(
                outcome,
                AdmissionOutcome::Queued { position, .. } if position == i + 1
            ));
        }

        for expected in ["D1", "D2", "D3"] {
            let outcome = store.clear_and_promote(KEY).unwrap();
            assert!(outcome.promoted);
            assert_eq!(store.get_active(KEY).unwrap().donor_name, expected);
        }
        let last = store.clear_and_promote(KEY).unwrap();
        assert!(!last.promoted);
        assert_eq!(store.clear_and_promote(KEY), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_queue_rejects() {
        let store = DonationStore::default();
        admit(&store, KEY, trakteer("Active", 1), 2).unwrap();
        admit(&store, KEY, trakteer("Q1", 1), 2).unwrap();
        admit(&store, KEY, trakteer("Q2", 1), 2).unwrap();

        assert_eq!(
            admit(&store, KEY, trakteer("Q3", 1), 2),
            Err(AdmissionError::Store(StoreError::QueueFull { limit: 2 }))
        );
        assert_eq!(store.snapshot(KEY).unwrap().queue_size, 2);

        // Rejected donations are not in the ledger, so a retry after a clear
        // is admitted.
        store.clear_and_promote(KEY).unwrap();
        assert!(matches!(
            admit(&store, KEY, trakteer("Q3", 1), 2).unwrap(),
            AdmissionOutcome::Queued { position: 2, .. }
        ));
    }
}
