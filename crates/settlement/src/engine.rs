//! The idempotent per-epoch settlement engine.

use crate::aggregate::{aggregate_digests, EpochGroup};
use crate::reward::{distribute_rewards, HostScoreInputs};
use caravel_api::CoordinatorStore;
use caravel_crypto::{mine_blocking, event_target, sign_event, Ed25519KeyPair};
use caravel_types::codec::Value;
use caravel_types::constants::AVAILABILITY_DEFAULT_SCORE;
use caravel_types::{
    encode_event_body, epoch::now_ms, EpochSummary, EventKind, EventV1, Hex32, SettlementError,
    SettlementReport,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Composes aggregation, reward distribution and persistence into one
/// idempotent `settle_epoch` operation.
pub struct SettlementEngine {
    store: Arc<dyn CoordinatorStore>,
    /// Signs the epoch summary event appended to the log.
    signer: Ed25519KeyPair,
}

impl SettlementEngine {
    pub fn new(store: Arc<dyn CoordinatorStore>, signer: Ed25519KeyPair) -> Self {
        Self { store, signer }
    }

    /// Settles one epoch. Safe to call any number of times: persisted
    /// summaries act as the idempotency key, so a second call for the same
    /// epoch returns an empty report and debits nothing.
    pub async fn settle_epoch(&self, epoch: u32) -> Result<SettlementReport, SettlementError> {
        // 1. Guard.
        if self.store.epoch_has_summaries(epoch).await? {
            return Ok(SettlementReport::already_settled(epoch));
        }

        // 2–3. Fetch and aggregate.
        let digests = self.store.receipts_for_epoch(epoch).await?;
        let groups = aggregate_digests(digests);
        let total_groups = groups.len() as u64;

        // 4. Classify. Ineligible groups are recorded, not discarded.
        let mut summaries: Vec<EpochSummary> = Vec::with_capacity(groups.len());
        let mut by_cid: BTreeMap<Hex32, Vec<EpochGroup>> = BTreeMap::new();
        for group in groups {
            if group.is_eligible() {
                by_cid.entry(group.cid).or_default().push(group);
            } else {
                summaries.push(EpochSummary {
                    epoch,
                    host: group.host,
                    cid: group.cid,
                    receipt_count: group.receipt_count,
                    unique_clients: group.unique_clients,
                    reward_sats: 0,
                    eligible: false,
                });
            }
        }
        let eligible_groups = by_cid.values().map(|v| v.len() as u64).sum::<u64>();

        // 5–6. Per-CID payouts and pool drain.
        let mut paid_groups = 0u64;
        let mut total_paid = 0u64;
        let mut total_fee = 0u64;
        for (cid, cid_groups) in by_cid {
            let pool = self.store.get_bounty(&cid).await?;
            if pool.balance_sats == 0 {
                for group in &cid_groups {
                    summaries.push(self.zero_reward_summary(epoch, group));
                }
                continue;
            }

            let mut inputs = Vec::with_capacity(cid_groups.len());
            for group in &cid_groups {
                let uptime = match self.store.get_host(&group.host).await? {
                    Some(host) => host.availability_score,
                    None => AVAILABILITY_DEFAULT_SCORE,
                };
                inputs.push(HostScoreInputs {
                    host: group.host,
                    unique_clients: group.unique_clients,
                    uptime,
                    // Reserved for geo/ASN weighting.
                    diversity: 1.0,
                });
            }

            let split = distribute_rewards(pool.balance_sats, &inputs);
            let actual_drain = self
                .store
                .debit_bounty(&cid, split.total_drain(), epoch)
                .await?;
            self.drain_pins(&cid, actual_drain).await?;
            if split.aggregator_fee_sats > 0 {
                self.store.credit_protocol(split.aggregator_fee_sats).await?;
            }

            for (group, (host, reward)) in cid_groups.iter().zip(&split.rewards) {
                debug_assert_eq!(group.host, *host);
                if *reward > 0 {
                    paid_groups += 1;
                }
                total_paid += reward;
                summaries.push(EpochSummary {
                    epoch,
                    host: *host,
                    cid,
                    receipt_count: group.receipt_count,
                    unique_clients: group.unique_clients,
                    reward_sats: *reward,
                    eligible: true,
                });
            }
            total_fee += split.aggregator_fee_sats;
        }

        // 7. Persist the whole batch atomically.
        if !summaries.is_empty() {
            self.store.insert_summaries(&summaries).await?;
        }

        let report = SettlementReport {
            epoch,
            total_groups,
            eligible_groups,
            paid_groups,
            total_paid_sats: total_paid,
            total_aggregator_fee_sats: total_fee,
            summaries,
        };

        // 8. Append the summary event to the log.
        if let Err(e) = self.append_summary_event(&report).await {
            // The epoch is settled either way; the log entry is advisory.
            warn!(target: "settlement", epoch, error = %e, "failed to append epoch summary event");
        }

        info!(
            target: "settlement",
            epoch,
            total_groups = report.total_groups,
            eligible = report.eligible_groups,
            paid = report.paid_groups,
            paid_sats = report.total_paid_sats,
            "epoch settled"
        );
        caravel_telemetry::record_settled_epoch(report.total_paid_sats);
        Ok(report)
    }

    fn zero_reward_summary(&self, epoch: u32, group: &EpochGroup) -> EpochSummary {
        EpochSummary {
            epoch,
            host: group.host,
            cid: group.cid,
            receipt_count: group.receipt_count,
            unique_clients: group.unique_clients,
            reward_sats: 0,
            eligible: true,
        }
    }

    /// Drains active pin contracts for a CID by the settled amount,
    /// oldest first. A contract that runs dry transitions to EXHAUSTED.
    async fn drain_pins(&self, cid: &Hex32, amount: u64) -> Result<(), SettlementError> {
        if amount == 0 {
            return Ok(());
        }
        let mut remaining = amount;
        let mut pins = self.store.active_pins_for(cid).await?;
        pins.sort_by_key(|p| p.created_epoch);
        for mut pin in pins {
            if remaining == 0 {
                break;
            }
            let drained = pin.drain(remaining);
            if drained > 0 {
                remaining -= drained;
                self.store.update_pin(&pin).await?;
            }
        }
        Ok(())
    }

    /// Signs and appends the MATERIALIZER summary event. Free events carry
    /// proof-of-work, so the nonce is mined on the blocking pool.
    async fn append_summary_event(&self, report: &SettlementReport) -> Result<(), SettlementError> {
        let body = Value::map([
            ("epoch", Value::from(report.epoch)),
            ("total_groups", Value::from(report.total_groups)),
            ("eligible_groups", Value::from(report.eligible_groups)),
            ("paid_groups", Value::from(report.paid_groups)),
            ("total_paid_sats", Value::from(report.total_paid_sats)),
            (
                "total_aggregator_fee_sats",
                Value::from(report.total_aggregator_fee_sats),
            ),
        ]);
        let body_hex =
            encode_event_body(&body).map_err(|e| SettlementError::SummaryEvent(e.to_string()))?;

        let mut event = EventV1 {
            v: 1,
            kind: EventKind::Materializer,
            from: self.signer.public(),
            r#ref: Hex32::ZERO,
            body: body_hex,
            sats: 0,
            ts: now_ms(),
            sig: String::new(),
            nonce: None,
            pow_hash: None,
        };

        let body_bytes = event
            .body_bytes()
            .map_err(|e| SettlementError::SummaryEvent(e.to_string()))?;
        let challenge = caravel_crypto::event_challenge(
            &event.from,
            event.ts,
            event.kind.as_u8(),
            &event.r#ref,
            &body_bytes,
        );
        let (nonce, pow) = mine_blocking(challenge, event_target())
            .await
            .map_err(|e| SettlementError::SummaryEvent(e.to_string()))?;
        event.nonce = Some(nonce);
        event.pow_hash = Some(Hex32::from_bytes(pow));

        sign_event(&self.signer, &mut event)
            .map_err(|e| SettlementError::SummaryEvent(e.to_string()))?;
        let event_id = event
            .event_id()
            .map_err(|e| SettlementError::SummaryEvent(e.to_string()))?;
        self.store.append_event(&event_id, &event).await?;
        Ok(())
    }
}
