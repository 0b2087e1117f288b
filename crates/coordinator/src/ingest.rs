//! Event ingest: verification, logging and kind-specific materialisation.

use caravel_api::CoordinatorStore;
use caravel_crypto::{verify_event, verify_event_pow};
use caravel_types::constants::FUND_ROYALTY_PCT;
use caravel_types::{
    ErrorTag, EventError, EventKind, EventV1, Hex32, HostPricing, HostRecord, StorageError,
};
use std::borrow::Cow;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Event(#[from] EventError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ErrorTag for IngestError {
    fn tag(&self) -> Cow<'static, str> {
        match self {
            Self::Event(e) => e.tag(),
            Self::Storage(e) => e.tag(),
        }
    }
}

/// Verifies incoming events and folds them into coordinator state.
pub struct EventIngestor {
    store: Arc<dyn CoordinatorStore>,
}

impl EventIngestor {
    pub fn new(store: Arc<dyn CoordinatorStore>) -> Self {
        Self { store }
    }

    /// Full ingest: shape, signature, proof-of-work, log append, then
    /// materialisation. Returns the event id and its log sequence.
    pub async fn ingest(&self, event: &EventV1) -> Result<(Hex32, u64), IngestError> {
        event.validate_shape()?;
        if !verify_event(event) {
            return Err(EventError::SignatureInvalid.into());
        }
        verify_event_pow(event)?;

        let event_id = event.event_id().map_err(EventError::from)?;
        let seq = self.store.append_event(&event_id, event).await?;
        self.materialize(event).await?;

        info!(target: "coordinator", %event_id, kind = ?event.kind, seq, "event ingested");
        Ok((event_id, seq))
    }

    async fn materialize(&self, event: &EventV1) -> Result<(), IngestError> {
        match event.kind {
            EventKind::Fund => self.materialize_fund(event).await,
            EventKind::Host => self.materialize_host(event).await,
            EventKind::Announce => self.materialize_announce(event).await,
            // Content and curation kinds live in the log alone; views over
            // them are built by their own materialisers.
            _ => {
                debug!(target: "coordinator", kind = ?event.kind, "no materialisation");
                Ok(())
            }
        }
    }

    /// FUND: credit the referenced bounty pool, minus the founder royalty.
    async fn materialize_fund(&self, event: &EventV1) -> Result<(), IngestError> {
        if event.r#ref.is_zero() {
            return Err(EventError::InvalidField("ref").into());
        }
        if event.sats == 0 {
            return Err(EventError::InvalidField("sats").into());
        }
        let royalty = (event.sats as u128 * (FUND_ROYALTY_PCT * 100.0) as u128 / 100) as u64;
        let credit = event.sats - royalty;
        self.store.credit_bounty(&event.r#ref, credit).await?;
        if royalty > 0 {
            self.store.credit_protocol(royalty).await?;
        }
        debug!(target: "coordinator", cid = %event.r#ref, credit, royalty, "bounty funded");
        Ok(())
    }

    /// HOST: register or update the sender's host record. Status and
    /// availability history survive updates.
    async fn materialize_host(&self, event: &EventV1) -> Result<(), IngestError> {
        if event.body.is_empty() {
            return Err(EventError::BodyRequired.into());
        }
        let body = event.decode_body()?;
        let endpoint = body
            .get("endpoint")
            .and_then(|v| v.as_text())
            .map(str::to_owned);
        let pricing = HostPricing {
            min_request_sats: body
                .get("min_request_sats")
                .and_then(|v| v.as_u64())
                .unwrap_or_else(|| HostPricing::default().min_request_sats),
            sats_per_gb: body
                .get("sats_per_gb")
                .and_then(|v| v.as_u64())
                .unwrap_or_else(|| HostPricing::default().sats_per_gb),
        };

        let record = match self.store.get_host(&event.from).await? {
            Some(mut existing) => {
                existing.endpoint = endpoint.or(existing.endpoint);
                existing.pricing = pricing;
                existing
            }
            None => HostRecord::new(event.from, endpoint, pricing),
        };
        self.store.upsert_host(&record).await?;
        Ok(())
    }

    /// ANNOUNCE: the sender serves the referenced file root.
    async fn materialize_announce(&self, event: &EventV1) -> Result<(), IngestError> {
        if event.r#ref.is_zero() {
            return Err(EventError::InvalidField("ref").into());
        }
        self.store.add_serve(&event.from, &event.r#ref).await?;
        Ok(())
    }
}
