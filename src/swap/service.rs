use std::sync::{Arc, Mutex};

use anyhow::{Context as _, Result};
use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

use crate::fee::waiver::{today, utc_day};
use crate::fee::{self, FeeBreakdown, FeePolicy, FeeQuote, Route, WaiverState};
use crate::registry::Registry;
use crate::swap::codec::{self, DecodeError, ResolvedSwap};
use crate::swap::status::StatusTag;
use crate::swap::store::SqliteStore;
use crate::swap::{SwapRecord, SwapUpdate};

#[derive(Debug, Clone, Default)]
pub struct TrackerConfig {
    pub fee_policy: FeePolicy,
}

/// Everything derived from one stored record at a point in time.
#[derive(Debug, Clone, Serialize)]
pub struct SwapView {
    pub record: SwapRecord,
    pub status: StatusTag,
    #[serde(skip)]
    pub swap: Option<ResolvedSwap>,
    pub fee: Option<FeeBreakdown>,
}

/// Deterministic id of a swap request: the same encoded swap from the same initiator maps to one record.
pub fn request_id(encoded: &str, initiator: &str) -> String {
    let key = format!("{}:{}", encoded.to_lowercase(), initiator.to_lowercase());
    Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()).to_string()
}

#[derive(Clone)]
pub struct SwapTracker<R> {
    cfg: TrackerConfig,
    registry: Arc<R>,
    store: Arc<Mutex<SqliteStore>>,
}

impl<R: Registry> SwapTracker<R> {
    pub fn new(cfg: TrackerConfig, registry: Arc<R>, store: Arc<Mutex<SqliteStore>>) -> Self {
        Self {
            cfg,
            registry,
            store,
        }
    }

    pub fn store(&self) -> &Arc<Mutex<SqliteStore>> {
        &self.store
    }

    pub fn decode(&self, encoded: &str) -> Result<ResolvedSwap, DecodeError> {
        codec::decode(encoded, self.registry.as_ref())
    }

    /// Records a swap request. Re-submitting the same request returns the stored record.
    ///
    /// A request carrying the fee-waiver bit draws on the initiator's allowance for the day.
    pub fn ingest_request(&self, encoded: &str, initiator: &str, now: u64) -> Result<SwapRecord> {
        let swap = self
            .decode(encoded)
            .with_context(|| format!("not a valid encoded swap: {encoded}"))?;

        let id = request_id(encoded, initiator);
        let mut store = self.store.lock().expect("store mutex poisoned");
        if let Some(existing) = store.get_swap(&id).context("look up swap")? {
            return Ok(existing);
        }

        let record = SwapRecord::requested(id, encoded, Some(initiator.to_string()), now);
        store.insert_swap(&record).context("persist swap")?;

        if swap.descriptor.will_waive_fee() {
            let day = utc_day(now as i64);
            let state = store
                .record_waiver(initiator, day, swap.descriptor.amount)
                .context("record fee waiver")?;
            tracing::info!(
                swap_id = %record.id,
                initiator,
                waived = state.waived,
                swaps = state.swaps,
                "service fee waived"
            );
        }
        Ok(record)
    }

    /// Records a placeholder for a swap observed before its request.
    pub fn ingest_temporary(
        &self,
        encoded: &str,
        initiator: Option<String>,
        now: u64,
    ) -> Result<SwapRecord> {
        self.decode(encoded)
            .with_context(|| format!("not a valid encoded swap: {encoded}"))?;

        let record = SwapRecord::temporary(encoded, initiator, now);
        self.store
            .lock()
            .expect("store mutex poisoned")
            .insert_swap(&record)
            .context("persist temporary swap")?;
        Ok(record)
    }

    pub fn apply_update(&self, swap_id: &str, update: &SwapUpdate) -> Result<Option<SwapRecord>> {
        self.store
            .lock()
            .expect("store mutex poisoned")
            .apply_update(swap_id, update)
    }

    pub fn view(&self, swap_id: &str, now: u64) -> Result<Option<SwapView>> {
        let record = self
            .store
            .lock()
            .expect("store mutex poisoned")
            .get_swap(swap_id)?;
        record.map(|r| self.view_of(r, now)).transpose()
    }

    pub fn view_of(&self, record: SwapRecord, now: u64) -> Result<SwapView> {
        let status = record.status_at(now);
        let swap = match self.decode(&record.encoded) {
            Ok(swap) => Some(swap),
            Err(err) => {
                tracing::warn!(swap_id = %record.id, error = %err, "stored swap does not decode");
                None
            }
        };

        // A signed swap carries its own waiver bit; daily counters only price new quotes.
        let fee = match &swap {
            Some(swap) => {
                let route = Route::from_swap(swap, record.from_to.initiator.clone());
                let rules = self
                    .store
                    .lock()
                    .expect("store mutex poisoned")
                    .load_rules()?;
                Some(fee::compute_fee(
                    swap.descriptor.amount,
                    rules.match_route(&route),
                    swap.descriptor.will_waive_fee(),
                    &self.cfg.fee_policy,
                ))
            }
            None => None,
        };

        Ok(SwapView {
            record,
            status,
            swap,
            fee,
        })
    }

    pub fn quote_fee(&self, route: &Route, amount: u64) -> Result<FeeQuote> {
        let rules = self
            .store
            .lock()
            .expect("store mutex poisoned")
            .load_rules()?;
        let waiver = self.waiver_for(route.initiator.as_deref(), today())?;
        Ok(fee::quote_fee(
            &rules,
            route,
            amount,
            waiver.as_ref(),
            &self.cfg.fee_policy,
        ))
    }

    fn waiver_for(
        &self,
        initiator: Option<&str>,
        day: NaiveDate,
    ) -> Result<Option<WaiverState>> {
        let Some(address) = initiator else {
            return Ok(None);
        };
        self.store
            .lock()
            .expect("store mutex poisoned")
            .get_waiver(address, day)
            .map(Some)
    }
}
