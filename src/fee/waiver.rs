use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// 10,000 USD-equivalent at 6 decimals.
pub const DEFAULT_DAILY_WAIVE_CAP: u64 = 10_000_000_000;
pub const DEFAULT_DAILY_SWAP_CAP: u32 = 10;
pub const DEFAULT_SERVICE_FEE_DIVISOR: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeePolicy {
    pub daily_waive_cap: u64,
    pub daily_swap_cap: u32,
    pub service_fee_divisor: u64,
}

impl Default for FeePolicy {
    fn default() -> Self {
        Self {
            daily_waive_cap: DEFAULT_DAILY_WAIVE_CAP,
            daily_swap_cap: DEFAULT_DAILY_SWAP_CAP,
            service_fee_divisor: DEFAULT_SERVICE_FEE_DIVISOR,
        }
    }
}

impl FeePolicy {
    /// Without a known initiator there is no allowance to draw from.
    pub fn waives(&self, state: Option<&WaiverState>) -> bool {
        state.is_some_and(|s| s.waived < self.daily_waive_cap && s.swaps < self.daily_swap_cap)
    }

    pub fn service_fee(&self, amount: u64) -> u64 {
        if self.service_fee_divisor == 0 {
            return 0;
        }
        amount / self.service_fee_divisor
    }
}

/// Service fee waived for one address during one UTC day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaiverState {
    pub day: NaiveDate,
    pub waived: u64,
    pub swaps: u32,
}

impl WaiverState {
    pub fn empty(day: NaiveDate) -> Self {
        Self {
            day,
            waived: 0,
            swaps: 0,
        }
    }

    /// The state as seen on `today`; counters from an earlier day have reset.
    pub fn on(&self, today: NaiveDate) -> Self {
        if self.day == today {
            self.clone()
        } else {
            Self::empty(today)
        }
    }

    pub fn record(&mut self, waived_amount: u64) {
        self.waived = self.waived.saturating_add(waived_amount);
        self.swaps = self.swaps.saturating_add(1);
    }
}

pub fn utc_day(ts: i64) -> NaiveDate {
    DateTime::from_timestamp(ts, 0)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
        .date_naive()
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub fn day_start_ts(day: NaiveDate) -> i64 {
    day.and_hms_opt(0, 0, 0)
        .map_or(0, |midnight| midnight.and_utc().timestamp())
}

/// Storage key for an address's waiver counters, `address:dayStartTs`.
pub fn waiver_key(address: &str, day: NaiveDate) -> String {
    format!("{}:{}", address.to_lowercase(), day_start_ts(day))
}
