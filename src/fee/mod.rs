pub mod waiver;

use std::cmp::Reverse;
use std::fmt;
use std::str::FromStr;

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::swap::codec::ResolvedSwap;

pub use self::waiver::{FeePolicy, WaiverState};

const DEFAULT_RATE_PPM: u64 = 1000;
const RATE_SCALE: u128 = 1_000_000;
const USD_SCALE: u64 = 1_000_000;

/// A `(fromChain:fromToken, toChain:toToken)` pair, with the initiating address when known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub from_chain: String,
    pub from_token: String,
    pub to_chain: String,
    pub to_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initiator: Option<String>,
}

impl Route {
    /// Parses `chain:token` endpoints, e.g. `Route::parse("eth:usdc", "bnb:usdt")`.
    pub fn parse(from: &str, to: &str) -> Result<Self> {
        fn endpoint(s: &str) -> Result<(String, String)> {
            let (chain, token) = s
                .split_once(':')
                .with_context(|| format!("expected chain:token, got {s:?}"))?;
            anyhow::ensure!(
                !chain.is_empty() && !token.is_empty(),
                "expected chain:token, got {s:?}"
            );
            Ok((chain.to_string(), token.to_string()))
        }

        let (from_chain, from_token) = endpoint(from)?;
        let (to_chain, to_token) = endpoint(to)?;
        Ok(Self {
            from_chain,
            from_token,
            to_chain,
            to_token,
            initiator: None,
        })
    }

    pub fn from_swap(swap: &ResolvedSwap, initiator: Option<String>) -> Self {
        Self {
            from_chain: swap.from.network.id.clone(),
            from_token: swap.from.token.symbol.clone(),
            to_chain: swap.to.network.id.clone(),
            to_token: swap.to.token.symbol.clone(),
            initiator,
        }
    }

    pub fn with_initiator(mut self, initiator: impl Into<String>) -> Self {
        self.initiator = Some(initiator.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenMatcher {
    Any,
    Exact(String),
    /// Matches only when the route's in and out tokens differ.
    DifferentToken,
}

impl TokenMatcher {
    fn matches(&self, token: &str, other_side: &str) -> bool {
        match self {
            TokenMatcher::Any => true,
            TokenMatcher::Exact(t) => t.eq_ignore_ascii_case(token),
            TokenMatcher::DifferentToken => !token.eq_ignore_ascii_case(other_side),
        }
    }
}

/// One side of a rule: `*`, `chain`, `chain:*`, `chain:token` or `chain:!`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "MatcherRepr", into = "String")]
pub struct RouteMatcher {
    pub chain: Option<String>,
    pub token: TokenMatcher,
}

impl RouteMatcher {
    pub fn any() -> Self {
        Self {
            chain: None,
            token: TokenMatcher::Any,
        }
    }

    fn matches(&self, chain: &str, token: &str, other_token: &str) -> bool {
        if let Some(c) = &self.chain
            && !c.eq_ignore_ascii_case(chain)
        {
            return false;
        }
        self.token.matches(token, other_token)
    }

    fn from_parts(chain: &str, token: Option<&str>) -> Result<Self> {
        anyhow::ensure!(!chain.is_empty(), "empty chain in route matcher");
        let chain = (chain != "*").then(|| chain.to_string());
        let token = match token {
            None | Some("*") => TokenMatcher::Any,
            Some("!") => TokenMatcher::DifferentToken,
            Some("") => anyhow::bail!("empty token in route matcher"),
            Some(t) => TokenMatcher::Exact(t.to_string()),
        };
        Ok(Self { chain, token })
    }
}

impl FromStr for RouteMatcher {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once(':') {
            Some((chain, token)) => Self::from_parts(chain, Some(token)),
            None => Self::from_parts(s, None),
        }
    }
}

impl fmt::Display for RouteMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.chain.as_deref().unwrap_or("*"))?;
        match &self.token {
            TokenMatcher::Any => Ok(()),
            TokenMatcher::Exact(t) => write!(f, ":{t}"),
            TokenMatcher::DifferentToken => f.write_str(":!"),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MatcherRepr {
    Text(String),
    Pair(Vec<String>),
}

impl TryFrom<MatcherRepr> for RouteMatcher {
    type Error = anyhow::Error;

    fn try_from(repr: MatcherRepr) -> Result<Self> {
        match repr {
            MatcherRepr::Text(s) => s.parse(),
            MatcherRepr::Pair(parts) => match parts.as_slice() {
                [chain] => Self::from_parts(chain, None),
                [chain, token] => Self::from_parts(chain, Some(token)),
                other => anyhow::bail!("route matcher needs 1 or 2 parts, got {}", other.len()),
            },
        }
    }
}

impl From<RouteMatcher> for String {
    fn from(m: RouteMatcher) -> Self {
        m.to_string()
    }
}

/// One LP fee tier. `min` is in whole USD, `base` in 6-dp units, `rate` in parts per million.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeeTier {
    #[serde(default)]
    pub min: u64,
    #[serde(default)]
    pub base: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<u64>,
    #[serde(default)]
    pub gas: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FeeTier {
    fn applies_to(&self, amount: u64) -> bool {
        (self.min as u128) * (USD_SCALE as u128) <= amount as u128
    }

    fn lp_fee(&self, amount: u64) -> u64 {
        let rate = self.rate.unwrap_or(DEFAULT_RATE_PPM) as u128;
        let proportional = u64::try_from(amount as u128 * rate / RATE_SCALE).unwrap_or(u64::MAX);
        proportional.max(self.base)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub from: RouteMatcher,
    pub to: RouteMatcher,
    #[serde(default)]
    pub priority: i64,
    /// Maximum swap amount in whole USD; `0` closes the route.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initiator: Option<String>,
    #[serde(default)]
    pub fee: Vec<FeeTier>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Rule {
    pub fn new(from: RouteMatcher, to: RouteMatcher) -> Self {
        Self {
            from,
            to,
            priority: 0,
            limit: None,
            initiator: None,
            fee: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn matches(&self, route: &Route) -> bool {
        if route.from_chain.is_empty() {
            return false;
        }
        if let Some(restricted) = &self.initiator {
            match &route.initiator {
                Some(initiator) if initiator.eq_ignore_ascii_case(restricted) => {}
                _ => return false,
            }
        }
        self.from
            .matches(&route.from_chain, &route.from_token, &route.to_token)
            && self
                .to
                .matches(&route.to_chain, &route.to_token, &route.from_token)
    }

    pub fn accepts(&self, amount: u64) -> bool {
        match self.limit {
            None => true,
            Some(0) => false,
            Some(limit) => amount as u128 <= limit as u128 * USD_SCALE as u128,
        }
    }
}

/// Rules ordered by descending priority; ties keep their input order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(mut rules: Vec<Rule>) -> Self {
        rules.sort_by_key(|r| Reverse(r.priority));
        Self { rules }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn match_route(&self, route: &Route) -> Option<&Rule> {
        match_route(&self.rules, route)
    }
}

/// First structurally matching rule. `rules` must already be sorted by priority, descending.
pub fn match_route<'a>(rules: &'a [Rule], route: &Route) -> Option<&'a Rule> {
    rules.iter().find(|r| r.matches(route))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeBreakdown {
    pub service_fee: u64,
    pub lp_fee: u64,
    pub gas_fee: u64,
    pub original_fee: u64,
    pub total_fee: u64,
    pub waived: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<usize>,
}

/// Fees for `amount` (6 dp) under `rule`. Integer arithmetic only; sums saturate.
///
/// Without a rule, or for a zero amount, every fee is zero. Only the first
/// tier whose `min` the amount reaches is applied. `waived` drops the service
/// fee from the total.
pub fn compute_fee(
    amount: u64,
    rule: Option<&Rule>,
    waived: bool,
    policy: &FeePolicy,
) -> FeeBreakdown {
    let Some(rule) = rule.filter(|_| amount > 0) else {
        return FeeBreakdown {
            waived,
            ..FeeBreakdown::default()
        };
    };

    let service_fee = policy.service_fee(amount);
    let (tier, lp_fee, gas_fee) = rule
        .fee
        .iter()
        .enumerate()
        .find(|(_, t)| t.applies_to(amount))
        .map_or((None, 0, 0), |(i, t)| (Some(i), t.lp_fee(amount), t.gas));

    FeeBreakdown {
        service_fee,
        lp_fee,
        gas_fee,
        original_fee: service_fee.saturating_add(lp_fee),
        total_fee: (if waived { 0 } else { service_fee }).saturating_add(lp_fee),
        waived,
        tier,
    }
}

/// Answer to a fee query for a route and amount.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeQuote {
    pub total_fee: u64,
    pub original_fee: u64,
    pub lp_fee: u64,
    pub service_fee: u64,
    /// Amount already waived for the initiator today.
    pub waived: u64,
    pub waive_service_fee: bool,
    pub swaps: u32,
    pub available: bool,
}

pub fn quote_fee(
    rules: &RuleSet,
    route: &Route,
    amount: u64,
    waiver: Option<&WaiverState>,
    policy: &FeePolicy,
) -> FeeQuote {
    let rule = rules.match_route(route);
    let available = rule.is_none_or(|r| r.accepts(amount));
    let waived = policy.waives(waiver);
    let fee = if available {
        compute_fee(amount, rule, waived, policy)
    } else {
        tracing::debug!(?route, amount, "route unavailable");
        FeeBreakdown {
            waived,
            ..FeeBreakdown::default()
        }
    };

    FeeQuote {
        total_fee: fee.total_fee,
        original_fee: fee.original_fee,
        lp_fee: fee.lp_fee,
        service_fee: fee.service_fee,
        waived: waiver.map_or(0, |w| w.waived),
        waive_service_fee: fee.waived,
        swaps: waiver.map_or(0, |w| w.swaps),
        available,
    }
}
