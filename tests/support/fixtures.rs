#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context as _, Result};

use swap_tracker::registry::StaticRegistry;
use swap_tracker::swap::codec::{Salt, SwapDescriptor};
use swap_tracker::swap::service::{SwapTracker, TrackerConfig};
use swap_tracker::swap::store::SqliteStore;
use swap_tracker::swap::{EventData, EventKind, SwapUpdate};

pub const ETH: u16 = 0x003c;
pub const BNB: u16 = 0x02ca;
pub const TRX: u16 = 0x00c3;

pub const USDC: u8 = 1;
pub const USDT: u8 = 2;

pub const ALICE: &str = "0xA11CE00000000000000000000000000000000001";
pub const BOB: &str = "0xB0B0000000000000000000000000000000000002";

pub const REGISTRY_JSON: &str = r#"{
  "networks": [
    {
      "id": "eth",
      "name": "Ethereum",
      "shortSlip44": 60,
      "coreSymbol": "ETH",
      "tokens": [
        { "index": 1, "symbol": "USDC" },
        { "index": 2, "symbol": "USDT" },
        { "index": 255, "symbol": "UCT", "decimals": 4 }
      ]
    },
    {
      "id": "bnb",
      "name": "BNB Chain",
      "shortSlip44": 714,
      "coreSymbol": "BNB",
      "tokens": [
        { "index": 1, "symbol": "USDC", "decimals": 18 },
        { "index": 2, "symbol": "USDT", "decimals": 18 }
      ]
    },
    {
      "id": "trx",
      "name": "Tron",
      "shortSlip44": 195,
      "tokens": [{ "index": 2, "symbol": "USDT" }]
    }
  ]
}"#;

pub fn registry() -> Result<StaticRegistry> {
    StaticRegistry::from_json_str(REGISTRY_JSON).context("parse fixture registry")
}

pub fn write_registry(dir: &Path) -> Result<std::path::PathBuf> {
    let path = dir.join("registry.json");
    std::fs::write(&path, REGISTRY_JSON).context("write fixture registry")?;
    Ok(path)
}

/// A standard-format swap of `amount` (6 dp) from eth:USDC to bnb:USDT.
pub fn descriptor(amount: u64, expire_ts: u64) -> SwapDescriptor {
    SwapDescriptor {
        version: 1,
        amount,
        salt: Salt {
            header: 0x9000,
            data: 0x1122_3344_5566_7788,
        },
        fee: 0,
        expire_ts,
        out_chain: BNB,
        out_token: USDT,
        in_chain: ETH,
        in_token: USDC,
        trailer: String::new(),
    }
}

pub fn encoded(amount: u64, expire_ts: u64) -> Result<String> {
    descriptor(amount, expire_ts)
        .encode()
        .context("encode fixture swap")
}

pub fn open_tracker(path: &Path) -> Result<SwapTracker<StaticRegistry>> {
    let store = SqliteStore::open(path.to_path_buf()).context("open sqlite store")?;
    Ok(SwapTracker::new(
        TrackerConfig::default(),
        Arc::new(registry()?),
        Arc::new(Mutex::new(store)),
    ))
}

pub fn update(kind: EventKind, hash: &str, ts: u64) -> SwapUpdate {
    SwapUpdate::new(
        kind,
        EventData {
            hash: Some(hash.to_string()),
            ts: Some(ts),
            ..EventData::default()
        },
    )
}
