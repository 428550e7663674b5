use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context as _, Result};
use clap::{Parser as _, Subcommand, ValueEnum};
use serde::Deserialize;
use serde_json::{Value, json};
use swap_tracker::fee::waiver::{
    DEFAULT_DAILY_SWAP_CAP, DEFAULT_DAILY_WAIVE_CAP, DEFAULT_SERVICE_FEE_DIVISOR,
};
use swap_tracker::fee::{FeePolicy, Route, Rule, RuleSet};
use swap_tracker::live::{self, UpdateHub};
use swap_tracker::registry::{Registry, StaticRegistry};
use swap_tracker::swap::codec::SwapDescriptor;
use swap_tracker::swap::service::{SwapTracker, SwapView, TrackerConfig};
use swap_tracker::swap::status::unix_now;
use swap_tracker::swap::store::{Flag, Page, SqliteStore};
use swap_tracker::swap::{EventData, EventName, SwapRecord, SwapUpdate};

#[derive(Debug, clap::Parser)]
struct Args {
    #[arg(long, default_value = "swap-tracker.sqlite3")]
    store_path: PathBuf,

    /// Network and token metadata, as JSON.
    #[arg(long)]
    registry: Option<PathBuf>,

    #[arg(long, default_value_t = DEFAULT_DAILY_WAIVE_CAP)]
    daily_waive_cap: u64,

    #[arg(long, default_value_t = DEFAULT_DAILY_SWAP_CAP)]
    daily_swap_cap: u32,

    #[arg(long, default_value_t = DEFAULT_SERVICE_FEE_DIVISOR)]
    service_fee_divisor: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, clap::Args)]
struct PageArgs {
    #[arg(long, default_value_t = 0)]
    page: u32,

    #[arg(long, default_value_t = 10)]
    size: u32,
}

impl From<PageArgs> for Page {
    fn from(args: PageArgs) -> Self {
        Page {
            page: args.page,
            size: args.size,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FlagArg {
    Disabled,
    Modified,
    ErrorConfirmed,
}

impl From<FlagArg> for Flag {
    fn from(arg: FlagArg) -> Self {
        match arg {
            FlagArg::Disabled => Flag::Disabled,
            FlagArg::Modified => Flag::Modified,
            FlagArg::ErrorConfirmed => Flag::ErrorConfirmed,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    Decode {
        encoded: String,
    },
    Fee {
        #[arg(long)]
        from: String,

        #[arg(long)]
        to: String,

        #[arg(long)]
        amount: u64,

        #[arg(long)]
        initiator: Option<String>,
    },
    ImportRules {
        file: PathBuf,
    },
    Ingest {
        encoded: String,

        #[arg(long)]
        initiator: Option<String>,

        /// Record a placeholder for a swap seen before its request.
        #[arg(long)]
        temporary: bool,
    },
    Apply {
        swap_id: String,
        update_json: String,
    },
    Show {
        swap_id: String,
    },
    /// Feeds JSON lines of `{swapId, status, data}` through the live hub.
    Replay {
        file: PathBuf,
    },
    Mark {
        swap_id: String,

        #[arg(value_enum)]
        flag: FlagArg,

        #[arg(long)]
        unset: bool,
    },
    Locked {
        #[command(flatten)]
        page: PageArgs,
    },
    NeedRelease {
        #[command(flatten)]
        page: PageArgs,
    },
    Modified {
        #[command(flatten)]
        page: PageArgs,
    },
    Address {
        address: String,

        #[command(flatten)]
        page: PageArgs,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReplayLine {
    swap_id: String,
    status: EventName,
    #[serde(default)]
    data: EventData,
}

#[tokio::main]
async fn main() -> Result<()> {
    swap_tracker::logging::init().ok();
    let args = Args::parse();

    let registry = match &args.registry {
        Some(path) => StaticRegistry::load(path)?,
        None => {
            tracing::warn!("no --registry given; chains and tokens will not resolve");
            StaticRegistry::default()
        }
    };
    let store = SqliteStore::open(args.store_path.clone()).context("open swap store")?;
    let cfg = TrackerConfig {
        fee_policy: FeePolicy {
            daily_waive_cap: args.daily_waive_cap,
            daily_swap_cap: args.daily_swap_cap,
            service_fee_divisor: args.service_fee_divisor,
        },
    };
    let tracker = SwapTracker::new(cfg, Arc::new(registry), Arc::new(Mutex::new(store)));

    let out = match args.command {
        Command::Decode { encoded } => {
            let descriptor = SwapDescriptor::decode(&encoded)
                .with_context(|| format!("decode {encoded}"))?;
            let resolved = match tracker.decode(&encoded) {
                Ok(swap) => Some(swap),
                Err(err) => {
                    tracing::warn!(error = %err, "swap endpoints not resolved");
                    None
                }
            };
            let mut out = descriptor_json(&descriptor);
            if let Some(swap) = resolved {
                out["from"] = json!({
                  "chain": swap.from.network.id,
                  "token": swap.from.token.symbol,
                });
                out["to"] = json!({
                  "chain": swap.to.network.id,
                  "token": swap.to.token.symbol,
                });
            }
            out
        }
        Command::Fee {
            from,
            to,
            amount,
            initiator,
        } => {
            let mut route = Route::parse(&from, &to)?;
            if let Some(initiator) = initiator {
                route = route.with_initiator(initiator);
            }
            let quote = tracker.quote_fee(&route, amount).context("quote fee")?;
            serde_json::to_value(quote)?
        }
        Command::ImportRules { file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("read rules {}", file.display()))?;
            let rules: Vec<Rule> = serde_json::from_str(&raw)
                .with_context(|| format!("parse rules {}", file.display()))?;
            let rules = RuleSet::new(rules);
            tracker
                .store()
                .lock()
                .expect("store mutex poisoned")
                .replace_rules(rules.rules())?;
            json!({
              "imported": rules.rules().len(),
            })
        }
        Command::Ingest {
            encoded,
            initiator,
            temporary,
        } => {
            let now = unix_now();
            let record = match (temporary, initiator) {
                (true, initiator) => tracker.ingest_temporary(&encoded, initiator, now)?,
                (false, Some(initiator)) => tracker.ingest_request(&encoded, &initiator, now)?,
                (false, None) => anyhow::bail!("--initiator is required unless --temporary"),
            };
            view_json(&tracker.view_of(record, now)?)
        }
        Command::Apply {
            swap_id,
            update_json,
        } => {
            let update: SwapUpdate =
                serde_json::from_str(&update_json).context("parse update json")?;
            let changed = tracker.apply_update(&swap_id, &update)?.is_some();
            let view = tracker
                .view(&swap_id, unix_now())?
                .with_context(|| format!("swap not found: {swap_id}"))?;
            let mut out = view_json(&view);
            out["changed"] = json!(changed);
            out
        }
        Command::Show { swap_id } => {
            let view = tracker
                .view(&swap_id, unix_now())?
                .with_context(|| format!("swap not found: {swap_id}"))?;
            view_json(&view)
        }
        Command::Replay { file } => replay(&tracker, &file).await?,
        Command::Mark {
            swap_id,
            flag,
            unset,
        } => {
            tracker
                .store()
                .lock()
                .expect("store mutex poisoned")
                .set_flag(&swap_id, flag.into(), !unset)?;
            json!({
              "swap_id": swap_id,
              "flag": format!("{flag:?}"),
              "value": !unset,
            })
        }
        Command::Locked { page } => {
            let swaps = tracker
                .store()
                .lock()
                .expect("store mutex poisoned")
                .list_locked(page.into())?;
            list_json(&swaps)
        }
        Command::NeedRelease { page } => {
            let swaps = tracker
                .store()
                .lock()
                .expect("store mutex poisoned")
                .list_need_release(page.into())?;
            list_json(&swaps)
        }
        Command::Modified { page } => {
            let swaps = tracker
                .store()
                .lock()
                .expect("store mutex poisoned")
                .list_modified(page.into())?;
            list_json(&swaps)
        }
        Command::Address { address, page } => {
            let swaps = tracker
                .store()
                .lock()
                .expect("store mutex poisoned")
                .list_by_address(&address, page.into())?;
            list_json(&swaps)
        }
    };

    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

async fn replay<R: Registry>(tracker: &SwapTracker<R>, file: &Path) -> Result<Value> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("read replay file {}", file.display()))?;
    let mut lines = Vec::new();
    for (n, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let line: ReplayLine = serde_json::from_str(line)
            .with_context(|| format!("parse replay line {}", n + 1))?;
        lines.push(line);
    }

    let hub = UpdateHub::new();
    let mut trackers = BTreeMap::new();
    for line in &lines {
        if trackers.contains_key(&line.swap_id) {
            continue;
        }
        let record = tracker
            .store()
            .lock()
            .expect("store mutex poisoned")
            .get_swap(&line.swap_id)?
            .with_context(|| format!("swap not found: {}", line.swap_id))?;
        if !live::needs_subscription(&record) {
            tracing::info!(swap_id = %record.id, "swap already settled; not subscribing");
            continue;
        }
        let subscription = hub.subscribe("replay", &line.swap_id);
        let (_snapshots, handle) = live::spawn_tracker(record, subscription);
        trackers.insert(line.swap_id.clone(), handle);
    }

    let (mut applied, mut ignored) = (0usize, 0usize);
    for line in lines {
        let update = SwapUpdate::new(line.status, line.data);
        match tracker.apply_update(&line.swap_id, &update)? {
            Some(_) => applied += 1,
            None => ignored += 1,
        }
        hub.publish(&line.swap_id, &update);
    }
    drop(hub);

    let now = unix_now();
    let mut swaps = Vec::new();
    for (swap_id, handle) in trackers {
        let record = handle
            .await
            .with_context(|| format!("join tracker for {swap_id}"))?;
        swaps.push(json!({
          "swap_id": swap_id,
          "status": record.status_at(now).as_str(),
          "settled": record.is_settled(),
          "events": record.events.len(),
        }));
    }

    Ok(json!({
      "applied": applied,
      "ignored": ignored,
      "swaps": swaps,
    }))
}

fn descriptor_json(d: &SwapDescriptor) -> Value {
    json!({
      "version": d.version,
      "encoding": format!("{:?}", d.encoding()),
      "amount": d.amount,
      "fee": d.fee,
      "service_fee": d.service_fee(),
      "in_amount": d.in_amount(),
      "out_amount": d.out_amount(),
      "expire_ts": d.expire_ts,
      "in_chain": format!("{:#06x}", d.in_chain),
      "in_token": d.in_token,
      "out_chain": format!("{:#06x}", d.out_chain),
      "out_token": d.out_token,
      "salt": json!({
        "header": format!("{:04x}", d.salt.header),
        "data": format!("{:016x}", d.salt.data),
        "fee_waived": d.salt.fee_waived(),
        "channel": format!("{:?}", d.salt.channel()),
        "to_contract": d.salt.to_contract(),
        "non_typed_signing": d.salt.non_typed_signing(),
        "event_qualified": d.salt.is_event_qualified(),
      }),
      "core_token": d.core_token().map(|c| json!({
        "amount_for_core_token": c.amount_for_core_token,
        "core_token_price": c.core_token_price,
        "core_token_amount": c.core_token_amount,
      })),
      "uct": d.is_uct(),
      "share_segment": d.share_segment(),
      "trailer": (!d.trailer.is_empty()).then_some(&d.trailer),
    })
}

fn view_json(view: &SwapView) -> Value {
    json!({
      "swap_id": view.record.id,
      "status": view.status.as_str(),
      "needs_action": view.status.needs_action(),
      "route": view.swap.as_ref().map(|s| format!(
        "{}:{} -> {}:{}",
        s.from.network.id, s.from.token.symbol, s.to.network.id, s.to.token.symbol
      )),
      "fee": view.fee,
      "record": view.record,
    })
}

fn list_json(swaps: &[SwapRecord]) -> Value {
    let now = unix_now();
    json!({
      "swaps": swaps.iter().map(|s| json!({
        "swap_id": s.id,
        "encoded": s.encoded,
        "status": s.status_at(now).as_str(),
        "created": s.created,
        "initiator": s.from_to.initiator,
        "recipient": s.from_to.recipient,
      })).collect::<Vec<_>>(),
    })
}

