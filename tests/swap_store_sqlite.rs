use anyhow::{Context as _, Result};

use swap_tracker::fee::waiver::utc_day;
use swap_tracker::fee::{FeeTier, Rule};
use swap_tracker::swap::store::{Flag, Page, SqliteStore};
use swap_tracker::swap::{EventData, EventKind, SwapRecord, SwapUpdate};

fn sample_swap(swap_id: &str, initiator: &str, created: u64) -> SwapRecord {
    SwapRecord::requested(
        swap_id,
        format!("encoded:{swap_id}"),
        Some(initiator.to_string()),
        created,
    )
}

fn event(kind: EventKind, hash: &str, ts: u64) -> SwapUpdate {
    SwapUpdate::new(
        kind,
        EventData {
            hash: Some(hash.to_string()),
            ts: Some(ts),
            ..EventData::default()
        },
    )
}

#[test]
fn sqlite_store_insert_get_update_list() -> Result<()> {
    let dir = tempfile::tempdir().context("create tempdir")?;
    let path = dir.path().join("swap_store.sqlite3");

    let mut store = SqliteStore::open(path).context("open sqlite store")?;

    let a = sample_swap("swap-a", "0xAlice", 100);
    store.insert_swap(&a).context("insert swap-a")?;
    let got = store
        .get_swap("swap-a")
        .context("get swap-a")?
        .context("swap-a missing")?;
    assert_eq!(got, a);

    let mut bonded = event(EventKind::Bonded, "0x01", 110);
    bonded.data.recipient = Some("0xBob".to_string());
    let next = store
        .apply_update("swap-a", &bonded)
        .context("apply bonded")?
        .context("bonded should change swap-a")?;
    assert_eq!(next.bonded, Some(110));

    let got = store
        .get_swap("swap-a")
        .context("get swap-a after update")?
        .context("swap-a missing after update")?;
    assert_eq!(got, next);
    assert_eq!(got.from_to.recipient.as_deref(), Some("0xBob"));

    assert!(
        store
            .apply_update("swap-a", &bonded)
            .context("replay bonded")?
            .is_none()
    );
    assert!(store.apply_update("swap-missing", &bonded).is_err());

    let b = sample_swap("swap-b", "0xCarol", 200);
    store.insert_swap(&b).context("insert swap-b")?;
    let c = SwapRecord::temporary("encoded:c", None, 150);
    store.insert_swap(&c).context("insert temporary swap")?;

    let all = store.list_swaps().context("list swaps")?;
    let ids: Vec<_> = all.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["swap-b", c.id.as_str(), "swap-a"]);
    assert!(all[1].is_temporary());

    Ok(())
}

#[test]
fn sqlite_store_persists_across_reopen() -> Result<()> {
    let dir = tempfile::tempdir().context("create tempdir")?;
    let path = dir.path().join("nested").join("swap_store.sqlite3");

    {
        let mut store = SqliteStore::open(path.clone()).context("open sqlite store")?;
        store
            .insert_swap(&sample_swap("swap-a", "0xAlice", 100))
            .context("insert swap-a")?;
        store
            .apply_update("swap-a", &event(EventKind::Posted, "0x01", 101))
            .context("apply posted")?;
    }

    let store = SqliteStore::open(path).context("reopen sqlite store")?;
    let got = store
        .get_swap("swap-a")
        .context("get swap-a")?
        .context("swap-a missing")?;
    assert_eq!(got.posted, Some(101));
    assert_eq!(got.events.len(), 1);
    Ok(())
}

#[test]
fn sqlite_store_operational_queries() -> Result<()> {
    let dir = tempfile::tempdir().context("create tempdir")?;
    let mut store =
        SqliteStore::open(dir.path().join("swap_store.sqlite3")).context("open sqlite store")?;

    for (id, created) in [("locked", 1), ("released", 2), ("executed", 3), ("flagged", 4)] {
        store
            .insert_swap(&sample_swap(id, "0xAlice", created))
            .with_context(|| format!("insert {id}"))?;
        store
            .apply_update(id, &event(EventKind::Locked, &format!("{id}:lock"), 10))
            .with_context(|| format!("lock {id}"))?;
    }
    store.apply_update("released", &event(EventKind::Released, "released:rel", 20))?;
    store.apply_update("executed", &event(EventKind::Executed, "executed:exe", 20))?;
    store.apply_update("flagged", &event(EventKind::Executed, "flagged:exe", 20))?;
    store.set_flag("flagged", Flag::Modified, true)?;

    let ids = |swaps: Vec<SwapRecord>| swaps.into_iter().map(|s| s.id).collect::<Vec<_>>();

    assert_eq!(
        ids(store.list_locked(Page::default())?),
        vec!["flagged", "executed", "locked"]
    );
    assert_eq!(ids(store.list_need_release(Page::default())?), vec!["executed"]);
    assert_eq!(ids(store.list_modified(Page::default())?), vec!["flagged"]);

    store.set_flag("locked", Flag::Disabled, true)?;
    assert_eq!(
        ids(store.list_locked(Page::default())?),
        vec!["flagged", "executed"]
    );
    assert!(store.set_flag("nope", Flag::ErrorConfirmed, true).is_err());
    Ok(())
}

#[test]
fn sqlite_store_lists_by_address_with_pages() -> Result<()> {
    let dir = tempfile::tempdir().context("create tempdir")?;
    let mut store =
        SqliteStore::open(dir.path().join("swap_store.sqlite3")).context("open sqlite store")?;

    for i in 0..5u64 {
        store.insert_swap(&sample_swap(&format!("alice-{i}"), "0xAlice", i))?;
    }
    store.insert_swap(&sample_swap("carol-0", "0xCarol", 10))?;
    let mut to_alice = event(EventKind::Bonded, "0xc0", 11);
    to_alice.data.recipient = Some("0xalice".to_string());
    store.apply_update("carol-0", &to_alice)?;

    let page = |page, size| Page { page, size };
    let first: Vec<_> = store
        .list_by_address("0xALICE", page(0, 2))?
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(first, vec!["carol-0", "alice-4"]);

    let last: Vec<_> = store
        .list_by_address("0xalice", page(2, 2))?
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(last, vec!["alice-1", "alice-0"]);

    assert!(store.list_by_address("0xalice", page(0, 0)).is_err());
    let err = store
        .list_by_address("0xalice", page(0, 21))
        .expect_err("oversized page");
    assert!(err.to_string().contains("cannot exceed 20"));
    Ok(())
}

#[test]
fn sqlite_store_rules_and_waivers() -> Result<()> {
    let dir = tempfile::tempdir().context("create tempdir")?;
    let mut store =
        SqliteStore::open(dir.path().join("swap_store.sqlite3")).context("open sqlite store")?;

    let mut low = Rule::new("*".parse()?, "*".parse()?);
    low.fee = vec![FeeTier {
        rate: Some(700),
        ..FeeTier::default()
    }];
    let mut high = Rule::new("eth".parse()?, "bnb:!".parse()?);
    high.priority = 9;
    store.replace_rules(&[low.clone(), high.clone()])?;

    let rules = store.load_rules()?;
    assert_eq!(rules.rules(), &[high.clone(), low.clone()]);

    store.replace_rules(std::slice::from_ref(&low))?;
    assert_eq!(store.load_rules()?.rules(), &[low]);

    let day = utc_day(1_700_000_000);
    assert_eq!(store.get_waiver("0xAlice", day)?.swaps, 0);
    store.record_waiver("0xAlice", day, 3_000_000)?;
    let state = store.record_waiver("0xalice", day, 4_000_000)?;
    assert_eq!((state.waived, state.swaps), (7_000_000, 2));
    assert_eq!(store.get_waiver("0xALICE", day)?, state);

    let next_day = day.succ_opt().context("next day")?;
    assert_eq!(store.get_waiver("0xalice", next_day)?.waived, 0);
    Ok(())
}
