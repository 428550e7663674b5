mod support {
    pub mod fixtures;
}

use std::path::Path;

use anyhow::{Context as _, Result};
use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;

use support::fixtures::{self, ALICE};

fn cli(dir: &Path) -> Result<Command> {
    let registry = fixtures::write_registry(dir)?;
    let mut cmd = Command::cargo_bin("swap_tracker").context("find swap_tracker binary")?;
    cmd.arg("--store-path")
        .arg(dir.join("store.sqlite3"))
        .arg("--registry")
        .arg(registry);
    Ok(cmd)
}

fn run_json(cmd: &mut Command) -> Result<Value> {
    let out = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&out).context("parse cli output")
}

#[test]
fn decode_prints_descriptor_fields() -> Result<()> {
    let dir = tempfile::tempdir().context("create tempdir")?;
    let encoded = fixtures::encoded(110_000_000, 1_900_000_000)?;

    let out = run_json(cli(dir.path())?.args(["decode", &encoded]))?;
    assert_eq!(out["amount"], 110_000_000);
    assert_eq!(out["encoding"], "Standard");
    assert_eq!(out["from"]["chain"], "eth");
    assert_eq!(out["to"]["token"], "USDT");
    assert_eq!(out["salt"]["channel"], "Api");
    Ok(())
}

#[test]
fn decode_rejects_garbage() -> Result<()> {
    let dir = tempfile::tempdir().context("create tempdir")?;
    cli(dir.path())?
        .args(["decode", "0xnothex"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("too short"));
    Ok(())
}

#[test]
fn rules_and_fee_quote() -> Result<()> {
    let dir = tempfile::tempdir().context("create tempdir")?;
    let rules = dir.path().join("rules.json");
    std::fs::write(
        &rules,
        r#"[{"from": "eth", "to": "bnb", "limit": 1000, "fee": [{"rate": 1000}]}]"#,
    )?;

    let out = run_json(cli(dir.path())?.arg("import-rules").arg(&rules))?;
    assert_eq!(out["imported"], 1);

    let out = run_json(cli(dir.path())?.args([
        "fee",
        "--from",
        "eth:usdc",
        "--to",
        "bnb:usdt",
        "--amount",
        "110000000",
    ]))?;
    assert_eq!(out["lpFee"], 110_000);
    assert_eq!(out["totalFee"], 220_000);
    assert_eq!(out["available"], true);

    let out = run_json(cli(dir.path())?.args([
        "--service-fee-divisor",
        "0",
        "fee",
        "--from",
        "eth:usdc",
        "--to",
        "bnb:usdt",
        "--amount",
        "110000000",
    ]))?;
    assert_eq!(out["totalFee"], 110_000);
    Ok(())
}

#[test]
fn ingest_apply_show_and_replay() -> Result<()> {
    let dir = tempfile::tempdir().context("create tempdir")?;
    let encoded = fixtures::encoded(110_000_000, 4_000_000_000)?;

    let out = run_json(cli(dir.path())?.args(["ingest", &encoded, "--initiator", ALICE]))?;
    assert_eq!(out["status"], "PENDING");
    let swap_id = out["swap_id"]
        .as_str()
        .context("swap_id in ingest output")?
        .to_string();

    let out = run_json(cli(dir.path())?.args([
        "apply",
        &swap_id,
        r#"{"status":"LOCKED","data":{"hash":"0x01","ts":1700000000}}"#,
    ]))?;
    assert_eq!(out["changed"], true);
    assert_eq!(out["status"], "LOCKED");

    let locked = run_json(cli(dir.path())?.arg("locked"))?;
    assert_eq!(locked["swaps"][0]["swap_id"], swap_id.as_str());

    let replay = dir.path().join("updates.jsonl");
    std::fs::write(
        &replay,
        format!(
            "{{\"swapId\":\"{swap_id}\",\"status\":\"EXECUTED\",\"data\":{{\"hash\":\"0x02\",\"ts\":1700000100}}}}\n\
             {{\"swapId\":\"{swap_id}\",\"status\":\"EXECUTED\",\"data\":{{\"hash\":\"0x02\",\"ts\":1700000100}}}}\n\
             \n\
             {{\"swapId\":\"{swap_id}\",\"status\":\"RELEASED\",\"data\":{{\"hash\":\"0x03\",\"ts\":1700000200,\"recipient\":\"0xbob\"}}}}\n"
        ),
    )?;
    let out = run_json(cli(dir.path())?.arg("replay").arg(&replay))?;
    assert_eq!(out["applied"], 2);
    assert_eq!(out["ignored"], 1);
    assert_eq!(out["swaps"][0]["status"], "RELEASED");
    assert_eq!(out["swaps"][0]["settled"], true);

    let out = run_json(cli(dir.path())?.args(["show", &swap_id]))?;
    assert_eq!(out["status"], "RELEASED");
    assert_eq!(out["record"]["fromTo"]["recipient"], "0xbob");
    assert_eq!(out["record"]["events"].as_array().map(Vec::len), Some(3));

    let by_recipient = run_json(cli(dir.path())?.args(["address", "0xBOB"]))?;
    assert_eq!(by_recipient["swaps"].as_array().map(Vec::len), Some(1));
    Ok(())
}

#[test]
fn list_queries_validate_page_size() -> Result<()> {
    let dir = tempfile::tempdir().context("create tempdir")?;
    cli(dir.path())?
        .args(["need-release", "--size", "50"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("size cannot exceed 20"));
    Ok(())
}

#[test]
fn ingest_requires_initiator_for_requests() -> Result<()> {
    let dir = tempfile::tempdir().context("create tempdir")?;
    let encoded = fixtures::encoded(1_000_000, 4_000_000_000)?;
    cli(dir.path())?
        .args(["ingest", &encoded])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--initiator is required"));

    let out = run_json(cli(dir.path())?.args(["ingest", &encoded, "--temporary"]))?;
    assert_eq!(out["status"], "TEMPORARY");
    Ok(())
}
