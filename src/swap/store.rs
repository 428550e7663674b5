use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context as _, Result};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension as _, Row, params};

use super::merge;
use super::{EventKind, FromTo, SwapRecord, SwapUpdate};
use crate::fee::waiver::waiver_key;
use crate::fee::{Rule, RuleSet, WaiverState};

pub const MAX_PAGE_SIZE: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub size: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self { page: 0, size: 10 }
    }
}

impl Page {
    pub fn validate(&self, max_size: u32) -> Result<()> {
        anyhow::ensure!(self.size >= 1, "invalid size value: {}", self.size);
        anyhow::ensure!(
            self.size <= max_size,
            "size cannot exceed {max_size}: {}",
            self.size
        );
        Ok(())
    }

    fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        let skip = self.page as usize * self.size as usize;
        items.into_iter().skip(skip).take(self.size as usize).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    Disabled,
    Modified,
    ErrorConfirmed,
}

impl Flag {
    fn column(self) -> &'static str {
        match self {
            Flag::Disabled => "disabled",
            Flag::Modified => "modified",
            Flag::ErrorConfirmed => "error_confirmed",
        }
    }
}

const SWAP_COLUMNS: &str = r#"
  id,
  encoded,
  events,
  created,
  temp_at,
  posted,
  bonded,
  released,
  executed,
  initiator,
  recipient,
  provider,
  disabled,
  modified,
  error_confirmed
"#;

#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    path: PathBuf,
}

impl SqliteStore {
    pub fn open(path: PathBuf) -> Result<Self> {
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create swap store dir {}", dir.display()))?;
        }

        let conn =
            Connection::open(&path).with_context(|| format!("open sqlite {}", path.display()))?;
        conn.busy_timeout(Duration::from_secs(5))
            .context("set sqlite busy_timeout")?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")
            .context("configure sqlite pragmas")?;

        migrate(&conn).context("migrate sqlite schema")?;

        Ok(Self { conn, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn insert_swap(&mut self, record: &SwapRecord) -> Result<()> {
        let events = serde_json::to_string(&record.events).context("encode events")?;
        self.conn
            .execute(
                &format!("INSERT INTO swaps ({SWAP_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"),
                params![
                    &record.id,
                    &record.encoded,
                    events,
                    record.created,
                    record.temp_at,
                    record.posted,
                    record.bonded,
                    record.released,
                    record.executed,
                    &record.from_to.initiator,
                    &record.from_to.recipient,
                    &record.provider,
                    record.disabled,
                    record.modified,
                    record.error_confirmed,
                ],
            )
            .with_context(|| format!("insert swap {}", record.id))?;
        tracing::info!(swap_id = %record.id, temporary = record.is_temporary(), "swap recorded");
        Ok(())
    }

    pub fn get_swap(&self, swap_id: &str) -> Result<Option<SwapRecord>> {
        self.conn
            .query_row(
                &format!("SELECT {SWAP_COLUMNS} FROM swaps WHERE id = ?1"),
                params![swap_id],
                swap_from_row,
            )
            .optional()
            .with_context(|| format!("get swap {swap_id}"))
    }

    /// Persists the event-derived fields of `record`. The encoded swap and creation time never change.
    fn save_progress(conn: &Connection, record: &SwapRecord) -> Result<()> {
        let events = serde_json::to_string(&record.events).context("encode events")?;
        let rows = conn
            .execute(
                r#"
UPDATE swaps SET
  events = ?2,
  posted = ?3,
  bonded = ?4,
  released = ?5,
  executed = ?6,
  recipient = ?7,
  provider = ?8
WHERE id = ?1
"#,
                params![
                    &record.id,
                    events,
                    record.posted,
                    record.bonded,
                    record.released,
                    record.executed,
                    &record.from_to.recipient,
                    &record.provider,
                ],
            )
            .with_context(|| format!("update swap {}", record.id))?;
        anyhow::ensure!(rows == 1, "swap not found: {}", record.id);
        Ok(())
    }

    /// Merges `update` into the stored record. Returns the new snapshot, or `None` if nothing changed.
    pub fn apply_update(
        &mut self,
        swap_id: &str,
        update: &SwapUpdate,
    ) -> Result<Option<SwapRecord>> {
        let tx = self.conn.transaction().context("begin transaction")?;
        let current = tx
            .query_row(
                &format!("SELECT {SWAP_COLUMNS} FROM swaps WHERE id = ?1"),
                params![swap_id],
                swap_from_row,
            )
            .optional()
            .with_context(|| format!("get swap {swap_id}"))?
            .with_context(|| format!("swap not found: {swap_id}"))?;

        let Some(next) = merge::merge(&current, update) else {
            return Ok(None);
        };
        Self::save_progress(&tx, &next)?;
        tx.commit().context("commit swap update")?;

        tracing::info!(swap_id, status = %update.status, events = next.events.len(), "swap updated");
        Ok(Some(next))
    }

    pub fn set_flag(&mut self, swap_id: &str, flag: Flag, value: bool) -> Result<()> {
        let rows = self
            .conn
            .execute(
                &format!("UPDATE swaps SET {} = ?2 WHERE id = ?1", flag.column()),
                params![swap_id, value],
            )
            .with_context(|| format!("set {} on swap {swap_id}", flag.column()))?;
        anyhow::ensure!(rows == 1, "swap not found: {swap_id}");
        Ok(())
    }

    pub fn list_swaps(&self) -> Result<Vec<SwapRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {SWAP_COLUMNS} FROM swaps ORDER BY created DESC, id"
            ))
            .context("prepare list swaps")?;

        let mut out = Vec::new();
        let rows = stmt
            .query_map([], swap_from_row)
            .context("query list swaps")?;
        for row in rows {
            out.push(row.context("read swap row")?);
        }
        Ok(out)
    }

    fn list_where(&self, page: Page, keep: impl Fn(&SwapRecord) -> bool) -> Result<Vec<SwapRecord>> {
        page.validate(MAX_PAGE_SIZE)?;
        let swaps = self
            .list_swaps()?
            .into_iter()
            .filter(|s| keep(s))
            .collect();
        Ok(page.apply(swaps))
    }

    /// Swaps initiated by or sent to `address`, newest first.
    pub fn list_by_address(&self, address: &str, page: Page) -> Result<Vec<SwapRecord>> {
        let is = |a: &Option<String>| a.as_deref().is_some_and(|a| a.eq_ignore_ascii_case(address));
        self.list_where(page, |s| {
            !s.disabled && (is(&s.from_to.initiator) || is(&s.from_to.recipient))
        })
    }

    /// Swaps whose liquidity lock was neither released nor unlocked.
    pub fn list_locked(&self, page: Page) -> Result<Vec<SwapRecord>> {
        self.list_where(page, |s| {
            !s.disabled
                && has_event(s, &EventKind::Locked)
                && !has_event(s, &EventKind::Released)
                && !has_event(s, &EventKind::Unlocked)
        })
    }

    /// Executed swaps still waiting for their release.
    pub fn list_need_release(&self, page: Page) -> Result<Vec<SwapRecord>> {
        self.list_where(page, |s| {
            s.released.is_none()
                && !s.disabled
                && !s.modified
                && !s.error_confirmed
                && has_event(s, &EventKind::Executed)
                && !has_event(s, &EventKind::Released)
                && !has_event(s, &EventKind::Cancelled)
        })
    }

    pub fn list_modified(&self, page: Page) -> Result<Vec<SwapRecord>> {
        self.list_where(page, |s| s.modified && !s.disabled)
    }

    pub fn replace_rules(&mut self, rules: &[Rule]) -> Result<()> {
        let tx = self.conn.transaction().context("begin transaction")?;
        tx.execute("DELETE FROM rules", [])
            .context("clear rules")?;
        for rule in rules {
            let doc = serde_json::to_string(rule).context("encode rule")?;
            tx.execute(
                "INSERT INTO rules (priority, doc) VALUES (?1, ?2)",
                params![rule.priority, doc],
            )
            .context("insert rule")?;
        }
        tx.commit().context("commit rules")?;
        tracing::info!(count = rules.len(), "fee rules replaced");
        Ok(())
    }

    pub fn load_rules(&self) -> Result<RuleSet> {
        let mut stmt = self
            .conn
            .prepare("SELECT doc FROM rules ORDER BY id")
            .context("prepare load rules")?;
        let docs = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .context("query rules")?;

        let mut rules = Vec::new();
        for doc in docs {
            let doc = doc.context("read rule row")?;
            rules.push(serde_json::from_str(&doc).context("decode rule")?);
        }
        Ok(RuleSet::new(rules))
    }

    pub fn get_waiver(&self, address: &str, day: NaiveDate) -> Result<WaiverState> {
        let key = waiver_key(address, day);
        let found = self
            .conn
            .query_row(
                "SELECT waived, swaps FROM fee_waives WHERE id = ?1",
                params![&key],
                |row| {
                    let waived: i64 = row.get(0)?;
                    let swaps: i64 = row.get(1)?;
                    Ok(WaiverState {
                        day,
                        waived: non_negative(waived, 0)?,
                        swaps: u32::try_from(swaps).map_err(|_| {
                            rusqlite::Error::FromSqlConversionFailure(
                                1,
                                rusqlite::types::Type::Integer,
                                format!("invalid swaps {swaps}").into(),
                            )
                        })?,
                    })
                },
            )
            .optional()
            .with_context(|| format!("get fee waiver {key}"))?;
        Ok(found.unwrap_or_else(|| WaiverState::empty(day)))
    }

    pub fn record_waiver(&mut self, address: &str, day: NaiveDate, amount: u64) -> Result<WaiverState> {
        let mut state = self.get_waiver(address, day)?;
        state.record(amount);
        let key = waiver_key(address, day);
        self.conn
            .execute(
                r#"
INSERT INTO fee_waives (id, waived, swaps) VALUES (?1, ?2, ?3)
ON CONFLICT(id) DO UPDATE SET waived = excluded.waived, swaps = excluded.swaps
"#,
                params![&key, state.waived, state.swaps],
            )
            .with_context(|| format!("record fee waiver {key}"))?;
        Ok(state)
    }
}

fn has_event(record: &SwapRecord, kind: &EventKind) -> bool {
    record
        .events
        .iter()
        .any(|e| !e.is_failed() && e.kind() == Some(kind))
}

fn non_negative(value: i64, col: usize) -> rusqlite::Result<u64> {
    u64::try_from(value).map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            col,
            rusqlite::types::Type::Integer,
            format!("negative value {value}").into(),
        )
    })
}

fn optional_ts(row: &Row<'_>, col: usize) -> rusqlite::Result<Option<u64>> {
    row.get::<_, Option<i64>>(col)?
        .map(|v| non_negative(v, col))
        .transpose()
}

fn swap_from_row(row: &Row<'_>) -> rusqlite::Result<SwapRecord> {
    let events_json: String = row.get(2)?;
    let events = serde_json::from_str(&events_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let created: i64 = row.get(3)?;

    Ok(SwapRecord {
        id: row.get(0)?,
        encoded: row.get(1)?,
        events,
        created: non_negative(created, 3)?,
        temp_at: optional_ts(row, 4)?,
        posted: optional_ts(row, 5)?,
        bonded: optional_ts(row, 6)?,
        released: optional_ts(row, 7)?,
        executed: optional_ts(row, 8)?,
        from_to: FromTo {
            initiator: row.get(9)?,
            recipient: row.get(10)?,
        },
        provider: row.get(11)?,
        disabled: row.get(12)?,
        modified: row.get(13)?,
        error_confirmed: row.get(14)?,
    })
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS swaps (
  id TEXT PRIMARY KEY,
  encoded TEXT NOT NULL,
  events TEXT NOT NULL,
  created INTEGER NOT NULL,
  temp_at INTEGER,
  posted INTEGER,
  bonded INTEGER,
  released INTEGER,
  executed INTEGER,
  initiator TEXT,
  recipient TEXT,
  provider TEXT,
  disabled INTEGER NOT NULL DEFAULT 0,
  modified INTEGER NOT NULL DEFAULT 0,
  error_confirmed INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS swaps_created_idx ON swaps(created);
CREATE INDEX IF NOT EXISTS swaps_initiator_idx ON swaps(initiator);
CREATE INDEX IF NOT EXISTS swaps_recipient_idx ON swaps(recipient);

CREATE TABLE IF NOT EXISTS rules (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  priority INTEGER NOT NULL,
  doc TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS fee_waives (
  id TEXT PRIMARY KEY,
  waived INTEGER NOT NULL,
  swaps INTEGER NOT NULL
);
"#,
    )
    .context("create tables")?;
    Ok(())
}
