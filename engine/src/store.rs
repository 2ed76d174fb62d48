//! Dual-backend storage.
//!
//! Postgres in production, SQLite for tests and single-host deployments,
//! behind one transaction surface. Mutual exclusion differs per backend:
//! SQLite transactions open IMMEDIATE (whole-database write lock), while
//! Postgres row-locks the period's bets with `FOR UPDATE NOWAIT`. Lock
//! contention on either backend surfaces as [`StoreError::LockTimeout`],
//! which callers treat as retryable with no side effects.
//!
//! Schema notes: the period identifier is TEXT in every table; draw
//! positions are stored as a comma-separated entrant list; monetary columns
//! are integer cents.

use std::path::Path;
use std::time::Duration;

use postgres::error::SqlState;
use postgres::NoTls;
use rusqlite::{params, OptionalExtension, TransactionBehavior};
use thiserror::Error;

use gridline_types::{
    Agent, ActorKind, Bet, DrawResult, Market, Member, PeriodId, RecordKind, TransactionRecord,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database lock contention")]
    LockTimeout,
    #[error("row not found: {0}")]
    Missing(String),
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Sqlite(rusqlite::Error),
    #[error(transparent)]
    Postgres(postgres::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(code, _) = &err {
            if matches!(
                code.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ) {
                return StoreError::LockTimeout;
            }
        }
        StoreError::Sqlite(err)
    }
}

impl From<postgres::Error> for StoreError {
    fn from(err: postgres::Error) -> Self {
        if let Some(code) = err.code() {
            if code == &SqlState::LOCK_NOT_AVAILABLE || code == &SqlState::QUERY_CANCELED {
                return StoreError::LockTimeout;
            }
        }
        StoreError::Postgres(err)
    }
}

fn to_i64(value: u64, label: &str) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::Corrupt(format!("{label} out of range: {value}")))
}

fn to_u64(value: i64, label: &str) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::Corrupt(format!("{label} negative: {value}")))
}

fn encode_positions(positions: &[u8]) -> String {
    let mut out = String::with_capacity(positions.len() * 3);
    for (idx, number) in positions.iter().enumerate() {
        if idx > 0 {
            out.push(',');
        }
        out.push_str(&number.to_string());
    }
    out
}

fn decode_positions(raw: &str) -> Result<Vec<u8>, StoreError> {
    raw.split(',')
        .map(|token| {
            token
                .parse::<u8>()
                .map_err(|_| StoreError::Corrupt(format!("bad draw positions: {raw}")))
        })
        .collect()
}

fn parse_period(raw: &str) -> Result<PeriodId, StoreError> {
    PeriodId::new(raw).map_err(|err| StoreError::Corrupt(format!("bad period {raw:?}: {err}")))
}

fn parse_market(raw: &str) -> Result<Market, StoreError> {
    Market::parse(raw).map_err(|err| StoreError::Corrupt(err.to_string()))
}

const SCHEMA_SQLITE: &str = "
    CREATE TABLE IF NOT EXISTS agents (
        id INTEGER PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        parent_id INTEGER,
        level INTEGER NOT NULL,
        market TEXT NOT NULL,
        rebate_bp INTEGER NOT NULL,
        balance_cents INTEGER NOT NULL DEFAULT 0
    );
    CREATE TABLE IF NOT EXISTS members (
        id INTEGER PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        balance_cents INTEGER NOT NULL DEFAULT 0,
        agent_id INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS bets (
        id INTEGER PRIMARY KEY,
        member_id INTEGER NOT NULL,
        period TEXT NOT NULL,
        bet_type TEXT NOT NULL,
        bet_value TEXT NOT NULL,
        position INTEGER,
        stake_cents INTEGER NOT NULL,
        odds_centi INTEGER NOT NULL DEFAULT 0,
        settled INTEGER NOT NULL DEFAULT 0,
        win INTEGER NOT NULL DEFAULT 0,
        payout_cents INTEGER NOT NULL DEFAULT 0,
        needs_review INTEGER NOT NULL DEFAULT 0,
        settled_at_ms INTEGER
    );
    CREATE INDEX IF NOT EXISTS bets_period_settled ON bets(period, settled);
    CREATE TABLE IF NOT EXISTS draw_results (
        period TEXT PRIMARY KEY,
        positions TEXT NOT NULL,
        drawn_at_ms INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS transaction_records (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        actor_kind TEXT NOT NULL,
        actor_id INTEGER NOT NULL,
        kind TEXT NOT NULL,
        amount_cents INTEGER NOT NULL,
        balance_before_cents INTEGER NOT NULL,
        balance_after_cents INTEGER NOT NULL,
        period TEXT,
        member_id INTEGER,
        description TEXT NOT NULL,
        created_at_ms INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS records_period_kind ON transaction_records(period, kind);
";

const SCHEMA_POSTGRES: &str = "
    CREATE TABLE IF NOT EXISTS agents (
        id BIGINT PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        parent_id BIGINT,
        level INTEGER NOT NULL,
        market TEXT NOT NULL,
        rebate_bp INTEGER NOT NULL,
        balance_cents BIGINT NOT NULL DEFAULT 0
    );
    CREATE TABLE IF NOT EXISTS members (
        id BIGINT PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        balance_cents BIGINT NOT NULL DEFAULT 0,
        agent_id BIGINT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS bets (
        id BIGSERIAL PRIMARY KEY,
        member_id BIGINT NOT NULL,
        period TEXT NOT NULL,
        bet_type TEXT NOT NULL,
        bet_value TEXT NOT NULL,
        position INTEGER,
        stake_cents BIGINT NOT NULL,
        odds_centi INTEGER NOT NULL DEFAULT 0,
        settled BOOLEAN NOT NULL DEFAULT FALSE,
        win BOOLEAN NOT NULL DEFAULT FALSE,
        payout_cents BIGINT NOT NULL DEFAULT 0,
        needs_review BOOLEAN NOT NULL DEFAULT FALSE,
        settled_at_ms BIGINT
    );
    CREATE INDEX IF NOT EXISTS bets_period_settled ON bets(period, settled);
    CREATE TABLE IF NOT EXISTS draw_results (
        period TEXT PRIMARY KEY,
        positions TEXT NOT NULL,
        drawn_at_ms BIGINT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS transaction_records (
        id BIGSERIAL PRIMARY KEY,
        actor_kind TEXT NOT NULL,
        actor_id BIGINT NOT NULL,
        kind TEXT NOT NULL,
        amount_cents BIGINT NOT NULL,
        balance_before_cents BIGINT NOT NULL,
        balance_after_cents BIGINT NOT NULL,
        period TEXT,
        member_id BIGINT,
        description TEXT NOT NULL,
        created_at_ms BIGINT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS records_period_kind ON transaction_records(period, kind);
";

pub enum Store {
    Sqlite(rusqlite::Connection),
    Postgres(postgres::Client),
}

impl Store {
    pub fn open_sqlite(path: &Path) -> Result<Self, StoreError> {
        let conn = rusqlite::Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        conn.execute_batch(SCHEMA_SQLITE)?;
        Ok(Store::Sqlite(conn))
    }

    pub fn open_sqlite_in_memory() -> Result<Self, StoreError> {
        let conn = rusqlite::Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQLITE)?;
        Ok(Store::Sqlite(conn))
    }

    pub fn open_postgres(url: &str) -> Result<Self, StoreError> {
        let mut client = postgres::Client::connect(url, NoTls)?;
        client.batch_execute(SCHEMA_POSTGRES)?;
        Ok(Store::Postgres(client))
    }

    /// Begin a write transaction.
    ///
    /// SQLite takes the write lock up front (IMMEDIATE) so that a concurrent
    /// writer fails fast as a lock timeout instead of at commit.
    pub fn begin(&mut self) -> Result<StoreTx<'_>, StoreError> {
        match self {
            Store::Sqlite(conn) => Ok(StoreTx::Sqlite(
                conn.transaction_with_behavior(TransactionBehavior::Immediate)?,
            )),
            Store::Postgres(client) => Ok(StoreTx::Postgres(client.transaction()?)),
        }
    }
}

pub enum StoreTx<'a> {
    Sqlite(rusqlite::Transaction<'a>),
    Postgres(postgres::Transaction<'a>),
}

fn bet_from_sqlite(row: &rusqlite::Row<'_>) -> rusqlite::Result<Bet> {
    let period_raw: String = row.get(2)?;
    let period = PeriodId::new(&period_raw).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(err))
    })?;
    let position: Option<i64> = row.get(5)?;
    let settled_at: Option<i64> = row.get(12)?;
    Ok(Bet {
        id: row.get(0)?,
        member_id: row.get(1)?,
        period,
        bet_type: row.get(3)?,
        bet_value: row.get(4)?,
        position: position.and_then(|p| u8::try_from(p).ok()),
        stake_cents: row.get(6)?,
        odds_centi: row.get::<_, i64>(7)? as u32,
        settled: row.get(8)?,
        win: row.get(9)?,
        payout_cents: row.get(10)?,
        needs_review: row.get(11)?,
        settled_at_ms: settled_at.and_then(|ms| u64::try_from(ms).ok()),
    })
}

fn bet_from_postgres(row: &postgres::Row) -> Result<Bet, StoreError> {
    let period_raw: String = row.get(2);
    let position: Option<i32> = row.get(5);
    let odds: i32 = row.get(7);
    let settled_at: Option<i64> = row.get(12);
    Ok(Bet {
        id: row.get(0),
        member_id: row.get(1),
        period: parse_period(&period_raw)?,
        bet_type: row.get(3),
        bet_value: row.get(4),
        position: position.and_then(|p| u8::try_from(p).ok()),
        stake_cents: row.get(6),
        odds_centi: odds as u32,
        settled: row.get(8),
        win: row.get(9),
        payout_cents: row.get(10),
        needs_review: row.get(11),
        settled_at_ms: settled_at.and_then(|ms| u64::try_from(ms).ok()),
    })
}

const BET_COLUMNS: &str = "id, member_id, period, bet_type, bet_value, position, stake_cents, \
                           odds_centi, settled, win, payout_cents, needs_review, settled_at_ms";

impl StoreTx<'_> {
    pub fn commit(self) -> Result<(), StoreError> {
        match self {
            StoreTx::Sqlite(tx) => tx.commit()?,
            StoreTx::Postgres(tx) => tx.commit()?,
        }
        Ok(())
    }

    /// Record a draw result, write-once. Returns false if the period already
    /// has one (the existing row wins; draws are immutable).
    pub fn insert_draw_result(&mut self, draw: &DrawResult) -> Result<bool, StoreError> {
        let positions = encode_positions(&draw.positions);
        let drawn_at = to_i64(draw.drawn_at_ms, "drawn_at_ms")?;
        match self {
            StoreTx::Sqlite(tx) => {
                let changed = tx.execute(
                    "INSERT OR IGNORE INTO draw_results (period, positions, drawn_at_ms) VALUES (?, ?, ?)",
                    params![draw.period.as_str(), positions, drawn_at],
                )?;
                Ok(changed > 0)
            }
            StoreTx::Postgres(tx) => {
                let changed = tx.execute(
                    "INSERT INTO draw_results (period, positions, drawn_at_ms) VALUES ($1, $2, $3)
                     ON CONFLICT (period) DO NOTHING",
                    &[&draw.period.as_str(), &positions, &drawn_at],
                )?;
                Ok(changed > 0)
            }
        }
    }

    pub fn draw_result(&mut self, period: &PeriodId) -> Result<Option<DrawResult>, StoreError> {
        let row = match self {
            StoreTx::Sqlite(tx) => tx
                .query_row(
                    "SELECT positions, drawn_at_ms FROM draw_results WHERE period = ?",
                    params![period.as_str()],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
                )
                .optional()?,
            StoreTx::Postgres(tx) => tx
                .query_opt(
                    "SELECT positions, drawn_at_ms FROM draw_results WHERE period = $1",
                    &[&period.as_str()],
                )?
                .map(|row| (row.get::<_, String>(0), row.get::<_, i64>(1))),
        };
        match row {
            Some((positions, drawn_at)) => Ok(Some(DrawResult {
                period: period.clone(),
                positions: decode_positions(&positions)?,
                drawn_at_ms: to_u64(drawn_at, "drawn_at_ms")?,
            })),
            None => Ok(None),
        }
    }

    /// Select and lock every unsettled bet for a period, oldest first.
    pub fn lock_unsettled_bets(&mut self, period: &PeriodId) -> Result<Vec<Bet>, StoreError> {
        match self {
            StoreTx::Sqlite(tx) => {
                // The IMMEDIATE transaction already holds the write lock.
                let sql = format!(
                    "SELECT {BET_COLUMNS} FROM bets WHERE period = ? AND settled = 0 ORDER BY id"
                );
                let mut stmt = tx.prepare(&sql)?;
                let rows = stmt.query_map(params![period.as_str()], bet_from_sqlite)?;
                let mut bets = Vec::new();
                for row in rows {
                    bets.push(row?);
                }
                Ok(bets)
            }
            StoreTx::Postgres(tx) => {
                let sql = format!(
                    "SELECT {BET_COLUMNS} FROM bets WHERE period = $1 AND settled = FALSE
                     ORDER BY id FOR UPDATE NOWAIT"
                );
                let rows = tx.query(&sql, &[&period.as_str()])?;
                rows.iter().map(bet_from_postgres).collect()
            }
        }
    }

    pub fn mark_bet_settled(
        &mut self,
        id: i64,
        win: bool,
        payout_cents: i64,
        needs_review: bool,
        settled_at_ms: u64,
    ) -> Result<(), StoreError> {
        let settled_at = to_i64(settled_at_ms, "settled_at_ms")?;
        let changed = match self {
            StoreTx::Sqlite(tx) => tx.execute(
                "UPDATE bets SET settled = 1, win = ?, payout_cents = ?, needs_review = ?,
                 settled_at_ms = ? WHERE id = ?",
                params![win, payout_cents, needs_review, settled_at, id],
            )?,
            StoreTx::Postgres(tx) => tx.execute(
                "UPDATE bets SET settled = TRUE, win = $1, payout_cents = $2, needs_review = $3,
                 settled_at_ms = $4 WHERE id = $5",
                &[&win, &payout_cents, &needs_review, &settled_at, &id],
            )? as usize,
        };
        if changed == 0 {
            return Err(StoreError::Missing(format!("bet {id}")));
        }
        Ok(())
    }

    pub fn bet(&mut self, id: i64) -> Result<Option<Bet>, StoreError> {
        match self {
            StoreTx::Sqlite(tx) => {
                let sql = format!("SELECT {BET_COLUMNS} FROM bets WHERE id = ?");
                Ok(tx.query_row(&sql, params![id], bet_from_sqlite).optional()?)
            }
            StoreTx::Postgres(tx) => {
                let sql = format!("SELECT {BET_COLUMNS} FROM bets WHERE id = $1 FOR UPDATE");
                match tx.query_opt(&sql, &[&id])? {
                    Some(row) => Ok(Some(bet_from_postgres(&row)?)),
                    None => Ok(None),
                }
            }
        }
    }

    pub fn update_bet_outcome(
        &mut self,
        id: i64,
        win: bool,
        payout_cents: i64,
    ) -> Result<(), StoreError> {
        let changed = match self {
            StoreTx::Sqlite(tx) => tx.execute(
                "UPDATE bets SET win = ?, payout_cents = ? WHERE id = ? AND settled = 1",
                params![win, payout_cents, id],
            )?,
            StoreTx::Postgres(tx) => tx.execute(
                "UPDATE bets SET win = $1, payout_cents = $2 WHERE id = $3 AND settled = TRUE",
                &[&win, &payout_cents, &id],
            )? as usize,
        };
        if changed == 0 {
            return Err(StoreError::Missing(format!("settled bet {id}")));
        }
        Ok(())
    }

    pub fn has_settled_bets(&mut self, period: &PeriodId) -> Result<bool, StoreError> {
        match self {
            StoreTx::Sqlite(tx) => {
                let count: i64 = tx.query_row(
                    "SELECT COUNT(*) FROM bets WHERE period = ? AND settled = 1",
                    params![period.as_str()],
                    |row| row.get(0),
                )?;
                Ok(count > 0)
            }
            StoreTx::Postgres(tx) => {
                let row = tx.query_one(
                    "SELECT COUNT(*) FROM bets WHERE period = $1 AND settled = TRUE",
                    &[&period.as_str()],
                )?;
                let count: i64 = row.get(0);
                Ok(count > 0)
            }
        }
    }

    /// Total settled stake per member for a period, excluding bets flagged
    /// for manual review.
    pub fn settled_stake_by_member(
        &mut self,
        period: &PeriodId,
    ) -> Result<Vec<(i64, i64)>, StoreError> {
        match self {
            StoreTx::Sqlite(tx) => {
                let mut stmt = tx.prepare(
                    "SELECT member_id, SUM(stake_cents) FROM bets
                     WHERE period = ? AND settled = 1 AND needs_review = 0
                     GROUP BY member_id ORDER BY member_id",
                )?;
                let rows = stmt.query_map(params![period.as_str()], |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
                })?;
                let mut stakes = Vec::new();
                for row in rows {
                    stakes.push(row?);
                }
                Ok(stakes)
            }
            StoreTx::Postgres(tx) => {
                let rows = tx.query(
                    "SELECT member_id, SUM(stake_cents)::BIGINT FROM bets
                     WHERE period = $1 AND settled = TRUE AND needs_review = FALSE
                     GROUP BY member_id ORDER BY member_id",
                    &[&period.as_str()],
                )?;
                Ok(rows
                    .iter()
                    .map(|row| (row.get::<_, i64>(0), row.get::<_, i64>(1)))
                    .collect())
            }
        }
    }

    pub fn recently_settled_periods(&mut self, since_ms: u64) -> Result<Vec<PeriodId>, StoreError> {
        let since = to_i64(since_ms, "since_ms")?;
        let raw: Vec<String> = match self {
            StoreTx::Sqlite(tx) => {
                let mut stmt = tx.prepare(
                    "SELECT DISTINCT period FROM bets
                     WHERE settled = 1 AND settled_at_ms >= ? ORDER BY period",
                )?;
                let rows = stmt.query_map(params![since], |row| row.get::<_, String>(0))?;
                let mut periods = Vec::new();
                for row in rows {
                    periods.push(row?);
                }
                periods
            }
            StoreTx::Postgres(tx) => {
                let rows = tx.query(
                    "SELECT DISTINCT period FROM bets
                     WHERE settled = TRUE AND settled_at_ms >= $1 ORDER BY period",
                    &[&since],
                )?;
                rows.iter().map(|row| row.get::<_, String>(0)).collect()
            }
        };
        raw.iter().map(|period| parse_period(period)).collect()
    }

    pub fn member(&mut self, id: i64) -> Result<Option<Member>, StoreError> {
        match self {
            StoreTx::Sqlite(tx) => Ok(tx
                .query_row(
                    "SELECT id, username, balance_cents, agent_id FROM members WHERE id = ?",
                    params![id],
                    |row| {
                        Ok(Member {
                            id: row.get(0)?,
                            username: row.get(1)?,
                            balance_cents: row.get(2)?,
                            agent_id: row.get(3)?,
                        })
                    },
                )
                .optional()?),
            StoreTx::Postgres(tx) => Ok(tx
                .query_opt(
                    "SELECT id, username, balance_cents, agent_id FROM members WHERE id = $1",
                    &[&id],
                )?
                .map(|row| Member {
                    id: row.get(0),
                    username: row.get(1),
                    balance_cents: row.get(2),
                    agent_id: row.get(3),
                })),
        }
    }

    /// Read a member balance for update; the row stays locked until commit.
    pub fn member_balance(&mut self, id: i64) -> Result<i64, StoreError> {
        match self {
            StoreTx::Sqlite(tx) => tx
                .query_row(
                    "SELECT balance_cents FROM members WHERE id = ?",
                    params![id],
                    |row| row.get(0),
                )
                .optional()?
                .ok_or_else(|| StoreError::Missing(format!("member {id}"))),
            StoreTx::Postgres(tx) => tx
                .query_opt(
                    "SELECT balance_cents FROM members WHERE id = $1 FOR UPDATE NOWAIT",
                    &[&id],
                )?
                .map(|row| row.get(0))
                .ok_or_else(|| StoreError::Missing(format!("member {id}"))),
        }
    }

    pub fn set_member_balance(&mut self, id: i64, balance_cents: i64) -> Result<(), StoreError> {
        let changed = match self {
            StoreTx::Sqlite(tx) => tx.execute(
                "UPDATE members SET balance_cents = ? WHERE id = ?",
                params![balance_cents, id],
            )?,
            StoreTx::Postgres(tx) => tx.execute(
                "UPDATE members SET balance_cents = $1 WHERE id = $2",
                &[&balance_cents, &id],
            )? as usize,
        };
        if changed == 0 {
            return Err(StoreError::Missing(format!("member {id}")));
        }
        Ok(())
    }

    pub fn agent(&mut self, id: i64) -> Result<Option<Agent>, StoreError> {
        match self {
            StoreTx::Sqlite(tx) => {
                let row = tx
                    .query_row(
                        "SELECT id, username, parent_id, level, market, rebate_bp, balance_cents
                         FROM agents WHERE id = ?",
                        params![id],
                        |row| {
                            Ok((
                                row.get::<_, i64>(0)?,
                                row.get::<_, String>(1)?,
                                row.get::<_, Option<i64>>(2)?,
                                row.get::<_, i64>(3)?,
                                row.get::<_, String>(4)?,
                                row.get::<_, i64>(5)?,
                                row.get::<_, i64>(6)?,
                            ))
                        },
                    )
                    .optional()?;
                match row {
                    Some((id, username, parent_id, level, market, rebate_bp, balance_cents)) => {
                        Ok(Some(Agent {
                            id,
                            username,
                            parent_id,
                            level: level as u32,
                            market: parse_market(&market)?,
                            rebate_bp: rebate_bp as u16,
                            balance_cents,
                        }))
                    }
                    None => Ok(None),
                }
            }
            StoreTx::Postgres(tx) => {
                match tx.query_opt(
                    "SELECT id, username, parent_id, level, market, rebate_bp, balance_cents
                     FROM agents WHERE id = $1",
                    &[&id],
                )? {
                    Some(row) => {
                        let market: String = row.get(4);
                        let level: i32 = row.get(3);
                        let rebate_bp: i32 = row.get(5);
                        Ok(Some(Agent {
                            id: row.get(0),
                            username: row.get(1),
                            parent_id: row.get(2),
                            level: level as u32,
                            market: parse_market(&market)?,
                            rebate_bp: rebate_bp as u16,
                            balance_cents: row.get(6),
                        }))
                    }
                    None => Ok(None),
                }
            }
        }
    }

    /// Read an agent balance for update; the row stays locked until commit.
    pub fn agent_balance(&mut self, id: i64) -> Result<i64, StoreError> {
        match self {
            StoreTx::Sqlite(tx) => tx
                .query_row(
                    "SELECT balance_cents FROM agents WHERE id = ?",
                    params![id],
                    |row| row.get(0),
                )
                .optional()?
                .ok_or_else(|| StoreError::Missing(format!("agent {id}"))),
            StoreTx::Postgres(tx) => tx
                .query_opt(
                    "SELECT balance_cents FROM agents WHERE id = $1 FOR UPDATE NOWAIT",
                    &[&id],
                )?
                .map(|row| row.get(0))
                .ok_or_else(|| StoreError::Missing(format!("agent {id}"))),
        }
    }

    pub fn set_agent_balance(&mut self, id: i64, balance_cents: i64) -> Result<(), StoreError> {
        let changed = match self {
            StoreTx::Sqlite(tx) => tx.execute(
                "UPDATE agents SET balance_cents = ? WHERE id = ?",
                params![balance_cents, id],
            )?,
            StoreTx::Postgres(tx) => tx.execute(
                "UPDATE agents SET balance_cents = $1 WHERE id = $2",
                &[&balance_cents, &id],
            )? as usize,
        };
        if changed == 0 {
            return Err(StoreError::Missing(format!("agent {id}")));
        }
        Ok(())
    }

    pub fn insert_record(&mut self, record: &TransactionRecord) -> Result<(), StoreError> {
        let created_at = to_i64(record.created_at_ms, "created_at_ms")?;
        let period = record.period.as_ref().map(|p| p.as_str().to_string());
        match self {
            StoreTx::Sqlite(tx) => {
                tx.execute(
                    "INSERT INTO transaction_records
                     (actor_kind, actor_id, kind, amount_cents, balance_before_cents,
                      balance_after_cents, period, member_id, description, created_at_ms)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    params![
                        record.actor.as_str(),
                        record.actor_id,
                        record.kind.as_str(),
                        record.amount_cents,
                        record.balance_before_cents,
                        record.balance_after_cents,
                        period,
                        record.member_id,
                        record.description,
                        created_at,
                    ],
                )?;
            }
            StoreTx::Postgres(tx) => {
                tx.execute(
                    "INSERT INTO transaction_records
                     (actor_kind, actor_id, kind, amount_cents, balance_before_cents,
                      balance_after_cents, period, member_id, description, created_at_ms)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
                    &[
                        &record.actor.as_str(),
                        &record.actor_id,
                        &record.kind.as_str(),
                        &record.amount_cents,
                        &record.balance_before_cents,
                        &record.balance_after_cents,
                        &period,
                        &record.member_id,
                        &record.description,
                        &created_at,
                    ],
                )?;
            }
        }
        Ok(())
    }

    /// The exactly-once guard: does this period already have rebate audit
    /// rows under its canonical text?
    pub fn has_rebate_records(&mut self, period: &PeriodId) -> Result<bool, StoreError> {
        self.count_rebate_records(period, None).map(|count| count > 0)
    }

    /// Per-member variant of the guard, used inside each chain transaction.
    pub fn has_member_rebate(
        &mut self,
        period: &PeriodId,
        member_id: i64,
    ) -> Result<bool, StoreError> {
        self.count_rebate_records(period, Some(member_id))
            .map(|count| count > 0)
    }

    fn count_rebate_records(
        &mut self,
        period: &PeriodId,
        member_id: Option<i64>,
    ) -> Result<i64, StoreError> {
        match self {
            StoreTx::Sqlite(tx) => {
                let count = match member_id {
                    Some(member) => tx.query_row(
                        "SELECT COUNT(*) FROM transaction_records
                         WHERE period = ? AND kind = 'rebate' AND member_id = ?",
                        params![period.as_str(), member],
                        |row| row.get(0),
                    )?,
                    None => tx.query_row(
                        "SELECT COUNT(*) FROM transaction_records
                         WHERE period = ? AND kind = 'rebate'",
                        params![period.as_str()],
                        |row| row.get(0),
                    )?,
                };
                Ok(count)
            }
            StoreTx::Postgres(tx) => {
                let row = match member_id {
                    Some(member) => tx.query_one(
                        "SELECT COUNT(*) FROM transaction_records
                         WHERE period = $1 AND kind = 'rebate' AND member_id = $2",
                        &[&period.as_str(), &member],
                    )?,
                    None => tx.query_one(
                        "SELECT COUNT(*) FROM transaction_records
                         WHERE period = $1 AND kind = 'rebate'",
                        &[&period.as_str()],
                    )?,
                };
                Ok(row.get(0))
            }
        }
    }

    /// Members that already have rebate rows for a period.
    pub fn rebated_member_ids(&mut self, period: &PeriodId) -> Result<Vec<i64>, StoreError> {
        match self {
            StoreTx::Sqlite(tx) => {
                let mut stmt = tx.prepare(
                    "SELECT DISTINCT member_id FROM transaction_records
                     WHERE period = ? AND kind = 'rebate' AND member_id IS NOT NULL
                     ORDER BY member_id",
                )?;
                let rows = stmt.query_map(params![period.as_str()], |row| row.get::<_, i64>(0))?;
                let mut members = Vec::new();
                for row in rows {
                    members.push(row?);
                }
                Ok(members)
            }
            StoreTx::Postgres(tx) => {
                let rows = tx.query(
                    "SELECT DISTINCT member_id FROM transaction_records
                     WHERE period = $1 AND kind = 'rebate' AND member_id IS NOT NULL
                     ORDER BY member_id",
                    &[&period.as_str()],
                )?;
                Ok(rows.iter().map(|row| row.get::<_, i64>(0)).collect())
            }
        }
    }

    /// All rebate audit rows for a period, insertion order.
    pub fn rebate_records(&mut self, period: &PeriodId) -> Result<Vec<TransactionRecord>, StoreError> {
        const COLUMNS: &str = "id, actor_kind, actor_id, kind, amount_cents, balance_before_cents, \
                               balance_after_cents, period, member_id, description, created_at_ms";
        let raw: Vec<(i64, String, i64, String, i64, i64, i64, Option<String>, Option<i64>, String, i64)> =
            match self {
                StoreTx::Sqlite(tx) => {
                    let sql = format!(
                        "SELECT {COLUMNS} FROM transaction_records
                         WHERE period = ? AND kind = 'rebate' ORDER BY id"
                    );
                    let mut stmt = tx.prepare(&sql)?;
                    let rows = stmt.query_map(params![period.as_str()], |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                            row.get(5)?,
                            row.get(6)?,
                            row.get(7)?,
                            row.get(8)?,
                            row.get(9)?,
                            row.get(10)?,
                        ))
                    })?;
                    let mut records = Vec::new();
                    for row in rows {
                        records.push(row?);
                    }
                    records
                }
                StoreTx::Postgres(tx) => {
                    let sql = format!(
                        "SELECT {COLUMNS} FROM transaction_records
                         WHERE period = $1 AND kind = 'rebate' ORDER BY id"
                    );
                    tx.query(&sql, &[&period.as_str()])?
                        .iter()
                        .map(|row| {
                            (
                                row.get(0),
                                row.get(1),
                                row.get(2),
                                row.get(3),
                                row.get(4),
                                row.get(5),
                                row.get(6),
                                row.get(7),
                                row.get(8),
                                row.get(9),
                                row.get(10),
                            )
                        })
                        .collect()
                }
            };

        raw.into_iter()
            .map(
                |(id, actor, actor_id, kind, amount, before, after, period_raw, member_id, description, created_at)| {
                    let actor = match actor.as_str() {
                        "member" => ActorKind::Member,
                        "agent" => ActorKind::Agent,
                        other => {
                            return Err(StoreError::Corrupt(format!("bad actor kind {other:?}")))
                        }
                    };
                    let kind = RecordKind::parse(&kind)
                        .map_err(|err| StoreError::Corrupt(err.to_string()))?;
                    let period = match period_raw {
                        Some(raw) => Some(parse_period(&raw)?),
                        None => None,
                    };
                    Ok(TransactionRecord {
                        id,
                        actor,
                        actor_id,
                        kind,
                        amount_cents: amount,
                        balance_before_cents: before,
                        balance_after_cents: after,
                        period,
                        member_id,
                        description,
                        created_at_ms: to_u64(created_at, "created_at_ms")?,
                    })
                },
            )
            .collect()
    }

    // Seeding helpers for fixtures and back-office tooling. Bet placement
    // itself (stake debits) happens upstream of this crate.

    pub fn insert_agent(&mut self, agent: &Agent) -> Result<(), StoreError> {
        match self {
            StoreTx::Sqlite(tx) => {
                tx.execute(
                    "INSERT INTO agents (id, username, parent_id, level, market, rebate_bp, balance_cents)
                     VALUES (?, ?, ?, ?, ?, ?, ?)",
                    params![
                        agent.id,
                        agent.username,
                        agent.parent_id,
                        i64::from(agent.level),
                        agent.market.as_str(),
                        i64::from(agent.rebate_bp),
                        agent.balance_cents,
                    ],
                )?;
            }
            StoreTx::Postgres(tx) => {
                tx.execute(
                    "INSERT INTO agents (id, username, parent_id, level, market, rebate_bp, balance_cents)
                     VALUES ($1, $2, $3, $4, $5, $6, $7)",
                    &[
                        &agent.id,
                        &agent.username,
                        &agent.parent_id,
                        &(agent.level as i32),
                        &agent.market.as_str(),
                        &(i32::from(agent.rebate_bp)),
                        &agent.balance_cents,
                    ],
                )?;
            }
        }
        Ok(())
    }

    pub fn insert_member(&mut self, member: &Member) -> Result<(), StoreError> {
        match self {
            StoreTx::Sqlite(tx) => {
                tx.execute(
                    "INSERT INTO members (id, username, balance_cents, agent_id) VALUES (?, ?, ?, ?)",
                    params![member.id, member.username, member.balance_cents, member.agent_id],
                )?;
            }
            StoreTx::Postgres(tx) => {
                tx.execute(
                    "INSERT INTO members (id, username, balance_cents, agent_id) VALUES ($1, $2, $3, $4)",
                    &[&member.id, &member.username, &member.balance_cents, &member.agent_id],
                )?;
            }
        }
        Ok(())
    }

    /// Insert a bet and return its generated id.
    pub fn insert_bet(&mut self, bet: &Bet) -> Result<i64, StoreError> {
        let settled_at = match bet.settled_at_ms {
            Some(ms) => Some(to_i64(ms, "settled_at_ms")?),
            None => None,
        };
        match self {
            StoreTx::Sqlite(tx) => {
                tx.execute(
                    "INSERT INTO bets (member_id, period, bet_type, bet_value, position, stake_cents,
                     odds_centi, settled, win, payout_cents, needs_review, settled_at_ms)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    params![
                        bet.member_id,
                        bet.period.as_str(),
                        bet.bet_type,
                        bet.bet_value,
                        bet.position.map(i64::from),
                        bet.stake_cents,
                        i64::from(bet.odds_centi),
                        bet.settled,
                        bet.win,
                        bet.payout_cents,
                        bet.needs_review,
                        settled_at,
                    ],
                )?;
                Ok(tx.last_insert_rowid())
            }
            StoreTx::Postgres(tx) => {
                let row = tx.query_one(
                    "INSERT INTO bets (member_id, period, bet_type, bet_value, position, stake_cents,
                     odds_centi, settled, win, payout_cents, needs_review, settled_at_ms)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) RETURNING id",
                    &[
                        &bet.member_id,
                        &bet.period.as_str(),
                        &bet.bet_type,
                        &bet.bet_value,
                        &bet.position.map(i32::from),
                        &bet.stake_cents,
                        &(bet.odds_centi as i32),
                        &bet.settled,
                        &bet.win,
                        &bet.payout_cents,
                        &bet.needs_review,
                        &settled_at,
                    ],
                )?;
                Ok(row.get(0))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positions_round_trip() {
        let positions = vec![3, 6, 1, 2, 4, 5, 7, 8, 9, 10];
        let encoded = encode_positions(&positions);
        assert_eq!(encoded, "3,6,1,2,4,5,7,8,9,10");
        assert_eq!(decode_positions(&encoded).unwrap(), positions);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode_positions("3,banana,1"),
            Err(StoreError::Corrupt(_))
        ));
    }

    #[test]
    fn test_draw_result_write_once() {
        let mut store = Store::open_sqlite_in_memory().unwrap();
        let period = PeriodId::new("20240801-1").unwrap();
        let draw = DrawResult::new(period.clone(), vec![3, 6, 1, 2, 4, 5, 7, 8, 9, 10], 5).unwrap();
        let mut tx = store.begin().unwrap();
        assert!(tx.insert_draw_result(&draw).unwrap());

        // The second insert is ignored; the original row wins.
        let altered = DrawResult::new(period.clone(), vec![10, 9, 8, 7, 6, 5, 4, 3, 2, 1], 9).unwrap();
        assert!(!tx.insert_draw_result(&altered).unwrap());
        let stored = tx.draw_result(&period).unwrap().unwrap();
        assert_eq!(stored.positions, draw.positions);
        tx.commit().unwrap();
    }

    #[test]
    fn test_busy_sqlite_maps_to_lock_timeout() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert!(matches!(StoreError::from(busy), StoreError::LockTimeout));

        let other = rusqlite::Error::QueryReturnedNoRows;
        assert!(matches!(StoreError::from(other), StoreError::Sqlite(_)));
    }

    #[test]
    fn test_missing_member_balance() {
        let mut store = Store::open_sqlite_in_memory().unwrap();
        let mut tx = store.begin().unwrap();
        assert!(matches!(tx.member_balance(99), Err(StoreError::Missing(_))));
    }
}
