//! SQLite-backed ledger store
//!
//! Every settlement unit runs inside one sqlx transaction. Commits are also
//! funnelled through a process-local write gate so the read-then-write
//! sequence (existing record, payer balance, writes) never races another
//! writer into `SQLITE_BUSY`.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parley_types::{
    AgentId, Amount, CommitKind, EntryId, InfluenceEvent, InfluenceEventId, InfluenceReason,
    LedgerTransfer, SessionId, SettlementFailure, SettlementRecord, SettlementStatus, TransferId,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, Transaction};
use tokio::sync::Mutex;
use tracing::debug;

use crate::store::{plan_commit, validate_unit, CommitPlan};
use crate::{
    CommitMode, CommitOutcome, EntryReason, EntryType, JournalEntry, LedgerStore, LedgerUnit,
    StoreError, StoreResult,
};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS balances (
        agent_id TEXT PRIMARY KEY,
        balance  INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS journal_entries (
        entry_id      TEXT PRIMARY KEY,
        agent_id      TEXT NOT NULL,
        entry_type    TEXT NOT NULL,
        amount        INTEGER NOT NULL,
        balance_after INTEGER NOT NULL,
        session_id    TEXT,
        created_at    TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_journal_agent ON journal_entries (agent_id)",
    "CREATE INDEX IF NOT EXISTS idx_journal_session ON journal_entries (session_id)",
    r#"
    CREATE TABLE IF NOT EXISTS transfers (
        transfer_id  TEXT PRIMARY KEY,
        session_id   TEXT NOT NULL UNIQUE,
        from_agent   TEXT NOT NULL,
        to_agent     TEXT NOT NULL,
        amount       INTEGER NOT NULL,
        committed_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS influence_events (
        event_id    TEXT PRIMARY KEY,
        agent_id    TEXT NOT NULL,
        delta       REAL NOT NULL,
        reason      TEXT NOT NULL,
        session_id  TEXT NOT NULL,
        recorded_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_influence_agent ON influence_events (agent_id)",
    "CREATE INDEX IF NOT EXISTS idx_influence_session ON influence_events (session_id)",
    r#"
    CREATE TABLE IF NOT EXISTS settlements (
        session_id  TEXT PRIMARY KEY,
        kind        TEXT NOT NULL,
        status      TEXT NOT NULL,
        failure     TEXT,
        attempts    INTEGER NOT NULL,
        recorded_at TEXT NOT NULL
    )
    "#,
];

/// Ledger store persisted in SQLite
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    write_gate: std::sync::Arc<Mutex<()>>,
}

impl SqliteStore {
    /// Connect to a SQLite database URL (e.g. `sqlite://parley.db`) and
    /// create the schema if missing
    pub async fn connect(url: &str, max_connections: u32) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    /// A private in-memory database. Uses a single pinned connection, since
    /// every SQLite memory connection is its own database.
    pub async fn in_memory() -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    /// Wrap an existing pool and run the schema migration
    pub async fn with_pool(pool: SqlitePool) -> StoreResult<Self> {
        let store = Self {
            pool,
            write_gate: std::sync::Arc::new(Mutex::new(())),
        };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> StoreResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!("Ledger schema ready");
        Ok(())
    }

    async fn balance_in(tx: &mut Transaction<'_, Sqlite>, agent: &AgentId) -> StoreResult<Amount> {
        let row = sqlx::query("SELECT balance FROM balances WHERE agent_id = ?")
            .bind(agent.to_string())
            .fetch_optional(&mut **tx)
            .await?;
        match row {
            Some(row) => from_db_amount(row.try_get("balance")?),
            None => Ok(Amount::zero()),
        }
    }

    async fn post_in(
        tx: &mut Transaction<'_, Sqlite>,
        account: &AgentId,
        entry_type: EntryType,
        amount: Amount,
        balance_after: Amount,
        reason: EntryReason,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO balances (agent_id, balance)
            VALUES (?, ?)
            ON CONFLICT (agent_id) DO UPDATE
            SET balance = excluded.balance
            "#,
        )
        .bind(account.to_string())
        .bind(to_db_amount(balance_after)?)
        .execute(&mut **tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO journal_entries
                (entry_id, agent_id, entry_type, amount, balance_after, session_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(EntryId::new().to_string())
        .bind(account.to_string())
        .bind(entry_type.as_str())
        .bind(to_db_amount(amount)?)
        .bind(to_db_amount(balance_after)?)
        .bind(reason.session_id().map(|s| s.to_string()))
        .bind(at.to_rfc3339())
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    async fn settlement_in(
        tx: &mut Transaction<'_, Sqlite>,
        session_id: &SessionId,
    ) -> StoreResult<Option<SettlementRecord>> {
        let row = sqlx::query(
            "SELECT session_id, kind, status, failure, attempts, recorded_at FROM settlements WHERE session_id = ?",
        )
        .bind(session_id.to_string())
        .fetch_optional(&mut **tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let transfer = sqlx::query(
            "SELECT transfer_id, session_id, from_agent, to_agent, amount, committed_at FROM transfers WHERE session_id = ?",
        )
        .bind(session_id.to_string())
        .fetch_optional(&mut **tx)
        .await?
        .map(|r| transfer_from_row(&r))
        .transpose()?;

        let influence = sqlx::query(
            "SELECT event_id, agent_id, delta, reason, session_id, recorded_at FROM influence_events WHERE session_id = ? ORDER BY rowid",
        )
        .bind(session_id.to_string())
        .fetch_all(&mut **tx)
        .await?;
        let influence = influence
            .iter()
            .map(influence_from_row)
            .collect::<StoreResult<Vec<_>>>()?;

        let failure: Option<String> = row.try_get("failure")?;
        let failure = failure
            .map(|f| serde_json::from_str::<SettlementFailure>(&f))
            .transpose()?;
        let kind: String = row.try_get("kind")?;
        let status: String = row.try_get("status")?;
        let attempts: i64 = row.try_get("attempts")?;

        Ok(Some(SettlementRecord {
            session_id: *session_id,
            kind: CommitKind::parse(&kind).ok_or_else(|| corrupt("kind", &kind))?,
            status: SettlementStatus::parse(&status).ok_or_else(|| corrupt("status", &status))?,
            transfer,
            influence,
            failure,
            attempts: u32::try_from(attempts).map_err(|_| corrupt("attempts", &attempts.to_string()))?,
            recorded_at: parse_time(&row.try_get::<String, _>("recorded_at")?)?,
        }))
    }

    async fn write_record(tx: &mut Transaction<'_, Sqlite>, record: &SettlementRecord) -> StoreResult<()> {
        let failure = record
            .failure
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        sqlx::query(
            r#"
            INSERT INTO settlements (session_id, kind, status, failure, attempts, recorded_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (session_id) DO UPDATE
            SET status = excluded.status, failure = excluded.failure,
                attempts = excluded.attempts, recorded_at = excluded.recorded_at
            "#,
        )
        .bind(record.session_id.to_string())
        .bind(record.kind.as_str())
        .bind(record.status.as_str())
        .bind(failure)
        .bind(i64::from(record.attempts))
        .bind(record.recorded_at.to_rfc3339())
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn apply_in(
        tx: &mut Transaction<'_, Sqlite>,
        record: &SettlementRecord,
        payer_balance: Amount,
    ) -> StoreResult<()> {
        if let Some(t) = &record.transfer {
            let debit_after = payer_balance
                .checked_sub(t.amount)
                .ok_or_else(|| StoreError::InvalidAmount {
                    message: "Balance underflow".to_string(),
                })?;
            let credit_after = Self::balance_in(tx, &t.to_agent)
                .await?
                .checked_add(t.amount)
                .ok_or_else(|| StoreError::InvalidAmount {
                    message: "Balance overflow".to_string(),
                })?;
            let reason = EntryReason::Settlement {
                session_id: t.session_id,
            };
            Self::post_in(tx, &t.from_agent, EntryType::Debit, t.amount, debit_after, reason, t.committed_at).await?;
            Self::post_in(tx, &t.to_agent, EntryType::Credit, t.amount, credit_after, reason, t.committed_at).await?;

            sqlx::query(
                r#"
                INSERT INTO transfers (transfer_id, session_id, from_agent, to_agent, amount, committed_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(t.transfer_id.to_string())
            .bind(t.session_id.to_string())
            .bind(t.from_agent.to_string())
            .bind(t.to_agent.to_string())
            .bind(to_db_amount(t.amount)?)
            .bind(t.committed_at.to_rfc3339())
            .execute(&mut **tx)
            .await?;
        }

        for event in &record.influence {
            sqlx::query(
                r#"
                INSERT INTO influence_events (event_id, agent_id, delta, reason, session_id, recorded_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(event.event_id.to_string())
            .bind(event.agent_id.to_string())
            .bind(event.delta)
            .bind(event.reason.as_str())
            .bind(event.session_id.to_string())
            .bind(event.recorded_at.to_rfc3339())
            .execute(&mut **tx)
            .await?;
        }

        Self::write_record(tx, record).await
    }
}

#[async_trait]
impl LedgerStore for SqliteStore {
    async fn balance(&self, agent: &AgentId) -> StoreResult<Amount> {
        let row = sqlx::query("SELECT balance FROM balances WHERE agent_id = ?")
            .bind(agent.to_string())
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => from_db_amount(row.try_get("balance")?),
            None => Ok(Amount::zero()),
        }
    }

    async fn total_balance(&self) -> StoreResult<u128> {
        let rows = sqlx::query("SELECT balance FROM balances")
            .fetch_all(&self.pool)
            .await?;
        let mut total: u128 = 0;
        for row in rows {
            total += from_db_amount(row.try_get("balance")?)?.0 as u128;
        }
        Ok(total)
    }

    async fn fund(&self, agent: &AgentId, amount: Amount, at: DateTime<Utc>) -> StoreResult<Amount> {
        if amount.is_zero() {
            return Err(StoreError::InvalidAmount {
                message: "Amount must be greater than zero".to_string(),
            });
        }

        let _gate = self.write_gate.lock().await;
        let mut tx = self.pool.begin().await?;
        let new_balance = Self::balance_in(&mut tx, agent)
            .await?
            .checked_add(amount)
            .ok_or_else(|| StoreError::InvalidAmount {
                message: "Balance overflow".to_string(),
            })?;
        Self::post_in(&mut tx, agent, EntryType::Credit, amount, new_balance, EntryReason::Funding, at).await?;
        tx.commit().await?;
        Ok(new_balance)
    }

    async fn commit(&self, unit: LedgerUnit, mode: CommitMode) -> StoreResult<CommitOutcome> {
        validate_unit(&unit)?;

        let _gate = self.write_gate.lock().await;
        let mut tx = self.pool.begin().await?;

        let existing = Self::settlement_in(&mut tx, &unit.session_id).await?;
        let payer_balance = match &unit.transfer {
            Some(t) => Self::balance_in(&mut tx, &t.from).await?,
            None => Amount::zero(),
        };

        // Dropping `tx` without commit rolls back every statement below
        let outcome = match plan_commit(&unit, mode, existing, payer_balance) {
            CommitPlan::Replay(record) => {
                return Ok(CommitOutcome {
                    record,
                    replayed: true,
                })
            }
            CommitPlan::Fail(record) => {
                Self::write_record(&mut tx, &record).await?;
                CommitOutcome {
                    record,
                    replayed: false,
                }
            }
            CommitPlan::Apply(record) => {
                Self::apply_in(&mut tx, &record, payer_balance).await?;
                CommitOutcome {
                    record,
                    replayed: false,
                }
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn settlement(&self, session_id: &SessionId) -> StoreResult<Option<SettlementRecord>> {
        let mut tx = self.pool.begin().await?;
        let record = Self::settlement_in(&mut tx, session_id).await?;
        tx.commit().await?;
        Ok(record)
    }

    async fn influence_events(&self, agent: &AgentId) -> StoreResult<Vec<InfluenceEvent>> {
        let rows = sqlx::query(
            "SELECT event_id, agent_id, delta, reason, session_id, recorded_at FROM influence_events WHERE agent_id = ? ORDER BY rowid",
        )
        .bind(agent.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(influence_from_row).collect()
    }

    async fn journal(&self, agent: &AgentId) -> StoreResult<Vec<JournalEntry>> {
        let rows = sqlx::query(
            "SELECT entry_id, agent_id, entry_type, amount, balance_after, session_id, created_at FROM journal_entries WHERE agent_id = ? ORDER BY rowid",
        )
        .bind(agent.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(journal_from_row).collect()
    }

    async fn session_journal(&self, session_id: &SessionId) -> StoreResult<Vec<JournalEntry>> {
        let rows = sqlx::query(
            "SELECT entry_id, agent_id, entry_type, amount, balance_after, session_id, created_at FROM journal_entries WHERE session_id = ? ORDER BY rowid",
        )
        .bind(session_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(journal_from_row).collect()
    }
}

// ============================================================================
// Row mapping
// ============================================================================

fn corrupt(field: &str, value: &str) -> StoreError {
    StoreError::Corrupt {
        message: format!("unexpected {} value {:?}", field, value),
    }
}

fn to_db_amount(amount: Amount) -> StoreResult<i64> {
    i64::try_from(amount.0).map_err(|_| StoreError::InvalidAmount {
        message: format!("{} exceeds the storable range", amount),
    })
}

fn from_db_amount(value: i64) -> StoreResult<Amount> {
    u64::try_from(value)
        .map(Amount::new)
        .map_err(|_| corrupt("amount", &value.to_string()))
}

fn parse_time(s: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| corrupt("timestamp", s))
}

fn parse_agent(s: &str) -> StoreResult<AgentId> {
    AgentId::parse(s).map_err(|_| corrupt("agent_id", s))
}

fn parse_session(s: &str) -> StoreResult<SessionId> {
    SessionId::parse(s).map_err(|_| corrupt("session_id", s))
}

fn transfer_from_row(row: &SqliteRow) -> StoreResult<LedgerTransfer> {
    let transfer_id: String = row.try_get("transfer_id")?;
    Ok(LedgerTransfer {
        transfer_id: TransferId::parse(&transfer_id).map_err(|_| corrupt("transfer_id", &transfer_id))?,
        from_agent: parse_agent(&row.try_get::<String, _>("from_agent")?)?,
        to_agent: parse_agent(&row.try_get::<String, _>("to_agent")?)?,
        amount: from_db_amount(row.try_get("amount")?)?,
        session_id: parse_session(&row.try_get::<String, _>("session_id")?)?,
        committed_at: parse_time(&row.try_get::<String, _>("committed_at")?)?,
    })
}

fn influence_from_row(row: &SqliteRow) -> StoreResult<InfluenceEvent> {
    let event_id: String = row.try_get("event_id")?;
    let reason: String = row.try_get("reason")?;
    Ok(InfluenceEvent {
        event_id: InfluenceEventId::parse(&event_id).map_err(|_| corrupt("event_id", &event_id))?,
        agent_id: parse_agent(&row.try_get::<String, _>("agent_id")?)?,
        delta: row.try_get("delta")?,
        reason: InfluenceReason::parse(&reason).ok_or_else(|| corrupt("reason", &reason))?,
        session_id: parse_session(&row.try_get::<String, _>("session_id")?)?,
        recorded_at: parse_time(&row.try_get::<String, _>("recorded_at")?)?,
    })
}

fn journal_from_row(row: &SqliteRow) -> StoreResult<JournalEntry> {
    let entry_id: String = row.try_get("entry_id")?;
    let entry_type: String = row.try_get("entry_type")?;
    let session_id: Option<String> = row.try_get("session_id")?;
    let reason = match session_id {
        Some(s) => EntryReason::Settlement {
            session_id: parse_session(&s)?,
        },
        None => EntryReason::Funding,
    };
    Ok(JournalEntry {
        entry_id: EntryId::parse(&entry_id).map_err(|_| corrupt("entry_id", &entry_id))?,
        account: parse_agent(&row.try_get::<String, _>("agent_id")?)?,
        entry_type: EntryType::parse(&entry_type).ok_or_else(|| corrupt("entry_type", &entry_type))?,
        amount: from_db_amount(row.try_get("amount")?)?,
        balance_after: from_db_amount(row.try_get("balance_after")?)?,
        reason,
        created_at: parse_time(&row.try_get::<String, _>("created_at")?)?,
    })
}
