//! SQLite-backed store.

use std::path::Path;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};
use uuid::Uuid;

use murmur_core::{generate_referral_code, Address, TxHash};

use crate::models::{Confession, TipRecord, User};
use crate::StoreError;

/// Store for confessions, users, and the tip ledger.
///
/// The connection sits behind a mutex; counter updates are single SQL
/// arithmetic statements, so concurrent increments on the same row can
/// never lose an update.
pub struct TipStore {
    conn: Mutex<Connection>,
}

impl TipStore {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(path)?;
        info!("store opened at {}", path.display());
        Self::init(conn)
    }

    /// Open an in-memory database (tests).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS confessions (
                id TEXT PRIMARY KEY,
                owner_address TEXT NOT NULL,
                body TEXT NOT NULL,
                category TEXT NOT NULL DEFAULT 'general',
                flagged INTEGER NOT NULL DEFAULT 0,
                total_tips INTEGER NOT NULL DEFAULT 0,
                tip_count INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS users (
                address TEXT PRIMARY KEY,
                total_tips_given INTEGER NOT NULL DEFAULT 0,
                total_tips_received INTEGER NOT NULL DEFAULT 0,
                referral_code TEXT NOT NULL UNIQUE,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS tips (
                id TEXT PRIMARY KEY,
                confession_id TEXT NOT NULL REFERENCES confessions(id),
                payer_address TEXT NOT NULL,
                amount INTEGER NOT NULL,
                tx_hash TEXT NOT NULL UNIQUE,
                created_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_tips_confession ON tips(confession_id);
            CREATE INDEX IF NOT EXISTS idx_tips_payer ON tips(payer_address);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // ------------------------------------------------------------------
    // Confessions
    // ------------------------------------------------------------------

    /// Insert a new confession and return it.
    pub fn insert_confession(
        &self,
        owner: &Address,
        body: &str,
        category: &str,
        flagged: bool,
    ) -> Result<Confession, StoreError> {
        let conn = self.conn.lock().unwrap();
        let id = Uuid::new_v4().to_string();
        let now = unix_now();
        conn.execute(
            "INSERT INTO confessions (id, owner_address, body, category, flagged, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![id, owner.as_str(), body, category, flagged as i64, now],
        )?;
        debug!(confession = %id, category, "confession inserted");
        Ok(Confession {
            id,
            owner_address: owner.clone(),
            body: body.to_string(),
            category: category.to_string(),
            flagged,
            total_tips: 0,
            tip_count: 0,
            created_at: now,
        })
    }

    /// Load a confession by id.
    pub fn confession(&self, id: &str) -> Result<Option<Confession>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let confession = conn
            .query_row(
                "SELECT id, owner_address, body, category, flagged, total_tips, tip_count, created_at
                 FROM confessions WHERE id = ?1",
                [id],
                row_to_confession,
            )
            .optional()?;
        Ok(confession)
    }

    /// The most-tipped confessions, unflagged only.
    pub fn top_confessions(&self, limit: u32) -> Result<Vec<Confession>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, owner_address, body, category, flagged, total_tips, tip_count, created_at
             FROM confessions WHERE flagged = 0
             ORDER BY total_tips DESC, created_at DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map([limit], row_to_confession)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    /// Load a user by address.
    pub fn user(&self, address: &Address) -> Result<Option<User>, StoreError> {
        let conn = self.conn.lock().unwrap();
        user_inner(&conn, address)
    }

    /// Find a user or create it with a fresh referral code.
    ///
    /// Idempotent: a concurrent create of the same address is absorbed by
    /// the `ON CONFLICT DO NOTHING`, and the loser reads the winner's row.
    pub fn get_or_create_user(&self, address: &Address) -> Result<User, StoreError> {
        let conn = self.conn.lock().unwrap();
        if let Some(user) = user_inner(&conn, address)? {
            return Ok(user);
        }

        let now = unix_now();
        loop {
            let code = generate_referral_code();
            match conn.execute(
                "INSERT INTO users (address, total_tips_given, total_tips_received, referral_code, created_at)
                 VALUES (?1, 0, 0, ?2, ?3)
                 ON CONFLICT(address) DO NOTHING",
                params![address.as_str(), code, now],
            ) {
                Ok(_) => break,
                // Referral code collision: regenerate and retry.
                Err(e) if is_unique_violation(&e) => continue,
                Err(e) => return Err(e.into()),
            }
        }

        user_inner(&conn, address)?
            .ok_or_else(|| StoreError::MissingRow(format!("user {}", address)))
    }

    // ------------------------------------------------------------------
    // Tip ledger
    // ------------------------------------------------------------------

    /// Idempotency lookup: the tip previously recorded for this reference.
    pub fn find_tip_by_reference(
        &self,
        reference: &TxHash,
    ) -> Result<Option<TipRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let tip = conn
            .query_row(
                "SELECT id, confession_id, payer_address, amount, tx_hash, created_at
                 FROM tips WHERE tx_hash = ?1",
                [reference.as_str()],
                row_to_tip,
            )
            .optional()?;
        Ok(tip)
    }

    /// Append a tip to the ledger.
    ///
    /// Fails with [`StoreError::DuplicateReference`] if the reference is
    /// already recorded, including when a concurrent insert won the race
    /// after this caller's idempotency check passed.
    pub fn insert_tip(
        &self,
        confession_id: &str,
        payer: &Address,
        amount: u64,
        reference: &TxHash,
    ) -> Result<TipRecord, StoreError> {
        let conn = self.conn.lock().unwrap();
        let id = Uuid::new_v4().to_string();
        let now = unix_now();
        let result = conn.execute(
            "INSERT INTO tips (id, confession_id, payer_address, amount, tx_hash, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id,
                confession_id,
                payer.as_str(),
                amount as i64,
                reference.as_str(),
                now
            ],
        );
        match result {
            Ok(_) => {
                debug!(reference = %reference, confession = confession_id, amount, "tip recorded");
                Ok(TipRecord {
                    id,
                    confession_id: confession_id.to_string(),
                    payer_address: payer.clone(),
                    amount,
                    tx_hash: reference.clone(),
                    created_at: now,
                })
            }
            Err(e) if is_unique_violation(&e) => Err(StoreError::DuplicateReference),
            Err(e) => Err(e.into()),
        }
    }

    /// Total number of ledger entries.
    pub fn tip_count(&self) -> Result<u64, StoreError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM tips", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ------------------------------------------------------------------
    // Aggregate increments
    // ------------------------------------------------------------------

    /// Add `amount` and one tip to a confession's counters.
    ///
    /// A single arithmetic UPDATE: the addition happens inside the storage
    /// layer, never as a read-modify-write in application code.
    pub fn increment_confession_tips(
        &self,
        confession_id: &str,
        amount: u64,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE confessions SET total_tips = total_tips + ?1, tip_count = tip_count + 1
             WHERE id = ?2",
            params![amount as i64, confession_id],
        )?;
        if changed == 0 {
            return Err(StoreError::MissingRow(format!(
                "confession {}",
                confession_id
            )));
        }
        Ok(())
    }

    /// Add `amount` to a user's tips-given counter.
    pub fn increment_user_tips_given(
        &self,
        address: &Address,
        amount: u64,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE users SET total_tips_given = total_tips_given + ?1 WHERE address = ?2",
            params![amount as i64, address.as_str()],
        )?;
        if changed == 0 {
            return Err(StoreError::MissingRow(format!("user {}", address)));
        }
        Ok(())
    }

    /// Add `amount` to a user's tips-received counter.
    pub fn increment_user_tips_received(
        &self,
        address: &Address,
        amount: u64,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE users SET total_tips_received = total_tips_received + ?1 WHERE address = ?2",
            params![amount as i64, address.as_str()],
        )?;
        if changed == 0 {
            return Err(StoreError::MissingRow(format!("user {}", address)));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Reconciliation
    // ------------------------------------------------------------------

    /// Recompute confession counters from the ledger. Returns the number of
    /// rows that had drifted.
    ///
    /// The sanctioned repair path for the window where a crash lands
    /// between the ledger insert and the aggregate increments.
    pub fn reconcile_confession_aggregates(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE confessions SET
                total_tips = COALESCE((SELECT SUM(amount) FROM tips WHERE tips.confession_id = confessions.id), 0),
                tip_count  = (SELECT COUNT(*) FROM tips WHERE tips.confession_id = confessions.id)
             WHERE total_tips <> COALESCE((SELECT SUM(amount) FROM tips WHERE tips.confession_id = confessions.id), 0)
                OR tip_count  <> (SELECT COUNT(*) FROM tips WHERE tips.confession_id = confessions.id)",
            [],
        )?;
        Ok(changed)
    }

    /// Recompute user counters from the ledger. Returns the number of rows
    /// that had drifted.
    pub fn reconcile_user_aggregates(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE users SET
                total_tips_given = COALESCE((SELECT SUM(amount) FROM tips WHERE tips.payer_address = users.address), 0),
                total_tips_received = COALESCE((SELECT SUM(t.amount) FROM tips t
                    JOIN confessions c ON t.confession_id = c.id
                    WHERE c.owner_address = users.address), 0)
             WHERE total_tips_given <> COALESCE((SELECT SUM(amount) FROM tips WHERE tips.payer_address = users.address), 0)
                OR total_tips_received <> COALESCE((SELECT SUM(t.amount) FROM tips t
                    JOIN confessions c ON t.confession_id = c.id
                    WHERE c.owner_address = users.address), 0)",
            [],
        )?;
        Ok(changed)
    }
}

fn user_inner(conn: &Connection, address: &Address) -> Result<Option<User>, StoreError> {
    let user = conn
        .query_row(
            "SELECT address, total_tips_given, total_tips_received, referral_code, created_at
             FROM users WHERE address = ?1",
            [address.as_str()],
            row_to_user,
        )
        .optional()?;
    Ok(user)
}

fn row_to_confession(row: &Row<'_>) -> rusqlite::Result<Confession> {
    Ok(Confession {
        id: row.get(0)?,
        owner_address: parse_address(row, 1)?,
        body: row.get(2)?,
        category: row.get(3)?,
        flagged: row.get::<_, i64>(4)? != 0,
        total_tips: row.get::<_, i64>(5)? as u64,
        tip_count: row.get::<_, i64>(6)? as u64,
        created_at: row.get(7)?,
    })
}

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        address: parse_address(row, 0)?,
        total_tips_given: row.get::<_, i64>(1)? as u64,
        total_tips_received: row.get::<_, i64>(2)? as u64,
        referral_code: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn row_to_tip(row: &Row<'_>) -> rusqlite::Result<TipRecord> {
    let tx_hash: String = row.get(4)?;
    let tx_hash = TxHash::parse(&tx_hash).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(TipRecord {
        id: row.get(0)?,
        confession_id: row.get(1)?,
        payer_address: parse_address(row, 2)?,
        amount: row.get::<_, i64>(3)? as u64,
        tx_hash,
        created_at: row.get(5)?,
    })
}

fn parse_address(row: &Row<'_>, idx: usize) -> rusqlite::Result<Address> {
    let raw: String = row.get(idx)?;
    Address::parse(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Current unix timestamp in seconds.
fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(fill: char) -> Address {
        Address::parse(&format!("0x{}", fill.to_string().repeat(40))).unwrap()
    }

    fn tx_hash(fill: char) -> TxHash {
        TxHash::parse(&format!("0x{}", fill.to_string().repeat(64))).unwrap()
    }

    fn store_with_confession() -> (TipStore, Confession) {
        let store = TipStore::open_in_memory().unwrap();
        let confession = store
            .insert_confession(&addr('a'), "i water a plastic plant", "habits", false)
            .unwrap();
        (store, confession)
    }

    #[test]
    fn insert_and_load_confession() {
        let (store, confession) = store_with_confession();
        let loaded = store.confession(&confession.id).unwrap().unwrap();
        assert_eq!(loaded, confession);
        assert!(store.confession("nope").unwrap().is_none());
    }

    #[test]
    fn top_confessions_orders_by_total_and_hides_flagged() {
        let store = TipStore::open_in_memory().unwrap();
        let low = store
            .insert_confession(&addr('a'), "low", "general", false)
            .unwrap();
        let high = store
            .insert_confession(&addr('b'), "high", "general", false)
            .unwrap();
        store
            .insert_confession(&addr('c'), "flagged", "general", true)
            .unwrap();

        store.increment_confession_tips(&low.id, 10_000).unwrap();
        store.increment_confession_tips(&high.id, 900_000).unwrap();

        let top = store.top_confessions(10).unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].id, high.id);
        assert_eq!(top[1].id, low.id);
    }

    #[test]
    fn get_or_create_user_is_idempotent() {
        let store = TipStore::open_in_memory().unwrap();
        let user1 = store.get_or_create_user(&addr('b')).unwrap();
        let user2 = store.get_or_create_user(&addr('b')).unwrap();
        assert_eq!(user1, user2);
        assert_eq!(user1.referral_code.len(), murmur_core::REFERRAL_CODE_LEN);
        assert_eq!(user1.total_tips_given, 0);
    }

    #[test]
    fn insert_tip_and_find_by_reference() {
        let (store, confession) = store_with_confession();
        let reference = tx_hash('1');

        assert!(store.find_tip_by_reference(&reference).unwrap().is_none());

        let tip = store
            .insert_tip(&confession.id, &addr('b'), 50_000, &reference)
            .unwrap();
        assert_eq!(tip.amount, 50_000);

        let found = store.find_tip_by_reference(&reference).unwrap().unwrap();
        assert_eq!(found, tip);
        assert_eq!(store.tip_count().unwrap(), 1);
    }

    #[test]
    fn duplicate_reference_is_rejected() {
        let (store, confession) = store_with_confession();
        let reference = tx_hash('1');

        store
            .insert_tip(&confession.id, &addr('b'), 50_000, &reference)
            .unwrap();
        let err = store
            .insert_tip(&confession.id, &addr('c'), 60_000, &reference)
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateReference));
        assert_eq!(store.tip_count().unwrap(), 1);
    }

    #[test]
    fn increments_accumulate() {
        let (store, confession) = store_with_confession();
        store.increment_confession_tips(&confession.id, 50_000).unwrap();
        store.increment_confession_tips(&confession.id, 25_000).unwrap();

        let loaded = store.confession(&confession.id).unwrap().unwrap();
        assert_eq!(loaded.total_tips, 75_000);
        assert_eq!(loaded.tip_count, 2);

        let payer = addr('b');
        store.get_or_create_user(&payer).unwrap();
        store.increment_user_tips_given(&payer, 50_000).unwrap();
        store.increment_user_tips_received(&payer, 10_000).unwrap();
        let user = store.user(&payer).unwrap().unwrap();
        assert_eq!(user.total_tips_given, 50_000);
        assert_eq!(user.total_tips_received, 10_000);
    }

    #[test]
    fn increment_on_missing_row_is_error() {
        let store = TipStore::open_in_memory().unwrap();
        let err = store.increment_confession_tips("ghost", 1_000).unwrap_err();
        assert!(matches!(err, StoreError::MissingRow(_)));
        let err = store
            .increment_user_tips_given(&addr('b'), 1_000)
            .unwrap_err();
        assert!(matches!(err, StoreError::MissingRow(_)));
    }

    #[test]
    fn reconcile_repairs_ledger_ahead_of_aggregates() {
        let (store, confession) = store_with_confession();
        let owner = addr('a');
        let payer = addr('b');
        store.get_or_create_user(&owner).unwrap();
        store.get_or_create_user(&payer).unwrap();

        // Ledger write landed but the increments never ran (crash window).
        store
            .insert_tip(&confession.id, &payer, 50_000, &tx_hash('1'))
            .unwrap();

        let drifted = store.reconcile_confession_aggregates().unwrap();
        assert_eq!(drifted, 1);
        let drifted_users = store.reconcile_user_aggregates().unwrap();
        assert_eq!(drifted_users, 2);

        let loaded = store.confession(&confession.id).unwrap().unwrap();
        assert_eq!(loaded.total_tips, 50_000);
        assert_eq!(loaded.tip_count, 1);
        assert_eq!(store.user(&payer).unwrap().unwrap().total_tips_given, 50_000);
        assert_eq!(
            store.user(&owner).unwrap().unwrap().total_tips_received,
            50_000
        );
    }

    #[test]
    fn reconcile_is_noop_when_consistent() {
        let (store, confession) = store_with_confession();
        let payer = addr('b');
        store.get_or_create_user(&addr('a')).unwrap();
        store.get_or_create_user(&payer).unwrap();

        store
            .insert_tip(&confession.id, &payer, 50_000, &tx_hash('1'))
            .unwrap();
        store.increment_confession_tips(&confession.id, 50_000).unwrap();
        store.increment_user_tips_given(&payer, 50_000).unwrap();
        store.increment_user_tips_received(&addr('a'), 50_000).unwrap();

        assert_eq!(store.reconcile_confession_aggregates().unwrap(), 0);
        assert_eq!(store.reconcile_user_aggregates().unwrap(), 0);
    }

    #[test]
    fn open_creates_parent_dirs_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("murmur.sqlite");

        {
            let store = TipStore::open(&path).unwrap();
            store
                .insert_confession(&addr('a'), "persisted", "general", false)
                .unwrap();
        }

        let store = TipStore::open(&path).unwrap();
        assert_eq!(store.top_confessions(10).unwrap().len(), 1);
    }
}
