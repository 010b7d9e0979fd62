use async_trait::async_trait;
use paygate::{CredentialStore, Credentials, Merchant, PaygateError};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::StoreError;

/// Merchant listing row without key material
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MerchantSummary {
    pub id: String,
    pub email: String,
    pub ipn_url: String,
    /// Providers the merchant holds credentials for
    pub services: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// SQLite-backed merchant store
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn new(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init_schema()?;
        Ok(db)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;

        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS merchants (
                id TEXT PRIMARY KEY,
                email TEXT UNIQUE NOT NULL,
                ipn_url TEXT NOT NULL,
                credentials TEXT NOT NULL DEFAULT '{}',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
            [],
        )?;

        Ok(())
    }

    /// Insert a new merchant
    pub fn create_merchant(&self, merchant: &Merchant) -> Result<MerchantSummary, StoreError> {
        let credentials = serde_json::to_string(&merchant.credentials)?;
        let conn = self.lock()?;
        let now = chrono::Utc::now().timestamp();

        conn.execute(
            r#"
            INSERT INTO merchants (id, email, ipn_url, credentials, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![merchant.id, merchant.email, merchant.ipn_url, credentials, now, now],
        )
        .map_err(|e| duplicate_email(e, &merchant.email))?;

        Ok(summary(merchant, now, now))
    }

    /// Get merchant by id, credentials included
    pub fn get_merchant(&self, id: &str) -> Result<Option<Merchant>, StoreError> {
        let conn = self.lock()?;

        let row = conn
            .query_row(
                "SELECT id, email, ipn_url, credentials FROM merchants WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((id, email, ipn_url, credentials)) => Ok(Some(Merchant {
                id,
                email,
                ipn_url,
                credentials: serde_json::from_str(&credentials)?,
            })),
            None => Ok(None),
        }
    }

    /// Replace email, IPN URL and credentials. Returns None if the merchant is gone.
    pub fn update_merchant(&self, merchant: &Merchant) -> Result<Option<MerchantSummary>, StoreError> {
        let credentials = serde_json::to_string(&merchant.credentials)?;
        let conn = self.lock()?;
        let now = chrono::Utc::now().timestamp();

        let rows = conn
            .execute(
                r#"
                UPDATE merchants
                SET email = ?1, ipn_url = ?2, credentials = ?3, updated_at = ?4
                WHERE id = ?5
                "#,
                params![merchant.email, merchant.ipn_url, credentials, now, merchant.id],
            )
            .map_err(|e| duplicate_email(e, &merchant.email))?;

        if rows == 0 {
            return Ok(None);
        }

        let created_at: i64 = conn.query_row(
            "SELECT created_at FROM merchants WHERE id = ?1",
            params![merchant.id],
            |row| row.get(0),
        )?;

        Ok(Some(summary(merchant, created_at, now)))
    }

    /// Delete merchant. Returns true if a row was removed.
    pub fn delete_merchant(&self, id: &str) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let rows = conn.execute("DELETE FROM merchants WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    /// List all merchants, oldest first, without credentials
    pub fn list_merchants(&self) -> Result<Vec<MerchantSummary>, StoreError> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT id, email, ipn_url, credentials, created_at, updated_at
            FROM merchants
            ORDER BY created_at ASC, id ASC
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, i64>(5)?,
            ))
        })?;

        let mut merchants = Vec::new();
        for row in rows {
            let (id, email, ipn_url, credentials, created_at, updated_at) = row?;
            let credentials: Credentials = serde_json::from_str(&credentials)?;
            merchants.push(MerchantSummary {
                id,
                email,
                ipn_url,
                services: service_names(&credentials),
                created_at,
                updated_at,
            });
        }

        Ok(merchants)
    }

    pub fn count_merchants(&self) -> Result<i64, StoreError> {
        let conn = self.lock()?;
        let count = conn.query_row("SELECT COUNT(*) FROM merchants", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Whether another merchant already uses `email`
    pub fn email_taken(&self, email: &str, except_id: Option<&str>) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let found = conn
            .query_row(
                "SELECT id FROM merchants WHERE email = ?1",
                params![email],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(match found {
            Some(id) => except_id != Some(id.as_str()),
            None => false,
        })
    }
}

fn duplicate_email(e: rusqlite::Error, email: &str) -> StoreError {
    match StoreError::from(e) {
        StoreError::DuplicateEmail(_) => StoreError::DuplicateEmail(email.to_string()),
        other => other,
    }
}

fn service_names(credentials: &Credentials) -> Vec<String> {
    credentials
        .providers()
        .into_iter()
        .map(|p| p.as_str().to_string())
        .collect()
}

fn summary(merchant: &Merchant, created_at: i64, updated_at: i64) -> MerchantSummary {
    MerchantSummary {
        id: merchant.id.clone(),
        email: merchant.email.clone(),
        ipn_url: merchant.ipn_url.clone(),
        services: service_names(&merchant.credentials),
        created_at,
        updated_at,
    }
}

#[async_trait]
impl CredentialStore for SqliteStore {
    async fn merchant_by_token(&self, token: &str) -> Result<Option<Merchant>, PaygateError> {
        let store = self.clone();
        let token = token.to_string();
        tokio::task::spawn_blocking(move || store.get_merchant(&token))
            .await
            .map_err(|e| PaygateError::Store(format!("lookup task failed: {e}")))?
            .map_err(PaygateError::from)
    }
}
