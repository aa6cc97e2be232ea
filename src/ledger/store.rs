//! SQLite persistence for the interaction ledger.
//!
//! The ledger lives in memory while the process runs; this store only loads
//! it at startup and rewrites it at shutdown. Both directions run inside a
//! single transaction so a crash mid-persist never leaves half a ledger.

use sqlx::sqlite::SqlitePool;
use sqlx::{QueryBuilder, Row, Sqlite, Transaction};
use thiserror::Error;
use tracing::{info, warn};

use super::LedgerSnapshot;
use crate::identity::HashIdentity;

const SOURCE: &str = "ledger::store";

const LIKES_TABLE: &str = "blog_likes";
const VIEWS_TABLE: &str = "blog_views";

// SQLite caps bound parameters per statement; 100 pairs stays far under it.
const BATCH_PAIRS: usize = 100;

#[derive(Debug, Error)]
pub enum LedgerStoreError {
    #[error("ledger query failed: {0}")]
    Query(#[from] sqlx::Error),
}

pub struct LedgerStore {
    pool: SqlitePool,
}

impl LedgerStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Read both tables in one transaction. Handles come back base64-encoded,
    /// ready for [`super::InteractionLedger::hydrate`].
    pub async fn load(
        &self,
    ) -> Result<(Vec<(String, String)>, Vec<(String, String)>), LedgerStoreError> {
        let mut tx = self.pool.begin().await?;
        let likes = fetch_pairs(&mut tx, LIKES_TABLE).await?;
        let views = fetch_pairs(&mut tx, VIEWS_TABLE).await?;
        tx.commit().await?;
        info!(
            target = "brezza::ledger",
            source = SOURCE,
            likes = likes.len(),
            views = views.len(),
            "interaction ledger loaded"
        );
        Ok((likes, views))
    }

    /// Rewrite both tables from a snapshot: truncate, then insert in batches.
    /// Handles that fail to decode are logged and skipped; they cannot be
    /// stored as the bytes they once were.
    pub async fn persist(&self, snapshot: &LedgerSnapshot) -> Result<(), LedgerStoreError> {
        let mut tx = self.pool.begin().await?;
        rewrite_table(&mut tx, LIKES_TABLE, &snapshot.likes).await?;
        rewrite_table(&mut tx, VIEWS_TABLE, &snapshot.views).await?;
        tx.commit().await?;
        info!(
            target = "brezza::ledger",
            source = SOURCE,
            like_pages = snapshot.likes.len(),
            view_pages = snapshot.views.len(),
            "interaction ledger persisted"
        );
        Ok(())
    }
}

async fn fetch_pairs(
    tx: &mut Transaction<'_, Sqlite>,
    table: &str,
) -> Result<Vec<(String, String)>, LedgerStoreError> {
    let rows = sqlx::query(&format!(
        "SELECT page_reference, client_handle FROM {table}"
    ))
    .fetch_all(&mut **tx)
    .await?;

    let mut pairs = Vec::with_capacity(rows.len());
    for row in rows {
        let page: String = row.try_get("page_reference")?;
        let handle: Vec<u8> = row.try_get("client_handle")?;
        pairs.push((page, HashIdentity::encode_handle(&handle)));
    }
    Ok(pairs)
}

async fn rewrite_table(
    tx: &mut Transaction<'_, Sqlite>,
    table: &str,
    pages: &[(String, Vec<String>)],
) -> Result<(), LedgerStoreError> {
    sqlx::query(&format!("DELETE FROM {table}"))
        .execute(&mut **tx)
        .await?;

    let mut decoded: Vec<(&str, Vec<u8>)> = Vec::new();
    for (page, handles) in pages {
        for handle in handles {
            match HashIdentity::decode_handle(handle) {
                Ok(bytes) => decoded.push((page.as_str(), bytes)),
                Err(err) => {
                    warn!(
                        target = "brezza::ledger",
                        source = SOURCE,
                        table,
                        page,
                        error = %err,
                        "skipping undecodable client handle"
                    );
                }
            }
        }
    }

    for chunk in decoded.chunks(BATCH_PAIRS) {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "INSERT OR IGNORE INTO {table} (page_reference, client_handle) "
        ));
        builder.push_values(chunk, |mut b, (page, handle)| {
            b.push_bind(*page).push_bind(handle.as_slice());
        });
        builder.build().execute(&mut **tx).await?;
    }
    Ok(())
}
