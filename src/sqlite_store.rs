//! SQLite-backed [`FragmentStore`] implementation.
//!
//! Reads go through identity- and status-scoped queries over the
//! `documents` and `fragments` tables. The write helpers exist for
//! [`import`](crate::import) only; the retrieval pipeline never writes.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::HashMap;

use context_select_core::models::{Document, DocumentStatus, Fragment, FragmentMetadata};
use context_select_core::similarity::{blob_to_vec, vec_to_blob};
use context_select_core::store::{FragmentStore, Scope};

const FRAGMENT_COLUMNS: &str =
    "f.id, f.document_id, f.sequence_index, f.content, f.metadata_json, f.embedding";

/// SQLite implementation of [`FragmentStore`].
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert or update a document row, keyed by id. An existing row keeps
    /// its owner.
    pub async fn upsert_document(&self, doc: &Document) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, owner, name, status, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                status = excluded.status
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.owner)
        .bind(&doc.name)
        .bind(doc.status.as_str())
        .bind(doc.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Owner of `doc_id`, regardless of status.
    pub async fn document_owner(&self, doc_id: &str) -> Result<Option<String>> {
        let owner: Option<String> = sqlx::query_scalar("SELECT owner FROM documents WHERE id = ?")
            .bind(doc_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(owner)
    }

    pub async fn set_document_status(&self, doc_id: &str, status: DocumentStatus) -> Result<()> {
        sqlx::query("UPDATE documents SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(doc_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Replace every fragment of `doc_id` in one transaction.
    pub async fn replace_fragments(&self, doc_id: &str, fragments: &[Fragment]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM fragments WHERE document_id = ?")
            .bind(doc_id)
            .execute(&mut *tx)
            .await?;

        for fragment in fragments {
            let blob = fragment.embedding.as_deref().map(vec_to_blob);
            sqlx::query(
                r#"
                INSERT INTO fragments (id, document_id, sequence_index, content, metadata_json, embedding)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&fragment.id)
            .bind(doc_id)
            .bind(fragment.sequence_index)
            .bind(&fragment.content)
            .bind(fragment.metadata.to_json_string())
            .bind(blob)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

fn row_to_fragment(row: &SqliteRow) -> Fragment {
    let metadata_json: String = row.get("metadata_json");
    let blob: Option<Vec<u8>> = row.get("embedding");
    Fragment {
        id: row.get("id"),
        document_id: row.get("document_id"),
        sequence_index: row.get("sequence_index"),
        content: row.get("content"),
        embedding: blob.map(|b| blob_to_vec(&b)),
        metadata: FragmentMetadata::from_json_str(&metadata_json),
    }
}

/// Append `AND <column> IN (?, ?, ...)`.
fn push_in_list(qb: &mut QueryBuilder<'_, Sqlite>, column: &str, ids: &[String]) {
    qb.push(format!(" AND {} IN (", column));
    let mut list = qb.separated(", ");
    for id in ids {
        list.push_bind(id.clone());
    }
    list.push_unseparated(")");
}

/// Append the owner, ready-status, and document-filter predicates.
fn push_scope(qb: &mut QueryBuilder<'_, Sqlite>, scope: Scope<'_>) {
    qb.push(" WHERE d.owner = ");
    qb.push_bind(scope.identity.to_string());
    qb.push(" AND d.status = ");
    qb.push_bind(DocumentStatus::Ready.as_str());
    if let Some(ids) = scope.document_ids {
        push_in_list(qb, "f.document_id", ids);
    }
}

#[async_trait]
impl FragmentStore for SqliteStore {
    async fn list_fragments(
        &self,
        scope: Scope<'_>,
        limit: Option<usize>,
    ) -> Result<Vec<Fragment>> {
        if matches!(scope.document_ids, Some(ids) if ids.is_empty()) || limit == Some(0) {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM fragments f JOIN documents d ON d.id = f.document_id",
            FRAGMENT_COLUMNS
        ));
        push_scope(&mut qb, scope);
        qb.push(" ORDER BY f.document_id, f.sequence_index");
        if let Some(limit) = limit {
            qb.push(" LIMIT ");
            qb.push_bind(limit as i64);
        }

        let rows = qb.build().fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_fragment).collect())
    }

    async fn get_fragments_by_ids(&self, ids: &[String], identity: &str) -> Result<Vec<Fragment>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM fragments f JOIN documents d ON d.id = f.document_id",
            FRAGMENT_COLUMNS
        ));
        push_scope(&mut qb, Scope::new(identity, None));
        push_in_list(&mut qb, "f.id", ids);

        let rows = qb.build().fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_fragment).collect())
    }

    async fn list_document_names(
        &self,
        ids: &[String],
        identity: &str,
    ) -> Result<HashMap<String, String>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut qb =
            QueryBuilder::<Sqlite>::new("SELECT d.id, d.name FROM documents d WHERE d.owner = ");
        qb.push_bind(identity.to_string());
        push_in_list(&mut qb, "d.id", ids);

        let rows = qb.build().fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(|row| (row.get("id"), row.get("name")))
            .collect())
    }

    async fn count_fragments(&self, scope: Scope<'_>) -> Result<usize> {
        if matches!(scope.document_ids, Some(ids) if ids.is_empty()) {
            return Ok(0);
        }

        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT COUNT(*) AS n FROM fragments f JOIN documents d ON d.id = f.document_id",
        );
        push_scope(&mut qb, scope);

        let row = qb.build().fetch_one(&self.pool).await?;
        let n: i64 = row.get("n");
        Ok(n.max(0) as usize)
    }
}
