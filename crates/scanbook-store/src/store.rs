// SPDX-License-Identifier: Apache-2.0
//
// Persistent document store backed by SQLite.
//
// The store holds document and page metadata (but NOT the image bytes) in a
// local SQLite database. Image files live in the app-owned storage directory
// and are referenced by path. Documents and their pages are created together
// in one transaction so no reader ever observes a partial page set.

use std::collections::HashSet;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use tracing::{debug, info, instrument};

use scanbook_core::error::{Result, ScanbookError};
use scanbook_core::types::{Document, DocumentId, FilterKind, NewPage, Page, PageId};

/// SQLite schema for documents and pages.
///
/// Pages carry an `ON DELETE CASCADE` foreign key as a schema-level backstop,
/// but document deletion still issues both deletes explicitly inside one
/// transaction (see `delete_document`).
const CREATE_SCHEMA_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS documents (
        id TEXT PRIMARY KEY NOT NULL,
        title TEXT NOT NULL,
        createdAt INTEGER NOT NULL,
        updatedAt INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS pages (
        id TEXT PRIMARY KEY NOT NULL,
        documentId TEXT NOT NULL,
        originalUri TEXT NOT NULL,
        processedUri TEXT NOT NULL,
        filterName TEXT NOT NULL,
        rotation INTEGER NOT NULL DEFAULT 0,
        orderIndex INTEGER NOT NULL,
        FOREIGN KEY (documentId) REFERENCES documents (id) ON DELETE CASCADE
    );

    CREATE INDEX IF NOT EXISTS idx_pages_documentId ON pages(documentId);
    CREATE INDEX IF NOT EXISTS idx_pages_order ON pages(documentId, orderIndex);
"#;

/// Document and page store backed by a SQLite database.
///
/// All methods are synchronous because `rusqlite` does not support async
/// natively. The handle is `Send` but not `Sync`; wrap in a mutex for
/// sharing. Construct explicitly and pass to the service layer — there is
/// no process-global connection.
pub struct DocumentStore {
    /// The open SQLite connection.
    conn: Connection,
}

impl DocumentStore {
    /// Open (or create) the document database at the given path.
    ///
    /// Applies WAL journal mode, enables foreign-key enforcement, and
    /// creates the schema if it does not exist.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .map_err(|e| ScanbookError::Database(format!("open: {e}")))?;

        // WAL mode survives unclean shutdowns more gracefully and allows
        // concurrent readers while a write is in flight.
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| ScanbookError::Database(format!("WAL pragma: {e}")))?;

        Self::init_schema(conn)
    }

    /// Open an in-memory database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| ScanbookError::Database(format!("open in-memory: {e}")))?;
        debug!("in-memory document database opened");
        Self::init_schema(conn)
    }

    fn init_schema(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|e| ScanbookError::Database(format!("foreign_keys pragma: {e}")))?;

        conn.execute_batch(CREATE_SCHEMA_SQL)
            .map_err(|e| ScanbookError::Database(format!("create schema: {e}")))?;

        info!("document database opened");
        Ok(Self { conn })
    }

    // -- Creation -------------------------------------------------------------

    /// Insert one document and all of its pages as a single transaction.
    ///
    /// Page `orderIndex` is the position in the input slice. Rejects empty
    /// page lists and blank titles before any write.
    #[instrument(skip(self, pages), fields(page_count = pages.len()))]
    pub fn create_document(&mut self, title: &str, pages: &[NewPage]) -> Result<Document> {
        if pages.is_empty() {
            return Err(ScanbookError::Validation(
                "a document must be created with at least one page".into(),
            ));
        }
        if title.trim().is_empty() {
            return Err(ScanbookError::Validation("title must not be empty".into()));
        }

        let doc_id = DocumentId::new();
        let now = now_millis();

        let tx = self
            .conn
            .transaction()
            .map_err(|e| ScanbookError::Database(format!("begin create: {e}")))?;

        tx.execute(
            "INSERT INTO documents (id, title, createdAt, updatedAt) VALUES (?1, ?2, ?3, ?4)",
            params![doc_id.to_string(), title, now, now],
        )
        .map_err(|e| ScanbookError::Database(format!("insert document: {e}")))?;

        for (index, page) in pages.iter().enumerate() {
            let page_id = PageId::new();
            tx.execute(
                "INSERT INTO pages (id, documentId, originalUri, processedUri, filterName,
                 rotation, orderIndex)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    page_id.to_string(),
                    doc_id.to_string(),
                    uri_to_text(&page.original_uri),
                    uri_to_text(&page.processed_uri),
                    page.filter.as_str(),
                    page.rotation,
                    index as i64,
                ],
            )
            .map_err(|e| ScanbookError::Database(format!("insert page {index}: {e}")))?;
        }

        tx.commit()
            .map_err(|e| ScanbookError::Database(format!("commit create: {e}")))?;

        info!(document_id = %doc_id, pages = pages.len(), "document created");
        self.get_document(&doc_id)
    }

    // -- Retrieval ------------------------------------------------------------

    /// Retrieve a single document with its pages ordered by `orderIndex`.
    #[instrument(skip(self), fields(document_id = %id))]
    pub fn get_document(&self, id: &DocumentId) -> Result<Document> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, title, createdAt, updatedAt FROM documents WHERE id = ?1")
            .map_err(|e| ScanbookError::Database(format!("prepare get_document: {e}")))?;

        let mut rows = stmt
            .query_map(params![id.to_string()], row_to_document_header)
            .map_err(|e| ScanbookError::Database(format!("query get_document: {e}")))?;

        let mut document = match rows.next() {
            Some(Ok(doc)) => doc,
            Some(Err(e)) => return Err(ScanbookError::Database(format!("row parse: {e}"))),
            None => return Err(ScanbookError::NotFound(format!("document {id}"))),
        };

        document.pages = self.pages_for(id)?;
        Ok(document)
    }

    /// Retrieve all documents with their ordered pages, newest first.
    #[instrument(skip(self))]
    pub fn get_all_documents(&self) -> Result<Vec<Document>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, title, createdAt, updatedAt FROM documents
                 ORDER BY createdAt DESC",
            )
            .map_err(|e| ScanbookError::Database(format!("prepare get_all: {e}")))?;

        let mut documents = stmt
            .query_map([], row_to_document_header)
            .map_err(|e| ScanbookError::Database(format!("query get_all: {e}")))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| ScanbookError::Database(format!("collect documents: {e}")))?;

        for document in &mut documents {
            document.pages = self.pages_for(&document.id)?;
        }

        debug!(count = documents.len(), "retrieved all documents");
        Ok(documents)
    }

    /// Ordered pages for one document.
    fn pages_for(&self, id: &DocumentId) -> Result<Vec<Page>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, documentId, originalUri, processedUri, filterName,
                        rotation, orderIndex
                 FROM pages WHERE documentId = ?1 ORDER BY orderIndex",
            )
            .map_err(|e| ScanbookError::Database(format!("prepare pages_for: {e}")))?;

        let pages = stmt
            .query_map(params![id.to_string()], row_to_page)
            .map_err(|e| ScanbookError::Database(format!("query pages_for: {e}")))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| ScanbookError::Database(format!("collect pages: {e}")));
        pages
    }

    // -- Mutation -------------------------------------------------------------

    /// Rename a document and bump `updatedAt`. Pages are untouched.
    #[instrument(skip(self), fields(document_id = %id))]
    pub fn update_document(&mut self, id: &DocumentId, title: &str) -> Result<()> {
        if title.trim().is_empty() {
            return Err(ScanbookError::Validation("title must not be empty".into()));
        }

        let rows = self
            .conn
            .execute(
                "UPDATE documents SET title = ?1, updatedAt = MAX(updatedAt, ?2) WHERE id = ?3",
                params![title, now_millis(), id.to_string()],
            )
            .map_err(|e| ScanbookError::Database(format!("update title: {e}")))?;

        if rows == 0 {
            return Err(ScanbookError::NotFound(format!("document {id}")));
        }

        debug!(document_id = %id, "document renamed");
        Ok(())
    }

    /// Delete a document and all of its pages.
    ///
    /// Both deletes run in one transaction: a crash can never leave orphaned
    /// page rows, independent of the schema-level cascade.
    #[instrument(skip(self), fields(document_id = %id))]
    pub fn delete_document(&mut self, id: &DocumentId) -> Result<()> {
        let tx = self
            .conn
            .transaction()
            .map_err(|e| ScanbookError::Database(format!("begin delete: {e}")))?;

        tx.execute(
            "DELETE FROM pages WHERE documentId = ?1",
            params![id.to_string()],
        )
        .map_err(|e| ScanbookError::Database(format!("delete pages: {e}")))?;

        let rows = tx
            .execute("DELETE FROM documents WHERE id = ?1", params![id.to_string()])
            .map_err(|e| ScanbookError::Database(format!("delete document: {e}")))?;

        if rows == 0 {
            return Err(ScanbookError::NotFound(format!("document {id}")));
        }

        tx.commit()
            .map_err(|e| ScanbookError::Database(format!("commit delete: {e}")))?;

        info!(document_id = %id, "document deleted");
        Ok(())
    }

    /// Reassign `orderIndex = position` for each page id in the given
    /// sequence and bump the document's `updatedAt`.
    ///
    /// The sequence must be exactly the document's current page-id set — a
    /// mismatch (missing, extra, or foreign ids) is rejected before any
    /// write rather than silently corrupting order state. Re-applying the
    /// same sequence converges to the same state, so an interrupted reorder
    /// is recovered by simply re-issuing the call.
    #[instrument(skip(self, ordered_ids), fields(document_id = %document_id, count = ordered_ids.len()))]
    pub fn update_page_order(
        &mut self,
        document_id: &DocumentId,
        ordered_ids: &[PageId],
    ) -> Result<()> {
        // Existence check doubles as the NotFound path for unknown documents.
        let current = self.pages_for(document_id)?;
        if current.is_empty() && !self.document_exists(document_id)? {
            return Err(ScanbookError::NotFound(format!("document {document_id}")));
        }

        let current_set: HashSet<PageId> = current.iter().map(|p| p.id).collect();
        let supplied_set: HashSet<PageId> = ordered_ids.iter().copied().collect();
        if supplied_set.len() != ordered_ids.len() || supplied_set != current_set {
            return Err(ScanbookError::Validation(format!(
                "page id sequence does not match the current page set of document {document_id}"
            )));
        }

        let tx = self
            .conn
            .transaction()
            .map_err(|e| ScanbookError::Database(format!("begin reorder: {e}")))?;

        for (index, page_id) in ordered_ids.iter().enumerate() {
            tx.execute(
                "UPDATE pages SET orderIndex = ?1 WHERE id = ?2 AND documentId = ?3",
                params![index as i64, page_id.to_string(), document_id.to_string()],
            )
            .map_err(|e| ScanbookError::Database(format!("reorder page {index}: {e}")))?;
        }

        tx.execute(
            "UPDATE documents SET updatedAt = MAX(updatedAt, ?1) WHERE id = ?2",
            params![now_millis(), document_id.to_string()],
        )
        .map_err(|e| ScanbookError::Database(format!("bump updatedAt: {e}")))?;

        tx.commit()
            .map_err(|e| ScanbookError::Database(format!("commit reorder: {e}")))?;

        debug!(document_id = %document_id, "page order updated");
        Ok(())
    }

    /// Replace a page's processed rendition reference and filter tag in
    /// place. Does not touch `orderIndex`; bumps the owning document's
    /// `updatedAt`.
    #[instrument(skip(self, processed_uri), fields(page_id = %page_id, filter = %filter))]
    pub fn update_page_filter(
        &mut self,
        page_id: &PageId,
        processed_uri: &std::path::Path,
        filter: FilterKind,
    ) -> Result<()> {
        let tx = self
            .conn
            .transaction()
            .map_err(|e| ScanbookError::Database(format!("begin filter update: {e}")))?;

        let document_id: String = tx
            .query_row(
                "SELECT documentId FROM pages WHERE id = ?1",
                params![page_id.to_string()],
                |row| row.get(0),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    ScanbookError::NotFound(format!("page {page_id}"))
                }
                other => ScanbookError::Database(format!("lookup page: {other}")),
            })?;

        tx.execute(
            "UPDATE pages SET processedUri = ?1, filterName = ?2 WHERE id = ?3",
            params![
                processed_uri.to_string_lossy(),
                filter.as_str(),
                page_id.to_string()
            ],
        )
        .map_err(|e| ScanbookError::Database(format!("update filter: {e}")))?;

        tx.execute(
            "UPDATE documents SET updatedAt = MAX(updatedAt, ?1) WHERE id = ?2",
            params![now_millis(), document_id],
        )
        .map_err(|e| ScanbookError::Database(format!("bump updatedAt: {e}")))?;

        tx.commit()
            .map_err(|e| ScanbookError::Database(format!("commit filter update: {e}")))?;

        debug!(page_id = %page_id, "page filter updated");
        Ok(())
    }

    /// Remove one page row and bump the document's `updatedAt`.
    ///
    /// The last-page invariant and order renormalization live one layer up
    /// in the service; this method only touches the rows it is told to.
    #[instrument(skip(self), fields(document_id = %document_id, page_id = %page_id))]
    pub fn delete_page(&mut self, document_id: &DocumentId, page_id: &PageId) -> Result<()> {
        let tx = self
            .conn
            .transaction()
            .map_err(|e| ScanbookError::Database(format!("begin page delete: {e}")))?;

        let rows = tx
            .execute(
                "DELETE FROM pages WHERE id = ?1 AND documentId = ?2",
                params![page_id.to_string(), document_id.to_string()],
            )
            .map_err(|e| ScanbookError::Database(format!("delete page: {e}")))?;

        if rows == 0 {
            return Err(ScanbookError::NotFound(format!(
                "page {page_id} in document {document_id}"
            )));
        }

        tx.execute(
            "UPDATE documents SET updatedAt = MAX(updatedAt, ?1) WHERE id = ?2",
            params![now_millis(), document_id.to_string()],
        )
        .map_err(|e| ScanbookError::Database(format!("bump updatedAt: {e}")))?;

        tx.commit()
            .map_err(|e| ScanbookError::Database(format!("commit page delete: {e}")))?;

        info!(page_id = %page_id, "page deleted");
        Ok(())
    }

    fn document_exists(&self, id: &DocumentId) -> Result<bool> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM documents WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .map_err(|e| ScanbookError::Database(format!("document_exists: {e}")))?;
        Ok(count > 0)
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

/// Current wall-clock time as Unix milliseconds (the `createdAt`/`updatedAt`
/// column representation).
fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn millis_to_datetime(column: usize, ms: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| {
        rusqlite::Error::IntegralValueOutOfRange(column, ms)
    })
}

fn uri_to_text(path: &std::path::Path) -> String {
    path.to_string_lossy().into_owned()
}

fn parse_uuid(column: usize, s: &str) -> rusqlite::Result<uuid::Uuid> {
    uuid::Uuid::parse_str(s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Map a SQLite row to a `Document` header (pages filled in separately).
fn row_to_document_header(row: &rusqlite::Row<'_>) -> rusqlite::Result<Document> {
    let id_str: String = row.get(0)?;
    let title: String = row.get(1)?;
    let created_ms: i64 = row.get(2)?;
    let updated_ms: i64 = row.get(3)?;

    Ok(Document {
        id: DocumentId(parse_uuid(0, &id_str)?),
        title,
        created_at: millis_to_datetime(2, created_ms)?,
        updated_at: millis_to_datetime(3, updated_ms)?,
        pages: Vec::new(),
    })
}

/// Map a SQLite row to a `Page`.
///
/// Column indices must match the SELECT order used in `pages_for`.
fn row_to_page(row: &rusqlite::Row<'_>) -> rusqlite::Result<Page> {
    let id_str: String = row.get(0)?;
    let document_id_str: String = row.get(1)?;
    let original_uri: String = row.get(2)?;
    let processed_uri: String = row.get(3)?;
    let filter_name: String = row.get(4)?;
    let rotation: i32 = row.get(5)?;
    let order_index: i64 = row.get(6)?;

    let filter = FilterKind::parse(&filter_name).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            format!("unknown filter name: {filter_name}").into(),
        )
    })?;

    Ok(Page {
        id: PageId(parse_uuid(0, &id_str)?),
        document_id: DocumentId(parse_uuid(1, &document_id_str)?),
        original_uri: PathBuf::from(original_uri),
        processed_uri: PathBuf::from(processed_uri),
        filter,
        rotation,
        order_index: order_index as u32,
    })
}
