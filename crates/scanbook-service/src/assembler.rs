// SPDX-License-Identifier: Apache-2.0
//
// Document service — the single mutation path over the store and the image
// pipeline.
//
// The store enforces row-level rules; cross-row invariants it cannot see
// (last-page protection, contiguous order after a mutation) are enforced
// here, before any write is issued. Presentation code talks only to this
// service, so the invariants cannot be bypassed.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use scanbook_core::config::AppConfig;
use scanbook_core::error::{Result, ScanbookError};
use scanbook_core::types::{Document, DocumentId, ExportConfig, FilterKind, NewPage, Page, PageId};
use scanbook_export::{plan_export, RenderEngine};
use scanbook_image::ImagePipeline;
use scanbook_store::DocumentStore;

use crate::capture::{CaptureSource, ShareSink};

/// One captured page awaiting persistence: the transient capture path and
/// the filter chosen for it.
#[derive(Debug, Clone)]
pub struct CapturedPage {
    pub capture_uri: PathBuf,
    pub filter: FilterKind,
}

/// Owns the store and the pipeline with an explicit lifecycle: construct at
/// process start, drop at shutdown. The rusqlite handle inside is `Send`
/// but not `Sync`; wrap the service in `Arc<Mutex<_>>` to share it.
pub struct DocumentService {
    store: DocumentStore,
    pipeline: ImagePipeline,
    default_export: ExportConfig,
}

impl DocumentService {
    pub fn new(store: DocumentStore, pipeline: ImagePipeline) -> Self {
        Self {
            store,
            pipeline,
            default_export: ExportConfig::default(),
        }
    }

    /// Replace the export settings used when a caller supplies none.
    pub fn with_default_export(mut self, config: ExportConfig) -> Self {
        self.default_export = config;
        self
    }

    /// Open a service rooted at the given data directory: database at
    /// `scanbook.db`, image storage under `scanned_docs/`.
    pub fn open_at(data_dir: &Path, config: &AppConfig) -> Result<Self> {
        let store = DocumentStore::open(data_dir.join("scanbook.db"))?;
        let pipeline = ImagePipeline::new(data_dir.join("scanned_docs"), config);
        Ok(Self::new(store, pipeline).with_default_export(config.default_export.clone()))
    }

    /// Open a service in the platform data directory (see [`crate::data_dir`]).
    pub fn open_default(config: &AppConfig) -> Result<Self> {
        Self::open_at(&crate::data_dir::data_dir()?, config)
    }

    // -- Scan session ---------------------------------------------------------

    /// Persist a completed scan session as one new document.
    ///
    /// Each capture is copied into durable storage and filtered before the
    /// single transactional document insert, so a row never references a
    /// missing file. A failure partway through aborts the remaining pages
    /// and surfaces the error; files already written stay on disk
    /// unreferenced.
    #[instrument(skip(self, captures), fields(captures = captures.len()))]
    pub fn save_scan_session(
        &mut self,
        title: &str,
        captures: &[CapturedPage],
    ) -> Result<Document> {
        if captures.is_empty() {
            return Err(ScanbookError::Validation(
                "a scan session must contain at least one capture".into(),
            ));
        }
        // Both checks precede file work so a caller error strands no files.
        if title.trim().is_empty() {
            return Err(ScanbookError::Validation(
                "document title must not be blank".into(),
            ));
        }

        let mut pages = Vec::with_capacity(captures.len());
        for capture in captures {
            let original_uri = self.pipeline.persist_original(&capture.capture_uri)?;
            let processed_uri = self.pipeline.apply_filter(&original_uri, capture.filter)?;
            pages.push(NewPage {
                original_uri,
                processed_uri,
                filter: capture.filter,
                rotation: 0,
            });
        }

        let document = self.store.create_document(title, &pages)?;
        info!(document_id = %document.id, pages = document.pages.len(), "scan session saved");
        Ok(document)
    }

    /// Drive an external capture source and save the result.
    ///
    /// Returns `Ok(None)` when the user cancelled or captured nothing —
    /// terminal outcomes, not failures. Without an explicit title the
    /// document gets a generated one.
    pub fn scan_with(
        &mut self,
        source: &dyn CaptureSource,
        filter: FilterKind,
        title: Option<String>,
    ) -> Result<Option<Document>> {
        let captured = match source.capture_pages()? {
            Some(paths) if !paths.is_empty() => paths,
            _ => {
                info!("capture session ended without pages");
                return Ok(None);
            }
        };

        let title = title.unwrap_or_else(|| default_title(Utc::now()));
        let captures: Vec<CapturedPage> = captured
            .into_iter()
            .map(|capture_uri| CapturedPage {
                capture_uri,
                filter,
            })
            .collect();
        self.save_scan_session(&title, &captures).map(Some)
    }

    // -- Reads ----------------------------------------------------------------

    pub fn document(&self, id: &DocumentId) -> Result<Document> {
        self.store.get_document(id)
    }

    pub fn documents(&self) -> Result<Vec<Document>> {
        self.store.get_all_documents()
    }

    // -- Mutation -------------------------------------------------------------

    pub fn rename_document(&mut self, id: &DocumentId, title: &str) -> Result<()> {
        self.store.update_document(id, title)
    }

    /// Delete a document, its page rows, and (best-effort) its image files.
    ///
    /// Rows go first and atomically; file cleanup afterwards never fails
    /// the operation, since a stale file is a lesser harm than a delete the
    /// user watched fail.
    #[instrument(skip(self), fields(document_id = %id))]
    pub fn delete_document(&mut self, id: &DocumentId) -> Result<()> {
        let document = self.store.get_document(id)?;
        self.store.delete_document(id)?;

        for page in &document.pages {
            self.pipeline.delete_file(&page.original_uri);
            if page.processed_uri != page.original_uri {
                self.pipeline.delete_file(&page.processed_uri);
            }
        }
        Ok(())
    }

    /// Delete one page, keeping the document's order contiguous.
    ///
    /// Rejected with `InvariantViolation` before any write when the
    /// document would be left empty. After the row delete the surviving
    /// ids are renormalized to 0..n-1 preserving their relative order.
    #[instrument(skip(self), fields(document_id = %document_id, page_id = %page_id))]
    pub fn delete_page(&mut self, document_id: &DocumentId, page_id: &PageId) -> Result<Document> {
        let document = self.store.get_document(document_id)?;
        if document.pages.len() <= 1 {
            return Err(ScanbookError::InvariantViolation(format!(
                "document {document_id} must keep at least one page"
            )));
        }
        let victim = document
            .pages
            .iter()
            .find(|p| p.id == *page_id)
            .cloned()
            .ok_or_else(|| {
                ScanbookError::NotFound(format!("page {page_id} in document {document_id}"))
            })?;

        self.store.delete_page(document_id, page_id)?;

        let survivors: Vec<PageId> = document
            .pages
            .iter()
            .filter(|p| p.id != *page_id)
            .map(|p| p.id)
            .collect();
        self.store.update_page_order(document_id, &survivors)?;

        self.pipeline.delete_file(&victim.original_uri);
        if victim.processed_uri != victim.original_uri {
            self.pipeline.delete_file(&victim.processed_uri);
        }

        self.store.get_document(document_id)
    }

    /// Reassign page order to match the supplied id sequence.
    ///
    /// Idempotent: re-issuing the same sequence (e.g. after an interrupted
    /// earlier attempt) converges to the same state.
    pub fn reorder_pages(
        &mut self,
        document_id: &DocumentId,
        ordered_ids: &[PageId],
    ) -> Result<Document> {
        self.store.update_page_order(document_id, ordered_ids)?;
        self.store.get_document(document_id)
    }

    /// Re-run the filter pipeline for one page from its stored original.
    ///
    /// The page's rank is untouched; the previous rendition file is removed
    /// best-effort once the row points at the new one.
    #[instrument(skip(self), fields(document_id = %document_id, page_id = %page_id, filter = %filter))]
    pub fn reapply_filter(
        &mut self,
        document_id: &DocumentId,
        page_id: &PageId,
        filter: FilterKind,
    ) -> Result<Page> {
        let document = self.store.get_document(document_id)?;
        let page = document
            .pages
            .iter()
            .find(|p| p.id == *page_id)
            .cloned()
            .ok_or_else(|| {
                ScanbookError::NotFound(format!("page {page_id} in document {document_id}"))
            })?;

        let new_processed = self.pipeline.apply_filter(&page.original_uri, filter)?;
        self.store
            .update_page_filter(page_id, &new_processed, filter)?;

        let old = &page.processed_uri;
        if *old != page.original_uri && *old != new_processed {
            self.pipeline.delete_file(old);
        }

        let reloaded = self.store.get_document(document_id)?;
        reloaded
            .pages
            .into_iter()
            .find(|p| p.id == *page_id)
            .ok_or_else(|| ScanbookError::NotFound(format!("page {page_id} after update")))
    }

    // -- Export ---------------------------------------------------------------

    /// Export a document to a paginated artifact.
    ///
    /// Without an explicit configuration the service's default export
    /// settings apply. The document is reloaded at call time — never
    /// memoized — so a re-export after a page edit picks up the new
    /// rendition automatically.
    #[instrument(skip(self, config, engine), fields(document_id = %id))]
    pub fn export_document(
        &self,
        id: &DocumentId,
        config: Option<&ExportConfig>,
        engine: &dyn RenderEngine,
        output_path: &Path,
    ) -> Result<PathBuf> {
        let document = self.store.get_document(id)?;
        let config = config.unwrap_or(&self.default_export);
        let plan = plan_export(&document, config)?;
        engine.render(&plan, output_path)
    }

    /// Offer an exported artifact to a share sink.
    ///
    /// Sink unavailability is reported in the log, not surfaced — the
    /// export itself already succeeded.
    pub fn share_artifact(&self, sink: &dyn ShareSink, path: &Path) {
        if let Err(err) = sink.share_file(path, "application/pdf") {
            warn!(error = %err, path = %path.display(), "share sink unavailable");
        }
    }
}

/// Generated title for an untitled scan session, e.g.
/// `Scan 2026-08-28 3:04 PM`.
pub fn default_title(now: DateTime<Utc>) -> String {
    format!("Scan {}", now.format("%Y-%m-%d %-I:%M %p"))
}

// -- Config file persistence -------------------------------------------------

const CONFIG_FILE: &str = "config.json";

/// Load the persisted app configuration, if any.
pub fn load_config(data_dir: &Path) -> Option<AppConfig> {
    let path = data_dir.join(CONFIG_FILE);
    let data = std::fs::read_to_string(&path).ok()?;
    serde_json::from_str(&data).ok()
}

/// Persist the app configuration as pretty JSON.
pub fn persist_config(data_dir: &Path, config: &AppConfig) -> Result<()> {
    let path = data_dir.join(CONFIG_FILE);
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use image::{DynamicImage, RgbImage};
    use scanbook_core::types::{ExportConfig, PageSize};
    use scanbook_export::ExportPlan;
    use std::cell::RefCell;

    fn test_service(dir: &Path) -> DocumentService {
        let store = DocumentStore::open_in_memory().expect("open store");
        let pipeline = ImagePipeline::new(dir.join("scanned_docs"), &AppConfig::default());
        DocumentService::new(store, pipeline)
    }

    fn fake_capture(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(24, 24, |x, _| {
            image::Rgb([if x % 2 == 0 { 50u8 } else { 190 }, 100, 160])
        }));
        img.save(&path).expect("write capture");
        path
    }

    fn captures(dir: &Path, n: usize, filter: FilterKind) -> Vec<CapturedPage> {
        (0..n)
            .map(|i| CapturedPage {
                capture_uri: fake_capture(dir, &format!("capture_{i}.png")),
                filter,
            })
            .collect()
    }

    /// Render engine double that records the plan instead of producing PDF.
    struct RecordingEngine {
        plans: RefCell<Vec<ExportPlan>>,
    }

    impl RecordingEngine {
        fn new() -> Self {
            Self {
                plans: RefCell::new(Vec::new()),
            }
        }
    }

    impl RenderEngine for RecordingEngine {
        fn render(&self, plan: &ExportPlan, output_path: &Path) -> Result<PathBuf> {
            self.plans.borrow_mut().push(plan.clone());
            Ok(output_path.to_path_buf())
        }
    }

    struct FixedCapture(Option<Vec<PathBuf>>);

    impl CaptureSource for FixedCapture {
        fn capture_pages(&self) -> Result<Option<Vec<PathBuf>>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn save_session_with_identity_filter_reuses_the_original() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut service = test_service(tmp.path());

        let doc = service
            .save_scan_session("Identity", &captures(tmp.path(), 2, FilterKind::Original))
            .expect("save");

        assert_eq!(doc.pages.len(), 2);
        for page in &doc.pages {
            assert_eq!(page.processed_uri, page.original_uri);
            assert!(page.original_uri.exists());
            assert_eq!(page.rotation, 0);
        }
    }

    #[test]
    fn save_session_with_filter_derives_distinct_renditions() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut service = test_service(tmp.path());

        let doc = service
            .save_scan_session("Filtered", &captures(tmp.path(), 2, FilterKind::Grayscale))
            .expect("save");

        for (i, page) in doc.pages.iter().enumerate() {
            assert_ne!(page.processed_uri, page.original_uri);
            assert!(page.original_uri.exists());
            assert!(page.processed_uri.exists());
            assert_eq!(page.filter, FilterKind::Grayscale);
            assert_eq!(page.order_index, i as u32);
        }
    }

    #[test]
    fn empty_session_is_rejected_before_any_write() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut service = test_service(tmp.path());
        assert!(matches!(
            service.save_scan_session("Empty", &[]),
            Err(ScanbookError::Validation(_))
        ));
        assert!(service.documents().expect("list").is_empty());
    }

    #[test]
    fn blank_title_is_rejected_before_any_file_is_written() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut service = test_service(tmp.path());
        let captures = captures(tmp.path(), 2, FilterKind::Grayscale);

        let result = service.save_scan_session("   ", &captures);
        assert!(matches!(result, Err(ScanbookError::Validation(_))));
        // The storage dir is created lazily, so rejection up front means
        // no copy or rendition was ever produced.
        assert!(!tmp.path().join("scanned_docs").exists());
        assert!(service.documents().expect("list").is_empty());
    }

    #[test]
    fn deleting_the_last_page_is_rejected_and_state_unchanged() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut service = test_service(tmp.path());
        let doc = service
            .save_scan_session("Single", &captures(tmp.path(), 1, FilterKind::Original))
            .expect("save");
        let page = doc.pages[0].clone();

        let result = service.delete_page(&doc.id, &page.id);
        assert!(matches!(result, Err(ScanbookError::InvariantViolation(_))));

        let reloaded = service.document(&doc.id).expect("get");
        assert_eq!(reloaded.pages.len(), 1);
        assert_eq!(reloaded.pages[0].id, page.id);
        assert!(page.original_uri.exists(), "files must be untouched");
    }

    #[test]
    fn deleting_one_of_three_pages_renormalizes_order() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut service = test_service(tmp.path());
        let doc = service
            .save_scan_session("Triple", &captures(tmp.path(), 3, FilterKind::Grayscale))
            .expect("save");
        let ids = doc.page_ids();
        let victim = doc.pages[1].clone();

        let after = service.delete_page(&doc.id, &victim.id).expect("delete");

        assert_eq!(after.pages.len(), 2);
        assert_eq!(after.page_ids(), vec![ids[0], ids[2]]);
        let orders: Vec<u32> = after.pages.iter().map(|p| p.order_index).collect();
        assert_eq!(orders, vec![0, 1]);
        // The victim's files are cleaned up, the survivors keep theirs.
        assert!(!victim.original_uri.exists());
        assert!(!victim.processed_uri.exists());
        assert!(after.pages[0].original_uri.exists());
    }

    #[test]
    fn reorder_through_service_is_idempotent() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut service = test_service(tmp.path());
        let doc = service
            .save_scan_session("Reorder", &captures(tmp.path(), 3, FilterKind::Original))
            .expect("save");
        let ids = doc.page_ids();

        let shuffled = vec![ids[2], ids[0], ids[1]];
        let first = service.reorder_pages(&doc.id, &shuffled).expect("reorder");
        assert_eq!(first.page_ids(), shuffled);

        let second = service
            .reorder_pages(&doc.id, &shuffled)
            .expect("reorder again");
        assert_eq!(second.page_ids(), shuffled);
        let orders: Vec<u32> = second.pages.iter().map(|p| p.order_index).collect();
        assert_eq!(orders, vec![0, 1, 2]);
    }

    #[test]
    fn delete_document_removes_rows_and_files() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut service = test_service(tmp.path());
        let doc = service
            .save_scan_session("Doomed", &captures(tmp.path(), 2, FilterKind::Bw))
            .expect("save");
        let pages = doc.pages.clone();

        service.delete_document(&doc.id).expect("delete");

        assert!(matches!(
            service.document(&doc.id),
            Err(ScanbookError::NotFound(_))
        ));
        for page in &pages {
            assert!(!page.original_uri.exists());
            assert!(!page.processed_uri.exists());
        }
    }

    #[test]
    fn reapply_filter_swaps_rendition_and_cleans_the_old_file() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut service = test_service(tmp.path());
        let doc = service
            .save_scan_session("Refilter", &captures(tmp.path(), 1, FilterKind::Grayscale))
            .expect("save");
        let before = doc.pages[0].clone();

        let after = service
            .reapply_filter(&doc.id, &before.id, FilterKind::Bw)
            .expect("reapply");

        assert_eq!(after.filter, FilterKind::Bw);
        assert_ne!(after.processed_uri, before.processed_uri);
        assert!(after.processed_uri.exists());
        assert!(!before.processed_uri.exists(), "stale rendition removed");
        assert!(before.original_uri.exists(), "original always kept");
        assert_eq!(after.order_index, 0);
    }

    #[test]
    fn reapply_identity_filter_points_back_at_the_original() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut service = test_service(tmp.path());
        let doc = service
            .save_scan_session("Back", &captures(tmp.path(), 1, FilterKind::Enhance))
            .expect("save");
        let before = doc.pages[0].clone();

        let after = service
            .reapply_filter(&doc.id, &before.id, FilterKind::Original)
            .expect("reapply");

        assert_eq!(after.processed_uri, after.original_uri);
        assert!(!before.processed_uri.exists());
    }

    #[test]
    fn export_reloads_the_document_snapshot() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut service = test_service(tmp.path());
        let doc = service
            .save_scan_session("Export", &captures(tmp.path(), 3, FilterKind::Grayscale))
            .expect("save");

        let engine = RecordingEngine::new();
        let out = tmp.path().join("export.pdf");
        service
            .export_document(&doc.id, Some(&ExportConfig::default()), &engine, &out)
            .expect("export");

        // Edit a page, re-export: the plan must pick up the new rendition
        // because the document is reloaded, not memoized.
        let target = doc.pages[0].id;
        let updated = service
            .reapply_filter(&doc.id, &target, FilterKind::Bw)
            .expect("reapply");
        service
            .export_document(&doc.id, Some(&ExportConfig::default()), &engine, &out)
            .expect("re-export");

        let plans = engine.plans.borrow();
        assert_eq!(plans.len(), 2);
        assert_eq!(plans[1].units[0].image_uri, updated.processed_uri);
        assert_ne!(plans[0].units[0].image_uri, plans[1].units[0].image_uri);
        // Captions stay 1-based and ordered.
        let captions: Vec<_> = plans[1]
            .units
            .iter()
            .map(|u| u.caption.clone().expect("caption"))
            .collect();
        assert_eq!(captions, vec!["Page 1 of 3", "Page 2 of 3", "Page 3 of 3"]);
    }

    #[test]
    fn export_without_explicit_config_uses_the_service_default() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = DocumentStore::open_in_memory().expect("open store");
        let pipeline = ImagePipeline::new(tmp.path().join("scanned_docs"), &AppConfig::default());
        let mut service = DocumentService::new(store, pipeline).with_default_export(ExportConfig {
            page_size: PageSize::A4,
            margin_mm: 12,
            include_page_numbers: false,
        });
        let doc = service
            .save_scan_session("Defaults", &captures(tmp.path(), 1, FilterKind::Original))
            .expect("save");

        let engine = RecordingEngine::new();
        service
            .export_document(&doc.id, None, &engine, &tmp.path().join("defaults.pdf"))
            .expect("export");

        let plans = engine.plans.borrow();
        assert_eq!(plans[0].page_size, PageSize::A4);
        assert_eq!(plans[0].margin_mm, 12);
        assert!(plans[0].units[0].caption.is_none());
    }

    #[test]
    fn export_with_bad_config_produces_nothing() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut service = test_service(tmp.path());
        let doc = service
            .save_scan_session("Bad", &captures(tmp.path(), 1, FilterKind::Original))
            .expect("save");

        let engine = RecordingEngine::new();
        let config = ExportConfig {
            page_size: PageSize::A4,
            margin_mm: 150,
            include_page_numbers: true,
        };
        let result =
            service.export_document(&doc.id, Some(&config), &engine, &tmp.path().join("bad.pdf"));

        assert!(matches!(result, Err(ScanbookError::Configuration(_))));
        assert!(engine.plans.borrow().is_empty(), "no unit may be rendered");
    }

    #[test]
    fn cancelled_capture_session_is_a_non_error_outcome() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut service = test_service(tmp.path());

        let cancelled = FixedCapture(None);
        assert!(service
            .scan_with(&cancelled, FilterKind::Original, None)
            .expect("scan")
            .is_none());

        let empty = FixedCapture(Some(Vec::new()));
        assert!(service
            .scan_with(&empty, FilterKind::Original, None)
            .expect("scan")
            .is_none());
        assert!(service.documents().expect("list").is_empty());
    }

    #[test]
    fn scan_with_captures_creates_a_titled_document() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut service = test_service(tmp.path());
        let paths = vec![
            fake_capture(tmp.path(), "a.png"),
            fake_capture(tmp.path(), "b.png"),
        ];

        let doc = service
            .scan_with(&FixedCapture(Some(paths)), FilterKind::Grayscale, None)
            .expect("scan")
            .expect("document");

        assert!(doc.title.starts_with("Scan "));
        assert_eq!(doc.pages.len(), 2);
    }

    #[test]
    fn default_title_formats_like_the_scan_screen() {
        let at = Utc.with_ymd_and_hms(2026, 8, 28, 15, 4, 0).single().expect("time");
        assert_eq!(default_title(at), "Scan 2026-08-28 3:04 PM");
        let morning = Utc.with_ymd_and_hms(2026, 1, 2, 0, 30, 0).single().expect("time");
        assert_eq!(default_title(morning), "Scan 2026-01-02 12:30 AM");
    }

    #[test]
    fn config_round_trips_through_the_data_dir() {
        let tmp = tempfile::tempdir().expect("tempdir");
        assert!(load_config(tmp.path()).is_none());

        let mut config = AppConfig::default();
        config.jpeg_quality = 75;
        config.default_filter = FilterKind::Bw;
        persist_config(tmp.path(), &config).expect("persist");

        let loaded = load_config(tmp.path()).expect("load");
        assert_eq!(loaded.jpeg_quality, 75);
        assert_eq!(loaded.default_filter, FilterKind::Bw);
    }
}
