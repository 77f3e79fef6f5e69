//! Media reconciliation and retry drain against a real Postgres schema.
//!
//! Most tests serve image bytes from memory; the size-cap test goes through
//! the HTTP fetcher against a wiremock server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use catalog_core::{NewProduct, PendingMedia, ProductPatch, VariantInput};
use catalog_media::HttpMediaFetcher;
use catalog_pipeline::memory::{
    MemoryEventQueue, MemoryIdAllocator, MemoryMediaFetch, MemoryMutationLock, MemoryObjectStore,
};
use catalog_pipeline::{
    AggregateWriter, CreatedProduct, EventQueue, FailureKind, MediaFetch, MediaReconciler,
    PendingMediaFailure, PipelineError, ReconcilerHandle, ID_COUNTER,
};
use rust_decimal::Decimal;
use sqlx::PgPool;
use wiremock::matchers::path;
use wiremock::{Mock, MockServer, ResponseTemplate};

const SHOP: i64 = 7;

struct Harness {
    writer: AggregateWriter,
    reconciler: Arc<MediaReconciler>,
    fetch: Arc<MemoryMediaFetch>,
    store: Arc<MemoryObjectStore>,
    events: Arc<MemoryEventQueue>,
}

fn harness(pool: &PgPool) -> Harness {
    let fetch = Arc::new(MemoryMediaFetch::default());
    harness_with_fetcher(pool, fetch.clone(), fetch)
}

fn harness_with_fetcher(
    pool: &PgPool,
    fetcher: Arc<dyn MediaFetch>,
    fetch: Arc<MemoryMediaFetch>,
) -> Harness {
    let store = Arc::new(MemoryObjectStore::default());
    let events = Arc::new(MemoryEventQueue::default());
    let writer = AggregateWriter::new(
        pool.clone(),
        Arc::new(MemoryIdAllocator::starting_at(ID_COUNTER, 500)),
        Arc::new(MemoryMutationLock::default()),
        events.clone(),
        Duration::from_secs(30),
    );
    let reconciler = Arc::new(MediaReconciler::new(
        pool.clone(),
        fetcher,
        store.clone(),
        events.clone(),
    ));
    Harness {
        writer,
        reconciler,
        fetch,
        store,
        events,
    }
}

async fn create(h: &Harness, images: &[&str], variant_images: &[&str]) -> CreatedProduct {
    let variants = variant_images
        .iter()
        .enumerate()
        .map(|(i, url)| VariantInput {
            price: Some(Decimal::new(1000, 2)),
            spec: Some(format!(r#"{{"size":"{i}"}}"#)),
            image_url: Some((*url).to_owned()),
            ..VariantInput::default()
        })
        .collect();
    let input = NewProduct {
        shop_id: SHOP,
        title: "Poster".to_owned(),
        price: Decimal::new(1000, 2),
        images: images.iter().map(|u| (*u).to_owned()).collect(),
        variants,
        ..NewProduct::default()
    };
    h.writer.create_product(input).await.unwrap()
}

fn failures(events: &MemoryEventQueue, kind: FailureKind) -> Vec<PendingMediaFailure> {
    events
        .entries(kind.queue())
        .into_iter()
        .map(|v| serde_json::from_value(v).unwrap())
        .collect()
}

async fn queue_failure(events: &dyn EventQueue, kind: FailureKind, failure: &PendingMediaFailure) {
    events
        .push(kind.queue(), serde_json::to_value(failure).unwrap())
        .await
        .unwrap();
}

/// Delegates to a memory queue but fails the `fail_on`-th pop.
struct FailingPopQueue {
    inner: Arc<MemoryEventQueue>,
    pops: AtomicUsize,
    fail_on: usize,
}

#[async_trait]
impl EventQueue for FailingPopQueue {
    async fn push(&self, queue: &str, payload: serde_json::Value) -> Result<(), PipelineError> {
        self.inner.push(queue, payload).await
    }

    async fn pop(&self, queue: &str) -> Result<Option<serde_json::Value>, PipelineError> {
        if self.pops.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_on {
            return Err(PipelineError::Capability("queue unavailable".to_owned()));
        }
        self.inner.pop(queue).await
    }

    async fn depth(&self, queue: &str) -> Result<usize, PipelineError> {
        self.inner.depth(queue).await
    }
}

// ----- Reconcile -----

#[sqlx::test(migrations = "../../migrations")]
async fn reconcile_keeps_order_and_dedupes_content(pool: PgPool) {
    let h = harness(&pool);
    h.fetch.insert("https://img.test/a.png", b"alpha", ".png");
    h.fetch.insert("https://img.test/b.png", b"bravo", ".png");
    h.fetch.insert("https://img.test/copy-of-a.png", b"alpha", ".png");
    let created = create(
        &h,
        &[
            "https://img.test/a.png",
            "https://img.test/b.png",
            "https://img.test/copy-of-a.png",
        ],
        &[],
    )
    .await;

    let report = h.reconciler.reconcile(created.pending.clone()).await;

    assert_eq!(report.stored, 3);
    assert_eq!(report.failed, 0);
    assert_eq!(h.store.len(), 2);

    let row = catalog_db::find_product(&pool, SHOP, created.product_id)
        .await
        .unwrap()
        .unwrap();
    let ids = catalog_core::parse_image_ids(&row.image_ids);
    assert_eq!(ids.len(), 2);
    assert_eq!(row.default_image_id, ids[0]);

    let first = catalog_db::find_image(&pool, SHOP, ids[0]).await.unwrap();
    assert!(first.src.starts_with("memory://uploader/"));
    assert!(first.src.ends_with(".png"));
}

#[sqlx::test(migrations = "../../migrations")]
async fn oversized_variant_image_fails_alone(pool: PgPool) {
    let server = MockServer::start().await;
    Mock::given(path("/ok.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"small".to_vec()))
        .mount(&server)
        .await;
    Mock::given(path("/huge.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 9_000_000]))
        .mount(&server)
        .await;

    let fetcher = HttpMediaFetcher::new(10, "catalog-test", 8 * 1024 * 1024).unwrap();
    let h = harness_with_fetcher(&pool, Arc::new(fetcher), Arc::new(MemoryMediaFetch::default()));
    let ok = format!("{}/ok.png", server.uri());
    let huge = format!("{}/huge.png", server.uri());
    let created = create(&h, &[ok.as_str()], &[ok.as_str(), huge.as_str()]).await;

    let report = h.reconciler.reconcile(created.pending.clone()).await;

    assert_eq!(report.stored, 1);
    assert_eq!(report.failed, 1);

    let variants = catalog_db::list_variants(&pool, created.product_id).await.unwrap();
    assert!(variants[0].image_id > 0);
    assert_eq!(variants[1].image_id, 0);

    let queued = failures(&h.events, FailureKind::VariantImage);
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].variant_id, Some(variants[1].id));
    assert_eq!(queued[0].url, huge);
    assert!(h.events.is_empty(FailureKind::ProductImage.queue()));
}

#[sqlx::test(migrations = "../../migrations")]
async fn unresolved_designated_default_falls_back_and_is_queued(pool: PgPool) {
    let h = harness(&pool);
    h.fetch.insert("https://img.test/a.png", b"alpha", ".png");
    let created = create(&h, &["https://img.test/a.png"], &[]).await;
    let mut job = created.pending.clone();
    job.default_image_url = Some("https://img.test/missing.png".to_owned());

    let report = h.reconciler.reconcile(job).await;

    assert_eq!(report.stored, 1);
    let row = catalog_db::find_product(&pool, SHOP, created.product_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.default_image_id.to_string(), row.image_ids);

    let queued = failures(&h.events, FailureKind::DefaultImage);
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].url, "https://img.test/missing.png");
}

#[sqlx::test(migrations = "../../migrations")]
async fn added_images_do_not_replace_existing_default(pool: PgPool) {
    let h = harness(&pool);
    h.fetch.insert("https://img.test/a.png", b"alpha", ".png");
    h.fetch.insert("https://img.test/b.png", b"bravo", ".png");
    let created = create(&h, &["https://img.test/a.png"], &[]).await;
    h.reconciler.reconcile(created.pending.clone()).await;
    let before = catalog_db::find_product(&pool, SHOP, created.product_id)
        .await
        .unwrap()
        .unwrap();

    let mut job = PendingMedia::new(SHOP, created.product_id);
    job.image_urls = vec!["https://img.test/b.png".to_owned()];
    h.reconciler.reconcile(job).await;

    let after = catalog_db::find_product(&pool, SHOP, created.product_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.default_image_id, before.default_image_id);
    assert_eq!(catalog_core::parse_image_ids(&after.image_ids).len(), 2);
}

#[sqlx::test(migrations = "../../migrations")]
async fn handle_runs_jobs_in_background_and_drains_on_shutdown(pool: PgPool) {
    let h = harness(&pool);
    h.fetch.insert("https://img.test/a.png", b"alpha", ".png");
    let created = create(&h, &["https://img.test/a.png"], &[]).await;

    let handle = ReconcilerHandle::spawn(h.reconciler.clone());
    handle.submit(created.pending.clone()).await;
    handle.shutdown().await;

    let row = catalog_db::find_product(&pool, SHOP, created.product_id)
        .await
        .unwrap()
        .unwrap();
    assert!(row.default_image_id > 0);

    // Intake is closed; the job goes straight to the failure queues.
    handle.submit(created.pending.clone()).await;
    assert_eq!(h.events.len(FailureKind::ProductImage.queue()), 1);
    assert_eq!(h.events.len(FailureKind::DefaultImage.queue()), 1);
}

// ----- Retry drain -----

#[sqlx::test(migrations = "../../migrations")]
async fn retry_recovers_once_url_becomes_available(pool: PgPool) {
    let h = harness(&pool);
    let created = create(&h, &["https://img.test/late.png"], &[]).await;
    let report = h.reconciler.reconcile(created.pending.clone()).await;
    assert_eq!(report.failed, 2);

    h.fetch.insert("https://img.test/late.png", b"late", ".png");
    let retry = h.reconciler.retry_failed_media(5).await.unwrap();

    assert_eq!(retry.retried, 2);
    assert_eq!(retry.succeeded, 2);
    assert_eq!(retry.requeued, 0);
    let row = catalog_db::find_product(&pool, SHOP, created.product_id)
        .await
        .unwrap()
        .unwrap();
    assert!(row.default_image_id > 0);
    assert_eq!(row.image_ids, row.default_image_id.to_string());
    assert!(h.events.is_empty(FailureKind::ProductImage.queue()));
}

#[sqlx::test(migrations = "../../migrations")]
async fn retry_requeues_then_drops_after_max_attempts(pool: PgPool) {
    let h = harness(&pool);
    let created = create(&h, &[], &[]).await;
    let failure = PendingMediaFailure {
        shop_id: SHOP,
        product_id: created.product_id,
        variant_id: None,
        url: "https://img.test/never.png".to_owned(),
        attempts: 0,
    };
    h.events
        .push(
            FailureKind::ProductImage.queue(),
            serde_json::to_value(&failure).unwrap(),
        )
        .await
        .unwrap();

    let first = h.reconciler.retry_failed_media(2).await.unwrap();
    assert_eq!(first.requeued, 1);
    let queued = failures(&h.events, FailureKind::ProductImage);
    assert_eq!(queued[0].attempts, 1);

    let second = h.reconciler.retry_failed_media(2).await.unwrap();
    assert_eq!(second.dropped, 1);
    assert!(h.events.is_empty(FailureKind::ProductImage.queue()));
}

#[sqlx::test(migrations = "../../migrations")]
async fn retry_drops_entries_for_deleted_products(pool: PgPool) {
    let h = harness(&pool);
    let created = create(&h, &["https://img.test/gone.png"], &[]).await;
    h.reconciler.reconcile(created.pending.clone()).await;
    h.writer
        .delete_product(SHOP, created.product_id)
        .await
        .unwrap();
    h.fetch.insert("https://img.test/gone.png", b"gone", ".png");

    let retry = h.reconciler.retry_failed_media(5).await.unwrap();

    assert_eq!(retry.dropped, 2);
    assert_eq!(retry.succeeded, 0);
    assert!(h.store.is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
async fn update_media_flows_through_reconciler(pool: PgPool) {
    let h = harness(&pool);
    h.fetch.insert("https://img.test/new.png", b"new", ".png");
    let created = create(&h, &[], &[]).await;

    let patch = ProductPatch {
        images: Some(vec![catalog_core::ImageRef {
            id: None,
            url: Some("https://img.test/new.png".to_owned()),
        }]),
        ..ProductPatch::default()
    };
    let pending = h
        .writer
        .update_product(SHOP, created.product_id, patch)
        .await
        .unwrap();
    let report = h.reconciler.reconcile(pending).await;

    assert_eq!(report.stored, 1);
    let row = catalog_db::find_product(&pool, SHOP, created.product_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.image_ids, row.default_image_id.to_string());
}

#[sqlx::test(migrations = "../../migrations")]
async fn retry_keeps_unpopped_entries_when_queue_read_fails(pool: PgPool) {
    let h = harness(&pool);
    let created = create(&h, &[], &[]).await;
    for n in 0..3 {
        let failure = PendingMediaFailure {
            shop_id: SHOP,
            product_id: created.product_id,
            variant_id: None,
            url: format!("https://img.test/missing-{n}.png"),
            attempts: 0,
        };
        queue_failure(h.events.as_ref(), FailureKind::ProductImage, &failure).await;
    }
    let failing = Arc::new(FailingPopQueue {
        inner: h.events.clone(),
        pops: AtomicUsize::new(0),
        fail_on: 2,
    });
    let reconciler = MediaReconciler::new(pool.clone(), h.fetch.clone(), h.store.clone(), failing);

    let result = reconciler.retry_failed_media(5).await;

    assert!(matches!(result, Err(PipelineError::Capability(_))));
    let queued = failures(&h.events, FailureKind::ProductImage);
    assert_eq!(queued.len(), 3);
    let mut attempts: Vec<u32> = queued.iter().map(|f| f.attempts).collect();
    attempts.sort_unstable();
    assert_eq!(attempts, vec![0, 0, 1]);
}

#[sqlx::test(migrations = "../../migrations")]
async fn retry_pass_does_not_revisit_requeued_entries(pool: PgPool) {
    let h = harness(&pool);
    let created = create(&h, &[], &[]).await;
    for n in 0..2 {
        let failure = PendingMediaFailure {
            shop_id: SHOP,
            product_id: created.product_id,
            variant_id: None,
            url: format!("https://img.test/absent-{n}.png"),
            attempts: 0,
        };
        queue_failure(h.events.as_ref(), FailureKind::ProductImage, &failure).await;
    }

    let report = h.reconciler.retry_failed_media(5).await.unwrap();

    assert_eq!(report.retried, 2);
    assert_eq!(report.requeued, 2);
    let queued = failures(&h.events, FailureKind::ProductImage);
    assert!(queued.iter().all(|f| f.attempts == 1));
}

#[sqlx::test(migrations = "../../migrations")]
async fn default_image_retry_stores_appends_and_binds(pool: PgPool) {
    let h = harness(&pool);
    let created = create(&h, &[], &[]).await;
    h.fetch.insert("https://img.test/cover.png", b"cover", ".png");
    let failure = PendingMediaFailure {
        shop_id: SHOP,
        product_id: created.product_id,
        variant_id: None,
        url: "https://img.test/cover.png".to_owned(),
        attempts: 2,
    };
    queue_failure(h.events.as_ref(), FailureKind::DefaultImage, &failure).await;

    let report = h.reconciler.retry_failed_media(5).await.unwrap();

    assert_eq!(report.succeeded, 1);
    let row = catalog_db::find_product(&pool, SHOP, created.product_id)
        .await
        .unwrap()
        .unwrap();
    assert!(row.default_image_id > 0);
    assert_eq!(row.image_ids, row.default_image_id.to_string());
    assert!(h.events.is_empty(FailureKind::DefaultImage.queue()));
}
