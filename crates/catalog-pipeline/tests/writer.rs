//! Aggregate writer tests against a real Postgres schema.
//!
//! Counters, locks and queues use the in-memory capabilities so each test
//! can inspect what was emitted.

use std::sync::Arc;
use std::time::Duration;

use catalog_core::{CoreError, ImageRef, NewProduct, ProductPatch, VariantInput};
use catalog_pipeline::memory::{MemoryEventQueue, MemoryIdAllocator, MemoryMutationLock};
use catalog_pipeline::{
    content_hash, title_lock_key, AggregateWriter, MutationLock, PipelineError, SyncEvent,
    SyncKind, TagCleanupHint, SYNC_QUEUE, TAG_CLEANUP_QUEUE,
};
use rust_decimal::Decimal;
use sqlx::PgPool;

const SHOP: i64 = 42;

struct Harness {
    writer: AggregateWriter,
    locks: Arc<MemoryMutationLock>,
    events: Arc<MemoryEventQueue>,
}

fn harness(pool: &PgPool) -> Harness {
    let locks = Arc::new(MemoryMutationLock::default());
    let events = Arc::new(MemoryEventQueue::default());
    let writer = AggregateWriter::new(
        pool.clone(),
        Arc::new(MemoryIdAllocator::starting_at(catalog_pipeline::ID_COUNTER, 1000)),
        locks.clone(),
        events.clone(),
        Duration::from_secs(30),
    );
    Harness {
        writer,
        locks,
        events,
    }
}

fn product(title: &str) -> NewProduct {
    NewProduct {
        shop_id: SHOP,
        title: title.to_owned(),
        price: Decimal::new(1999, 2),
        body_html: Some("<p>Soft leather</p>".to_owned()),
        ..NewProduct::default()
    }
}

fn variant(spec: &str, price: i64) -> VariantInput {
    VariantInput {
        title: Some(spec.to_owned()),
        price: Some(Decimal::new(price, 2)),
        spec: Some(spec.to_owned()),
        ..VariantInput::default()
    }
}

fn sync_events(events: &MemoryEventQueue) -> Vec<SyncEvent> {
    events
        .entries(SYNC_QUEUE)
        .into_iter()
        .map(|v| serde_json::from_value(v).unwrap())
        .collect()
}

async fn product_count(pool: &PgPool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM products")
        .fetch_one(pool)
        .await
        .unwrap()
}

// ----- Create -----

#[sqlx::test(migrations = "../../migrations")]
async fn create_assigns_unique_handlers(pool: PgPool) {
    let h = harness(&pool);

    let first = h.writer.create_product(product("Red Shoe")).await.unwrap();
    let second = h.writer.create_product(product("Red Shoe")).await.unwrap();

    assert_eq!(first.handler, "red-shoe");
    assert_eq!(second.handler, "red-shoe-1");
    assert_ne!(first.product_id, second.product_id);

    let stored = catalog_db::find_product(&pool, SHOP, second.product_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.handler_origin, "red-shoe");
    assert_eq!(stored.seo_title, "Red Shoe");
    assert_eq!(stored.seo_desc, "Soft leather");
    assert_eq!(stored.status, 2);
}

#[sqlx::test(migrations = "../../migrations")]
async fn create_writes_whole_aggregate(pool: PgPool) {
    let h = harness(&pool);
    let mut input = product("Canvas Tote");
    input.tags = vec!["summer".to_owned(), " summer ".to_owned(), "bags".to_owned()];
    input.variants = vec![
        variant(r#"{"color":"red"}"#, 1500),
        variant(r#"{"color":"blue"}"#, 1600),
    ];

    let created = h.writer.create_product(input).await.unwrap();

    let variants = catalog_db::list_variants(&pool, created.product_id).await.unwrap();
    assert_eq!(variants.len(), 2);
    assert!(variants.iter().all(|v| v.is_show));
    assert_eq!(variants[0].sort, 1);
    assert_eq!(variants[1].sort, 2);

    let tags: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM product_tags WHERE product_id = $1")
        .bind(created.product_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(tags, 2);

    let detail = catalog_db::find_detail(&pool, created.product_id).await.unwrap();
    assert_eq!(detail.content_hash, content_hash("<p>Soft leather</p>"));

    assert_eq!(
        sync_events(&h.events),
        vec![SyncEvent {
            shop_id: SHOP,
            product_id: created.product_id,
            event: SyncKind::Add,
        }]
    );
    assert!(!h.locks.is_held(&title_lock_key(SHOP, "Canvas Tote")));
}

#[sqlx::test(migrations = "../../migrations")]
async fn create_without_variants_synthesizes_hidden_catch_all(pool: PgPool) {
    let h = harness(&pool);
    let mut input = product("Plain Mug");
    input.sku = Some("MUG-1".to_owned());
    input.inventory_quantity = 12;

    let created = h.writer.create_product(input).await.unwrap();

    let variants = catalog_db::list_variants(&pool, created.product_id).await.unwrap();
    assert_eq!(variants.len(), 1);
    let catch_all = &variants[0];
    assert!(!catch_all.is_show);
    assert_eq!(catch_all.title, "Plain Mug");
    assert_eq!(catch_all.sku_code, "MUG-1");
    assert_eq!(catch_all.price, Decimal::new(1999, 2));
    assert_eq!(catch_all.inventory_quantity, 12);
}

#[sqlx::test(migrations = "../../migrations")]
async fn duplicate_spec_rejected_before_any_write(pool: PgPool) {
    let h = harness(&pool);
    let mut input = product("Twin Socks");
    input.variants = vec![
        variant(r#"{"size":"M"}"#, 500),
        variant(r#"{"size":"M"}"#, 600),
    ];

    let err = h.writer.create_product(input).await.unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Validation(CoreError::SpecRepeated)
    ));
    assert_eq!(product_count(&pool).await, 0);
    assert!(h.events.is_empty(SYNC_QUEUE));
}

#[sqlx::test(migrations = "../../migrations")]
async fn create_with_held_title_lock_is_contention(pool: PgPool) {
    let h = harness(&pool);
    let held = h
        .locks
        .try_acquire(&title_lock_key(SHOP, "Red Shoe"), Duration::from_secs(30))
        .await
        .unwrap();
    assert!(held.is_some());

    let err = h.writer.create_product(product("Red Shoe")).await.unwrap_err();

    assert!(matches!(err, PipelineError::Contention));
    assert_eq!(product_count(&pool).await, 0);
}

#[sqlx::test(migrations = "../../migrations")]
async fn create_returns_pending_media(pool: PgPool) {
    let h = harness(&pool);
    let mut input = product("Lamp");
    input.images = vec![
        "https://img.test/a.png".to_owned(),
        "https://img.test/b.png".to_owned(),
    ];
    input.variants = vec![VariantInput {
        image_url: Some("https://img.test/v.png".to_owned()),
        ..variant(r#"{"finish":"brass"}"#, 4000)
    }];

    let created = h.writer.create_product(input).await.unwrap();

    assert_eq!(created.pending.product_id, created.product_id);
    assert_eq!(
        created.pending.default_image_url.as_deref(),
        Some("https://img.test/a.png")
    );
    assert_eq!(created.pending.image_urls.len(), 2);
    assert_eq!(created.pending.variant_images.len(), 1);
}

// ----- Update -----

#[sqlx::test(migrations = "../../migrations")]
async fn update_replaces_variant_set(pool: PgPool) {
    let h = harness(&pool);
    let mut input = product("Hoodie");
    input.variants = vec![
        variant(r#"{"size":"S"}"#, 3000),
        variant(r#"{"size":"M"}"#, 3000),
        variant(r#"{"size":"L"}"#, 3000),
    ];
    let created = h.writer.create_product(input).await.unwrap();
    let before = catalog_db::list_variants(&pool, created.product_id).await.unwrap();
    let (a, b, c) = (before[0].id, before[1].id, before[2].id);

    let patch = ProductPatch {
        variants: Some(vec![
            VariantInput {
                id: Some(a),
                price: Some(Decimal::new(2500, 2)),
                ..VariantInput::default()
            },
            variant(r#"{"size":"XL"}"#, 3500),
        ]),
        ..ProductPatch::default()
    };
    h.writer
        .update_product(SHOP, created.product_id, patch)
        .await
        .unwrap();

    let after = catalog_db::list_variants(&pool, created.product_id).await.unwrap();
    let ids: Vec<i64> = after.iter().map(|v| v.id).collect();
    assert_eq!(after.len(), 2);
    assert!(ids.contains(&a));
    assert!(!ids.contains(&b));
    assert!(!ids.contains(&c));

    let edited = after.iter().find(|v| v.id == a).unwrap();
    assert_eq!(edited.price, Decimal::new(2500, 2));
    assert_eq!(edited.spec, r#"{"size":"S"}"#);
    let added = after.iter().find(|v| v.id != a).unwrap();
    assert_eq!(added.spec, r#"{"size":"XL"}"#);
    assert_eq!(added.sort, 2);
}

#[sqlx::test(migrations = "../../migrations")]
async fn update_with_unknown_variant_id_is_not_found(pool: PgPool) {
    let h = harness(&pool);
    let created = h.writer.create_product(product("Cap")).await.unwrap();

    let patch = ProductPatch {
        title: Some("Cap Two".to_owned()),
        variants: Some(vec![
            variant(r#"{"size":"S"}"#, 100),
            VariantInput {
                id: Some(999_999),
                price: Some(Decimal::ONE),
                ..VariantInput::default()
            },
        ]),
        ..ProductPatch::default()
    };
    let err = h
        .writer
        .update_product(SHOP, created.product_id, patch)
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::NotFound { entity: "variant" }));
    // No id was taken for the earlier insert and the title was never locked.
    let next = h.writer.create_product(product("Visor")).await.unwrap();
    assert_eq!(next.product_id, created.product_id + 2);
    assert!(!h.locks.is_held(&title_lock_key(SHOP, "Cap Two")));
    let stored = catalog_db::find_product(&pool, SHOP, created.product_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.title, "Cap");
}

#[sqlx::test(migrations = "../../migrations")]
async fn update_with_empty_variant_list_keeps_variants(pool: PgPool) {
    let h = harness(&pool);
    let mut input = product("Hoodie");
    input.variants = vec![variant(r#"{"size":"S"}"#, 3000), variant(r#"{"size":"M"}"#, 3200)];
    let created = h.writer.create_product(input).await.unwrap();
    let before = catalog_db::list_variants(&pool, created.product_id).await.unwrap();

    let patch = ProductPatch {
        sub_title: Some("Heavyweight".to_owned()),
        variants: Some(Vec::new()),
        ..ProductPatch::default()
    };
    h.writer
        .update_product(SHOP, created.product_id, patch)
        .await
        .unwrap();

    let after = catalog_db::list_variants(&pool, created.product_id).await.unwrap();
    let before_ids: Vec<i64> = before.iter().map(|v| v.id).collect();
    let after_ids: Vec<i64> = after.iter().map(|v| v.id).collect();
    assert_eq!(after_ids, before_ids);
    assert_eq!(after.len(), 2);
}

#[sqlx::test(migrations = "../../migrations")]
async fn empty_variant_list_still_mirrors_into_catch_all(pool: PgPool) {
    let h = harness(&pool);
    let created = h.writer.create_product(product("Pin")).await.unwrap();

    let patch = ProductPatch {
        price: Some(Decimal::new(450, 2)),
        variants: Some(Vec::new()),
        ..ProductPatch::default()
    };
    h.writer
        .update_product(SHOP, created.product_id, patch)
        .await
        .unwrap();

    let variants = catalog_db::list_variants(&pool, created.product_id).await.unwrap();
    assert_eq!(variants.len(), 1);
    assert!(!variants[0].is_show);
    assert_eq!(variants[0].price, Decimal::new(450, 2));
}

#[sqlx::test(migrations = "../../migrations")]
async fn first_real_variants_replace_catch_all(pool: PgPool) {
    let h = harness(&pool);
    let created = h.writer.create_product(product("Scarf")).await.unwrap();
    let catch_all = catalog_db::list_variants(&pool, created.product_id).await.unwrap();
    assert_eq!(catch_all.len(), 1);
    assert!(!catch_all[0].is_show);

    let patch = ProductPatch {
        variants: Some(vec![
            variant(r#"{"color":"red"}"#, 2500),
            variant(r#"{"color":"grey"}"#, 2500),
        ]),
        ..ProductPatch::default()
    };
    h.writer
        .update_product(SHOP, created.product_id, patch)
        .await
        .unwrap();

    let variants = catalog_db::list_variants(&pool, created.product_id).await.unwrap();
    assert_eq!(variants.len(), 2);
    assert!(variants.iter().all(|v| v.is_show && v.id != catch_all[0].id));
    let sorts: Vec<i32> = variants.iter().map(|v| v.sort).collect();
    assert_eq!(sorts, vec![1, 2]);
}

#[sqlx::test(migrations = "../../migrations")]
async fn update_writes_zero_price_and_mirrors_catch_all(pool: PgPool) {
    let h = harness(&pool);
    let created = h.writer.create_product(product("Sticker")).await.unwrap();

    let patch = ProductPatch {
        price: Some(Decimal::ZERO),
        ..ProductPatch::default()
    };
    h.writer
        .update_product(SHOP, created.product_id, patch)
        .await
        .unwrap();

    let stored = catalog_db::find_product(&pool, SHOP, created.product_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.price, Decimal::ZERO);
    assert_eq!(stored.title, "Sticker");

    let variants = catalog_db::list_variants(&pool, created.product_id).await.unwrap();
    assert_eq!(variants[0].price, Decimal::ZERO);
}

#[sqlx::test(migrations = "../../migrations")]
async fn unchanged_body_skips_detail_write(pool: PgPool) {
    let h = harness(&pool);
    let created = h.writer.create_product(product("Vase")).await.unwrap();
    let before = catalog_db::find_detail(&pool, created.product_id).await.unwrap();

    let patch = ProductPatch {
        body_html: Some("<p>Soft leather</p>".to_owned()),
        ..ProductPatch::default()
    };
    h.writer
        .update_product(SHOP, created.product_id, patch)
        .await
        .unwrap();

    let after = catalog_db::find_detail(&pool, created.product_id).await.unwrap();
    assert_eq!(before.updated_at, after.updated_at);

    let patch = ProductPatch {
        body_html: Some("<p>Glazed</p>".to_owned()),
        ..ProductPatch::default()
    };
    h.writer
        .update_product(SHOP, created.product_id, patch)
        .await
        .unwrap();
    let changed = catalog_db::find_detail(&pool, created.product_id).await.unwrap();
    assert_eq!(changed.body_html, "<p>Glazed</p>");
    assert_eq!(changed.content_hash, content_hash("<p>Glazed</p>"));
}

#[sqlx::test(migrations = "../../migrations")]
async fn update_title_regenerates_handler(pool: PgPool) {
    let h = harness(&pool);
    let created = h.writer.create_product(product("Old Name")).await.unwrap();

    let patch = ProductPatch {
        title: Some("New Name".to_owned()),
        ..ProductPatch::default()
    };
    h.writer
        .update_product(SHOP, created.product_id, patch)
        .await
        .unwrap();

    let stored = catalog_db::find_product(&pool, SHOP, created.product_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.handler, "new-name");
    assert!(!h.locks.is_held(&title_lock_key(SHOP, "New Name")));
}

#[sqlx::test(migrations = "../../migrations")]
async fn update_images_keeps_live_ids_and_returns_new_urls(pool: PgPool) {
    let h = harness(&pool);
    let created = h.writer.create_product(product("Frame")).await.unwrap();
    let live = catalog_db::upsert_image(
        &pool,
        &catalog_db::NewImage {
            shop_id: SHOP,
            fingerprint: "f1",
            file_key: "uploader/f1.png",
            src: "https://cdn.test/f1.png",
            width: 10,
        },
    )
    .await
    .unwrap();

    let patch = ProductPatch {
        images: Some(vec![
            ImageRef {
                id: Some(live),
                url: None,
            },
            ImageRef {
                id: Some(424_242),
                url: None,
            },
            ImageRef {
                id: None,
                url: Some("https://img.test/new.png".to_owned()),
            },
        ]),
        ..ProductPatch::default()
    };
    let pending = h
        .writer
        .update_product(SHOP, created.product_id, patch)
        .await
        .unwrap();

    let stored = catalog_db::find_product(&pool, SHOP, created.product_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.image_ids, live.to_string());
    assert_eq!(stored.default_image_id, live);
    assert_eq!(pending.image_urls, vec!["https://img.test/new.png"]);
}

#[sqlx::test(migrations = "../../migrations")]
async fn update_tags_reports_orphaned_tags(pool: PgPool) {
    let h = harness(&pool);
    let mut input = product("Scarf");
    input.tags = vec!["wool".to_owned(), "winter".to_owned()];
    let created = h.writer.create_product(input).await.unwrap();

    let patch = ProductPatch {
        tags: Some(vec!["wool".to_owned()]),
        ..ProductPatch::default()
    };
    h.writer
        .update_product(SHOP, created.product_id, patch)
        .await
        .unwrap();

    let hints: Vec<TagCleanupHint> = h
        .events
        .entries(TAG_CLEANUP_QUEUE)
        .into_iter()
        .map(|v| serde_json::from_value(v).unwrap())
        .collect();
    assert_eq!(hints.len(), 1);
    assert_eq!(hints[0].shop_id, SHOP);
}

// ----- Delete -----

#[sqlx::test(migrations = "../../migrations")]
async fn delete_published_product_is_rejected(pool: PgPool) {
    let h = harness(&pool);
    let mut input = product("Shown");
    input.status = Some("published".to_owned());
    let created = h.writer.create_product(input).await.unwrap();

    let err = h
        .writer
        .delete_product(SHOP, created.product_id)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Validation(CoreError::DeletePublished)
    ));
    assert!(catalog_db::find_product(&pool, SHOP, created.product_id)
        .await
        .unwrap()
        .is_some());
}

#[sqlx::test(migrations = "../../migrations")]
async fn delete_soft_deletes_and_emits(pool: PgPool) {
    let h = harness(&pool);
    let mut input = product("Gone Soon");
    input.tags = vec!["clearance".to_owned()];
    let created = h.writer.create_product(input).await.unwrap();

    h.writer
        .delete_product(SHOP, created.product_id)
        .await
        .unwrap();

    assert!(catalog_db::find_product(&pool, SHOP, created.product_id)
        .await
        .unwrap()
        .is_none());
    assert!(catalog_db::list_variants(&pool, created.product_id)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(h.events.len(TAG_CLEANUP_QUEUE), 1);

    let kinds: Vec<SyncKind> = sync_events(&h.events).into_iter().map(|e| e.event).collect();
    assert_eq!(kinds, vec![SyncKind::Add, SyncKind::Delete]);

    let again = h.writer.delete_product(SHOP, created.product_id).await;
    assert!(matches!(again, Err(PipelineError::NotFound { entity: "product" })));
}
