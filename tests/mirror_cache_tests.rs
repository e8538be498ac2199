mod common;

use common::row;
use digimagang::domains::testimonials::{Testimonial, TestimonialDraft, TestimonialStatus, Testimonials};
use digimagang::domains::{TESTIMONIAL_MIRROR_KEY, TestimonialStore};
use digimagang::store::{Domain, SnapshotSource};
use digimagang::{FileMirror, MemoryTable, MirrorCache, TableGateway};
use serde_json::json;
use std::sync::Arc;

fn testimonial_rows() -> Vec<digimagang::core::RawRow> {
    vec![
        row(json!({
            "id": 1,
            "author": "Rina",
            "program": "Content Marketing",
            "content": "Seru dan langsung praktik",
            "rating": 5,
            "status": "published",
            "date": "2025-02-01"
        })),
        row(json!({
            "id": 2,
            "author": "Bagas",
            "program": "Ads Dasar",
            "content": "Belajar iklan dari nol",
            "rating": 4,
            "status": "published",
            "date": "2025-03-10"
        })),
    ]
}

fn store_over(table: &MemoryTable, mirror: &Arc<FileMirror>) -> TestimonialStore {
    TestimonialStore::new(Some(Arc::new(table.clone()) as Arc<dyn TableGateway>))
        .with_mirror(mirror.clone() as Arc<dyn MirrorCache>, TESTIMONIAL_MIRROR_KEY)
}

#[tokio::test]
async fn test_remote_load_writes_mirror_file() {
    let dir = tempfile::tempdir().unwrap();
    let mirror = Arc::new(FileMirror::new(dir.path()));
    let table = MemoryTable::with_rows("testimoni", testimonial_rows());
    let store = store_over(&table, &mirror);

    store.load().await;

    let path = mirror.path_for(TESTIMONIAL_MIRROR_KEY);
    assert!(path.ends_with("testimoni_data.json"));
    let saved: Vec<Testimonial> = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(saved, store.entities().into_iter().collect::<Vec<_>>());
    // newest first
    assert_eq!(saved[0].id, "2");
}

#[tokio::test]
async fn test_failed_fetch_falls_back_to_mirror() {
    let dir = tempfile::tempdir().unwrap();
    let mirror = Arc::new(FileMirror::new(dir.path()));
    let table = MemoryTable::with_rows("testimoni", testimonial_rows());
    let first = store_over(&table, &mirror);
    first.load().await;
    let remembered = first.entities();
    first.dispose();

    let offline = MemoryTable::new("testimoni");
    offline.set_offline(true);
    let second = store_over(&offline, &mirror);
    second.load().await;

    let snapshot = second.snapshot();
    assert_eq!(snapshot.source, SnapshotSource::Mirror);
    assert!(snapshot.is_fallback());
    assert!(snapshot.error.is_some());
    assert_eq!(snapshot.entities, remembered);
}

#[tokio::test]
async fn test_empty_mirror_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let mirror = Arc::new(FileMirror::new(dir.path()));
    let offline = MemoryTable::new("testimoni");
    offline.set_offline(true);
    let store = store_over(&offline, &mirror);

    store.load().await;

    let snapshot = store.snapshot();
    assert_eq!(snapshot.source, SnapshotSource::Defaults);
    assert!(snapshot.error.is_some());
    assert_eq!(snapshot.entities.iter().cloned().collect::<Vec<_>>(), Testimonials::defaults());
}

#[tokio::test]
async fn test_unreadable_mirror_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let mirror = Arc::new(FileMirror::new(dir.path()));
    mirror.write(TESTIMONIAL_MIRROR_KEY, "{not json").await.unwrap();
    let offline = MemoryTable::new("testimoni");
    offline.set_offline(true);
    let store = store_over(&offline, &mirror);

    store.load().await;

    assert_eq!(store.snapshot().source, SnapshotSource::Defaults);
}

#[tokio::test]
async fn test_detached_store_persists_writes_to_mirror() {
    let dir = tempfile::tempdir().unwrap();
    let mirror = Arc::new(FileMirror::new(dir.path()));
    let store = TestimonialStore::detached()
        .with_mirror(mirror.clone() as Arc<dyn MirrorCache>, TESTIMONIAL_MIRROR_KEY);
    store.load().await;

    let created = store
        .create(TestimonialDraft {
            author: "Nadia".to_string(),
            program: "Copywriting & Closing".to_string(),
            content: "Closing pertama di minggu kedua".to_string(),
            rating: 5,
            status: TestimonialStatus::Published,
            date: "2025-04-01".to_string(),
            image: None,
            avatar: None,
            earnings: None,
        })
        .await
        .unwrap();

    let reopened = TestimonialStore::detached()
        .with_mirror(mirror.clone() as Arc<dyn MirrorCache>, TESTIMONIAL_MIRROR_KEY);
    reopened.load().await;

    let snapshot = reopened.snapshot();
    assert_eq!(snapshot.source, SnapshotSource::Local);
    assert_eq!(snapshot.len(), Testimonials::defaults().len() + 1);
    assert_eq!(snapshot.entities[0], created);
}

#[tokio::test]
async fn test_remote_create_replaces_mirror_content() {
    let dir = tempfile::tempdir().unwrap();
    let mirror = Arc::new(FileMirror::new(dir.path()));
    let first = store_over(&MemoryTable::with_rows("testimoni", testimonial_rows()), &mirror);
    first.load().await;
    first.dispose();

    let table = MemoryTable::new("testimoni");
    table.set_offline(true);
    let store = store_over(&table, &mirror);
    store.load().await;
    assert_eq!(store.snapshot().source, SnapshotSource::Mirror);
    table.set_offline(false);

    let created = store
        .create(TestimonialDraft {
            author: "Nadia".to_string(),
            program: "Copywriting & Closing".to_string(),
            content: "Closing pertama di minggu kedua".to_string(),
            rating: 5,
            status: TestimonialStatus::Published,
            date: "2025-04-01".to_string(),
            image: None,
            avatar: None,
            earnings: None,
        })
        .await
        .unwrap();

    let snapshot = store.snapshot();
    assert_eq!(snapshot.source, SnapshotSource::Remote);
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot.get(&created.id).unwrap().author, "Nadia");
}
