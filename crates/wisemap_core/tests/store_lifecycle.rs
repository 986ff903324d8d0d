use std::collections::HashSet;
use std::fs::File;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use wisemap_core::{extract_title, MapId, MapStore, StorageConfig, StoreError};

fn store_in(dir: &tempfile::TempDir) -> MapStore {
    MapStore::new(StorageConfig::new(dir.path().join("maps")))
}

fn set_modified(path: &std::path::Path, at: SystemTime) {
    let file = File::options().write(true).open(path).unwrap();
    file.set_modified(at).unwrap();
}

#[tokio::test]
async fn create_load_save_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);

    let id = store.create("Budget 2025").await.unwrap();
    let initial = store.load(id).await.unwrap();
    assert_eq!(extract_title(&initial), "Budget 2025");

    let updated = r#"<map name="x"><topic central="true" text="Budget 2026"/></map>"#;
    store.save(id, updated).await.unwrap();
    assert_eq!(store.load(id).await.unwrap(), updated);

    let listed = store.list().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, id);
    assert_eq!(listed[0].title, "Budget 2026");
    assert_eq!(listed[0].location, store.document_path(id));
}

#[tokio::test]
async fn create_assigns_distinct_ids() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(store_in(&dir));

    let mut tasks = Vec::new();
    for index in 0..16 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            store.create(&format!("map {index}")).await.unwrap()
        }));
    }
    let mut ids = HashSet::new();
    for task in tasks {
        ids.insert(task.await.unwrap());
    }

    assert_eq!(ids.len(), 16);
    assert_eq!(store.list().await.unwrap().len(), 16);
}

#[tokio::test]
async fn list_on_missing_root_creates_it_and_returns_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);

    assert!(store.list().await.unwrap().is_empty());
    assert!(store.storage_location().is_dir());
}

#[tokio::test]
async fn list_orders_newest_first() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    let oldest = store.create("oldest").await.unwrap();
    let newest = store.create("newest").await.unwrap();
    let middle = store.create("middle").await.unwrap();

    let base = SystemTime::now() - Duration::from_secs(3600);
    set_modified(&store.document_path(oldest), base);
    set_modified(&store.document_path(middle), base + Duration::from_secs(60));
    set_modified(&store.document_path(newest), base + Duration::from_secs(120));

    let titles = store
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|record| record.title)
        .collect::<Vec<_>>();
    assert_eq!(titles, vec!["newest", "middle", "oldest"]);
}

#[tokio::test]
async fn list_breaks_modified_ties_by_id() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    let at = SystemTime::now() - Duration::from_secs(600);

    let mut ids = Vec::new();
    for title in ["a", "b", "c"] {
        let id = store.create(title).await.unwrap();
        set_modified(&store.document_path(id), at);
        ids.push(id);
    }
    ids.sort();

    let listed = store
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|record| record.id)
        .collect::<Vec<_>>();
    assert_eq!(listed, ids);
}

#[tokio::test]
async fn list_skips_unreadable_entries_and_foreign_files() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    let good = store.create("kept").await.unwrap();
    let root = store.storage_location().to_path_buf();

    std::fs::write(root.join(MapId::generate().file_name()), [0xff, 0xfe, 0x00, 0x80]).unwrap();
    std::fs::create_dir(root.join(MapId::generate().file_name())).unwrap();
    std::fs::write(root.join("notes.txt"), "not a map").unwrap();
    std::fs::write(root.join("not-a-uuid.wxml"), "<map/>").unwrap();
    let alias = good.to_string();
    std::fs::write(root.join(format!("{}.wxml", alias.to_uppercase())), "<map/>").unwrap();
    std::fs::write(root.join(format!("{}.wxml", alias.replace('-', ""))), "<map/>").unwrap();

    let listed = store.list().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, good);
    assert_eq!(listed[0].title, "kept");
}

#[tokio::test]
async fn list_falls_back_to_untitled_for_unparseable_content() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    let id = store.create("temporary").await.unwrap();

    store.save(id, "<map><topic central=").await.unwrap();

    let listed = store.list().await.unwrap();
    assert_eq!(listed[0].title, "Untitled");
}

#[tokio::test]
async fn deleted_documents_stay_gone() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    let id = store.create("short lived").await.unwrap();

    store.delete(id).await.unwrap();

    assert!(matches!(store.load(id).await, Err(StoreError::NotFound(got)) if got == id));
    assert!(matches!(
        store.save(id, "<map/>").await,
        Err(StoreError::NotFound(_))
    ));
    assert!(matches!(store.delete(id).await, Err(StoreError::NotFound(_))));
    let destination = dir.path().join("out.wxml");
    assert!(matches!(
        store.export_to(id, &destination).await,
        Err(StoreError::NotFound(_))
    ));
    assert!(!destination.exists());
    assert!(store.list().await.unwrap().is_empty());
    assert!(!store.document_path(id).exists());
}

#[tokio::test]
async fn save_keeps_modified_time_moving_forward() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    let id = store.create("clock").await.unwrap();
    let path = store.document_path(id);

    let future = SystemTime::now() + Duration::from_secs(3600);
    set_modified(&path, future);

    store
        .save(id, r#"<map><topic central="true" text="clock"/></map>"#)
        .await
        .unwrap();

    let modified = std::fs::metadata(&path).unwrap().modified().unwrap();
    assert!(modified >= future);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_saves_never_interleave() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(store_in(&dir));
    let id = store.create("contended").await.unwrap();

    let payloads = (0..12)
        .map(|index| {
            let filler = char::from(b'a' + index as u8).to_string().repeat(64 * 1024);
            format!(r#"<map><topic central="true" text="v{index}"/><!--{filler}--></map>"#)
        })
        .collect::<Vec<_>>();

    let mut tasks = Vec::new();
    for payload in payloads.clone() {
        let store = store.clone();
        tasks.push(tokio::spawn(async move { store.save(id, &payload).await }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let stored = store.load(id).await.unwrap();
    assert!(payloads.contains(&stored));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn readers_never_observe_a_partial_save() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(store_in(&dir));
    let id = store.create("v0").await.unwrap();

    let payloads = Arc::new(
        (0..8)
            .map(|index| {
                let filler = char::from(b'a' + index as u8).to_string().repeat(256 * 1024);
                format!(r#"<map><topic central="true" text="v{index}"/><!--{filler}--></map>"#)
            })
            .collect::<Vec<_>>(),
    );
    let mut titles = (0..8).map(|index| format!("v{index}")).collect::<HashSet<_>>();
    titles.insert("v0".to_string());

    let saver = {
        let store = store.clone();
        let payloads = payloads.clone();
        tokio::spawn(async move {
            for _ in 0..4 {
                for payload in payloads.iter() {
                    store.save(id, payload).await.unwrap();
                }
            }
        })
    };

    let initial = store.load(id).await.unwrap();
    let mut readers = Vec::new();
    for _ in 0..3 {
        let store = store.clone();
        let payloads = payloads.clone();
        let titles = titles.clone();
        let initial = initial.clone();
        readers.push(tokio::spawn(async move {
            for _ in 0..40 {
                let content = store.load(id).await.unwrap();
                assert!(
                    content == initial || payloads.contains(&content),
                    "torn read of {} bytes",
                    content.len()
                );
                let listed = store.list().await.unwrap();
                assert_eq!(listed.len(), 1);
                assert!(titles.contains(&listed[0].title), "{}", listed[0].title);
                tokio::task::yield_now().await;
            }
        }));
    }

    saver.await.unwrap();
    for reader in readers {
        reader.await.unwrap();
    }
    assert_eq!(store.load(id).await.unwrap(), payloads[7]);
}

#[tokio::test]
async fn in_place_saves_keep_the_creation_time() {
    let dir = tempfile::tempdir().unwrap();
    let store = MapStore::new(
        StorageConfig::new(dir.path().join("maps")).with_atomic_writes(false),
    );
    let id = store.create("birth").await.unwrap();
    if std::fs::metadata(store.document_path(id)).unwrap().created().is_err() {
        return;
    }
    let before = store.list().await.unwrap()[0].created;

    tokio::time::sleep(Duration::from_millis(1200)).await;
    store.save(id, "<map/>").await.unwrap();

    let after = store.list().await.unwrap();
    assert_eq!(after[0].created, before);
    assert!(after[0].modified > before);
}

#[tokio::test]
async fn atomic_saves_move_the_creation_time_to_the_rewrite() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    let id = store.create("reborn").await.unwrap();
    if std::fs::metadata(store.document_path(id)).unwrap().created().is_err() {
        return;
    }
    let before = store.list().await.unwrap()[0].created;

    tokio::time::sleep(Duration::from_millis(1200)).await;
    store.save(id, "<map/>").await.unwrap();

    let after = store.list().await.unwrap();
    assert!(after[0].created > before);
    assert!(after[0].created <= after[0].modified);
}

#[tokio::test]
async fn in_place_writes_still_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = MapStore::new(
        StorageConfig::new(dir.path().join("maps")).with_atomic_writes(false),
    );
    let id = store.create("plain").await.unwrap();

    store.save(id, "<map/>").await.unwrap();
    assert_eq!(store.load(id).await.unwrap(), "<map/>");
}

#[tokio::test]
async fn export_copies_current_content() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    let id = store.create("shared").await.unwrap();
    let destination = dir.path().join("shared.wxml");

    store.export_to(id, &destination).await.unwrap();

    assert_eq!(
        std::fs::read_to_string(&destination).unwrap(),
        store.load(id).await.unwrap()
    );
}

#[tokio::test]
async fn export_rejects_destinations_outside_scope() {
    let dir = tempfile::tempdir().unwrap();
    let allowed = dir.path().join("exports");
    let elsewhere = dir.path().join("elsewhere");
    std::fs::create_dir_all(&allowed).unwrap();
    std::fs::create_dir_all(&elsewhere).unwrap();
    let store = MapStore::new(
        StorageConfig::new(dir.path().join("maps")).with_export_root(&allowed),
    );
    let id = store.create("scoped").await.unwrap();

    store.export_to(id, &allowed.join("ok.wxml")).await.unwrap();

    let outside = store.export_to(id, &elsewhere.join("no.wxml")).await;
    assert!(matches!(outside, Err(StoreError::ExportFailure { .. })));
    assert!(!elsewhere.join("no.wxml").exists());

    let into_root = store
        .export_to(id, &store.storage_location().join("copy.wxml"))
        .await;
    assert!(matches!(into_root, Err(StoreError::ExportFailure { .. })));
}

#[tokio::test]
async fn export_to_missing_directory_is_an_export_failure() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    let id = store.create("lost").await.unwrap();

    let result = store
        .export_to(id, &dir.path().join("missing").join("x.wxml"))
        .await;
    let err = result.unwrap_err();
    assert_eq!(err.kind(), "export_failure");
}
