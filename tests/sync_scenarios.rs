use anyhow::Result;
use async_trait::async_trait;
use bucketsync_lib::core::fingerprint::fingerprint_file;
use bucketsync_lib::storage::{PutRequest, RemoteObject};
use bucketsync_lib::{LocalTree, RemoteStore, SyncConfig, SyncEngine, SyncError, SyncOptions};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// 内存中的 S3，ETag 按分块上传规则计算
#[derive(Default)]
struct MockStore {
    objects: Mutex<BTreeMap<String, RemoteObject>>,
    puts: Mutex<Vec<PutRequest>>,
    deletes: Mutex<Vec<Vec<String>>>,
    fail_puts: HashSet<String>,
    fail_listing: bool,
}

impl MockStore {
    fn with_failures(keys: &[&str]) -> Self {
        Self {
            fail_puts: keys.iter().map(|k| k.to_string()).collect(),
            ..Default::default()
        }
    }

    /// 按 S3 的方式计算 ETag 后放入对象
    fn seed_from_file(&self, key: &str, path: &Path, chunk_size: u64) {
        let size = fs::metadata(path).unwrap().len();
        let etag = format!("\"{}\"", fingerprint_file(path, chunk_size).unwrap());
        self.seed(key, size, &etag);
    }

    fn seed(&self, key: &str, size: u64, etag: &str) {
        self.objects.lock().unwrap().insert(
            key.to_string(),
            RemoteObject {
                key: key.to_string(),
                size,
                etag: etag.to_string(),
            },
        );
    }

    fn put_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.puts.lock().unwrap().iter().map(|p| p.key.clone()).collect();
        keys.sort();
        keys
    }

    fn delete_calls(&self) -> usize {
        self.deletes.lock().unwrap().len()
    }

    fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl RemoteStore for MockStore {
    async fn list_objects(&self, prefix: &str) -> Result<Vec<RemoteObject>> {
        if self.fail_listing {
            anyhow::bail!("503 Service Unavailable");
        }
        Ok(self
            .objects
            .lock()
            .unwrap()
            .values()
            .filter(|o| o.key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn put_object(&self, request: &PutRequest) -> Result<()> {
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        if self.fail_puts.contains(&request.key) {
            anyhow::bail!("connection reset");
        }
        let etag = format!("\"{}\"", fingerprint_file(&request.source, request.chunk_size)?);
        self.seed(&request.key, request.size, &etag);
        self.puts.lock().unwrap().push(request.clone());
        Ok(())
    }

    async fn delete_objects(&self, keys: &[String]) -> Result<Vec<String>> {
        self.deletes.lock().unwrap().push(keys.to_vec());
        let mut objects = self.objects.lock().unwrap();
        Ok(keys
            .iter()
            .filter(|k| objects.remove(k.as_str()).is_some())
            .cloned()
            .collect())
    }

    fn name(&self) -> &str {
        "s3://mock"
    }
}

fn write(dir: &TempDir, path: &str, content: &[u8]) {
    let full = dir.path().join(path);
    if let Some(parent) = full.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(full, content).unwrap();
}

/// 内存存储没有 S3 的最小分块限制，用小分块覆盖分块指纹
const CHUNK: u64 = 16;

fn options(dir: &TempDir) -> SyncOptions {
    SyncOptions {
        bucket: "mock".to_string(),
        dir: dir.path().to_path_buf(),
        includes: vec!["**".to_string()],
        ..Default::default()
    }
}

fn engine(store: &Arc<MockStore>, options: &SyncOptions) -> SyncEngine {
    let mut config = SyncConfig::from_options(options).unwrap();
    config.chunk_size = CHUNK;
    SyncEngine::new(store.clone(), LocalTree::new(options.dir.clone()), config)
}

/// index.html 为新文件，app.js 未变化，远程多出 old.css
fn website(store: &MockStore, dir: &TempDir) {
    write(dir, "index.html", b"<html></html>");
    write(dir, "app.js", b"console.log('hi')");
    store.seed_from_file("app.js", &dir.path().join("app.js"), CHUNK);
    store.seed("old.css", 10, "\"0123\"");
}

#[tokio::test]
async fn adds_new_skips_unchanged_deletes_orphan() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MockStore::default());
    let opts = SyncOptions {
        delete_orphaned: true,
        ..options(&dir)
    };
    website(&store, &dir);

    let report = engine(&store, &opts).run().await.unwrap();

    assert_eq!(report.added, 1);
    assert_eq!(report.updated, 0);
    assert_eq!(report.deleted, 1);
    assert_eq!(report.unchanged, 1);
    assert_eq!(store.put_keys(), vec!["index.html"]);
    assert_eq!(store.keys(), vec!["app.js", "index.html"]);
}

#[tokio::test]
async fn dry_run_reports_same_counts_without_mutation() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MockStore::default());
    let opts = SyncOptions {
        delete_orphaned: true,
        dry_run: true,
        wait_before_delete: 60_000,
        ..options(&dir)
    };
    website(&store, &dir);

    let report = engine(&store, &opts).run().await.unwrap();

    assert!(report.dry_run);
    assert_eq!((report.added, report.updated, report.deleted), (1, 0, 1));
    assert!(store.put_keys().is_empty());
    assert_eq!(store.delete_calls(), 0);
    assert_eq!(store.keys(), vec!["app.js", "old.css"]);
}

#[tokio::test]
async fn orphans_kept_when_delete_disabled() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MockStore::default());
    let opts = options(&dir);
    website(&store, &dir);

    let report = engine(&store, &opts).run().await.unwrap();

    assert_eq!(report.deleted, 0);
    assert_eq!(store.delete_calls(), 0);
    assert!(store.keys().contains(&"old.css".to_string()));
}

#[tokio::test]
async fn second_run_uploads_nothing() {
    let dir = TempDir::new().unwrap();
    // 大于分块大小的文件走分块 ETag
    write(&dir, "big.bin", &[9u8; 50]);
    write(&dir, "exact.bin", &[1u8; 16]);
    write(&dir, "small.txt", b"tiny");
    write(&dir, "nested/deep/file.txt", b"deep");

    let store = Arc::new(MockStore::default());
    let opts = options(&dir);

    let first = engine(&store, &opts).run().await.unwrap();
    assert_eq!(first.added, 4);

    let etag = store.objects.lock().unwrap()["big.bin"].etag.clone();
    assert!(etag.ends_with("-4\""), "unexpected etag {etag}");

    let second = engine(&store, &opts).run().await.unwrap();
    assert_eq!((second.added, second.updated, second.unchanged), (0, 0, 4));
    assert_eq!(store.puts.lock().unwrap().len(), 4);
}

#[tokio::test]
async fn modified_content_same_size_is_reuploaded() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MockStore::default());
    let opts = options(&dir);

    write(&dir, "data.txt", b"version-1");
    engine(&store, &opts).run().await.unwrap();

    write(&dir, "data.txt", b"version-2");
    let report = engine(&store, &opts).run().await.unwrap();
    assert_eq!(report.updated, 1);
    assert_eq!(store.puts.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn force_upload_reuploads_existing() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MockStore::default());
    let opts = SyncOptions {
        force_upload: true,
        ..options(&dir)
    };
    website(&store, &dir);

    let report = engine(&store, &opts).run().await.unwrap();
    assert_eq!((report.added, report.updated), (1, 1));
    assert_eq!(store.put_keys(), vec!["app.js", "index.html"]);
}

#[tokio::test]
async fn upload_failure_skips_delete_phase() {
    let dir = TempDir::new().unwrap();
    for name in ["a.js", "b.js", "c.js", "d.js", "e.js"] {
        write(&dir, name, name.as_bytes());
    }
    let store = Arc::new(MockStore::with_failures(&["c.js"]));
    store.seed("stale.js", 1, "\"x\"");

    let opts = SyncOptions {
        delete_orphaned: true,
        ..options(&dir)
    };
    let err = engine(&store, &opts).run().await.unwrap_err();

    match err {
        SyncError::Upload { failed, total, keys } => {
            assert_eq!((failed, total), (1, 5));
            assert_eq!(keys, vec!["c.js"]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(store.put_keys(), vec!["a.js", "b.js", "d.js", "e.js"]);
    assert_eq!(store.delete_calls(), 0);
    assert!(store.keys().contains(&"stale.js".to_string()));
}

#[tokio::test]
async fn listing_failure_aborts_before_mutation() {
    let dir = TempDir::new().unwrap();
    write(&dir, "index.html", b"x");
    let store = Arc::new(MockStore {
        fail_listing: true,
        ..Default::default()
    });

    let err = engine(&store, &options(&dir)).run().await.unwrap_err();
    assert!(matches!(err, SyncError::Listing { .. }));
    assert!(err.to_string().contains("503"));
    assert!(store.put_keys().is_empty());
}

#[tokio::test]
async fn filters_apply_to_both_sides_with_prefix() {
    let dir = TempDir::new().unwrap();
    write(&dir, "index.html", b"<html/>");
    write(&dir, "app.js.map", b"{}");
    write(&dir, "css/site.css", b"body{}");

    let store = Arc::new(MockStore::default());
    // 被排除的远程文件不能被当作孤立文件删除
    store.seed("site/legacy.js.map", 2, "\"x\"");
    store.seed("site/gone.html", 2, "\"x\"");
    store.seed("other/keep.html", 2, "\"x\"");

    let opts = SyncOptions {
        prefix: "site/".to_string(),
        excludes: vec!["*.map".to_string()],
        delete_orphaned: true,
        cache_control: vec!["*.html=no-cache".to_string()],
        ..options(&dir)
    };
    let report = engine(&store, &opts).run().await.unwrap();

    assert_eq!((report.added, report.deleted), (2, 1));
    assert_eq!(store.put_keys(), vec!["site/css/site.css", "site/index.html"]);
    assert_eq!(
        store.keys(),
        vec!["other/keep.html", "site/css/site.css", "site/index.html", "site/legacy.js.map"]
    );

    let puts = store.puts.lock().unwrap();
    let html = puts.iter().find(|p| p.key == "site/index.html").unwrap();
    assert_eq!(html.cache_control.as_deref(), Some("no-cache"));
    assert_eq!(html.content_type, "text/html");
    let css = puts.iter().find(|p| p.key == "site/css/site.css").unwrap();
    assert_eq!(css.cache_control, None);
}

#[tokio::test]
async fn uploads_follow_priority_order() {
    let dir = TempDir::new().unwrap();
    for name in ["b.js", "a.css", "c.png", "index.html"] {
        write(&dir, name, name.as_bytes());
    }
    let store = Arc::new(MockStore::default());
    let opts = SyncOptions {
        order: "*.css,*.js".to_string(),
        concurrency: 1,
        ..options(&dir)
    };

    engine(&store, &opts).run().await.unwrap();

    let order: Vec<String> = store.puts.lock().unwrap().iter().map(|p| p.key.clone()).collect();
    // 未匹配的文件保持遍历顺序（按文件名）
    assert_eq!(order, vec!["a.css", "b.js", "c.png", "index.html"]);
}

#[tokio::test]
async fn invalid_config_is_rejected() {
    let dir = TempDir::new().unwrap();
    let opts = SyncOptions {
        includes: vec!["[".to_string()],
        ..options(&dir)
    };
    assert!(matches!(
        SyncConfig::from_options(&opts),
        Err(SyncError::Pattern { .. })
    ));

    let opts = SyncOptions {
        cache_control: vec!["missing-equals".to_string()],
        ..options(&dir)
    };
    assert!(matches!(
        SyncConfig::from_options(&opts),
        Err(SyncError::Config(_))
    ));

    let opts = SyncOptions {
        chunk_size: 1024 * 1024,
        ..options(&dir)
    };
    assert!(matches!(
        SyncConfig::from_options(&opts),
        Err(SyncError::Config(_))
    ));
}
