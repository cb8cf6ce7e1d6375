// SPDX-License-Identifier: Apache-2.0

use dataledger_diff::DiffEngine;
use dataledger_model::{VersionLabel, VersionSelector};
use dataledger_object::{BucketClient, RetryPolicy};
use dataledger_ops::{
    clean_staging, delete_dataset, finalize, prepare, preflight_staging, prune, rollback,
    DiffLimits, FinalizeOutcome, OpsContext, OpsErrorCode, PrepareOutcome, PrepareRequest,
    RollbackRequest,
};
use dataledger_store::LedgerStore;
use rusqlite::Connection;
use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;
use tiny_http::{Header, Method, Request, Response, Server, StatusCode};

type ObjectMap = HashMap<(String, String), (Vec<u8>, Option<String>)>;

struct FakeBuckets {
    base: String,
    objects: Arc<Mutex<ObjectMap>>,
    deny: Arc<Mutex<HashSet<(String, String)>>>,
    shutdown: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl FakeBuckets {
    fn start(buckets: &[&str]) -> Self {
        let server = Server::http("127.0.0.1:0").expect("http server");
        let base = format!("http://{}", server.server_addr());
        let objects: Arc<Mutex<ObjectMap>> = Arc::new(Mutex::new(HashMap::new()));
        let deny: Arc<Mutex<HashSet<(String, String)>>> = Arc::new(Mutex::new(HashSet::new()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let known: Vec<String> = buckets.iter().map(ToString::to_string).collect();
        let thread_objects = Arc::clone(&objects);
        let thread_deny = Arc::clone(&deny);
        let thread_shutdown = Arc::clone(&shutdown);
        let handle = thread::spawn(move || loop {
            let request = match server.recv_timeout(Duration::from_millis(200)) {
                Ok(Some(request)) => request,
                Ok(None) => {
                    if thread_shutdown.load(Ordering::Relaxed) {
                        break;
                    }
                    continue;
                }
                Err(_) => break,
            };
            handle_request(request, &known, &thread_objects, &thread_deny);
        });

        Self {
            base,
            objects,
            deny,
            shutdown,
            handle: Some(handle),
        }
    }

    fn client(&self, bucket: &str) -> BucketClient {
        BucketClient::new(self.base.clone(), bucket.to_string()).with_retry(RetryPolicy {
            max_attempts: 2,
            base_backoff_ms: 1,
        })
    }

    fn deny(&self, method: &str, bucket: &str) {
        self.deny
            .lock()
            .expect("deny lock")
            .insert((method.to_string(), bucket.to_string()));
    }

    fn stored_keys(&self, bucket: &str) -> Vec<String> {
        let map = self.objects.lock().expect("objects lock");
        let mut keys: Vec<String> = map
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect();
        keys.sort();
        keys
    }
}

impl Drop for FakeBuckets {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn handle_request(
    mut request: Request,
    known: &[String],
    objects: &Arc<Mutex<ObjectMap>>,
    deny: &Arc<Mutex<HashSet<(String, String)>>>,
) {
    let url = request.url().to_string();
    let (path, query) = url.split_once('?').unwrap_or((url.as_str(), ""));
    let mut segments = path.trim_start_matches('/').splitn(2, '/');
    let bucket = segments.next().unwrap_or_default().to_string();
    let key = segments.next().unwrap_or_default().to_string();
    let method_kind = request.method().clone();
    let method = method_kind.to_string();

    if deny
        .lock()
        .expect("deny lock")
        .contains(&(method, bucket.clone()))
    {
        let _ = request.respond(Response::empty(StatusCode(403)));
        return;
    }
    if !known.iter().any(|b| b == &bucket) {
        let _ = request.respond(Response::empty(StatusCode(404)));
        return;
    }

    match method_kind {
        Method::Head | Method::Get if key.is_empty() => {
            if query.contains("list-type=2") {
                let map = objects.lock().expect("objects lock");
                let mut body = String::from("<ListBucketResult>");
                for (b, k) in map.keys() {
                    if b == &bucket {
                        body.push_str(&format!("<Contents><Key>{k}</Key></Contents>"));
                    }
                }
                body.push_str("<IsTruncated>false</IsTruncated></ListBucketResult>");
                let _ = request.respond(Response::from_data(body.into_bytes()));
            } else {
                let _ = request.respond(Response::empty(StatusCode(200)));
            }
        }
        Method::Put => {
            if let Some(source) = find_header(&request, "x-amz-copy-source") {
                let source = source.trim_start_matches('/');
                let (src_bucket, src_key) = source.split_once('/').unwrap_or((source, ""));
                let copied = {
                    let map = objects.lock().expect("objects lock");
                    map.get(&(src_bucket.to_string(), src_key.to_string())).cloned()
                };
                match copied {
                    Some(object) => {
                        objects
                            .lock()
                            .expect("objects lock")
                            .insert((bucket, key), object);
                        let _ = request
                            .respond(Response::from_data(b"<CopyObjectResult/>".to_vec()));
                    }
                    None => {
                        let _ = request.respond(Response::empty(StatusCode(404)));
                    }
                }
                return;
            }
            let sha = find_header(&request, "x-amz-meta-sha256");
            let mut body = Vec::new();
            if request.as_reader().read_to_end(&mut body).is_err() {
                let _ = request.respond(Response::empty(StatusCode(500)));
                return;
            }
            objects
                .lock()
                .expect("objects lock")
                .insert((bucket, key), (body, sha));
            let _ = request.respond(Response::empty(StatusCode(200)));
        }
        Method::Get | Method::Head => {
            let object = {
                let map = objects.lock().expect("objects lock");
                map.get(&(bucket, key)).cloned()
            };
            match object {
                Some((bytes, sha)) => {
                    let mut response = Response::from_data(bytes);
                    if let Some(sha) = sha {
                        response = response.with_header(
                            Header::from_bytes(b"x-amz-meta-sha256".as_ref(), sha.as_bytes())
                                .expect("meta header"),
                        );
                    }
                    let _ = request.respond(response);
                }
                None => {
                    let _ = request.respond(Response::empty(StatusCode(404)));
                }
            }
        }
        Method::Delete => {
            objects.lock().expect("objects lock").remove(&(bucket, key));
            let _ = request.respond(Response::empty(StatusCode(204)));
        }
        _ => {
            let _ = request.respond(Response::empty(StatusCode(405)));
        }
    }
}

fn find_header(request: &Request, name: &str) -> Option<String> {
    request
        .headers()
        .iter()
        .find(|h| h.field.as_str().as_str().eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str().to_string())
}

struct TestWorld {
    fake: FakeBuckets,
    scratch: TempDir,
    store: LedgerStore,
    staging: BucketClient,
    production: BucketClient,
    diff: DiffEngine,
}

impl TestWorld {
    fn new() -> Self {
        let fake = FakeBuckets::start(&["staging", "production"]);
        let scratch = TempDir::new().expect("scratch dir");
        let store = LedgerStore::new(scratch.path().join("manifest.json"));
        let staging = fake.client("staging");
        let production = fake.client("production");
        Self {
            fake,
            scratch,
            store,
            staging,
            production,
            diff: DiffEngine::fallback_only(),
        }
    }

    fn ctx(&self) -> OpsContext<'_> {
        OpsContext {
            store: &self.store,
            staging: &self.staging,
            production: &self.production,
            diff: &self.diff,
            limits: DiffLimits::default(),
        }
    }

    fn fixture_db(&self, file_name: &str, rows: &[(i64, &str)]) -> PathBuf {
        let path = self.scratch.path().join(file_name);
        build_db(&path, rows);
        path
    }
}

fn build_db(path: &Path, rows: &[(i64, &str)]) {
    let conn = Connection::open(path).expect("open db");
    conn.execute_batch("CREATE TABLE grid (id INTEGER PRIMARY KEY, name TEXT NOT NULL);")
        .expect("create schema");
    for (id, name) in rows {
        conn.execute("INSERT INTO grid (id, name) VALUES (?1, ?2)", (id, name))
            .expect("insert row");
    }
}

fn latest_version(world: &TestWorld, name: &str) -> String {
    world
        .store
        .get_version_entry(name, &VersionSelector::Latest)
        .expect("lookup")
        .expect("entry present")
        .version
        .to_string()
}

#[test]
fn create_update_finalize_walks_the_versioned_history() {
    let world = TestWorld::new();
    let ctx = world.ctx();

    let file_v1 = world.fixture_db("local_v1.sqlite", &[(1, "solar"), (2, "wind")]);
    let result = prepare(
        &ctx,
        &PrepareRequest {
            name: "grid.sqlite",
            file: &file_v1,
            description: "initial import",
        },
    )
    .expect("prepare v1");
    let v1_entry = match result.outcome {
        PrepareOutcome::CreatedDataset(entry) => entry,
        other => panic!("expected created dataset, got {other:?}"),
    };
    assert_eq!(v1_entry.version.to_string(), "v1");
    assert!(v1_entry.is_placeholder());
    assert!(v1_entry.diff_summary.is_none(), "first version has no diff");
    assert_eq!(world.fake.stored_keys("staging"), vec![v1_entry.object_key.clone()]);
    assert!(world.fake.stored_keys("production").is_empty());

    let finalize_result = finalize(&ctx, "grid.sqlite", "c0ffee1").expect("finalize v1");
    match finalize_result.outcome {
        FinalizeOutcome::Finalized(entry) => {
            assert_eq!(entry.commit_hash.as_deref(), Some("c0ffee1"));
        }
        other => panic!("expected finalized, got {other:?}"),
    }
    assert_eq!(
        world.fake.stored_keys("production"),
        vec![v1_entry.object_key.clone()]
    );
    assert!(world.fake.stored_keys("staging").is_empty(), "staging copy retired");

    let file_v2 = world.fixture_db("local_v2.sqlite", &[(1, "solar"), (2, "wind"), (3, "hydro")]);
    let result = prepare(
        &ctx,
        &PrepareRequest {
            name: "grid.sqlite",
            file: &file_v2,
            description: "add hydro",
        },
    )
    .expect("prepare v2");
    let v2_entry = match result.outcome {
        PrepareOutcome::NewVersion(entry) => entry,
        other => panic!("expected new version, got {other:?}"),
    };
    assert_eq!(v2_entry.version.to_string(), "v2");
    let summary = v2_entry.diff_summary.as_deref().expect("diff summary recorded");
    assert_eq!(summary.trim(), "# summary: 1 additions, 0 deletions");
    assert!(v2_entry
        .diff_detail
        .as_deref()
        .expect("diff detail recorded")
        .contains("hydro"));

    let dataset = world
        .store
        .get_dataset("grid.sqlite")
        .expect("lookup")
        .expect("dataset present");
    assert_eq!(dataset.history.len(), 2);
    assert_eq!(dataset.history[0].version.to_string(), "v2");
    assert!(dataset.history[0].is_placeholder());
    assert_eq!(dataset.history[1].version.to_string(), "v1");
    assert!(!dataset.history[1].is_placeholder());
}

#[test]
fn prepare_with_identical_content_is_a_no_op() {
    let world = TestWorld::new();
    let ctx = world.ctx();
    let file = world.fixture_db("local.sqlite", &[(1, "solar")]);

    prepare(
        &ctx,
        &PrepareRequest {
            name: "grid.sqlite",
            file: &file,
            description: "initial import",
        },
    )
    .expect("prepare v1");
    finalize(&ctx, "grid.sqlite", "c0ffee1").expect("finalize v1");

    let result = prepare(
        &ctx,
        &PrepareRequest {
            name: "grid.sqlite",
            file: &file,
            description: "same bytes again",
        },
    )
    .expect("prepare unchanged");
    assert!(matches!(
        result.outcome,
        PrepareOutcome::Unchanged(version) if version.to_string() == "v1"
    ));
    assert_eq!(latest_version(&world, "grid.sqlite"), "v1");
}

#[test]
fn a_pending_placeholder_blocks_every_new_operation() {
    let world = TestWorld::new();
    let ctx = world.ctx();
    let file = world.fixture_db("local.sqlite", &[(1, "solar")]);
    prepare(
        &ctx,
        &PrepareRequest {
            name: "grid.sqlite",
            file: &file,
            description: "initial import",
        },
    )
    .expect("prepare v1");

    let other = world.fixture_db("other.sqlite", &[(9, "coal")]);
    let err = prepare(
        &ctx,
        &PrepareRequest {
            name: "grid.sqlite",
            file: &other,
            description: "second while pending",
        },
    )
    .expect_err("prepare while pending must fail");
    assert_eq!(err.code, OpsErrorCode::Conflict);
    assert!(err.message.contains("v1"));

    let err = prune(&ctx, "grid.sqlite", 1).expect_err("prune while pending must fail");
    assert_eq!(err.code, OpsErrorCode::Conflict);

    let err = rollback(
        &ctx,
        &RollbackRequest {
            name: "grid.sqlite",
            target: VersionLabel::parse("v1").expect("label"),
            description: None,
        },
    )
    .expect_err("rollback while pending must fail");
    assert_eq!(err.code, OpsErrorCode::Conflict);

    let err = delete_dataset(&ctx, "grid.sqlite").expect_err("delete while pending must fail");
    assert_eq!(err.code, OpsErrorCode::Conflict);
}

#[test]
fn failed_upload_leaves_the_manifest_untouched() {
    let world = TestWorld::new();
    world.fake.deny("PUT", "staging");
    let ctx = world.ctx();
    let file = world.fixture_db("local.sqlite", &[(1, "solar")]);

    let err = prepare(
        &ctx,
        &PrepareRequest {
            name: "grid.sqlite",
            file: &file,
            description: "initial import",
        },
    )
    .expect_err("denied upload must fail");
    assert_eq!(err.code, OpsErrorCode::Permission);

    let ledger = world.store.load().expect("load");
    assert!(ledger.datasets.is_empty(), "no dangling ledger entry");
}

#[test]
fn finalize_again_is_a_no_op() {
    let world = TestWorld::new();
    let ctx = world.ctx();
    let file = world.fixture_db("local.sqlite", &[(1, "solar")]);
    prepare(
        &ctx,
        &PrepareRequest {
            name: "grid.sqlite",
            file: &file,
            description: "initial import",
        },
    )
    .expect("prepare v1");
    finalize(&ctx, "grid.sqlite", "c0ffee1").expect("first finalize");

    let before = world.store.load().expect("load before");
    let result = finalize(&ctx, "grid.sqlite", "c0ffee1").expect("second finalize");
    assert!(matches!(
        result.outcome,
        FinalizeOutcome::AlreadyFinalized(version) if version.to_string() == "v1"
    ));
    let after = world.store.load().expect("load after");
    assert_eq!(before, after, "retried finalize must not rewrite history");
}

#[test]
fn finalizing_v3_records_the_commit_and_changes_nothing_else() {
    let world = TestWorld::new();
    let ctx = world.ctx();

    let mut commit_counter = 0;
    for rows in [
        vec![(1_i64, "solar")],
        vec![(1_i64, "solar"), (2, "wind")],
    ] {
        commit_counter += 1;
        let file = world.fixture_db(&format!("local_{commit_counter}.sqlite"), &rows);
        prepare(
            &ctx,
            &PrepareRequest {
                name: "grid.sqlite",
                file: &file,
                description: "step",
            },
        )
        .expect("prepare");
        finalize(&ctx, "grid.sqlite", &format!("commit{commit_counter}")).expect("finalize");
    }

    let file_v3 = world.fixture_db("local_3.sqlite", &[(1, "solar"), (2, "wind"), (3, "hydro")]);
    prepare(
        &ctx,
        &PrepareRequest {
            name: "grid.sqlite",
            file: &file_v3,
            description: "third revision",
        },
    )
    .expect("prepare v3");

    let placeholder = world
        .store
        .get_version_entry("grid.sqlite", &VersionSelector::Latest)
        .expect("lookup")
        .expect("placeholder");
    assert_eq!(placeholder.version.to_string(), "v3");
    assert!(placeholder.is_placeholder());

    finalize(&ctx, "grid.sqlite", "abc123").expect("finalize v3");
    let finalized = world
        .store
        .get_version_entry("grid.sqlite", &VersionSelector::Latest)
        .expect("lookup")
        .expect("finalized");
    assert_eq!(finalized.commit_hash.as_deref(), Some("abc123"));
    assert_eq!(finalized.version, placeholder.version);
    assert_eq!(finalized.object_key, placeholder.object_key);
    assert_eq!(finalized.sha256, placeholder.sha256);
    assert_eq!(finalized.description, placeholder.description);
    assert_eq!(finalized.diff_summary, placeholder.diff_summary);
}

#[test]
fn rollback_aliases_the_target_key_without_uploading() {
    let world = TestWorld::new();
    let ctx = world.ctx();

    for (index, rows) in [
        vec![(1_i64, "solar")],
        vec![(1_i64, "solar"), (2, "wind")],
        vec![(1_i64, "solar"), (2, "wind"), (3, "hydro")],
    ]
    .iter()
    .enumerate()
    {
        let file = world.fixture_db(&format!("local_{index}.sqlite"), rows);
        prepare(
            &ctx,
            &PrepareRequest {
                name: "grid.sqlite",
                file: &file,
                description: "step",
            },
        )
        .expect("prepare");
        finalize(&ctx, "grid.sqlite", &format!("commit{index}")).expect("finalize");
    }
    assert_eq!(latest_version(&world, "grid.sqlite"), "v3");

    let v1 = world
        .store
        .get_version_entry(
            "grid.sqlite",
            &VersionSelector::Label(VersionLabel::parse("v1").expect("label")),
        )
        .expect("lookup")
        .expect("v1 present");

    assert!(world.fake.stored_keys("staging").is_empty());
    let result = rollback(
        &ctx,
        &RollbackRequest {
            name: "grid.sqlite",
            target: VersionLabel::parse("v1").expect("label"),
            description: None,
        },
    )
    .expect("rollback");
    assert_eq!(result.entry.version.to_string(), "v4");
    assert_eq!(result.entry.object_key, v1.object_key);
    assert_eq!(result.entry.sha256, v1.sha256);
    assert!(result.entry.is_placeholder());
    assert!(
        world.fake.stored_keys("staging").is_empty(),
        "rollback must not upload anything"
    );

    // The aliased object is already live in production, so finalization
    // completes without any copy.
    finalize(&ctx, "grid.sqlite", "r0llbck").expect("finalize rollback");
    let finalized = world
        .store
        .get_version_entry("grid.sqlite", &VersionSelector::Latest)
        .expect("lookup")
        .expect("v4");
    assert_eq!(finalized.commit_hash.as_deref(), Some("r0llbck"));
    assert_eq!(finalized.object_key, v1.object_key);
}

#[test]
fn prune_keeps_recent_entries_and_spares_aliased_keys() {
    let world = TestWorld::new();
    let ctx = world.ctx();

    for (index, rows) in [
        vec![(1_i64, "solar")],
        vec![(1_i64, "solar"), (2, "wind")],
        vec![(1_i64, "solar"), (2, "wind"), (3, "hydro")],
    ]
    .iter()
    .enumerate()
    {
        let file = world.fixture_db(&format!("local_{index}.sqlite"), rows);
        prepare(
            &ctx,
            &PrepareRequest {
                name: "grid.sqlite",
                file: &file,
                description: "step",
            },
        )
        .expect("prepare");
        finalize(&ctx, "grid.sqlite", &format!("commit{index}")).expect("finalize");
    }
    rollback(
        &ctx,
        &RollbackRequest {
            name: "grid.sqlite",
            target: VersionLabel::parse("v1").expect("label"),
            description: None,
        },
    )
    .expect("rollback to v1");
    finalize(&ctx, "grid.sqlite", "commit4").expect("finalize v4");

    let v1_key = world
        .store
        .get_version_entry(
            "grid.sqlite",
            &VersionSelector::Label(VersionLabel::parse("v1").expect("label")),
        )
        .expect("lookup")
        .expect("v1")
        .object_key
        .clone();
    let v2_key = world
        .store
        .get_version_entry(
            "grid.sqlite",
            &VersionSelector::Label(VersionLabel::parse("v2").expect("label")),
        )
        .expect("lookup")
        .expect("v2")
        .object_key
        .clone();

    let result = prune(&ctx, "grid.sqlite", 2).expect("prune");
    let dataset = world
        .store
        .get_dataset("grid.sqlite")
        .expect("lookup")
        .expect("dataset");
    let versions: Vec<String> = dataset
        .history
        .iter()
        .map(|e| e.version.to_string())
        .collect();
    assert_eq!(versions, vec!["v4".to_string(), "v3".to_string()]);
    assert_eq!(result.removed.len(), 2);
    // v4 aliases v1's key, so only v2's object became unreferenced.
    assert_eq!(result.reclaim, vec![v2_key]);
    assert!(!result.reclaim.contains(&v1_key));
}

#[test]
fn prune_never_empties_a_dataset() {
    let world = TestWorld::new();
    let ctx = world.ctx();
    let file = world.fixture_db("local.sqlite", &[(1, "solar")]);
    prepare(
        &ctx,
        &PrepareRequest {
            name: "grid.sqlite",
            file: &file,
            description: "initial import",
        },
    )
    .expect("prepare");
    finalize(&ctx, "grid.sqlite", "c0ffee1").expect("finalize");

    let err = prune(&ctx, "grid.sqlite", 0).expect_err("keep zero must fail");
    assert_eq!(err.code, OpsErrorCode::Conflict);

    let result = prune(&ctx, "grid.sqlite", 1).expect("prune with nothing to do");
    assert!(result.removed.is_empty());
    assert_eq!(latest_version(&world, "grid.sqlite"), "v1");
}

#[test]
fn delete_removes_the_dataset_and_reports_every_key() {
    let world = TestWorld::new();
    let ctx = world.ctx();

    for (index, rows) in [
        vec![(1_i64, "solar")],
        vec![(1_i64, "solar"), (2, "wind")],
    ]
    .iter()
    .enumerate()
    {
        let file = world.fixture_db(&format!("local_{index}.sqlite"), rows);
        prepare(
            &ctx,
            &PrepareRequest {
                name: "grid.sqlite",
                file: &file,
                description: "step",
            },
        )
        .expect("prepare");
        finalize(&ctx, "grid.sqlite", &format!("commit{index}")).expect("finalize");
    }

    let result = delete_dataset(&ctx, "grid.sqlite").expect("delete");
    assert_eq!(result.dataset.history.len(), 2);
    assert_eq!(result.reclaim.len(), 2);

    let ledger = world.store.load().expect("load");
    assert!(ledger.datasets.is_empty());

    let err = delete_dataset(&ctx, "grid.sqlite").expect_err("second delete must fail");
    assert_eq!(err.code, OpsErrorCode::NotFound);
}

#[test]
fn clean_staging_spares_objects_backing_placeholders() {
    let world = TestWorld::new();
    let ctx = world.ctx();
    let file = world.fixture_db("local.sqlite", &[(1, "solar")]);
    let result = prepare(
        &ctx,
        &PrepareRequest {
            name: "grid.sqlite",
            file: &file,
            description: "initial import",
        },
    )
    .expect("prepare");
    let pending_key = match result.outcome {
        PrepareOutcome::CreatedDataset(entry) => entry.object_key,
        other => panic!("expected created dataset, got {other:?}"),
    };
    world
        .staging
        .put_bytes("stray/leftover.bin", b"orphan")
        .expect("stray object");

    let cleaned = clean_staging(&ctx).expect("clean staging");
    assert_eq!(cleaned.deleted, vec!["stray/leftover.bin".to_string()]);
    assert_eq!(cleaned.kept, vec![pending_key.clone()]);
    assert_eq!(world.fake.stored_keys("staging"), vec![pending_key]);
}

#[test]
fn diff_text_respects_the_configured_bounds() {
    let world = TestWorld::new();
    let tight = OpsContext {
        limits: DiffLimits {
            max_summary_lines: 1,
            max_detail_lines: 1,
        },
        ..world.ctx()
    };

    let file_v1 = world.fixture_db("local_v1.sqlite", &[(1, "solar")]);
    prepare(
        &tight,
        &PrepareRequest {
            name: "grid.sqlite",
            file: &file_v1,
            description: "initial import",
        },
    )
    .expect("prepare v1");
    finalize(&tight, "grid.sqlite", "c0ffee1").expect("finalize v1");

    let file_v2 = world.fixture_db(
        "local_v2.sqlite",
        &[(1, "solar"), (2, "wind"), (3, "hydro"), (4, "coal")],
    );
    let result = prepare(
        &tight,
        &PrepareRequest {
            name: "grid.sqlite",
            file: &file_v2,
            description: "many rows",
        },
    )
    .expect("prepare v2");
    let entry = match result.outcome {
        PrepareOutcome::NewVersion(entry) => entry,
        other => panic!("expected new version, got {other:?}"),
    };
    assert!(entry.diff_summary.is_some(), "bounded summary still recorded");
    assert!(
        entry.diff_detail.is_none(),
        "detail beyond the line budget must be omitted"
    );
}

#[test]
fn preflight_refuses_an_unwritable_staging_bucket() {
    let world = TestWorld::new();
    world.fake.deny("PUT", "staging");
    let ctx = world.ctx();

    let err = preflight_staging(&ctx).expect_err("unwritable staging must fail preflight");
    assert_eq!(err.code, OpsErrorCode::Permission);
    assert!(err.message.contains("staging"));
}
