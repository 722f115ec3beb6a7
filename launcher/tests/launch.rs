//! End-to-end launch flows: bootstrap, idempotent refresh, stale-validator
//! refresh, exit-code passthrough, and concurrent-invocation refresh
//! skipping, driven against a mock artifact server and a stub interpreter.

#![cfg(unix)]

use std::ffi::OsString;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use pipz_launcher::cache::{PyzCache, ResponseHeaders};
use pipz_launcher::{LaunchError, LauncherConfig, launch};
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Stub interpreter: appends its argv to a log, exits 0 for version probes
/// and with a fixed code otherwise.
fn stub_interpreter(dir: &Path, exit_code: i32) -> PathBuf {
    let log = dir.join("argv.log");
    let script = dir.join("python-stub");
    let body = format!(
        "#!/bin/sh\n\
         printf '%s\\n' \"$@\" >> '{log}'\n\
         for arg in \"$@\"; do\n\
         \x20\x20if [ \"$arg\" = \"--version\" ]; then exit 0; fi\n\
         done\n\
         exit {exit_code}\n",
        log = log.display(),
    );
    fs::write(&script, body).expect("write stub");
    let mut perms = fs::metadata(&script).expect("metadata").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&script, perms).expect("chmod");
    script
}

fn config(server: &MockServer, cache_dir: &Path, interpreter: PathBuf) -> LauncherConfig {
    LauncherConfig {
        cache_dir: cache_dir.to_path_buf(),
        pyz_url: Url::parse(&format!("{}/pip/pip.pyz", server.uri())).expect("url"),
        interpreter: Some(interpreter),
    }
}

fn seed_cache(cache_dir: &Path, bytes: &[u8], etag: &str, last_modified: &str) {
    let mut headers = ResponseHeaders::new();
    headers.insert("etag".to_string(), etag.to_string());
    headers.insert("last-modified".to_string(), last_modified.to_string());
    PyzCache::new(cache_dir).write(bytes, &headers).expect("seed cache");
}

fn sidecar(cache_dir: &Path) -> serde_json::Value {
    let raw = fs::read_to_string(cache_dir.join("response_headers.json")).expect("sidecar");
    serde_json::from_str(&raw).expect("sidecar json")
}

#[tokio::test]
async fn bootstrap_populates_cache_and_passes_exit_code_through() {
    let tmp = TempDir::new().expect("tempdir");
    let cache_dir = tmp.path().join("cache");
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pip/pip.pyz"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"first-download".to_vec())
                .insert_header("ETag", "\"v1\"")
                .insert_header("Last-Modified", "Wed, 01 Jan 2025 00:00:00 GMT"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let interpreter = stub_interpreter(tmp.path(), 7);
    let cfg = config(&server, &cache_dir, interpreter);
    let code = launch(&cfg, vec![OsString::from("install")]).await.expect("launch");

    assert_eq!(code, 7);
    assert_eq!(fs::read(cache_dir.join("pip.pyz")).expect("pyz"), b"first-download");

    // Exactly the artifact and its sidecar; no temp or marker files left.
    let mut names: Vec<String> = fs::read_dir(&cache_dir)
        .expect("read_dir")
        .map(|entry| entry.expect("entry").file_name().into_string().expect("utf8"))
        .collect();
    names.sort();
    assert_eq!(names, vec!["pip.pyz", "response_headers.json"]);

    // The pip run puts the fixed flags before the forwarded arguments.
    let argv = fs::read_to_string(tmp.path().join("argv.log")).expect("argv");
    let lines: Vec<&str> = argv.lines().collect();
    let tail = &lines[lines.len() - 4..];
    assert!(tail[0].ends_with("pip.pyz"), "tail: {tail:?}");
    assert_eq!(&tail[1..], ["--disable-pip-version-check", "--require-virtualenv", "install"]);
    // The bootstrap version probe ran first, without --require-virtualenv.
    assert!(lines.contains(&"--version"));
}

#[tokio::test]
async fn unchanged_remote_leaves_validator_and_artifact_alone() {
    let tmp = TempDir::new().expect("tempdir");
    let cache_dir = tmp.path().join("cache");
    seed_cache(&cache_dir, b"cached", "\"v1\"", "Wed, 01 Jan 2025 00:00:00 GMT");

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pip/pip.pyz"))
        .and(header("If-None-Match", "\"v1\""))
        .and(header("If-Modified-Since", "Wed, 01 Jan 2025 00:00:00 GMT"))
        .respond_with(ResponseTemplate::new(304))
        .expect(2)
        .mount(&server)
        .await;

    let interpreter = stub_interpreter(tmp.path(), 0);
    let cfg = config(&server, &cache_dir, interpreter);
    for _ in 0..2 {
        let code = launch(&cfg, vec![OsString::from("list")]).await.expect("launch");
        assert_eq!(code, 0);
    }

    let sidecar = sidecar(&cache_dir);
    assert_eq!(sidecar["etag"], "\"v1\"");
    assert_eq!(sidecar["last-modified"], "Wed, 01 Jan 2025 00:00:00 GMT");
    assert_eq!(fs::read(cache_dir.join("pip.pyz")).expect("pyz"), b"cached");
}

#[tokio::test]
async fn stale_validator_forces_refresh_and_updates_sidecar() {
    let tmp = TempDir::new().expect("tempdir");
    let cache_dir = tmp.path().join("cache");
    seed_cache(&cache_dir, b"old-bytes", "\"bogus\"", "Mon, 01 Jan 2001 00:00:00 GMT");

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pip/pip.pyz"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"new-bytes".to_vec())
                .insert_header("ETag", "\"v2\"")
                .insert_header("Last-Modified", "Thu, 02 Jan 2025 00:00:00 GMT"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let interpreter = stub_interpreter(tmp.path(), 3);
    let cfg = config(&server, &cache_dir, interpreter);
    let code = launch(&cfg, vec![OsString::from("list")]).await.expect("launch");

    // pip's exit code is untouched by the successful refresh.
    assert_eq!(code, 3);
    // The cache now reflects the server's true validators, not the bogus ones.
    assert_eq!(fs::read(cache_dir.join("pip.pyz")).expect("pyz"), b"new-bytes");
    let sidecar = sidecar(&cache_dir);
    assert_eq!(sidecar["etag"], "\"v2\"");
    assert_eq!(sidecar["last-modified"], "Thu, 02 Jan 2025 00:00:00 GMT");
}

#[tokio::test]
async fn refresh_failure_never_disturbs_the_foreground_run() {
    let tmp = TempDir::new().expect("tempdir");
    let cache_dir = tmp.path().join("cache");
    seed_cache(&cache_dir, b"cached", "\"v1\"", "Wed, 01 Jan 2025 00:00:00 GMT");

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pip/pip.pyz"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let interpreter = stub_interpreter(tmp.path(), 0);
    let cfg = config(&server, &cache_dir, interpreter);
    let code = launch(&cfg, vec![OsString::from("list")]).await.expect("launch");

    assert_eq!(code, 0);
    assert_eq!(fs::read(cache_dir.join("pip.pyz")).expect("pyz"), b"cached");
    assert_eq!(sidecar(&cache_dir)["etag"], "\"v1\"");
}

#[tokio::test]
async fn in_flight_marker_skips_the_redundant_refresh() {
    let tmp = TempDir::new().expect("tempdir");
    let cache_dir = tmp.path().join("cache");
    seed_cache(&cache_dir, b"cached", "\"v1\"", "Wed, 01 Jan 2025 00:00:00 GMT");
    // Another invocation is mid-refresh: its marker is fresh.
    fs::write(cache_dir.join("pip.pyz.refreshing"), b"").expect("marker");

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pip/pip.pyz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"racing".to_vec()))
        .expect(0)
        .mount(&server)
        .await;

    let interpreter = stub_interpreter(tmp.path(), 4);
    let cfg = config(&server, &cache_dir, interpreter);
    let code = launch(&cfg, vec![OsString::from("list")]).await.expect("launch");

    assert_eq!(code, 4);
    assert_eq!(fs::read(cache_dir.join("pip.pyz")).expect("pyz"), b"cached");
    // The foreign marker is left for its owner to release.
    assert!(cache_dir.join("pip.pyz.refreshing").exists());
}

#[tokio::test]
async fn failed_bootstrap_is_fatal_and_runs_nothing() {
    let tmp = TempDir::new().expect("tempdir");
    let cache_dir = tmp.path().join("cache");

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pip/pip.pyz"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let interpreter = stub_interpreter(tmp.path(), 0);
    let cfg = config(&server, &cache_dir, interpreter);
    let err = launch(&cfg, vec![OsString::from("install")]).await.expect_err("fatal");

    assert!(matches!(err, LaunchError::Fetch(_)));
    assert!(!cache_dir.join("pip.pyz").exists());
    // The interpreter never ran: no artifact, nothing to execute.
    assert!(!tmp.path().join("argv.log").exists());
}
