//! Integration tests: checksum verification against served reference files.

mod common;

use common::scripted_server::{self, Reply};
use shardfetch_core::checksum::{self, ChecksumError, ChecksumSource};
use std::fs;
use std::time::Duration;
use tempfile::tempdir;

const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";
const TIMEOUT: Duration = Duration::from_secs(5);

#[test]
fn lfs_pointer_reference_matches() {
    let pointer = format!(
        "version https://git-lfs.github.com/spec/v1\noid sha256:{}\nsize 5\n",
        HELLO_SHA256
    );
    let server = scripted_server::start("/raw/main/shard.bin", vec![Reply::ok(pointer.as_bytes())]);
    let dir = tempdir().unwrap();
    let file = dir.path().join("shard.bin");
    fs::write(&file, b"hello").unwrap();

    let result = checksum::verify(&file, &ChecksumSource::Url(server.url.clone()), TIMEOUT).unwrap();

    assert!(result.matched);
    assert_eq!(result.computed, HELLO_SHA256);
    assert_eq!(server.hits(), 1);
}

#[test]
fn plain_digest_reference_detects_mismatch() {
    let body = format!("{}  shard.bin\n", HELLO_SHA256.to_uppercase());
    let server = scripted_server::start("/shard.bin.sha256", vec![Reply::ok(body.as_bytes())]);
    let dir = tempdir().unwrap();
    let file = dir.path().join("shard.bin");
    fs::write(&file, b"hello!").unwrap();

    let result = checksum::verify(&file, &ChecksumSource::parse(&server.url), TIMEOUT).unwrap();

    assert!(!result.matched);
    assert_eq!(result.expected, HELLO_SHA256);
}

#[test]
fn unreachable_reference_is_an_error() {
    let server = scripted_server::start("/gone", vec![Reply::status(404)]);
    let dir = tempdir().unwrap();
    let file = dir.path().join("shard.bin");
    fs::write(&file, b"hello").unwrap();

    let err = checksum::verify(&file, &ChecksumSource::Url(server.url.clone()), TIMEOUT).unwrap_err();

    assert!(matches!(err, ChecksumError::Fetch { .. }), "{:?}", err);
}

#[test]
fn garbage_reference_is_rejected() {
    let server = scripted_server::start("/junk", vec![Reply::ok(b"<html>not a digest</html>")]);
    let dir = tempdir().unwrap();
    let file = dir.path().join("shard.bin");
    fs::write(&file, b"hello").unwrap();

    let err = checksum::verify(&file, &ChecksumSource::Url(server.url.clone()), TIMEOUT).unwrap_err();

    assert!(matches!(err, ChecksumError::BadReference { .. }), "{:?}", err);
}

#[test]
fn missing_file_does_not_contact_server() {
    let server = scripted_server::start("/never", vec![Reply::ok(HELLO_SHA256.as_bytes())]);
    let dir = tempdir().unwrap();

    let err = checksum::verify(
        &dir.path().join("absent.bin"),
        &ChecksumSource::Url(server.url.clone()),
        TIMEOUT,
    )
    .unwrap_err();

    assert!(matches!(err, ChecksumError::FileNotFound(_)));
    assert_eq!(server.hits(), 0);
}
