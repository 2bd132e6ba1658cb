//! Payload packaging against a real source tree.

use camino::Utf8Path;
use rstest::*;
use stackwright::{load_source_dir, package, unpack};
use tempfile::TempDir;

#[fixture]
fn source_tree() -> TempDir {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path();
    std::fs::write(root.join("handler.py"), "def lambda_handler(event, context):\n    return {}\n")
        .expect("write handler");
    std::fs::create_dir(root.join("vendor")).expect("mkdir vendor");
    std::fs::write(root.join("vendor/client.py"), "API = 'x'\n").expect("write client");
    temp
}

#[rstest]
fn source_tree_round_trips_through_the_archive(source_tree: TempDir) {
    let root = Utf8Path::from_path(source_tree.path()).expect("utf8 path");
    let files = load_source_dir(root).expect("load sources");

    let archive = package(files.clone()).expect("package");

    assert_eq!(unpack(&archive).expect("unpack"), files);
}

#[rstest]
fn repeated_packaging_is_byte_identical(source_tree: TempDir) {
    let root = Utf8Path::from_path(source_tree.path()).expect("utf8 path");

    let first = package(load_source_dir(root).expect("load")).expect("first");
    let second = package(load_source_dir(root).expect("load")).expect("second");

    assert_eq!(first, second);
}

#[rstest]
fn handler_entry_keeps_its_content() {
    let archive = package([("handler", "print('ok')")]).expect("package");

    let files = unpack(&archive).expect("unpack");

    assert_eq!(files.len(), 1);
    assert_eq!(files.get("handler").map(Vec::as_slice), Some(&b"print('ok')"[..]));
}
