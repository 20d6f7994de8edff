use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use chordex::testing::chord_progression_fixture;
use serde_json::Value;
use tempfile::tempdir;

fn cli(media: &Path, out: &Path) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_chordex"));
    command
        .arg("--media-root")
        .arg(media)
        .arg("--index-dir")
        .arg(out);
    command
}

fn stdout_json(output: &Output) -> Value {
    assert!(
        output.status.success(),
        "command exited with {:?}: {}",
        output.status.code(),
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("JSON on stdout")
}

#[test]
fn index_then_search_outputs_json() {
    let media = tempdir().expect("media dir");
    let out = tempdir().expect("index dir");
    fs::write(media.path().join("song.mid"), chord_progression_fixture()).expect("write fixture");

    let summary = stdout_json(
        &cli(media.path(), out.path())
            .args(["index", "--json"])
            .output()
            .expect("index command"),
    );
    assert_eq!(summary["files_indexed"], 1);
    assert_eq!(summary["chords"], 3);

    let response = stdout_json(
        &cli(media.path(), out.path())
            .args(["search", "64", "60", "67"])
            .output()
            .expect("search command"),
    );
    assert_eq!(response["num_matches"], 2);
    assert_eq!(response["results"][0]["file_id"], 1);
}

#[test]
fn report_and_inspect_after_index() {
    let media = tempdir().expect("media dir");
    let out = tempdir().expect("index dir");
    fs::write(media.path().join("song.mid"), chord_progression_fixture()).expect("write fixture");

    let status = cli(media.path(), out.path())
        .args(["index", "--keep-buckets"])
        .status()
        .expect("index command");
    assert!(status.success());

    let report = stdout_json(
        &cli(media.path(), out.path())
            .args(["report", "--json"])
            .output()
            .expect("report command"),
    );
    assert_eq!(report["chunk_files"], 1);
    assert_eq!(report["bucket_chords"], 3);

    let chunks: Value = serde_json::from_slice(
        &fs::read(out.path().join("chunks.json")).expect("chunks.json"),
    )
    .expect("chunk list JSON");
    let filename = chunks[0]["filename"].as_str().expect("chunk filename");

    let inspection = stdout_json(
        &cli(media.path(), out.path())
            .args(["inspect", "--json"])
            .arg(out.path().join(filename))
            .output()
            .expect("inspect command"),
    );
    assert_eq!(inspection["keys"].as_array().map(Vec::len), Some(2));
}

#[test]
fn search_without_index_fails() {
    let media = tempdir().expect("media dir");
    let out = tempdir().expect("index dir");

    let output = cli(media.path(), out.path())
        .args(["search", "60", "64"])
        .output()
        .expect("search command");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("chordex error"), "unexpected stderr: {stderr}");
}
