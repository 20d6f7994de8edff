//! End-to-end indexing and search over synthetic corpora
//!
//! Each test writes MIDI files into a temporary media root, runs a full
//! indexing pass and queries the persisted index through `AppContext`.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use chordex::config::{AppConfig, StorageConfig};
use chordex::context::AppContext;
use chordex::index::{IndexReport, Indexer};
use chordex::query::{open_store, SearchRequest};
use chordex::testing::{chord_progression_fixture, MidiFileBuilder, NoteSpan};
use tempfile::{tempdir, TempDir};

struct Corpus {
    media: TempDir,
    out: TempDir,
}

impl Corpus {
    fn new() -> Self {
        Self {
            media: tempdir().expect("media dir"),
            out: tempdir().expect("index dir"),
        }
    }

    fn add(&self, relative: &str, bytes: Vec<u8>) {
        let path = self.media.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create media subdir");
        }
        fs::write(path, bytes).expect("write media file");
    }

    fn config(&self, metadata_path: Option<&Path>) -> AppConfig {
        let mut config = AppConfig::default();
        config.storage = StorageConfig {
            index_dir: self.out.path().to_path_buf(),
            media_root: self.media.path().to_path_buf(),
            metadata_path: metadata_path.map(Path::to_path_buf),
        };
        config
    }

    fn index(&self, config: &AppConfig) {
        let metadata = open_store(config.storage.metadata_path.as_deref()).expect("metadata");
        Indexer::new(config.storage.clone(), config.indexing.clone(), metadata)
            .run()
            .expect("index run");
    }

    fn context(&self) -> AppContext {
        let config = self.config(None);
        self.index(&config);
        AppContext::load(config).expect("load context")
    }
}

fn search(ctx: &AppContext, notes: &[u8], start: usize) -> chordex::query::SearchResponse {
    ctx.search(&SearchRequest::single(notes.to_vec()), start)
        .expect("search")
}

#[test]
fn test_progression_end_to_end() {
    let corpus = Corpus::new();
    corpus.add("song.mid", chord_progression_fixture());
    let ctx = corpus.context();

    let c_major = search(&ctx, &[67, 60, 64], 0);
    assert_eq!(c_major.num_matches, 2);
    assert_eq!(c_major.num_files, 1);
    let mut offsets = c_major.results[0].offsets.clone();
    offsets.sort_unstable();
    assert_eq!(offsets, vec![0, 960]);

    let f_major = search(&ctx, &[60, 65, 69], 0);
    assert_eq!(f_major.num_matches, 1);
    assert_eq!(f_major.results[0].offsets, vec![480]);

    let absent = search(&ctx, &[61, 63], 0);
    assert_eq!(absent.num_matches, 0);
    assert!(absent.results.is_empty());
}

#[test]
fn test_pagination_over_files() {
    let corpus = Corpus::new();
    for i in 0..12 {
        let bytes = MidiFileBuilder::new(480)
            .chord(&[50, 53, 57], 0, 480)
            .chord(&[40 + i, 70], 960, 1440)
            .build();
        corpus.add(&format!("set/{:02}.mid", i), bytes);
    }
    let ctx = corpus.context();

    let first = search(&ctx, &[50, 53, 57], 0);
    assert_eq!(first.num_files, 12);
    assert_eq!(first.num_matches, 12);
    assert_eq!(first.results.len(), 10);

    let second = search(&ctx, &[50, 53, 57], 10);
    assert_eq!(second.start, 10);
    assert_eq!(second.results.len(), 2);

    let mut seen: Vec<u32> = first
        .results
        .iter()
        .chain(second.results.iter())
        .map(|r| r.file_id)
        .collect();
    seen.sort_unstable();
    seen.dedup();
    assert_eq!(seen.len(), 12);
}

#[test]
fn test_percussion_is_ignored() {
    let corpus = Corpus::new();
    let drums = vec![
        NoteSpan::new(36, 0, 240).on_channel(9),
        NoteSpan::new(42, 0, 240).on_channel(9),
    ];
    corpus.add("drums.mid", MidiFileBuilder::new(480).track(drums).build());
    let ctx = corpus.context();

    assert_eq!(search(&ctx, &[36, 42], 0).num_matches, 0);
}

#[test]
fn test_metadata_is_attached() {
    let corpus = Corpus::new();
    corpus.add("song.mid", chord_progression_fixture());
    let metadata_path = corpus.out.path().join("metadata.json");
    fs::write(
        &metadata_path,
        r#"{"song.mid": {"year": 1985, "artist": "Band", "title": "Tune", "release": "LP"}}"#,
    )
    .expect("write metadata");

    let config = corpus.config(Some(&metadata_path));
    corpus.index(&config);
    let ctx = AppContext::load(config).expect("load context");

    let response = search(&ctx, &[60, 65, 69], 0);
    let metadata = response.results[0]
        .midi_metadata
        .as_ref()
        .expect("metadata attached");
    assert_eq!(metadata.year, 1985);
    assert_eq!(metadata.artist, "Band");
}

#[test]
fn test_kept_buckets_show_in_report() {
    let corpus = Corpus::new();
    corpus.add("song.mid", chord_progression_fixture());
    let mut config = corpus.config(None);
    config.indexing.delete_buckets = false;
    corpus.index(&config);

    let report = IndexReport::collect(corpus.out.path()).expect("report");
    assert_eq!(report.bucket_files, 1);
    assert_eq!(report.bucket_chords, 3);
    assert_eq!(report.chunk_chords(), 3);
}

#[test]
fn test_shared_context_across_threads() {
    let corpus = Corpus::new();
    corpus.add("song.mid", chord_progression_fixture());
    let ctx = Arc::new(corpus.context());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let ctx = Arc::clone(&ctx);
            std::thread::spawn(move || search(&ctx, &[60, 64, 67], 0).num_matches)
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().expect("search thread"), 2);
    }
}
