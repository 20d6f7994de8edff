// Chordex - chord index and search over MIDI corpora
//
// Indexing turns every .mid file under a media root into chord observations,
// spills them into per-lowest-note bucket shards and compacts those into
// sorted chunk files. Search binary-searches the chunk list for a chord key
// and reads its match entries straight out of one chunk.

pub mod chord;
pub mod config;
pub mod context;
pub mod error;
pub mod excerpt;
#[cfg(feature = "http")]
pub mod http;
pub mod index;
pub mod query;
pub mod testing;
