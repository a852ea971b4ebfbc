//! Offline dataset tooling: synthetic fundus generation and batch image
//! preprocessing. The `datagen` and `preprocess` binaries are thin
//! wrappers over [`datagen::run_datagen`] and [`preprocess::run_preprocess`].

pub mod datagen;
pub mod preprocess;

pub use datagen::{resolve_seed, run_datagen, DatagenArgs};
pub use preprocess::{run_preprocess, PreprocessArgs};
