//! Multi-tile containers for the tileforge workspace.
//!
//! Currently one container is implemented: a plain `<z>/<x>/<y>.<ext>`
//! directory tree of vector tiles, optionally described by a sibling
//! `metadata.json` document.

mod directory;

pub use directory::{DirectoryDataset, DirectoryLayer, DirectoryOptions, MAX_FILES_PER_DIR};
