//! Input path expansion.

use std::path::PathBuf;

use ignore::WalkBuilder;
use tracing::warn;

/// Expand the given inputs into a sorted list of files. Directories are
/// walked recursively with hidden files skipped; traversal errors are
/// logged and do not abort the batch. Sorting keeps the document arrival
/// order, and with it the column schema evolution, reproducible.
pub fn expand_inputs(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let walk = WalkBuilder::new(input)
                .standard_filters(false)
                .hidden(true)
                .build();
            for entry in walk {
                match entry {
                    Ok(entry) => {
                        if entry.file_type().is_some_and(|t| t.is_file()) {
                            files.push(entry.into_path());
                        }
                    }
                    Err(err) => warn!("error walking {}: {}", input.display(), err),
                }
            }
        } else {
            files.push(input.clone());
        }
    }
    files.sort();
    files
}
