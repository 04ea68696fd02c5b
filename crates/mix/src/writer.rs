//! Corpus files on disk.
//!
//! Layout of an output directory:
//! - `train.jsonl`, `validation.jsonl`, `test.jsonl`: one canonical record
//!   per line
//! - `manifest.json`: the build manifest
//!
//! Each file is written to a hidden sibling and renamed into place.

use corpus_core::{CanonicalRecord, CorpusPaths, Error, Result, SplitLabel};
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use crate::pipeline::CorpusBuild;

/// Writes a [`CorpusBuild`] to a directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct CorpusWriter;

impl CorpusWriter {
    /// Write splits and manifest under `dir`, creating it if needed.
    pub fn write(&self, build: &CorpusBuild, dir: impl AsRef<Path>) -> Result<CorpusPaths> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let paths = CorpusPaths::in_dir(dir);

        for label in SplitLabel::ALL {
            let mut body = String::new();
            for entry in build.splits.split(label) {
                body.push_str(&serde_json::to_string(&entry.record)?);
                body.push('\n');
            }
            write_atomic(paths.split(label), body.as_bytes())?;
        }

        let mut manifest = serde_json::to_string_pretty(&build.manifest)?;
        manifest.push('\n');
        write_atomic(&paths.manifest, manifest.as_bytes())?;

        tracing::info!(
            dir = %dir.display(),
            train = build.splits.train.len(),
            validation = build.splits.validation.len(),
            test = build.splits.test.len(),
            "corpus written"
        );
        Ok(paths)
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::data(format!("invalid output path {}", path.display())))?;
    let tmp = path.with_file_name(format!(".{name}.tmp"));

    let mut file = fs::File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp, path)?;
    Ok(())
}

/// Read a split file back into canonical records.
pub fn read_split(path: impl AsRef<Path>) -> Result<Vec<CanonicalRecord>> {
    let path = path.as_ref();
    let reader = BufReader::new(fs::File::open(path)?);
    let mut records = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|e| {
            Error::data(format!("{}:{}: {e}", path.display(), line_no + 1))
        })?;
        records.push(record);
    }
    Ok(records)
}
