//! Loaders for the source datasets.
//!
//! Orange Book editions ship as `~`-delimited `products.txt` files; NDC
//! directory editions ship as tab-delimited `product.txt` files. Both are
//! read by column name so that field reordering across vintages does not
//! break ingestion. Header names are lowercased before lookup because the
//! FDA has changed header casing between editions.

mod orange_book;
mod pricing;

pub use orange_book::{load_orange_book_dir, load_orange_book_edition};
pub use pricing::PricingLoader;

use std::collections::HashMap;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to read {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed to scan {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}: missing required column `{column}`")]
    MissingColumn { path: PathBuf, column: String },

    #[error("no editions found under {path}")]
    NoEditions { path: PathBuf },
}

/// Case-insensitive header-name to column-index lookup for one file.
struct ColumnMap {
    indices: HashMap<String, usize>,
}

impl ColumnMap {
    fn new(headers: &csv::ByteRecord) -> Self {
        let indices = headers
            .iter()
            .enumerate()
            .map(|(i, raw)| {
                let name = String::from_utf8_lossy(raw)
                    .trim()
                    .trim_start_matches('\u{feff}')
                    .to_ascii_lowercase();
                (name, i)
            })
            .collect();
        Self { indices }
    }

    fn require(&self, path: &std::path::Path, column: &str) -> Result<usize, IngestError> {
        self.indices
            .get(column)
            .copied()
            .ok_or_else(|| IngestError::MissingColumn {
                path: path.to_path_buf(),
                column: column.to_string(),
            })
    }
}

/// Extract one field as trimmed text. The NDC files are cp1252, not UTF-8,
/// so conversion is lossy rather than fallible.
fn field(record: &csv::ByteRecord, index: usize) -> String {
    record
        .get(index)
        .map(|raw| String::from_utf8_lossy(raw).trim().to_string())
        .unwrap_or_default()
}
