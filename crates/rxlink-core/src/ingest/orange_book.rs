//! Orange Book `products.txt` loader.

use std::path::Path;

use chrono::NaiveDate;

use super::{field, ColumnMap, IngestError};
use crate::models::ObProductRecord;

/// Load one edition's `products.txt`. The `edition` label is carried onto
/// every record so that cross-edition unions stay auditable.
pub fn load_orange_book_edition(
    path: &Path,
    edition: &str,
) -> Result<Vec<ObProductRecord>, IngestError> {
    let csv_err = |source| IngestError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'~')
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(csv_err)?;

    let headers = reader.byte_headers().map_err(csv_err)?.clone();
    let cols = ColumnMap::new(&headers);
    let ingredient = cols.require(path, "ingredient")?;
    let df_route = cols.require(path, "df;route")?;
    let trade_name = cols.require(path, "trade_name")?;
    let applicant = cols.require(path, "applicant")?;
    let strength = cols.require(path, "strength")?;
    let appl_no = cols.require(path, "appl_no")?;
    let product_no = cols.require(path, "product_no")?;
    let te_code = cols.require(path, "te_code")?;
    let approval_date = cols.require(path, "approval_date")?;

    let mut records = Vec::new();
    for result in reader.byte_records() {
        let record = result.map_err(csv_err)?;
        let date_text = field(&record, approval_date);
        let approval = parse_approval_date(&date_text);
        if approval.is_none() && !date_text.is_empty() {
            tracing::warn!(edition, date = %date_text, "unparseable approval date");
        }
        records.push(ObProductRecord {
            appl_no: field(&record, appl_no),
            product_no: field(&record, product_no),
            ingredient: field(&record, ingredient),
            df_route: field(&record, df_route),
            strength: field(&record, strength),
            te_code: field(&record, te_code),
            approval_date: approval,
            applicant: field(&record, applicant),
            trade_name: field(&record, trade_name),
            edition: edition.to_string(),
        });
    }

    tracing::info!(edition, records = records.len(), "loaded Orange Book edition");
    Ok(records)
}

/// Load every edition under `dir`, oldest first. Each `EOBZIP_*`
/// subdirectory is one edition holding a `products.txt`.
pub fn load_orange_book_dir(dir: &Path) -> Result<Vec<ObProductRecord>, IngestError> {
    let io_err = |source| IngestError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut editions = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with("EOBZIP_") {
            editions.push((name, entry.path().join("products.txt")));
        }
    }
    if editions.is_empty() {
        return Err(IngestError::NoEditions {
            path: dir.to_path_buf(),
        });
    }
    editions.sort();

    let mut records = Vec::new();
    for (name, path) in editions {
        let edition = name.trim_start_matches("EOBZIP_");
        records.extend(load_orange_book_edition(&path, edition)?);
    }
    Ok(records)
}

/// The oldest approvals carry a sentinel phrase instead of a date; they are
/// pinned to 1982-01-01, matching how the Orange Book itself dates them.
fn parse_approval_date(text: &str) -> Option<NaiveDate> {
    if text.is_empty() {
        return None;
    }
    if text == "Approved Prior to Jan 1, 1982" {
        return NaiveDate::from_ymd_opt(1982, 1, 1);
    }
    NaiveDate::parse_from_str(text, "%b %d, %Y").ok()
}
