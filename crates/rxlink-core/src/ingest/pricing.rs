//! NDC directory `product.txt` loader.
//!
//! Successive directory editions re-list the same products with occasional
//! corrections, so loading accumulates into a map keyed by the NDC and the
//! application number as printed. The latest edition wins for descriptive
//! fields; marketing dates keep the earliest start and the latest end seen,
//! since manufacturers push the end date around between editions.

use std::collections::BTreeMap;
use std::path::Path;

use super::{field, ColumnMap, IngestError};
use crate::models::PricingRecord;

#[derive(Debug, Default)]
pub struct PricingLoader {
    records: BTreeMap<(String, String), PricingRecord>,
}

impl PricingLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load one edition's `product.txt`, consolidating into records seen in
    /// earlier editions. Returns the number of rows kept from this file.
    pub fn load_file(&mut self, path: &Path) -> Result<usize, IngestError> {
        let csv_err = |source| IngestError::Csv {
            path: path.to_path_buf(),
            source,
        };

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .flexible(true)
            .from_path(path)
            .map_err(csv_err)?;

        let headers = reader.byte_headers().map_err(csv_err)?.clone();
        let cols = ColumnMap::new(&headers);
        let ndc = cols.require(path, "productndc")?;
        let proprietary = cols.require(path, "proprietaryname")?;
        let appl_no = cols.require(path, "applicationnumber")?;
        let substance = cols.require(path, "substancename")?;
        let dosage_form = cols.require(path, "dosageformname")?;
        let route = cols.require(path, "routename")?;
        let strength_num = cols.require(path, "active_numerator_strength")?;
        let strength_unit = cols.require(path, "active_ingred_unit")?;
        let start_date = cols.require(path, "startmarketingdate")?;
        let end_date = cols.require(path, "endmarketingdate")?;
        let suffix = cols.indices.get("proprietarynamesuffix").copied();

        let mut kept = 0;
        for result in reader.byte_records() {
            let record = result.map_err(csv_err)?;
            let raw_appl = field(&record, appl_no);
            // OTC monograph rows carry "part N" instead of an application
            // number and cannot be joined to the Orange Book.
            if raw_appl.is_empty() || raw_appl.to_ascii_lowercase().starts_with("part") {
                continue;
            }
            if field(&record, dosage_form) == "KIT" {
                continue;
            }
            if field(&record, substance) == "WATER" {
                continue;
            }

            let mut description = field(&record, proprietary);
            if let Some(suffix) = suffix {
                let suffix = field(&record, suffix);
                if !suffix.is_empty() {
                    description = format!("{description} {suffix}");
                }
            }

            let row = PricingRecord {
                ndc: field(&record, ndc),
                description,
                // "NDA012345" and "ANDA076543" both join on the digits
                appl_no: raw_appl.trim_start_matches(|c: char| c.is_ascii_alphabetic()).to_string(),
                ingredient: field(&record, substance),
                form: field(&record, dosage_form),
                route: field(&record, route),
                strength_num: field(&record, strength_num),
                strength_unit: field(&record, strength_unit),
                start_date: field(&record, start_date),
                end_date: field(&record, end_date),
            };
            kept += 1;

            let key = (row.ndc.clone(), raw_appl);
            match self.records.entry(key) {
                std::collections::btree_map::Entry::Vacant(slot) => {
                    slot.insert(row);
                }
                std::collections::btree_map::Entry::Occupied(mut slot) => {
                    let prior = slot.get();
                    let start_date = prior.start_date.clone().min(row.start_date.clone());
                    let end_date = prior.end_date.clone().max(row.end_date.clone());
                    let mut merged = row;
                    merged.start_date = start_date;
                    merged.end_date = end_date;
                    slot.insert(merged);
                }
            }
        }

        tracing::info!(path = %path.display(), kept, "loaded NDC product file");
        Ok(kept)
    }

    /// Load every edition under `dir`, oldest first. Each `ndc-*`
    /// subdirectory is one edition holding a `product.txt`.
    pub fn load_dir(&mut self, dir: &Path) -> Result<(), IngestError> {
        let io_err = |source| IngestError::Io {
            path: dir.to_path_buf(),
            source,
        };

        let mut editions = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(io_err)? {
            let entry = entry.map_err(io_err)?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with("ndc-") {
                editions.push(entry.path().join("product.txt"));
            }
        }
        if editions.is_empty() {
            return Err(IngestError::NoEditions {
                path: dir.to_path_buf(),
            });
        }
        editions.sort();

        for path in editions {
            self.load_file(&path)?;
        }
        Ok(())
    }

    /// Consolidated records in key order.
    pub fn finish(self) -> Vec<PricingRecord> {
        self.records.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const HEADER: &str = "PRODUCTNDC\tPROPRIETARYNAME\tPROPRIETARYNAMESUFFIX\tDOSAGEFORMNAME\tROUTENAME\tSTARTMARKETINGDATE\tENDMARKETINGDATE\tAPPLICATIONNUMBER\tSUBSTANCENAME\tACTIVE_NUMERATOR_STRENGTH\tACTIVE_INGRED_UNIT";

    fn write_file(dir: &Path, name: &str, rows: &[&str]) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "{HEADER}").unwrap();
        for row in rows {
            writeln!(file, "{row}").unwrap();
        }
        path
    }

    #[test]
    fn test_load_and_filter() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "product.txt",
            &[
                "0093-3109\tAmoxicillin\t\tCAPSULE\tORAL\t19740117\t\tANDA050542\tAMOXICILLIN\t500\tmg/1",
                "1111-0001\tSaline\t\tSOLUTION\tINTRAVENOUS\t20000101\t\tpart 341\tSODIUM CHLORIDE\t9\tmg/mL",
                "2222-0001\tFirst Aid Kit\t\tKIT\tTOPICAL\t20000101\t\tNDA000001\tBACITRACIN\t1\tg/1",
                "3333-0001\tSterile Water\t\tSOLUTION\tINTRAVENOUS\t20000101\t\tNDA000002\tWATER\t1\tmL/mL",
            ],
        );

        let mut loader = PricingLoader::new();
        assert_eq!(loader.load_file(&path).unwrap(), 1);
        let records = loader.finish();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].ndc, "0093-3109");
        assert_eq!(records[0].appl_no, "050542");
        assert_eq!(records[0].description, "Amoxicillin");
    }

    #[test]
    fn test_consolidation_last_wins_dates_widen() {
        let dir = tempfile::tempdir().unwrap();
        let first = write_file(
            dir.path(),
            "a.txt",
            &["0093-3109\tAmoxicillin\t\tCAPSULE\tORAL\t19740117\t20200101\tANDA050542\tAMOXICILLIN\t500\tmg/1"],
        );
        let second = write_file(
            dir.path(),
            "b.txt",
            &["0093-3109\tAmoxicillin\tCaps\tCAPSULE\tORAL\t19800101\t20250101\tANDA050542\tAMOXICILLIN\t500\tmg/1"],
        );

        let mut loader = PricingLoader::new();
        loader.load_file(&first).unwrap();
        loader.load_file(&second).unwrap();
        let records = loader.finish();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].description, "Amoxicillin Caps");
        assert_eq!(records[0].start_date, "19740117");
        assert_eq!(records[0].end_date, "20250101");
    }

    #[test]
    fn test_same_ndc_distinct_applications_kept_apart() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "product.txt",
            &[
                "0093-3109\tAmoxicillin\t\tCAPSULE\tORAL\t19740117\t\tANDA050542\tAMOXICILLIN\t500\tmg/1",
                "0093-3109\tAmoxicillin\t\tCAPSULE\tORAL\t19900101\t\tANDA062374\tAMOXICILLIN\t500\tmg/1",
            ],
        );

        let mut loader = PricingLoader::new();
        loader.load_file(&path).unwrap();
        assert_eq!(loader.finish().len(), 2);
    }

    #[test]
    fn test_load_dir() {
        let dir = tempfile::tempdir().unwrap();
        let edition = dir.path().join("ndc-20240101");
        std::fs::create_dir_all(&edition).unwrap();
        write_file(
            &edition,
            "product.txt",
            &["0093-3109\tAmoxicillin\t\tCAPSULE\tORAL\t19740117\t\tANDA050542\tAMOXICILLIN\t500\tmg/1"],
        );

        let mut loader = PricingLoader::new();
        loader.load_dir(dir.path()).unwrap();
        assert_eq!(loader.finish().len(), 1);

        let mut empty = PricingLoader::new();
        let other = tempfile::tempdir().unwrap();
        assert!(matches!(
            empty.load_dir(other.path()),
            Err(IngestError::NoEditions { .. })
        ));
    }
}
