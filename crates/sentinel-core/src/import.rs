//! CSV import of ledger entries
//!
//! Expected header (case-insensitive, Portuguese aliases accepted):
//! `date,description,amount[,category_id][,unit_id]`
//!
//! Dates are day-first (`2024-01-15`, `15/01/2024`, `15/01/24`) and amounts
//! may use either a decimal point or a decimal comma (`-1.234,56`).

use std::io::Read;

use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord};
use serde::Serialize;
use tracing::{debug, info};

use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::NewLedgerEntry;

const DATE_COLUMNS: &[&str] = &["date", "data", "posting_date"];
const DESCRIPTION_COLUMNS: &[&str] = &["description", "descricao", "historico"];
const AMOUNT_COLUMNS: &[&str] = &["amount", "valor"];
const CATEGORY_COLUMNS: &[&str] = &["category_id", "categoria_id", "categoriaid", "categoryid"];
const UNIT_COLUMNS: &[&str] = &["unit_id", "unidade_id", "unidadeid", "unitid"];

/// Outcome of an import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub imported: usize,
    pub uncategorized: usize,
}

/// Column positions resolved from the header row
struct Columns {
    date: usize,
    description: usize,
    amount: usize,
    category: Option<usize>,
    unit: Option<usize>,
}

impl Columns {
    fn from_headers(headers: &StringRecord) -> Result<Self> {
        let find = |names: &[&str]| {
            headers
                .iter()
                .position(|h| names.contains(&h.trim().to_lowercase().as_str()))
        };
        let require = |names: &[&str]| {
            find(names).ok_or_else(|| Error::Import(format!("Missing column: {}", names[0])))
        };

        Ok(Self {
            date: require(DATE_COLUMNS)?,
            description: require(DESCRIPTION_COLUMNS)?,
            amount: require(AMOUNT_COLUMNS)?,
            category: find(CATEGORY_COLUMNS),
            unit: find(UNIT_COLUMNS),
        })
    }
}

/// Parse ledger entries from CSV
///
/// The whole file is rejected if any row is malformed; the error names the
/// offending line.
pub fn parse_ledger_csv<R: Read>(reader: R) -> Result<Vec<NewLedgerEntry>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let columns = Columns::from_headers(rdr.headers()?)?;
    let mut entries = Vec::new();

    for result in rdr.records() {
        let record = result?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);

        // Skip blank lines
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }

        let entry = parse_record(&record, &columns)
            .map_err(|e| Error::Import(format!("line {}: {}", line, e)))?;
        entries.push(entry);
    }

    debug!("Parsed {} ledger entries", entries.len());
    Ok(entries)
}

fn parse_record(record: &StringRecord, columns: &Columns) -> Result<NewLedgerEntry> {
    let field = |idx: usize| record.get(idx).map(str::trim).unwrap_or("");

    let posting_date = parse_date(field(columns.date))?;

    let description = field(columns.description).to_string();
    if description.is_empty() {
        return Err(Error::Import("Missing description".into()));
    }

    let amount_str = field(columns.amount);
    if amount_str.is_empty() {
        return Err(Error::Import("Missing amount".into()));
    }
    let amount = parse_amount(amount_str)?;

    let category_id = columns
        .category
        .map(|idx| parse_optional_id(field(idx), "category_id"))
        .transpose()?
        .flatten();
    let unit_id = columns
        .unit
        .map(|idx| parse_optional_id(field(idx), "unit_id"))
        .transpose()?
        .flatten();

    Ok(NewLedgerEntry {
        description,
        posting_date,
        amount,
        category_id,
        unit_id,
    })
}

/// Parse ledger entries from CSV and insert them in one transaction
pub fn import_ledger_csv<R: Read>(db: &Database, reader: R) -> Result<ImportSummary> {
    let entries = parse_ledger_csv(reader)?;
    let uncategorized = entries.iter().filter(|e| e.category_id.is_none()).count();

    let ids = db.insert_ledger_entries(&entries)?;
    info!(
        "Imported {} ledger entries ({} uncategorized)",
        ids.len(),
        uncategorized
    );

    Ok(ImportSummary {
        imported: ids.len(),
        uncategorized,
    })
}

/// Parse a date string in the supported day-first formats
fn parse_date(s: &str) -> Result<NaiveDate> {
    let s = s.trim();

    let formats = [
        "%Y-%m-%d", // 2024-01-15
        "%d/%m/%Y", // 15/01/2024
        "%d/%m/%y", // 15/01/24
        "%d-%m-%Y", // 15-01-2024
    ];

    for fmt in formats {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(date);
        }
    }

    Err(Error::Import(format!("Unable to parse date: {}", s)))
}

/// Parse an amount, accepting currency symbols, thousands separators,
/// decimal commas and accounting-style parentheses
fn parse_amount(s: &str) -> Result<f64> {
    let mut cleaned: String = s
        .trim()
        .replace("R$", "")
        .replace(['$', ' '], "")
        .replace('(', "-")
        .replace(')', "");

    cleaned = match (cleaned.rfind(','), cleaned.rfind('.')) {
        // 1.234,56
        (Some(comma), Some(dot)) if comma > dot => cleaned.replace('.', "").replace(',', "."),
        // 1,234.56
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        // 1234,56
        (Some(_), None) => cleaned.replace(',', "."),
        _ => cleaned,
    };

    cleaned
        .parse::<f64>()
        .map_err(|_| Error::Import(format!("Unable to parse amount: {}", s)))
}

fn parse_optional_id(s: &str, column: &str) -> Result<Option<i64>> {
    if s.is_empty() {
        return Ok(None);
    }
    s.parse::<i64>()
        .map(Some)
        .map_err(|_| Error::Import(format!("Invalid {}: {}", column, s)))
}
