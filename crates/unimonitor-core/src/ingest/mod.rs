// =============================================================================
// Ingest: tabular input file → raw records
// =============================================================================
//
// The spreadsheet this project was built around has been exported in several
// ways over time, so the reader is deliberately forgiving:
//
//   - UTF-8, or Latin-1 when the bytes are not valid UTF-8
//   - comma-separated, or semicolon-separated (Brazilian locale exports)
//   - header names matched case-insensitively, accents stripped:
//         "Universidade", "Ano ", "Orçamento(GND 3+4)", "IGC (Contínuo)"
//   - numbers with "R$", thousands separators or a decimal comma
//
// Nothing here decides whether a row is usable. A cell that doesn't parse is
// simply None; the panel builder excludes and counts such rows.
//
// =============================================================================

use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::error::{MonitorError, Result};

/// One unvalidated row from the input file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawRecord {
    /// 1-based line in the source file (header is line 1).
    pub line: usize,
    pub institution: Option<String>,
    pub year: Option<i32>,
    pub budget: Option<f64>,
    pub igc: Option<f64>,
}

impl RawRecord {
    /// Convenience constructor for a fully populated row.
    pub fn new(institution: &str, year: i32, budget: f64, igc: f64) -> Self {
        Self {
            line: 0,
            institution: Some(institution.to_string()),
            year: Some(year),
            budget: Some(budget),
            igc: Some(igc),
        }
    }
}

/// The parsed file.
#[derive(Debug, Clone)]
pub struct RawTable {
    pub records: Vec<RawRecord>,
    pub delimiter: u8,
    /// Header names as they appeared in the file, for the columns we used.
    pub matched_headers: [String; 4],
}

// Column aliases after normalisation (lowercase, trimmed, no accents).
const INSTITUTION_ALIASES: &[&str] = &["universidade", "university", "institution", "instituicao", "ies"];
const YEAR_ALIASES: &[&str] = &["ano", "year"];
const BUDGET_ALIASES: &[&str] = &["orcamento(gnd 3+4)", "orcamento (gnd 3+4)", "orcamento", "budget"];
const IGC_ALIASES: &[&str] = &["igc (continuo)", "igc(continuo)", "igc continuo", "igc"];

/// Read and parse a CSV-like file from disk.
pub fn read_records(path: &Path) -> Result<RawTable> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    if ext == "xlsx" || ext == "xls" {
        return Err(MonitorError::DataValidation(format!(
            "{}: spreadsheet workbooks are not supported, export the sheet as CSV",
            path.display()
        )));
    }

    let bytes = fs::read(path)?;
    let table = parse_records(&bytes)?;
    let delimiter = table.delimiter as char;
    tracing::info!(
        path = %path.display(),
        rows = table.records.len(),
        %delimiter,
        columns = ?table.matched_headers,
        "input file parsed"
    );
    Ok(table)
}

/// Parse CSV-like bytes.
pub fn parse_records(bytes: &[u8]) -> Result<RawTable> {
    let text = decode(bytes);
    let text = text.trim_start_matches('\u{feff}');

    let header_line = text.lines().next().unwrap_or_default();
    if header_line.trim().is_empty() {
        return Err(MonitorError::DataValidation("input file is empty".into()));
    }
    let delimiter = sniff_delimiter(header_line);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
    let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();

    let find = |aliases: &[&str], what: &str| -> Result<usize> {
        aliases
            .iter()
            .find_map(|alias| normalized.iter().position(|h| h == alias))
            .ok_or_else(|| {
                MonitorError::DataValidation(format!(
                    "missing {what} column (looked for {}; found {})",
                    aliases.join(", "),
                    headers.join(", ")
                ))
            })
    };

    let inst_col = find(INSTITUTION_ALIASES, "institution")?;
    let year_col = find(YEAR_ALIASES, "year")?;
    let budget_col = find(BUDGET_ALIASES, "budget")?;
    let igc_col = find(IGC_ALIASES, "IGC")?;

    let mut records = Vec::new();
    for (idx, row) in reader.records().enumerate() {
        let row = row?;
        let cell = |col: usize| row.get(col).map(str::trim).filter(|s| !s.is_empty());

        if row.iter().all(|c| c.trim().is_empty()) {
            continue;
        }

        records.push(RawRecord {
            line: row.position().map_or(idx + 2, |p| p.line() as usize),
            institution: cell(inst_col).map(str::to_string),
            year: cell(year_col).and_then(parse_year),
            budget: cell(budget_col).and_then(parse_number),
            igc: cell(igc_col).and_then(parse_number),
        });
    }

    Ok(RawTable {
        records,
        delimiter,
        matched_headers: [
            headers[inst_col].clone(),
            headers[year_col].clone(),
            headers[budget_col].clone(),
            headers[igc_col].clone(),
        ],
    })
}

fn decode(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        // Latin-1 maps each byte straight onto the first 256 code points.
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

fn sniff_delimiter(header: &str) -> u8 {
    let commas = header.matches(',').count();
    let semis = header.matches(';').count();
    if semis > commas {
        b';'
    } else {
        b','
    }
}

/// Lowercase, trim, strip Portuguese accents, collapse inner whitespace.
pub fn normalize_header(raw: &str) -> String {
    let stripped: String = raw
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'ç' => 'c',
            other => other,
        })
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse a number written in either the "1,234.56" or the "1.234,56" style.
pub fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches("R$")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let commas = cleaned.matches(',').count();
    let dots = cleaned.matches('.').count();

    let canonical = match (commas, dots) {
        (0, 0) | (0, 1) => cleaned,
        (0, _) => cleaned.replace('.', ""),
        (1, 0) => cleaned.replace(',', "."),
        (_, 0) => cleaned.replace(',', ""),
        _ => {
            let last_comma = cleaned.rfind(',').unwrap_or(0);
            let last_dot = cleaned.rfind('.').unwrap_or(0);
            if last_comma > last_dot {
                cleaned.replace('.', "").replace(',', ".")
            } else {
                cleaned.replace(',', "")
            }
        }
    };

    canonical.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_year(raw: &str) -> Option<i32> {
    if let Ok(y) = raw.trim().parse::<i32>() {
        return Some(y);
    }
    // Spreadsheet exports sometimes write years as "2014.0".
    let value = parse_number(raw)?;
    if value.fract() == 0.0 && value.abs() < i32::MAX as f64 {
        Some(value as i32)
    } else {
        None
    }
}
