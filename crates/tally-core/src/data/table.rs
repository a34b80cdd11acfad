//! String-typed CSV table. Every cell stays a string so identifiers such as
//! `01234` keep their leading zeros; blank cells are treated as missing.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl Table {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        let width = headers.len();
        let rows = rows
            .into_iter()
            .map(|mut r| {
                r.resize(width, None);
                r
            })
            .collect();
        Self { headers, rows }
    }

    pub fn from_path(path: &Path) -> Result<Self, csv::Error> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, csv::Error> {
        let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
        let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.trim().to_string()).collect();
        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record?;
            let row = record
                .iter()
                .map(|cell| {
                    let cell = cell.trim();
                    (!cell.is_empty()).then(|| cell.to_string())
                })
                .collect();
            rows.push(row);
        }
        Ok(Self::new(headers, rows))
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<Option<String>>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)?.as_deref()
    }

    pub fn set(&mut self, row: usize, column: &str, value: Option<String>) {
        if let Some(idx) = self.column_index(column) {
            if let Some(cell) = self.rows.get_mut(row).and_then(|r| r.get_mut(idx)) {
                *cell = value;
            }
        }
    }

    /// Values of one column, `None` for missing cells.
    pub fn column(&self, name: &str) -> Vec<Option<&str>> {
        match self.column_index(name) {
            Some(idx) => self
                .rows
                .iter()
                .map(|r| r.get(idx).and_then(|c| c.as_deref()))
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn missing_by_column(&self) -> BTreeMap<String, usize> {
        self.headers
            .iter()
            .enumerate()
            .map(|(idx, h)| {
                let missing = self
                    .rows
                    .iter()
                    .filter(|r| r.get(idx).map_or(true, Option::is_none))
                    .count();
                (h.clone(), missing)
            })
            .collect()
    }

    /// Row as a header → value map, skipping missing cells.
    pub fn row_map(&self, row: usize) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        if let Some(r) = self.rows.get(row) {
            for (h, cell) in self.headers.iter().zip(r) {
                if let Some(v) = cell {
                    out.insert(h.clone(), v.clone());
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_cells_as_strings_and_blanks_as_missing() {
        let csv = "Invoice, Work Order Number ,Total\n1001,01234,$10.00\n1002,,5\n";
        let t = Table::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(t.headers(), &["Invoice", "Work Order Number", "Total"]);
        assert_eq!(t.value(0, "Work Order Number"), Some("01234"));
        assert_eq!(t.value(1, "Work Order Number"), None);
        assert_eq!(t.missing_by_column()["Work Order Number"], 1);
        assert_eq!(t.missing_by_column()["Total"], 0);
    }

    #[test]
    fn short_rows_are_padded() {
        let csv = "a,b,c\n1\n";
        let t = Table::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(t.rows()[0].len(), 3);
        assert_eq!(t.value(0, "c"), None);
        assert_eq!(t.row_map(0).len(), 1);
    }
}
