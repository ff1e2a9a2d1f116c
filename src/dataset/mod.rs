//! Tabular datasets as opaque CSV bytes plus best-effort metadata.
//!
//! The execution sandbox and the cache treat a dataset as a byte blob so the
//! snapshot/revert guarantee stays byte-exact. Parsing happens only for the
//! read-only projections (column listing, row sample, preview) used by the
//! service's utility endpoints.

use serde::{Deserialize, Serialize};

/// How many data rows to look at when inferring a column's dtype.
const INFERENCE_SAMPLE_ROWS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub dtype: String,
}

impl Dataset {
    pub fn from_csv_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    fn text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }

    pub fn column_names(&self) -> Vec<String> {
        match self.text().lines().next() {
            Some(header) if !header.trim().is_empty() => split_csv_line(header),
            _ => Vec::new(),
        }
    }

    /// `(data_rows, columns)`, header excluded from the row count.
    pub fn shape(&self) -> (usize, usize) {
        let text = self.text();
        let mut lines = text.lines().filter(|l| !l.trim().is_empty());
        let cols = match lines.next() {
            Some(header) => split_csv_line(header).len(),
            None => return (0, 0),
        };
        (lines.count(), cols)
    }

    /// Column names with dtypes inferred over a bounded row sample.
    pub fn column_info(&self) -> Vec<ColumnInfo> {
        let names = self.column_names();
        if names.is_empty() {
            return Vec::new();
        }
        let rows = self.row_sample(INFERENCE_SAMPLE_ROWS);
        names
            .into_iter()
            .enumerate()
            .map(|(i, name)| {
                let values: Vec<&str> = rows
                    .iter()
                    .filter_map(|r| r.get(i).map(|s| s.as_str()))
                    .collect();
                ColumnInfo {
                    name,
                    dtype: infer_dtype(&values).to_string(),
                }
            })
            .collect()
    }

    /// Up to `n` parsed data rows, in file order.
    pub fn row_sample(&self, n: usize) -> Vec<Vec<String>> {
        self.text()
            .lines()
            .filter(|l| !l.trim().is_empty())
            .skip(1)
            .take(n)
            .map(split_csv_line)
            .collect()
    }

    /// Aligned textual table of the first `n` data rows.
    pub fn preview(&self, n: usize) -> String {
        let names = self.column_names();
        if names.is_empty() {
            return String::new();
        }
        let rows = self.row_sample(n);
        let mut widths: Vec<usize> = names.iter().map(|s| s.len()).collect();
        for row in &rows {
            for (i, cell) in row.iter().enumerate() {
                if i < widths.len() && cell.len() > widths[i] {
                    widths[i] = cell.len();
                }
            }
        }
        let render = |cells: &[String]| {
            cells
                .iter()
                .enumerate()
                .map(|(i, c)| format!("{:<w$}", c, w = widths.get(i).copied().unwrap_or(0)))
                .collect::<Vec<_>>()
                .join("  ")
        };
        let mut out = render(&names);
        for row in &rows {
            out.push('\n');
            out.push_str(&render(row));
        }
        out
    }
}

/// Split one CSV line honoring double-quoted fields and `""` escapes.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut field));
            }
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}

fn infer_dtype(values: &[&str]) -> &'static str {
    let non_empty: Vec<&str> = values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .collect();
    if non_empty.is_empty() {
        return "object";
    }
    if non_empty.iter().all(|v| v.parse::<i64>().is_ok()) {
        return "int64";
    }
    if non_empty.iter().all(|v| v.parse::<f64>().is_ok()) {
        return "float64";
    }
    if non_empty
        .iter()
        .all(|v| v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("false"))
    {
        return "bool";
    }
    "object"
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Dataset {
        Dataset::from_csv_bytes(
            b"name,age,score,active\nalice,30,9.5,true\nbob,25,7.25,false\n".to_vec(),
        )
    }

    #[test]
    fn columns_and_shape() {
        let ds = sample();
        assert_eq!(ds.column_names(), vec!["name", "age", "score", "active"]);
        assert_eq!(ds.shape(), (2, 4));
    }

    #[test]
    fn dtype_inference() {
        let info = sample().column_info();
        let dtypes: Vec<&str> = info.iter().map(|c| c.dtype.as_str()).collect();
        assert_eq!(dtypes, vec!["object", "int64", "float64", "bool"]);
    }

    #[test]
    fn quoted_fields_survive_commas() {
        let ds = Dataset::from_csv_bytes(b"a,b\n\"x, y\",\"he said \"\"hi\"\"\"\n".to_vec());
        let rows = ds.row_sample(10);
        assert_eq!(rows, vec![vec!["x, y".to_string(), "he said \"hi\"".to_string()]]);
    }

    #[test]
    fn preview_is_aligned_and_bounded() {
        let ds = sample();
        let p = ds.preview(1);
        assert_eq!(p.lines().count(), 2);
        assert!(p.lines().next().unwrap().starts_with("name"));
    }

    #[test]
    fn empty_dataset_has_no_columns() {
        let ds = Dataset::from_csv_bytes(Vec::new());
        assert!(ds.column_names().is_empty());
        assert_eq!(ds.shape(), (0, 0));
        assert!(ds.preview(5).is_empty());
    }

    #[test]
    fn byte_identity_round_trip() {
        let bytes = b"a,b\n1,2\n".to_vec();
        let ds = Dataset::from_csv_bytes(bytes.clone());
        assert_eq!(ds.clone().into_bytes(), bytes);
    }
}
