//! Feature table: one labelled row per sample or frame group

use crate::core::errors::StegError;
use crate::core::models::{FeatureMap, Label};
use crate::Result;
use ndarray::{Array1, Array2};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const ID_COLUMN: &str = "file_name";
pub const CLASS_COLUMN: &str = "class";

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub id: String,
    /// Values aligned with the table columns; shorter than the column list when
    /// later rows introduced new columns, `None` where the row lacks a feature
    pub values: Vec<Option<f64>>,
    pub label: Label,
}

impl FeatureRow {
    pub fn value(&self, column: usize) -> Option<f64> {
        self.values.get(column).copied().flatten()
    }
}

/// Rectangular feature table whose columns are the union of the feature names
/// of all rows, in order of first appearance.
#[derive(Debug, Clone, Default)]
pub struct FeatureTable {
    columns: Vec<String>,
    index: HashMap<String, usize>,
    rows: Vec<FeatureRow>,
    source: Option<PathBuf>,
}

impl FeatureTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_row(&mut self, id: impl Into<String>, features: &FeatureMap, label: Label) {
        let mut values = vec![None; self.columns.len()];
        for (name, value) in features.iter() {
            let column = match self.index.get(name) {
                Some(&column) => column,
                None => {
                    self.columns.push(name.to_string());
                    self.index.insert(name.to_string(), self.columns.len() - 1);
                    values.push(None);
                    self.columns.len() - 1
                }
            };
            values[column] = Some(value);
        }

        self.rows.push(FeatureRow {
            id: id.into(),
            values,
            label,
        });
    }

    /// Feature column names (without the id and class columns)
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn count_label(&self, label: Label) -> usize {
        self.rows.iter().filter(|row| row.label == label).count()
    }

    /// Write `file_name, <features...>, class`; absent values become empty fields
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;

        let mut header = Vec::with_capacity(self.columns.len() + 2);
        header.push(ID_COLUMN);
        header.extend(self.columns.iter().map(String::as_str));
        header.push(CLASS_COLUMN);
        writer.write_record(&header)?;

        for row in &self.rows {
            let mut record = Vec::with_capacity(header.len());
            record.push(row.id.clone());
            for column in 0..self.columns.len() {
                record.push(row.value(column).map(|v| v.to_string()).unwrap_or_default());
            }
            record.push(row.label.class_value().to_string());
            writer.write_record(&record)?;
        }

        writer.flush()?;
        debug!("Wrote {} rows x {} features to {}", self.rows.len(), self.columns.len(), path.display());
        Ok(())
    }

    /// Read a table written by `write_csv`; fails fast when the id or class column is missing
    pub fn read_csv(path: &Path) -> Result<Self> {
        let malformed = |message: String| StegError::MalformedTrainingData {
            path: path.to_path_buf(),
            message,
        };

        let mut reader = csv::Reader::from_path(path).map_err(|e| malformed(e.to_string()))?;
        let headers = reader.headers().map_err(|e| malformed(e.to_string()))?.clone();

        let id_pos = headers
            .iter()
            .position(|h| h == ID_COLUMN)
            .ok_or_else(|| malformed(format!("missing '{}' column", ID_COLUMN)))?;
        let class_pos = headers
            .iter()
            .position(|h| h == CLASS_COLUMN)
            .ok_or_else(|| malformed(format!("missing '{}' column", CLASS_COLUMN)))?;

        let feature_positions: Vec<usize> = (0..headers.len()).filter(|&i| i != id_pos && i != class_pos).collect();

        let mut table = FeatureTable::new();
        for &pos in &feature_positions {
            let name = headers[pos].to_string();
            if table.index.contains_key(&name) {
                return Err(malformed(format!("duplicate column '{}'", name)));
            }
            table.index.insert(name.clone(), table.columns.len());
            table.columns.push(name);
        }

        for (line, record) in reader.records().enumerate() {
            let record = record.map_err(|e| malformed(e.to_string()))?;
            let row_number = line + 2;

            let id = record
                .get(id_pos)
                .ok_or_else(|| malformed(format!("row {} has no file name", row_number)))?
                .to_string();
            let class = record.get(class_pos).unwrap_or("").trim();
            let label = class
                .parse::<u8>()
                .ok()
                .and_then(Label::from_class_value)
                .ok_or_else(|| malformed(format!("row {} has invalid class '{}'", row_number, class)))?;

            let mut values = Vec::with_capacity(feature_positions.len());
            for &pos in &feature_positions {
                let field = record.get(pos).unwrap_or("").trim();
                if field.is_empty() {
                    values.push(None);
                } else {
                    let value = field.parse::<f64>().map_err(|_| {
                        malformed(format!("row {} column '{}' is not numeric: '{}'", row_number, &headers[pos], field))
                    })?;
                    values.push(Some(value));
                }
            }

            table.rows.push(FeatureRow { id, values, label });
        }

        table.source = Some(path.to_path_buf());
        debug!("Read {} rows x {} features from {}", table.len(), table.columns.len(), path.display());
        Ok(table)
    }

    /// Dense design matrix and stego-label vector; absent values are an error
    pub fn design_matrix(&self) -> Result<(Array2<f64>, Array1<bool>)> {
        let malformed = |message: String| StegError::MalformedTrainingData {
            path: self.source.clone().unwrap_or_default(),
            message,
        };

        if self.rows.is_empty() || self.columns.is_empty() {
            return Err(malformed("table has no rows or no feature columns".to_string()));
        }

        let width = self.columns.len();
        let mut data = Vec::with_capacity(self.rows.len() * width);
        for row in &self.rows {
            for column in 0..width {
                let value = row.value(column).ok_or_else(|| {
                    malformed(format!("row '{}' has no value for '{}'", row.id, self.columns[column]))
                })?;
                data.push(value);
            }
        }

        let x = Array2::from_shape_vec((self.rows.len(), width), data)
            .map_err(|e| malformed(format!("cannot shape design matrix: {}", e)))?;
        let y = self.rows.iter().map(|row| row.label.is_stego()).collect::<Array1<bool>>();
        Ok((x, y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(pairs: &[(&str, f64)]) -> FeatureMap {
        pairs.iter().map(|(n, v)| (n.to_string(), *v)).collect()
    }

    #[test]
    fn test_columns_are_union_in_first_seen_order() {
        let mut table = FeatureTable::new();
        table.push_row("a.png", &features(&[("f1", 1.0), ("f2", 2.0)]), Label::Stego);
        table.push_row("b.png", &features(&[("f3", 3.0), ("f1", 4.0)]), Label::Clean);

        assert_eq!(table.columns(), &["f1", "f2", "f3"]);
        assert_eq!(table.rows()[0].value(2), None);
        assert_eq!(table.rows()[1].value(0), Some(4.0));
        assert_eq!(table.rows()[1].value(1), None);
        assert_eq!(table.count_label(Label::Stego), 1);
    }

    #[test]
    fn test_csv_round_trip_keeps_columns_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("img-features.csv");

        let mut table = FeatureTable::new();
        table.push_row("a.png", &features(&[("f1", 0.25), ("f2", -1.5)]), Label::Stego);
        table.push_row("b.png", &features(&[("f1", 3.0)]), Label::Clean);
        table.write_csv(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("file_name,f1,f2,class\n"));
        assert!(text.contains("b.png,3,,0"));

        let back = FeatureTable::read_csv(&path).unwrap();
        assert_eq!(back.columns(), table.columns());
        assert_eq!(back.len(), 2);
        assert_eq!(back.rows()[0].value(1), Some(-1.5));
        assert_eq!(back.rows()[1].value(1), None);
        assert_eq!(back.rows()[1].label, Label::Clean);
    }

    #[test]
    fn test_read_rejects_missing_class_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "file_name,f1\na.png,1.0\n").unwrap();

        let err = FeatureTable::read_csv(&path).unwrap_err();
        assert!(matches!(err, StegError::MalformedTrainingData { .. }));
        assert!(err.to_string().contains("class"));
    }

    #[test]
    fn test_read_rejects_bad_class_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "file_name,f1,class\na.png,1.0,2\n").unwrap();

        assert!(matches!(
            FeatureTable::read_csv(&path),
            Err(StegError::MalformedTrainingData { .. })
        ));
    }

    #[test]
    fn test_design_matrix() {
        let mut table = FeatureTable::new();
        table.push_row("a", &features(&[("f1", 1.0), ("f2", 2.0)]), Label::Stego);
        table.push_row("b", &features(&[("f1", 3.0), ("f2", 4.0)]), Label::Clean);

        let (x, y) = table.design_matrix().unwrap();
        assert_eq!(x.shape(), &[2, 2]);
        assert_eq!(x[[1, 0]], 3.0);
        assert_eq!(y.to_vec(), vec![true, false]);
    }

    #[test]
    fn test_design_matrix_rejects_sparse_rows() {
        let mut table = FeatureTable::new();
        table.push_row("a", &features(&[("f1", 1.0)]), Label::Stego);
        table.push_row("b", &features(&[("f2", 4.0)]), Label::Clean);

        assert!(table.design_matrix().is_err());
        assert!(FeatureTable::new().design_matrix().is_err());
    }
}
