//! Results table written after an inference run

use crate::core::models::ClassificationRow;
use crate::Result;
use std::path::Path;
use tracing::debug;

pub const RESULT_HEADERS: [&str; 3] = ["File name", "SVM Classification", "LR Classification"];

/// Per-file predictions with 1-based row numbers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassificationTable {
    rows: Vec<ClassificationRow>,
}

impl ClassificationTable {
    pub fn from_rows(rows: Vec<ClassificationRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[ClassificationRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// `(row number, cells)` for display
    pub fn records(&self) -> impl Iterator<Item = (usize, [String; 3])> + '_ {
        self.rows.iter().enumerate().map(|(i, row)| {
            (
                i + 1,
                [row.file_name.clone(), row.svm.to_string(), row.lr.to_string()],
            )
        })
    }

    /// Header row starts with an unnamed index column
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;

        writer.write_record(std::iter::once("").chain(RESULT_HEADERS))?;
        for (number, cells) in self.records() {
            writer.write_record(std::iter::once(number.to_string()).chain(cells))?;
        }

        writer.flush()?;
        debug!("Wrote {} classifications to {}", self.rows.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::Label;

    #[test]
    fn test_write_csv_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("classifications.csv");
        let table = ClassificationTable::from_rows(vec![
            ClassificationRow {
                file_name: "cat.jpg".to_string(),
                svm: Label::Clean,
                lr: Label::Clean,
            },
            ClassificationRow {
                file_name: "clip.mp4".to_string(),
                svm: Label::Stego,
                lr: Label::Clean,
            },
        ]);
        table.write_csv(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                ",File name,SVM Classification,LR Classification",
                "1,cat.jpg,clean,clean",
                "2,clip.mp4,stego,clean",
            ]
        );
    }

    #[test]
    fn test_empty_table_still_has_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        ClassificationTable::default().write_csv(&path).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap().trim(),
            ",File name,SVM Classification,LR Classification"
        );
    }
}
