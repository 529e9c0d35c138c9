//! Range-cut reduction of CSV shards.

use crate::{failed, persist, staged_writer};
use railyard_libs::{RangeCut, Reducer, Result, Selection};
use std::path::Path;
use tracing::info;

const NAME: &str = "CutReducer";

/// Keeps the rows where every cut column satisfies `min <= value < max`.
///
/// Rows whose cut column is empty or not a number are dropped. The output
/// file is only created once every row has been read.
#[derive(Debug, Clone)]
pub struct CutReducer {
    selection: String,
    cuts: Vec<RangeCut>,
}

impl CutReducer {
    pub fn new(selection: &Selection) -> Result<Self> {
        Ok(Self {
            selection: selection.name.clone(),
            cuts: selection.range_cuts()?,
        })
    }
}

pub fn make_cut_reducer(selection: &Selection) -> Result<Box<dyn Reducer>> {
    Ok(Box::new(CutReducer::new(selection)?))
}

impl Reducer for CutReducer {
    fn reduce(&self, input: &Path, output: &Path) -> Result<()> {
        let mut reader = csv::Reader::from_path(input).map_err(|e| failed(NAME, e))?;
        let headers = reader.headers().map_err(|e| failed(NAME, e))?.clone();

        let mut columns = Vec::with_capacity(self.cuts.len());
        for cut in &self.cuts {
            let index = headers.iter().position(|h| h == cut.column).ok_or_else(|| {
                failed(
                    NAME,
                    format!("column '{}' not found in {:?}", cut.column, input),
                )
            })?;
            columns.push((index, cut));
        }

        let mut writer = staged_writer(NAME, output)?;
        writer.write_record(&headers).map_err(|e| failed(NAME, e))?;

        let (mut kept, mut total) = (0usize, 0usize);
        for record in reader.records() {
            let record = record.map_err(|e| failed(NAME, e))?;
            total += 1;
            let passes = columns.iter().all(|(index, cut)| {
                record
                    .get(*index)
                    .and_then(|v| v.trim().parse::<f64>().ok())
                    .is_some_and(|v| cut.accepts(v))
            });
            if passes {
                writer.write_record(&record).map_err(|e| failed(NAME, e))?;
                kept += 1;
            }
        }
        persist(NAME, writer, output)?;

        info!(
            "Selection {} kept {} of {} objects from {:?}",
            self.selection, kept, total, input
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use railyard_libs::{AppError, Configurable};
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn gold() -> Selection {
        Selection::from_dict(&json!({"name": "gold", "cuts": {"maglim_i": [null, 25.5], "redshift": [0.1, null]}}))
            .unwrap()
    }

    #[test]
    fn test_reduce_applies_every_cut() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("in.csv");
        let output = temp_dir.path().join("out.csv");
        fs::write(
            &input,
            "id,maglim_i,redshift\n1,24.0,0.5\n2,25.5,0.5\n3,23.0,0.05\n4,,0.3\n5,22.1,1.2\n",
        )
        .unwrap();

        CutReducer::new(&gold()).unwrap().reduce(&input, &output).unwrap();
        assert_eq!(
            fs::read_to_string(&output).unwrap(),
            "id,maglim_i,redshift\n1,24.0,0.5\n5,22.1,1.2\n"
        );
    }

    #[test]
    fn test_missing_column() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("in.csv");
        fs::write(&input, "id,mag_r\n1,20.0\n").unwrap();

        let err = CutReducer::new(&gold())
            .unwrap()
            .reduce(&input, &temp_dir.path().join("out.csv"))
            .unwrap_err();
        match err {
            AppError::AlgorithmFailed { algorithm, message } => {
                assert_eq!(algorithm, "CutReducer");
                assert!(message.contains("maglim_i"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_malformed_row_leaves_no_output() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("in.csv");
        let output = temp_dir.path().join("out.csv");
        fs::write(&input, "id,maglim_i,redshift\n1,24.0,0.5\n2,23.0,0.6\n3,22.0,0.7,extra\n4,21.0,0.8\n")
            .unwrap();

        let result = CutReducer::new(&gold()).unwrap().reduce(&input, &output);
        assert!(matches!(result, Err(AppError::AlgorithmFailed { .. })));
        assert!(!output.exists());
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_missing_input_file() {
        let temp_dir = TempDir::new().unwrap();
        let result = CutReducer::new(&gold())
            .unwrap()
            .reduce(&temp_dir.path().join("nope.csv"), &temp_dir.path().join("out.csv"));
        assert!(matches!(result, Err(AppError::AlgorithmFailed { .. })));
    }
}
