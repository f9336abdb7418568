//! JSON Lines export of batch records, one row per line.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::engine::arena::BatchRecord;
use crate::engine::error::ExportError;

/// Write `records` to `path`, creating parent directories as needed.
pub fn write_records(path: &Path, records: &[BatchRecord]) -> Result<(), ExportError> {
    let io_err = |source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }

    let mut out = BufWriter::new(File::create(path).map_err(io_err)?);
    for (i, record) in records.iter().enumerate() {
        serde_json::to_writer(&mut out, record).map_err(|source| ExportError::Json {
            path: path.to_path_buf(),
            line: i + 1,
            source,
        })?;
        out.write_all(b"\n").map_err(io_err)?;
    }
    out.flush().map_err(io_err)?;

    tracing::info!(path = %path.display(), rows = records.len(), "records written");
    Ok(())
}

/// Read a table written by [`write_records`]. Blank lines are skipped.
pub fn read_records(path: &Path) -> Result<Vec<BatchRecord>, ExportError> {
    let io_err = |source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    };

    let reader = BufReader::new(File::open(path).map_err(io_err)?);
    let mut records = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line.map_err(io_err)?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|source| ExportError::Json {
            path: path.to_path_buf(),
            line: i + 1,
            source,
        })?;
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::models::OutputRecord;

    fn sample(round: u32, player_id: usize) -> BatchRecord {
        BatchRecord {
            record: OutputRecord {
                round,
                player_id,
                strategy: "random".into(),
                endowment: 20.0,
                contribution: 13.0,
                kept_private: 7.0,
                pot_share_received: 10.4,
                round_gain_total: 17.4,
                cumulative_score: 17.4 * round as f64,
                group_total_pot: 13.0,
                group_synergy_factor: 1.6,
            },
            game_id: "mixed-1-0000".into(),
            scenario: "mixed".into(),
            n_players: 2,
            model_used: Some("gemma2".into()),
        }
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out/results.jsonl");
        let records = vec![sample(1, 0), sample(1, 1), sample(2, 0)];

        write_records(&path, &records).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 3);
        assert!(content.lines().all(|l| l.contains("\"game_id\":\"mixed-1-0000\"")));

        assert_eq!(read_records(&path).unwrap(), records);
    }

    #[test]
    fn test_bad_line_reports_position() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jsonl");
        let good = serde_json::to_string(&sample(1, 0)).unwrap();
        std::fs::write(&path, format!("{}\n\n{{not json}}\n", good)).unwrap();

        match read_records(&path) {
            Err(ExportError::Json { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected a JSON error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_file() {
        let err = read_records(Path::new("/nonexistent/results.jsonl")).unwrap_err();
        assert!(matches!(err, ExportError::Io { .. }));
    }
}
