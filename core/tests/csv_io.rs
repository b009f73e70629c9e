mod common;

use common::day;
use finstudy_core::{csv_io, error::AnalysisError, frame::PriceFrame};
use std::fs;

#[test]
fn frame_survives_a_write_and_read() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("prices.csv");
    let frame = PriceFrame::new(
        vec![day(2024, 3, 1), day(2024, 3, 4)],
        vec!["SPY".into(), "BTC".into()],
        vec![vec![510.25, 62_000.5], vec![f64::NAN, 63_100.0]],
    )
    .unwrap();

    csv_io::write_frame(&path, &frame).unwrap();
    let loaded = csv_io::read_frame(&path).unwrap();

    assert_eq!(loaded.index(), frame.index());
    assert_eq!(loaded.columns(), frame.columns());
    assert_eq!(loaded.rows()[0], vec![510.25, 62_000.5]);
    assert!(loaded.rows()[1][0].is_nan());
}

/// Rows come back sorted and timestamps are cut to the day.
#[test]
fn read_sorts_rows_and_accepts_timestamps() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("raw.csv");
    fs::write(
        &path,
        "Date,BTC\n2024-01-03 00:00:00,3\n2024-01-01T00:00:00,1\n2024-01-02,\n",
    )
    .unwrap();

    let frame = csv_io::read_frame(&path).unwrap();
    assert_eq!(frame.index(), &[day(2024, 1, 1), day(2024, 1, 2), day(2024, 1, 3)]);
    let btc = frame.column("BTC").unwrap();
    assert_eq!(btc[0], 1.0);
    assert!(btc[1].is_nan());
    assert_eq!(btc[2], 3.0);
}

#[test]
fn read_rejects_bad_cells() {
    let dir = tempfile::tempdir().unwrap();

    let path = dir.path().join("bad_number.csv");
    fs::write(&path, "Date,SPY\n2024-01-01,abc\n").unwrap();
    let err = csv_io::read_frame(&path).unwrap_err();
    assert!(matches!(err, AnalysisError::InvalidNumber { ref column, .. } if column == "SPY"));

    let path = dir.path().join("bad_date.csv");
    fs::write(&path, "Date,SPY\n01/02/2024,1\n").unwrap();
    assert!(matches!(csv_io::read_frame(&path), Err(AnalysisError::InvalidDate { .. })));

    let path = dir.path().join("no_values.csv");
    fs::write(&path, "Date\n2024-01-01\n").unwrap();
    assert!(matches!(csv_io::read_frame(&path), Err(AnalysisError::InsufficientData(_))));
}

#[test]
fn matrix_and_tables_are_written_with_headers() {
    let dir = tempfile::tempdir().unwrap();
    let labels = vec!["BTC".to_string(), "SPY".to_string()];

    let path = dir.path().join("matrix.csv");
    csv_io::write_matrix(&path, &labels, &[vec![1.0, 0.5], vec![0.5, 1.0]]).unwrap();
    let text = fs::read_to_string(&path).unwrap();
    assert_eq!(text.lines().next(), Some(",BTC,SPY"));
    assert_eq!(text.lines().nth(1), Some("BTC,1,0.5"));

    let path = dir.path().join("table.csv");
    csv_io::write_table(&path, &["asset", "correlation"], &[vec!["AGG".into(), "0.1".into()]]).unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), "asset,correlation\nAGG,0.1\n");

    let err = csv_io::write_rows(&dir.path().join("rows.csv"), &labels, &[vec![1.0]]).unwrap_err();
    assert!(matches!(err, AnalysisError::ShapeMismatch { expected: 2, actual: 1 }));
}
