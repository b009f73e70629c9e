mod common;

use common::{day, synthetic_prices};
use finstudy_core::{
    correlation::{
        correlation_matrix, pearson, rolling_correlation, rolling_correlation_multi, weakly_correlated,
        CorrelationMatrix, DEFAULT_WEAK_THRESHOLD,
    },
    error::AnalysisError,
    frame::PriceFrame,
};

#[test]
fn pearson_edge_cases() {
    assert!((pearson(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]) - 1.0).abs() < 1e-12);
    assert!((pearson(&[1.0, 2.0, 3.0], &[3.0, 2.0, 1.0]) + 1.0).abs() < 1e-12);
    assert!(pearson(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]).is_nan());
    assert!(pearson(&[1.0], &[1.0]).is_nan());
}

/// The matrix is symmetric with a unit diagonal.
#[test]
fn matrix_is_symmetric() {
    let returns = synthetic_prices(3, 300).pct_change();
    let m = correlation_matrix(&returns);
    assert_eq!(m.size(), 4);
    for i in 0..4 {
        assert!((m.values[i][i] - 1.0).abs() < 1e-12);
        for j in 0..4 {
            assert_eq!(m.values[i][j], m.values[j][i]);
            assert!(m.values[i][j].abs() <= 1.0);
        }
    }
    // GLD tracks SPY; AGG is independent.
    assert!(m.get("SPY", "GLD").unwrap() > m.get("SPY", "AGG").unwrap().abs());
}

#[test]
fn strongest_pair_skips_nan() {
    let m = CorrelationMatrix {
        labels: vec!["A".into(), "B".into(), "C".into()],
        values: vec![
            vec![1.0, f64::NAN, -0.8],
            vec![f64::NAN, 1.0, 0.3],
            vec![-0.8, 0.3, 1.0],
        ],
    };
    assert_eq!(m.strongest_pair(), Some(("A".to_string(), "C".to_string(), -0.8)));
}

#[test]
fn rolling_window_has_nan_prefix() {
    let index = (1..=6).map(|d| day(2024, 1, d)).collect();
    let rows = vec![
        vec![1.0, 2.0],
        vec![2.0, 4.0],
        vec![3.0, 7.0],
        vec![4.0, 8.0],
        vec![f64::NAN, 9.0],
        vec![6.0, 1.0],
    ];
    let frame = PriceFrame::new(index, vec!["BTC".into(), "SPY".into()], rows).unwrap();

    let r = rolling_correlation(&frame, "BTC", "SPY", 3).unwrap();
    assert_eq!(r.len(), 6);
    assert!(r[0].1.is_nan() && r[1].1.is_nan());
    assert!(r[2].1 > 0.9);
    assert_eq!(r[2].0, day(2024, 1, 3));
    // Windows touching the NaN row.
    assert!(r[4].1.is_nan() && r[5].1.is_nan());

    assert!(matches!(
        rolling_correlation(&frame, "BTC", "SPY", 1),
        Err(AnalysisError::InsufficientData(_))
    ));
    assert!(matches!(
        rolling_correlation(&frame, "BTC", "ETH", 3),
        Err(AnalysisError::UnknownColumn { .. })
    ));
}

#[test]
fn rolling_multi_names_columns_and_skips_missing_assets() {
    let returns = synthetic_prices(5, 80).pct_change();
    let compare = vec!["SPY".to_string(), "ETH".to_string(), "AGG".to_string()];
    let rolled = rolling_correlation_multi(&returns, "BTC", &compare, 10).unwrap().unwrap();
    assert_eq!(rolled.columns(), &["BTC_vs_SPY".to_string(), "BTC_vs_AGG".to_string()]);
    assert_eq!(rolled.len(), returns.len());

    let none = rolling_correlation_multi(&returns, "BTC", &["ETH".to_string()], 10).unwrap();
    assert!(none.is_none());
}

/// The base asset never reports itself as weakly correlated.
#[test]
fn weak_screen_excludes_base() {
    let m = CorrelationMatrix {
        labels: vec!["BTC".into(), "SPY".into(), "AGG".into()],
        values: vec![
            vec![1.0, 0.45, -0.05],
            vec![0.45, 1.0, 0.1],
            vec![-0.05, 0.1, 1.0],
        ],
    };
    let weak = weakly_correlated(&m, "BTC", DEFAULT_WEAK_THRESHOLD).unwrap();
    assert_eq!(weak, vec![("AGG".to_string(), -0.05)]);

    // A threshold above 1 still leaves out the diagonal.
    let all = weakly_correlated(&m, "BTC", 1.5).unwrap();
    assert_eq!(all.len(), 2);

    assert!(weakly_correlated(&m, "ETH", 0.2).is_err());
}
