use finstudy_core::{
    config::LstmSection,
    error::AnalysisError,
    lstm::{extract_features, feature_correlation, train, AssetRelationshipModel, LstmConfig, WindowDataset},
    rng::StageRng,
};

/// Two phase-shifted waves scaled into [0, 1].
fn waves(n: usize) -> Vec<Vec<f64>> {
    (0..n)
        .map(|t| {
            let x = t as f64 / 5.0;
            vec![(x.sin() + 1.0) / 2.0, (x.cos() + 1.0) / 2.0]
        })
        .collect()
}

fn small_config(epochs: usize) -> LstmConfig {
    let section = LstmSection {
        hidden_size:   8,
        num_layers:    2,
        seq_length:    5,
        batch_size:    16,
        epochs,
        learning_rate: 1e-2,
    };
    LstmConfig::for_width(&section, 2)
}

#[test]
fn dataset_windows() {
    let ds = WindowDataset::new(waves(20), 5).unwrap();
    assert_eq!(ds.len(), 15);
    assert_eq!(ds.width(), 2);
    let (window, target) = ds.item(3);
    assert_eq!(window.len(), 5);
    assert_eq!(window[0], waves(20)[3]);
    assert_eq!(target, waves(20)[8].as_slice());
}

#[test]
fn dataset_rejects_bad_input() {
    assert!(matches!(WindowDataset::new(waves(5), 5), Err(AnalysisError::InsufficientData(_))));
    assert!(WindowDataset::new(waves(10), 0).is_err());
    let mut ragged = waves(10);
    ragged[4].pop();
    assert!(matches!(WindowDataset::new(ragged, 3), Err(AnalysisError::ShapeMismatch { .. })));
    let mut holes = waves(10);
    holes[2][1] = f64::NAN;
    assert!(WindowDataset::new(holes, 3).is_err());
}

/// Same seed, same weights, same shuffles, same losses.
#[test]
fn training_is_deterministic() {
    let ds = WindowDataset::new(waves(120), 5).unwrap();
    let config = small_config(3);
    let run = || {
        let mut rng = StageRng::new(7, 10);
        let mut model = AssetRelationshipModel::new(&config, &mut rng).unwrap();
        train(&mut model, &ds, &config, &mut rng).unwrap()
    };
    let first = run();
    assert_eq!(first.len(), 3);
    assert_eq!(first, run());
}

#[test]
fn loss_decreases_on_a_smooth_signal() {
    let ds = WindowDataset::new(waves(200), 5).unwrap();
    let config = small_config(30);
    let mut rng = StageRng::new(3, 10);
    let mut model = AssetRelationshipModel::new(&config, &mut rng).unwrap();
    let history = train(&mut model, &ds, &config, &mut rng).unwrap();
    assert!(history.iter().all(|l| l.is_finite()));
    assert!(history[29] < history[0], "loss went from {} to {}", history[0], history[29]);
}

#[test]
fn features_have_one_row_per_window() {
    let ds = WindowDataset::new(waves(60), 5).unwrap();
    let config = small_config(2);
    let mut rng = StageRng::new(5, 10);
    let mut model = AssetRelationshipModel::new(&config, &mut rng).unwrap();
    train(&mut model, &ds, &config, &mut rng).unwrap();

    let features = extract_features(&model, &ds);
    assert_eq!(features.len(), ds.len());
    assert!(features.iter().all(|r| r.len() == 2));

    let labels = vec!["BTC".to_string(), "SPY".to_string()];
    let corr = feature_correlation(&features, &labels).unwrap();
    assert_eq!(corr.labels, labels);
    assert!((corr.values[0][0] - 1.0).abs() < 1e-9);

    assert!(feature_correlation(&features, &labels[..1]).is_err());
}

#[test]
fn model_rejects_mismatched_data() {
    let mut rng = StageRng::new(1, 10);
    let mut config = small_config(1);
    let mut model = AssetRelationshipModel::new(&config, &mut rng).unwrap();
    let ds = WindowDataset::new(vec![vec![0.1, 0.2, 0.3]; 12], 5).unwrap();
    assert!(train(&mut model, &ds, &config, &mut rng).is_err());

    config.hidden_size = 0;
    assert!(AssetRelationshipModel::new(&config, &mut rng).is_err());
}
