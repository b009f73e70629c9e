use finstudy_core::{
    error::AnalysisError,
    rng::StageRng,
    stationarity::{adf_test, check_stationarity, mackinnon_crit, mackinnon_p},
};

fn noise(seed: u64, n: usize) -> Vec<f64> {
    let mut rng = StageRng::new(seed, 0);
    (0..n).map(|_| rng.normal()).collect()
}

#[test]
fn white_noise_is_stationary() {
    let report = check_stationarity(&noise(1, 500), "noise", 0.05).unwrap();
    assert!(report.stationary);
    assert!(report.adf.statistic < -4.0);
    assert!(report.adf.p_value < 0.01);
    assert_eq!(report.series, "noise");
}

/// An explosive AR(1) has a positive ADF statistic.
#[test]
fn explosive_series_is_not_stationary() {
    let e = noise(2, 300);
    let mut y = Vec::with_capacity(e.len());
    let mut level = 50.0;
    for shock in e {
        level = 1.01 * level + shock;
        y.push(level);
    }
    let report = check_stationarity(&y, "explosive", 0.05).unwrap();
    assert!(!report.stationary);
    assert!(report.adf.p_value > 0.5);
}

#[test]
fn explicit_max_lag_bounds_the_search() {
    let result = adf_test(&noise(3, 200), Some(2)).unwrap();
    assert!(result.used_lag <= 2);
    assert_eq!(result.nobs, 199 - result.used_lag);
    assert_eq!(result.critical_values.len(), 3);
}

#[test]
fn mackinnon_surfaces() {
    let p5 = mackinnon_p(-2.86).unwrap();
    assert!(p5 > 0.04 && p5 < 0.06, "p at -2.86 was {p5}");
    let p1 = mackinnon_p(-3.43).unwrap();
    assert!((p1 - 0.01).abs() < 0.003, "p at -3.43 was {p1}");
    assert_eq!(mackinnon_p(5.0).unwrap(), 1.0);
    assert_eq!(mackinnon_p(-25.0).unwrap(), 0.0);

    let crit = mackinnon_crit(100);
    assert_eq!(crit[0].0, "1%");
    assert!((crit[0].1 + 3.4975).abs() < 1e-3);
    assert!(crit[0].1 < crit[1].1 && crit[1].1 < crit[2].1);
}

#[test]
fn short_or_missing_input_errors() {
    assert!(matches!(adf_test(&[1.0, 2.0, 3.0], None), Err(AnalysisError::InsufficientData(_))));
    assert!(adf_test(&[1.0, f64::NAN, 2.0, 3.0, 1.0, 2.0], None).is_err());
}

/// With no augmentation lags the ADF statistic is the slope t-value of
/// Δy_t on [1, y_{t-1}], which has a closed form.
#[test]
fn adf_without_lags_matches_hand_regression() {
    let mut level = 10.0;
    let y: Vec<f64> = noise(4, 150)
        .into_iter()
        .map(|e| {
            level = 0.9 * level + e;
            level
        })
        .collect();

    let x: Vec<f64> = y[..y.len() - 1].to_vec();
    let dy: Vec<f64> = y.windows(2).map(|w| w[1] - w[0]).collect();
    let m = x.len() as f64;
    let (mx, my) = (x.iter().sum::<f64>() / m, dy.iter().sum::<f64>() / m);
    let sxx: f64 = x.iter().map(|v| (v - mx).powi(2)).sum();
    let sxy: f64 = x.iter().zip(&dy).map(|(a, b)| (a - mx) * (b - my)).sum();
    let slope = sxy / sxx;
    let intercept = my - slope * mx;
    let ssr: f64 = x.iter().zip(&dy).map(|(a, b)| (b - intercept - slope * a).powi(2)).sum();
    let t = slope / (ssr / (m - 2.0) / sxx).sqrt();

    let result = adf_test(&y, Some(0)).unwrap();
    assert_eq!(result.used_lag, 0);
    assert_eq!(result.nobs, 149);
    assert!((result.statistic - t).abs() < 1e-9, "{} vs {t}", result.statistic);
    assert_eq!(result.p_value, mackinnon_p(result.statistic).unwrap());
}
