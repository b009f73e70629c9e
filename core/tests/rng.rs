use finstudy_core::rng::{RngBank, StageRng, StageSlot};

#[test]
fn shuffle_is_a_seeded_permutation() {
    let mut a: Vec<usize> = (0..50).collect();
    let mut b: Vec<usize> = (0..50).collect();
    StageRng::new(11, 10).shuffle(&mut a);
    StageRng::new(11, 10).shuffle(&mut b);
    assert_eq!(a, b, "same seed must give the same order");
    assert_ne!(a, (0..50).collect::<Vec<_>>());

    let mut sorted = a.clone();
    sorted.sort_unstable();
    assert_eq!(sorted, (0..50).collect::<Vec<_>>());
}

/// Every position of a 3-element shuffle should be roughly uniform.
#[test]
fn shuffle_spreads_evenly() {
    let mut rng = StageRng::new(3, 0);
    let mut first = [0usize; 3];
    let trials = 30_000;
    for _ in 0..trials {
        let mut items = [0usize, 1, 2];
        rng.shuffle(&mut items);
        first[items[0]] += 1;
    }
    for count in first {
        let share = count as f64 / trials as f64;
        assert!((share - 1.0 / 3.0).abs() < 0.02, "share {share}");
    }
}

#[test]
fn normal_draws_have_unit_moments() {
    let mut rng = StageRng::new(42, 1);
    let n = 20_000;
    let draws: Vec<f64> = (0..n).map(|_| rng.normal()).collect();
    let mean = draws.iter().sum::<f64>() / n as f64;
    let var = draws.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    assert!(mean.abs() < 0.05, "mean {mean}");
    assert!((var - 1.0).abs() < 0.05, "variance {var}");
}

#[test]
fn stage_streams_are_independent_and_stable() {
    let bank = RngBank::new(2024);
    let mut var = bank.for_stage(StageSlot::Var);
    let mut lstm = bank.for_stage(StageSlot::Lstm);
    assert_eq!(lstm.name, "lstm");
    assert_ne!(var.next_f64(), lstm.next_f64());

    let mut again = RngBank::new(2024).for_stage(StageSlot::Lstm);
    let mut fresh = bank.for_stage(StageSlot::Lstm);
    assert_eq!(again.uniform(-1.0, 1.0), fresh.uniform(-1.0, 1.0));
}
