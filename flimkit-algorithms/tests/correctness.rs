#![allow(clippy::uninlined_format_args, clippy::cast_precision_loss)]
use approx::assert_abs_diff_eq;
use flimkit_algorithms::lifetime::semicircle_point;
use flimkit_algorithms::quality::{LABEL_ABOVE, LABEL_BELOW, LABEL_KEPT};
use flimkit_algorithms::{
    angular_frequency, apparent_lifetime, classify, median_filter, phasor_from_lifetime,
    phasor_from_signal, photon_range_mask, Calibration, PhasorMap, RawSignal, Roi,
    SignalMetadata,
};
use ndarray::{array, Array2, Array3};
use std::f64::consts::PI;

/// Counts whose first-harmonic DFT is exactly `(g, s)` before rounding.
fn harmonic_signal(g: f64, s: f64, bins: usize, shape: (usize, usize), frequency: f64) -> RawSignal {
    let amplitude = 1.0e6;
    let counts = Array3::from_shape_fn((bins, shape.0, shape.1), |(k, _, _)| {
        let phase = 2.0 * PI * k as f64 / bins as f64;
        (amplitude * (1.0 + 2.0 * g * phase.cos() + 2.0 * s * phase.sin())).round() as u32
    });
    RawSignal::new(counts, SignalMetadata::new(0).with_frequency(frequency))
}

/// A uniform phasor map at `(g, s)`.
fn uniform_map(g: f64, s: f64) -> PhasorMap {
    PhasorMap::new(
        1,
        Array2::from_elem((4, 4), 500.0),
        Array2::from_elem((4, 4), g),
        Array2::from_elem((4, 4), s),
    )
    .unwrap()
}

/// Small deterministic generator for sweep tests.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
        self.0 >> 33
    }

    fn unit(&mut self) -> f64 {
        self.next() as f64 / (1u64 << 31) as f64
    }
}

#[test]
fn test_calibration_round_trip_on_semicircle() {
    let (eg, es) = phasor_from_lifetime(4.0, 80.0, 1).unwrap();
    let reference = uniform_map(eg, es);
    let mut calibration = Calibration::new();
    calibration.fit(&reference, 4.0, 80.0).unwrap();

    let (g, s) = calibration
        .apply(reference.real(), reference.imag())
        .unwrap();
    for (&gv, &sv) in g.iter().zip(s.iter()) {
        assert_abs_diff_eq!(gv, eg, epsilon = 1e-9);
        assert_abs_diff_eq!(sv, es, epsilon = 1e-9);
    }
}

#[test]
fn test_calibration_round_trip_distorted_reference() {
    let (eg, es) = phasor_from_lifetime(4.0, 80.0, 1).unwrap();
    // instrument response: rotate by -0.3 rad and shrink to 80 %
    let (c, s) = ((-0.3f64).cos(), (-0.3f64).sin());
    let rg = 0.8 * (eg * c - es * s);
    let rs = 0.8 * (eg * s + es * c);
    let reference = uniform_map(rg, rs);

    let mut calibration = Calibration::new();
    let state = *calibration.fit(&reference, 4.0, 80.0).unwrap();
    assert_abs_diff_eq!(state.phase_zero, 0.3, epsilon = 1e-12);
    assert_abs_diff_eq!(state.modulation_zero, 1.25, epsilon = 1e-12);

    let (g, s) = calibration.apply_point(rg, rs);
    assert_abs_diff_eq!(g, eg, epsilon = 1e-9);
    assert_abs_diff_eq!(s, es, epsilon = 1e-9);
}

#[test]
fn test_identity_calibration() {
    let calibration = Calibration::new();
    let mut rng = Lcg(7);
    let g = Array2::from_shape_fn((8, 8), |_| rng.unit() * 4.0 - 2.0);
    let s = Array2::from_shape_fn((8, 8), |_| rng.unit() * 4.0 - 2.0);
    let (gc, sc) = calibration.apply(g.view(), s.view()).unwrap();
    assert_eq!(gc, g);
    assert_eq!(sc, s);
}

#[test]
fn test_photon_mask_partition() {
    let mut rng = Lcg(42);
    let counts = Array2::from_shape_fn((16, 16), |_| rng.next() % 2000);
    let bounds = [(0, None), (10, Some(1000)), (500, Some(500)), (1999, None), (0, Some(0))];

    for (min, max) in bounds {
        let labels = photon_range_mask(counts.view().into_dyn(), min, max).unwrap();
        for (&c, &l) in counts.iter().zip(labels.iter()) {
            match l {
                LABEL_BELOW => assert!(c < min),
                LABEL_KEPT => {
                    assert!(c >= min);
                    if let Some(max) = max {
                        assert!(c <= max);
                    }
                }
                LABEL_ABOVE => {
                    assert!(max.is_some_and(|m| c > m), "label 2 with max {:?}", max);
                }
                other => panic!("unexpected label {}", other),
            }
        }
    }
}

#[test]
fn test_median_uniform_is_fixed_point() {
    let image = Array2::from_elem((9, 7), 0.37);
    for kernel in [1, 3, 5, 7, 11] {
        for repeat in [1, 2, 5] {
            let out = median_filter(image.view(), kernel, repeat).unwrap();
            assert_eq!(out, image, "kernel {} repeat {}", kernel, repeat);
        }
    }
}

#[test]
fn test_roi_priority_first_match() {
    let rois = vec![
        Roi::new("outer", 0.5, 0.3, 0.2),
        Roi::new("inner", 0.52, 0.31, 0.05),
    ];
    let g = array![[0.52]];
    let s = array![[0.31]];
    assert!(rois[1].contains(0.52, 0.31));
    let labels = classify(g.view(), s.view(), &rois).unwrap();
    assert_eq!(labels[[0, 0]], 1);
}

#[test]
fn test_lifetime_nan_propagates_to_classification() {
    let g = array![[1.5, 0.5]];
    let s = array![[0.5, 0.3]];
    let (_, modulation) = apparent_lifetime(g.view(), s.view(), 80.0, 1).unwrap();
    assert!(modulation[[0, 0]].is_nan());

    // classify the lifetime image itself as a 1-D "phasor" against a circle
    // that covers every finite value
    let zeros = Array2::<f64>::zeros((1, 2));
    let rois = vec![Roi::new("all", 0.0, 0.0, 1.0e6)];
    let labels = classify(modulation.view(), zeros.view(), &rois).unwrap();
    assert_eq!(labels, array![[0u8, 1]]);

    let mask = modulation.mapv(|t| u8::from(t > 0.0));
    assert_eq!(mask[[0, 0]], 0);
}

#[test]
fn test_scenario_a_harmonic_signal() {
    let omega = angular_frequency(80.0, 1).unwrap();
    let (eg, es) = semicircle_point(omega, 4.0);
    assert_abs_diff_eq!(omega, 2.0 * PI * 80.0e6 * 1.0e-9, epsilon = 1e-15);

    let signal = harmonic_signal(eg, es, 64, (16, 16), 80.0);
    let map = phasor_from_signal(&signal, 1).unwrap();
    assert_eq!(map.dim(), (16, 16));
    for (&g, &s) in map.real().iter().zip(map.imag().iter()) {
        assert_abs_diff_eq!(g, eg, epsilon = 1e-6);
        assert_abs_diff_eq!(s, es, epsilon = 1e-6);
    }
}

#[test]
fn test_scenario_a_sampled_exponential() {
    // an exponential sampled over one 12.5 ns period in 64 bins has the
    // discrete phasor (1 - r) / (1 - r·e^{iθ}) with r = e^{-Δ/τ}
    let bins = 64;
    let tau = 4.0;
    let dt = 1.0e3 / 80.0 / bins as f64;
    let r = (-dt / tau).exp();
    let counts = Array3::from_shape_fn((bins, 16, 16), |(k, _, _)| {
        (1.0e6 * r.powi(k as i32)).round() as u32
    });
    let signal = RawSignal::new(counts, SignalMetadata::new(0).with_frequency(80.0));
    let map = phasor_from_signal(&signal, 1).unwrap();

    let theta = 2.0 * PI / bins as f64;
    let (dr, di) = (1.0 - r * theta.cos(), -r * theta.sin());
    let norm = dr * dr + di * di;
    let expected_g = (1.0 - r) * dr / norm;
    let expected_s = -(1.0 - r) * di / norm;
    assert_abs_diff_eq!(map.real()[[3, 3]], expected_g, epsilon = 1e-6);
    assert_abs_diff_eq!(map.imag()[[3, 3]], expected_s, epsilon = 1e-6);

    // and close to the continuous semicircle point
    let (eg, es) = phasor_from_lifetime(tau, 80.0, 1).unwrap();
    assert_abs_diff_eq!(map.real()[[0, 0]], eg, epsilon = 0.05);
    assert_abs_diff_eq!(map.imag()[[0, 0]], es, epsilon = 0.05);
}

#[test]
fn test_scenario_b_reference_calibration() {
    let (eg, es) = phasor_from_lifetime(3.6, 40.0, 1).unwrap();
    // what an uncorrected instrument might report
    let signal = harmonic_signal(0.6 * eg + 0.05 * es, 0.6 * es - 0.05 * eg, 128, (8, 8), 40.0);
    let reference = phasor_from_signal(&signal, 1).unwrap();

    let mut calibration = Calibration::new();
    let state = *calibration.fit(&reference, 3.6, 40.0).unwrap();
    assert!(state.modulation_zero > 0.0);
    assert_eq!(calibration.revision(), 1);

    let (g, s) = calibration
        .apply(reference.real(), reference.imag())
        .unwrap();
    for (&gv, &sv) in g.iter().zip(s.iter()) {
        assert_abs_diff_eq!(gv, eg, epsilon = 1e-9);
        assert_abs_diff_eq!(sv, es, epsilon = 1e-9);
    }
}

#[test]
fn test_scenario_c_photon_mask() {
    let counts = array![[0u64, 5], [50, 5000]];
    let labels = photon_range_mask(counts.view().into_dyn(), 10, Some(1000)).unwrap();
    assert_eq!(labels, array![[0u8, 0], [1, 2]]);
}
