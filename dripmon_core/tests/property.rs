//! Invariant properties over randomized inputs.

use dripmon_core::config::{DripFilterCfg, WeightFilterCfg, WpdCfg};
use dripmon_core::drip_filter::DripRateFilter;
use dripmon_core::fusion::FlowFusion;
use dripmon_core::weight_filter::WeightKalmanFilter;
use dripmon_core::wpd::{WpdEstimator, WPD_CLAMP_MAX_GPD, WPD_CLAMP_MIN_GPD};
use dripmon_core::FusionCfg;
use proptest::prelude::*;

proptest! {
    /// The WPD posterior sits inside the physical clamp after every
    /// calibrate call, whatever mass trajectory the scale reports.
    #[test]
    fn wpd_always_within_clamp(
        drops_per_tick in proptest::collection::vec(0u64..20, 1..80),
        masses in proptest::collection::vec(-100.0f32..600.0, 1..80),
    ) {
        let mut est = WpdEstimator::new(&WpdCfg::default());
        est.set_initial_mass(500.0);
        est.start();
        for (d, m) in drops_per_tick.iter().zip(masses.iter()) {
            est.add_drops(*d);
            est.calibrate(*m);
            prop_assert!(
                (WPD_CLAMP_MIN_GPD..=WPD_CLAMP_MAX_GPD).contains(&est.wpd_gpd()),
                "wpd {} escaped the clamp", est.wpd_gpd()
            );
        }
    }

    /// Cumulative drop count is monotone between reinits.
    #[test]
    fn cumulative_drops_monotone(
        drops_per_tick in proptest::collection::vec(0u64..50, 1..100),
    ) {
        let mut est = WpdEstimator::new(&WpdCfg::default());
        est.set_initial_mass(500.0);
        let mut prev = 0;
        for d in drops_per_tick {
            est.add_drops(d);
            prop_assert!(est.cumulative_drops() >= prev);
            prev = est.cumulative_drops();
        }
    }

    /// Fused outputs stay non-negative for arbitrary (even hostile)
    /// channel measurements.
    #[test]
    fn fusion_outputs_nonnegative(
        measurements in proptest::collection::vec(
            (-10.0f32..10.0, -10.0f32..10.0, -1000.0f32..1000.0, -1000.0f32..1000.0),
            1..200
        ),
    ) {
        let mut fusion = FlowFusion::new(&FusionCfg::default());
        fusion.init(0.0, 500.0);
        for (fw, fd, mw, rd) in measurements {
            fusion.update(fw, fd, mw, rd, 1.0);
            prop_assert!(fusion.flow_gps() >= 0.0);
            prop_assert!(fusion.remaining_g() >= 0.0);
        }
    }

    /// Weight-filter covariance remains symmetric and PSD (within float
    /// tolerance) under arbitrary bounded measurement noise.
    #[test]
    fn weight_covariance_symmetric_psd(
        noise in proptest::collection::vec(-5.0f32..5.0, 1..150),
    ) {
        let mut kf = WeightKalmanFilter::new(&WeightFilterCfg::default());
        kf.init(500.0, 0.0, 0.0);
        for (i, n) in noise.iter().enumerate() {
            kf.update(500.0 - i as f32 * 0.1 + n, 1.0);
            let p = kf.covariance();
            for r in 0..3 {
                for c in 0..3 {
                    prop_assert!((p[r][c] - p[c][r]).abs() < 1e-3);
                }
                prop_assert!(p[r][r] >= -1e-6);
            }
        }
    }

    /// Drip-filter covariance remains symmetric and PSD, and a zero or
    /// negative dt never mutates the state.
    #[test]
    fn drip_filter_invariants(
        rates in proptest::collection::vec(-2.0f32..10.0, 1..150),
    ) {
        let mut kf = DripRateFilter::new(&DripFilterCfg::default());
        kf.init(1.0);
        for z in rates {
            let before = kf.rate_dps();
            kf.update(z, 0.0);
            prop_assert_eq!(before, kf.rate_dps());
            kf.update(z, 1.0);
            let p = kf.covariance();
            prop_assert!((p[0][1] - p[1][0]).abs() < 1e-4);
            prop_assert!(p[0][0] >= -1e-6 && p[1][1] >= -1e-6);
            prop_assert!(kf.rate_dps() >= 0.0);
        }
    }
}
