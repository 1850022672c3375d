//! Deterministic sample-size / power arithmetic for the data analysis agent.
//! No randomness, no external solver: a closed-form two-proportion z-test
//! formula plus a rational approximation to the inverse standard normal CDF.

/// Acklam's rational approximation to the inverse standard normal CDF,
/// accurate to about 1.15e-9 over (0, 1).
pub fn inverse_normal_cdf(p: f64) -> f64 {
    const A: [f64; 6] = [
        -3.969_683_028_665_376e+01,
        2.209_460_984_245_205e+02,
        -2.759_285_104_469_687e+02,
        1.383_577_518_672_690e+02,
        -3.066_479_806_614_716e+01,
        2.506_628_277_459_239e+00,
    ];
    const B: [f64; 5] = [
        -5.447_609_879_822_406e+01,
        1.615_858_368_580_409e+02,
        -1.556_989_798_598_866e+02,
        6.680_131_188_771_972e+01,
        -1.328_068_155_288_572e+01,
    ];
    const C: [f64; 6] = [
        -7.784_894_002_430_293e-03,
        -3.223_964_580_411_365e-01,
        -2.400_758_277_161_838e+00,
        -2.549_732_539_343_734e+00,
        4.374_664_141_464_968e+00,
        2.938_163_982_698_783e+00,
    ];
    const D: [f64; 4] = [
        7.784_695_709_041_462e-03,
        3.224_671_290_700_398e-01,
        2.445_134_137_142_996e+00,
        3.754_408_661_907_416e+00,
    ];
    const P_LOW: f64 = 0.02425;

    if p <= 0.0 || p >= 1.0 {
        return f64::NAN;
    }
    if p < P_LOW {
        let q = (-2.0 * p.ln()).sqrt();
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        let q = (-2.0 * (1.0 - p).ln()).sqrt();
        -(((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    }
}

/// Total sample size (both arms combined) for a two-proportion z-test
/// comparing a baseline rate `p1` against an assumed post-intervention
/// rate `p2`, at the given two-sided `alpha` and `power`. Returns the
/// per-arm count doubled, rounded up.
pub fn two_proportion_sample_size(p1: f64, p2: f64, alpha: f64, power: f64) -> u32 {
    let z_alpha = inverse_normal_cdf(1.0 - alpha / 2.0);
    let z_power = inverse_normal_cdf(power);
    let numerator = (z_alpha + z_power).powi(2) * (p1 * (1.0 - p1) + p2 * (1.0 - p2));
    let denominator = (p1 - p2).powi(2);
    let per_arm = (numerator / denominator).ceil();
    (per_arm * 2.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverse_cdf_matches_known_critical_values() {
        assert!((inverse_normal_cdf(0.975) - 1.959_963_985).abs() < 1e-6);
        assert!((inverse_normal_cdf(0.8) - 0.841_621_234).abs() < 1e-6);
    }

    #[test]
    fn sample_size_for_a_moderate_effect_is_in_a_sane_range() {
        // baseline 40% fall rate, 30% relative reduction -> 28%, alpha .05, power .8
        let n = two_proportion_sample_size(0.40, 0.28, 0.05, 0.8);
        assert!(n > 200 && n < 2000);
    }

    #[test]
    fn a_tiny_effect_on_a_rare_outcome_needs_a_huge_sample() {
        let n = two_proportion_sample_size(0.05, 0.049, 0.05, 0.8);
        assert!(n > 100_000);
    }
}
