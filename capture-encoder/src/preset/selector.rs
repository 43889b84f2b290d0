use tracing::info;

use super::PresetTier;
use super::cpu::{CpuCapabilities, CpuProfile};

/**
    Outcome of a benchmark run.
*/
#[derive(Clone, Debug, PartialEq)]
pub struct PresetSelection {
    pub profile: CpuProfile,
    /// Frequency after extension and core corrections, in MHz.
    pub corrected_mhz: f64,
    pub tier: PresetTier,
}

/**
    Weight the measured frequency by instruction-set extensions and cores.
*/
pub fn corrected_frequency(profile: &CpuProfile) -> f64 {
    let mut freq = profile.frequency_mhz;

    if let Some(features) = &profile.features {
        if features.avx {
            freq *= 1.1;
        }
        if features.avx2 {
            freq *= 1.05;
        }
        if features.sse42 {
            freq *= 1.1;
        }
        if features.amd_3dnow {
            freq *= 1.2;
        }
    }

    let aes = profile.features.as_ref().is_some_and(|f| f.aes);
    match profile.logical_cores {
        4 if aes => freq * 4.0,
        4 => freq * 2.5,
        n if n >= 6 => freq * 6.0,
        5 => freq,
        n => freq * n as f64,
    }
}

/**
    Map a corrected frequency onto a tier. The bands partition the axis.
*/
pub fn tier_for_frequency(mhz: f64) -> PresetTier {
    if mhz > 42000.0 {
        PresetTier::Placebo
    } else if mhz > 33000.0 {
        PresetTier::Veryslow
    } else if mhz > 20000.0 {
        PresetTier::Slower
    } else if mhz > 12000.0 {
        PresetTier::Slow
    } else if mhz > 6500.0 {
        PresetTier::Medium
    } else if mhz >= 5500.0 {
        PresetTier::Veryfast
    } else {
        PresetTier::Ultrafast
    }
}

/**
    Probe the CPU and pick a tier.
*/
pub fn select_preset(cpu: &dyn CpuCapabilities) -> PresetSelection {
    let profile = cpu.probe();
    let corrected_mhz = corrected_frequency(&profile);
    let tier = tier_for_frequency(corrected_mhz);

    info!(
        vendor = %profile.vendor,
        measured_mhz = profile.frequency_mhz,
        cores = profile.logical_cores,
        corrected_mhz,
        tier = %tier,
        "selected encoder preset"
    );

    PresetSelection {
        profile,
        corrected_mhz,
        tier,
    }
}

#[cfg(test)]
mod tests {
    use super::super::cpu::{CpuFeatures, FixedProfile};
    use super::*;

    fn profile(mhz: f64, cores: usize, features: Option<CpuFeatures>) -> CpuProfile {
        CpuProfile {
            vendor: "TestVendor".to_string(),
            frequency_mhz: mhz,
            logical_cores: cores,
            features,
        }
    }

    fn aes_only() -> CpuFeatures {
        CpuFeatures {
            aes: true,
            ..CpuFeatures::default()
        }
    }

    #[test]
    fn four_cores_depend_on_aes() {
        let with_aes = profile(1700.0, 4, Some(aes_only()));
        let without = profile(1700.0, 4, Some(CpuFeatures::default()));

        assert_eq!(corrected_frequency(&with_aes), 6800.0);
        assert_eq!(corrected_frequency(&without), 4250.0);
        assert_eq!(tier_for_frequency(6800.0), PresetTier::Medium);
        assert_eq!(tier_for_frequency(4250.0), PresetTier::Ultrafast);
    }

    #[test]
    fn core_corrections() {
        assert_eq!(corrected_frequency(&profile(1000.0, 1, None)), 1000.0);
        assert_eq!(corrected_frequency(&profile(1000.0, 2, None)), 2000.0);
        assert_eq!(corrected_frequency(&profile(1000.0, 5, None)), 1000.0);
        assert_eq!(corrected_frequency(&profile(1000.0, 6, None)), 6000.0);
        assert_eq!(corrected_frequency(&profile(1000.0, 64, None)), 6000.0);
        // unknown features: no AES
        assert_eq!(corrected_frequency(&profile(1000.0, 4, None)), 2500.0);
    }

    #[test]
    fn extension_factors_multiply() {
        let features = CpuFeatures {
            avx: true,
            avx2: true,
            sse42: true,
            amd_3dnow: true,
            aes: false,
        };
        let freq = corrected_frequency(&profile(1000.0, 1, Some(features)));
        assert!((freq - 1000.0 * 1.1 * 1.05 * 1.1 * 1.2).abs() < 1e-6);
    }

    #[test]
    fn band_edges() {
        assert_eq!(tier_for_frequency(42000.1), PresetTier::Placebo);
        assert_eq!(tier_for_frequency(42000.0), PresetTier::Veryslow);
        assert_eq!(tier_for_frequency(33000.0), PresetTier::Slower);
        assert_eq!(tier_for_frequency(20000.0), PresetTier::Slow);
        assert_eq!(tier_for_frequency(12000.0), PresetTier::Medium);
        assert_eq!(tier_for_frequency(6500.0), PresetTier::Veryfast);
        assert_eq!(tier_for_frequency(5500.0), PresetTier::Veryfast);
        assert_eq!(tier_for_frequency(5499.9), PresetTier::Ultrafast);
        assert_eq!(tier_for_frequency(0.0), PresetTier::Ultrafast);
    }

    #[test]
    fn tier_is_monotonic_in_frequency() {
        let mut previous = PresetTier::Ultrafast;
        for step in 0..2000 {
            let tier = tier_for_frequency(step as f64 * 25.0);
            assert!(tier >= previous);
            previous = tier;
        }
        assert_eq!(previous, PresetTier::Placebo);
    }

    #[test]
    fn select_uses_the_provider() {
        let cpu = FixedProfile::new(profile(3000.0, 8, None));
        let selection = select_preset(&cpu);
        assert_eq!(selection.corrected_mhz, 18000.0);
        assert_eq!(selection.tier, PresetTier::Slow);
        assert_eq!(selection.profile.logical_cores, 8);
    }
}
