/*!
    Encoder effort selection from a one-shot CPU benchmark.
*/

pub mod cpu;
mod selector;

pub use cpu::{CpuCapabilities, CpuFeatures, CpuInfoProbe, CpuProfile, FixedProfile, NativeProbe};
pub use selector::{PresetSelection, corrected_frequency, select_preset, tier_for_frequency};

/**
    Encoder effort level, from fastest to most thorough.
*/
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PresetTier {
    Ultrafast,
    Superfast,
    Veryfast,
    Faster,
    /// Used when no benchmark ran.
    #[default]
    Fast,
    Medium,
    Slow,
    Slower,
    Veryslow,
    Placebo,
}

impl PresetTier {
    pub const ALL: [PresetTier; 10] = [
        Self::Ultrafast,
        Self::Superfast,
        Self::Veryfast,
        Self::Faster,
        Self::Fast,
        Self::Medium,
        Self::Slow,
        Self::Slower,
        Self::Veryslow,
        Self::Placebo,
    ];

    /**
        x264 preset name.
    */
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ultrafast => "ultrafast",
            Self::Superfast => "superfast",
            Self::Veryfast => "veryfast",
            Self::Faster => "faster",
            Self::Fast => "fast",
            Self::Medium => "medium",
            Self::Slow => "slow",
            Self::Slower => "slower",
            Self::Veryslow => "veryslow",
            Self::Placebo => "placebo",
        }
    }
}

impl std::fmt::Display for PresetTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PresetTier {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|tier| tier.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| crate::Error::UnsupportedFormat(format!("preset {:?}", s)))
    }
}
