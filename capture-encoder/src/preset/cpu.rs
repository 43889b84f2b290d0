/*!
    Host CPU probing.

    Three providers implement [`CpuCapabilities`]: [`NativeProbe`] counts
    time-stamp-counter ticks and asks CPUID on x86, [`CpuInfoProbe`] parses
    `/proc/cpuinfo`, and [`FixedProfile`] returns a preset profile. Use
    [`detect`] to get the right one for the current platform.
*/

use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, warn};

/// Frequency assumed when nothing better is known.
pub const DEFAULT_FREQUENCY_MHZ: f64 = 1000.0;

/**
    Instruction-set extensions that affect encoder throughput.
*/
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CpuFeatures {
    pub avx: bool,
    pub avx2: bool,
    pub sse42: bool,
    pub amd_3dnow: bool,
    pub aes: bool,
}

/**
    What the benchmark learned about the host.
*/
#[derive(Clone, Debug, PartialEq)]
pub struct CpuProfile {
    pub vendor: String,
    /// Estimated clock frequency in MHz.
    pub frequency_mhz: f64,
    pub logical_cores: usize,
    /// Extension flags, if the provider could read them.
    pub features: Option<CpuFeatures>,
}

impl CpuProfile {
    /**
        Profile with the default frequency and no feature information.
    */
    pub fn fallback() -> Self {
        Self {
            vendor: "unknown".to_string(),
            frequency_mhz: DEFAULT_FREQUENCY_MHZ,
            logical_cores: logical_cores(),
            features: None,
        }
    }
}

/**
    Source of a [`CpuProfile`].
*/
pub trait CpuCapabilities: Send + Sync {
    fn probe(&self) -> CpuProfile;
}

/**
    Pick the provider for the current platform.
*/
pub fn detect() -> Box<dyn CpuCapabilities> {
    if cfg!(any(target_arch = "x86", target_arch = "x86_64")) {
        Box::new(NativeProbe::default())
    } else if cfg!(target_os = "linux") {
        Box::new(CpuInfoProbe::default())
    } else {
        Box::new(FixedProfile::new(CpuProfile::fallback()))
    }
}

pub fn logical_cores() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

// ── Native ───────────────────────────────────────────────────────────────

/**
    Measures the time-stamp counter over a busy-wait interval.

    Blocks the calling thread for the whole interval. On non-x86 targets it
    reports the default frequency.
*/
#[derive(Clone, Debug)]
pub struct NativeProbe {
    pub interval: Duration,
}

impl Default for NativeProbe {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
        }
    }
}

impl NativeProbe {
    pub fn with_interval(interval: Duration) -> Self {
        Self { interval }
    }
}

impl CpuCapabilities for NativeProbe {
    fn probe(&self) -> CpuProfile {
        let mut profile = CpuProfile::fallback();

        #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
        {
            profile.vendor = x86::vendor();
            profile.features = Some(x86::features());
            if let Some(mhz) = x86::measure_tsc_mhz(self.interval) {
                profile.frequency_mhz = mhz;
            }
        }

        debug!(?profile, "native cpu probe");
        profile
    }
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
mod x86 {
    #[cfg(target_arch = "x86")]
    use std::arch::x86 as arch;
    #[cfg(target_arch = "x86_64")]
    use std::arch::x86_64 as arch;
    use std::time::{Duration, Instant};

    use super::CpuFeatures;

    pub fn measure_tsc_mhz(interval: Duration) -> Option<f64> {
        let start = Instant::now();
        // SAFETY: RDTSC is available on every x86 CPU Rust targets.
        let begin = unsafe { arch::_rdtsc() };
        while start.elapsed() < interval {
            std::hint::spin_loop();
        }
        let end = unsafe { arch::_rdtsc() };

        let secs = start.elapsed().as_secs_f64();
        if secs <= 0.0 || end <= begin {
            return None;
        }
        Some((end - begin) as f64 / secs / 1_000_000.0)
    }

    pub fn vendor() -> String {
        // SAFETY: leaf 0 is supported by every CPU with CPUID.
        let leaf = unsafe { arch::__cpuid(0) };
        let bytes: Vec<u8> = [leaf.ebx, leaf.edx, leaf.ecx]
            .iter()
            .flat_map(|r| r.to_le_bytes())
            .collect();
        String::from_utf8_lossy(&bytes).trim().to_string()
    }

    pub fn features() -> CpuFeatures {
        CpuFeatures {
            avx: is_x86_feature_detected!("avx"),
            avx2: is_x86_feature_detected!("avx2"),
            sse42: is_x86_feature_detected!("sse4.2"),
            amd_3dnow: has_3dnow(),
            aes: is_x86_feature_detected!("aes"),
        }
    }

    fn has_3dnow() -> bool {
        // SAFETY: the extended leaf range is checked before it is queried.
        let edx = unsafe {
            let max_extended = arch::__cpuid(0x8000_0000).eax;
            if max_extended < 0x8000_0001 {
                return false;
            }
            arch::__cpuid(0x8000_0001).edx
        };
        super::reports_3dnow(&vendor(), edx)
    }
}

/**
    3DNow! is bit 31 of extended leaf 0x80000001 EDX, but only on AMD parts.
*/
#[cfg(any(target_arch = "x86", target_arch = "x86_64", test))]
fn reports_3dnow(vendor: &str, extended_edx: u32) -> bool {
    vendor == "AuthenticAMD" && extended_edx & (1 << 31) != 0
}

// ── /proc/cpuinfo ────────────────────────────────────────────────────────

/**
    Reads the frequency estimate from the kernel's `bogomips` field.
*/
#[derive(Clone, Debug)]
pub struct CpuInfoProbe {
    pub path: PathBuf,
}

impl Default for CpuInfoProbe {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/proc/cpuinfo"),
        }
    }
}

impl CpuInfoProbe {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CpuCapabilities for CpuInfoProbe {
    fn probe(&self) -> CpuProfile {
        let mut profile = CpuProfile::fallback();

        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "cannot read cpuinfo");
                return profile;
            }
        };

        let info = parse_cpuinfo(&text);
        if let Some(mhz) = info.bogomips {
            profile.frequency_mhz = mhz;
        }
        if let Some(vendor) = info.vendor {
            profile.vendor = vendor;
        }
        profile.features = info.features;

        debug!(?profile, path = %self.path.display(), "cpuinfo probe");
        profile
    }
}

/**
    Fields pulled out of a cpuinfo dump. Only the first occurrence counts.
*/
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CpuInfo {
    pub bogomips: Option<f64>,
    pub vendor: Option<String>,
    pub features: Option<CpuFeatures>,
}

pub fn parse_cpuinfo(text: &str) -> CpuInfo {
    let mut info = CpuInfo::default();

    for line in text.lines() {
        if info.bogomips.is_none() {
            info.bogomips = bogomips_regex()
                .captures(line)
                .and_then(|c| c[1].parse::<f64>().ok());
        }
        if let Some(caps) = field_regex().captures(line) {
            let value = caps[2].trim();
            match &caps[1] {
                "vendor_id" if info.vendor.is_none() => info.vendor = Some(value.to_string()),
                "flags" if info.features.is_none() => info.features = Some(parse_flags(value)),
                _ => {}
            }
        }
    }

    info
}

fn parse_flags(flags: &str) -> CpuFeatures {
    let mut features = CpuFeatures::default();
    for flag in flags.split_whitespace() {
        match flag {
            "avx" => features.avx = true,
            "avx2" => features.avx2 = true,
            "sse4_2" => features.sse42 = true,
            "3dnow" => features.amd_3dnow = true,
            "aes" => features.aes = true,
            _ => {}
        }
    }
    features
}

fn bogomips_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)bogomips\s*:\s*([0-9.]+)").expect("bogomips regex should compile")
    })
}

fn field_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(vendor_id|flags)\s*:\s*(.*)$").expect("field regex should compile")
    })
}

// ── Fixed ────────────────────────────────────────────────────────────────

/**
    Returns the same profile every time.
*/
#[derive(Clone, Debug)]
pub struct FixedProfile(pub CpuProfile);

impl FixedProfile {
    pub fn new(profile: CpuProfile) -> Self {
        Self(profile)
    }
}

impl CpuCapabilities for FixedProfile {
    fn probe(&self) -> CpuProfile {
        self.0.clone()
    }
}
