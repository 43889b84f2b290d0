use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use capture_encoder::preset::{
    CpuCapabilities, CpuInfoProbe, NativeProbe, corrected_frequency, select_preset,
};

#[derive(Parser, Debug)]
pub struct BenchmarkCommand {
    /// Busy-wait interval of the clock measurement, in milliseconds
    #[arg(short, long, default_value = "1000")]
    pub interval_ms: u64,

    /// Read the CPU description from a cpuinfo file instead of measuring
    #[arg(long)]
    pub cpuinfo: Option<PathBuf>,
}

impl BenchmarkCommand {
    pub fn run(self) -> Result<()> {
        let cpu: Box<dyn CpuCapabilities> = match self.cpuinfo {
            Some(path) => Box::new(CpuInfoProbe::new(path)),
            None => Box::new(NativeProbe::with_interval(Duration::from_millis(
                self.interval_ms,
            ))),
        };

        let selection = select_preset(cpu.as_ref());
        let profile = &selection.profile;

        println!("Vendor:          {}", profile.vendor);
        println!("Measured:        {:.0} MHz", profile.frequency_mhz);
        println!("Logical cores:   {}", profile.logical_cores);
        match &profile.features {
            Some(features) => println!(
                "Extensions:      avx={} avx2={} sse4.2={} 3dnow={} aes={}",
                features.avx, features.avx2, features.sse42, features.amd_3dnow, features.aes
            ),
            None => println!("Extensions:      unknown"),
        }
        println!("Corrected:       {:.0} MHz", corrected_frequency(profile));
        println!("Preset:          {}", selection.tier);

        Ok(())
    }
}
