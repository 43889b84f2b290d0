use anyhow::Result;
use clap::{Parser, Subcommand};

mod benchmark;
mod encode;

pub use benchmark::BenchmarkCommand;
pub use encode::EncodeCommand;

#[derive(Parser, Debug)]
#[command(name = "capture-encoder")]
#[command(about = "Encode raw BGR0 video and S16 PCM captures to H.264/AAC")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Measure the CPU and print the preset it would get
    Benchmark(BenchmarkCommand),
    /// Encode raw capture files into a container
    Encode(EncodeCommand),
}

impl Args {
    pub fn run(self) -> Result<()> {
        match self.command {
            Command::Benchmark(cmd) => cmd.run(),
            Command::Encode(cmd) => cmd.run(),
        }
    }
}
