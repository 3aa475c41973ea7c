
// top-level library module

pub mod cli;
pub mod codec;
pub mod launcher;

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use discrete_convolution::{Image, convolve_parallel_with_threads, convolve_sequential};
use log::info;

use crate::cli::{CliArgs, Command};

/// Loads the input, runs the selected strategy, reports the time spent
/// convolving, and writes the output.
///
/// In distributed mode only the coordinator prints a time and writes the
/// output file.
pub fn run(args: CliArgs) -> Result<()> {
    let filter = args.command.filter();
    let kernel = filter.resolve_kernel()?;

    let input = codec::load_bmp(&filter.input)
        .with_context(|| format!("failed to load {}", filter.input.display()))?;
    info!(
        "loaded {}x{} image from {}",
        input.width(),
        input.height(),
        filter.input.display()
    );

    let filtered = match &args.command {
        Command::Sequential(_) => Some(timed(|| convolve_sequential(&input, &kernel))?),
        Command::Parallel(parallel) => {
            let threads = parallel.threads.unwrap_or_else(num_cpus::get);
            Some(timed(|| {
                convolve_parallel_with_threads(&input, &kernel, threads)
            })?)
        }
        Command::Distributed(distributed) => {
            launcher::run_distributed(distributed, &input, &kernel)?
        }
    };

    let Some((output, elapsed)) = filtered else {
        return Ok(());
    };

    info!("convolution took {elapsed:?}");
    println!("{}", elapsed.as_secs_f64());

    codec::save_bmp(&filter.output, &output)
        .with_context(|| format!("failed to save {}", filter.output.display()))?;
    info!("saved filtered image to {}", filter.output.display());

    Ok(())
}

/// Runs a convolution and measures how long it took.
pub(crate) fn timed(
    convolve: impl FnOnce() -> discrete_convolution::Result<Image>,
) -> Result<(Image, Duration)> {
    let time = Instant::now();
    let output = convolve()?;
    Ok((output, time.elapsed()))
}
