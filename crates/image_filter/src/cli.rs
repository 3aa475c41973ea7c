// Command line arguments for the image_filter binary.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use discrete_convolution::Kernel;

/// Apply a discrete 2D convolution filter to a 24-bit BMP image.
#[derive(Debug, Parser)]
#[command(about, long_about = None)]
pub struct CliArgs {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Convolve on a single thread.
    #[command(visible_alias = "S")]
    Sequential(FilterArgs),
    /// Convolve on a pool of worker threads.
    #[command(visible_alias = "P")]
    Parallel(ParallelArgs),
    /// Convolve across several cooperating processes.
    #[command(visible_alias = "D")]
    Distributed(DistributedArgs),
}

/// Input, output and kernel, shared by every strategy.
///
/// Options go before the trailing kernel values, which take everything left
/// on the command line. Without a kernel or preset the 3x3 uniform averaging
/// kernel is used.
#[derive(Debug, Args)]
pub struct FilterArgs {
    /// Image to filter.
    pub input: PathBuf,

    /// Where to write the filtered image.
    pub output: PathBuf,

    /// A built-in kernel.
    #[clap(long, value_enum)]
    pub preset: Option<Preset>,

    /// Kernel width, height, then the coefficients in row-major order.
    #[clap(
        value_name = "KERNEL",
        num_args = 0..,
        trailing_var_arg = true,
        allow_hyphen_values = true,
        conflicts_with = "preset"
    )]
    pub kernel: Vec<String>,
}

#[derive(Debug, Args)]
pub struct ParallelArgs {
    /// Worker threads; defaults to the number of logical CPUs.
    #[clap(long)]
    pub threads: Option<usize>,

    #[command(flatten)]
    pub filter: FilterArgs,
}

#[derive(Debug, Args)]
pub struct DistributedArgs {
    /// Number of processes taking part, including the coordinator.
    #[clap(long, env = "CONV_WORLD_SIZE", default_value_t = 2)]
    pub world_size: usize,

    /// This process's rank. Without it, this process becomes rank 0 and
    /// launches the remaining ranks itself.
    #[clap(long, env = "CONV_RANK")]
    pub rank: Option<usize>,

    /// Address the coordinator listens on and the workers connect to.
    #[clap(long, env = "CONV_COORDINATOR", default_value = "127.0.0.1:0")]
    pub coordinator: SocketAddr,

    /// Worker threads per process; defaults to the number of logical CPUs.
    #[clap(long)]
    pub threads: Option<usize>,

    /// Seconds to wait for all ranks to connect.
    #[clap(long, default_value_t = 30)]
    pub connect_timeout: u64,

    #[command(flatten)]
    pub filter: FilterArgs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Preset {
    Box3,
    Box5,
    Identity,
    Sharpen,
    SobelX,
    SobelY,
    Gaussian5,
}

impl Preset {
    pub fn kernel(self) -> Kernel {
        match self {
            Preset::Box3 => Kernel::box_blur(3),
            Preset::Box5 => Kernel::box_blur(5),
            Preset::Identity => Kernel::identity(),
            Preset::Sharpen => Kernel::sharpen(),
            Preset::SobelX => Kernel::sobel_x(),
            Preset::SobelY => Kernel::sobel_y(),
            Preset::Gaussian5 => Kernel::gaussian(5, 1.0),
        }
    }
}

impl Command {
    pub fn filter(&self) -> &FilterArgs {
        match self {
            Command::Sequential(filter) => filter,
            Command::Parallel(parallel) => &parallel.filter,
            Command::Distributed(distributed) => &distributed.filter,
        }
    }
}

impl FilterArgs {
    /// The kernel the arguments describe.
    ///
    /// The coefficient count is not checked against the dimensions here; the
    /// convolution rejects a kernel that does not match.
    pub fn resolve_kernel(&self) -> Result<Kernel> {
        if let Some(preset) = self.preset {
            return Ok(preset.kernel());
        }

        let [width, height, coefficients @ ..] = self.kernel.as_slice() else {
            if self.kernel.is_empty() {
                return Ok(Kernel::default());
            }
            bail!("a kernel needs a width and a height before its coefficients");
        };

        let width = width
            .parse::<usize>()
            .with_context(|| format!("invalid kernel width {width:?}"))?;
        let height = height
            .parse::<usize>()
            .with_context(|| format!("invalid kernel height {height:?}"))?;
        let coefficients = coefficients
            .iter()
            .map(|value| {
                value
                    .parse::<f64>()
                    .with_context(|| format!("invalid kernel coefficient {value:?}"))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Kernel {
            width,
            height,
            coefficients,
        })
    }
}
