// CLI for the discrete convolution filter.

use clap::Parser;
use image_filter::cli::CliArgs;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = CliArgs::parse();
    image_filter::run(args)
}
