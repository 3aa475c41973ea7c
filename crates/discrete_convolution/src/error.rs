use thiserror::Error;

/// Everything that can abort a convolution call. None of these are
/// recoverable inside the crate; the caller decides how to report them.
#[derive(Error, Debug)]
pub enum ConvolutionError {
    /// The coefficient count does not match the declared kernel size.
    #[error("kernel declared as {width}x{height} has {len} coefficients")]
    InvalidKernel {
        width: usize,
        height: usize,
        len: usize,
    },

    /// The pixel buffer does not hold exactly `width * height` RGB pixels.
    #[error("pixel buffer of {len} bytes does not describe a {width}x{height} RGB image")]
    InvalidImage {
        width: usize,
        height: usize,
        len: usize,
    },

    #[error("thread count must be > 0, got {0}")]
    InvalidThreadCount(usize),

    #[error("failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// A rank outside `0..world_size`, or an empty world.
    #[error("rank {rank} is not valid in a world of size {world_size}")]
    InvalidTopology { rank: usize, world_size: usize },

    /// A message went missing, came from the wrong rank, or had the wrong size.
    #[error("transport failure: {0}")]
    TransportFailure(String),
}

pub type Result<T> = std::result::Result<T, ConvolutionError>;
