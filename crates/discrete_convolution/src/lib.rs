#[cfg(test)]
mod tests;

// Discrete 2D convolution of RGB images.
//
// One row-range core does all of the arithmetic; the sequential, parallel and
// distributed strategies only differ in which rows they hand to it and on
// which thread or process.

pub mod convolve;
pub mod distributed;
pub mod error;
pub mod image;
pub mod kernel;
pub mod parallel;
pub mod sequential;
pub mod transport;

pub use convolve::{compute_pixel, convolve_rows};
pub use distributed::{
    convolve_distributed, convolve_distributed_with_threads, row_block, run_local_world,
};
pub use error::{ConvolutionError, Result};
pub use image::{CHANNELS, Image};
pub use kernel::{Kernel, KernelGeometry};
pub use parallel::{convolve_parallel, convolve_parallel_with_threads};
pub use sequential::convolve_sequential;
pub use transport::{COORDINATOR, Communicator, LocalCommunicator, TcpCommunicator};
