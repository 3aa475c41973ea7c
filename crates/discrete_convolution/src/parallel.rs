// Shared-memory parallel convolution.
//
// The output pixels are cut into one contiguous run per worker, counted in
// whole pixels rather than rows so short blocks still use every worker. Each
// worker owns its slice exclusively and reads the input freely, so nothing
// needs a lock.

use std::ops::Range;

use log::debug;
use rayon::{
    ThreadPool, ThreadPoolBuilder,
    iter::{IndexedParallelIterator, ParallelIterator},
    slice::ParallelSliceMut,
};

use crate::convolve::convolve_pixels;
use crate::error::{ConvolutionError, Result};
use crate::image::{CHANNELS, Image};
use crate::kernel::{Kernel, KernelGeometry};

/// Convolves the whole image using one worker per available hardware thread.
///
/// The result is byte for byte the same as
/// [`convolve_sequential`](crate::convolve_sequential).
pub fn convolve_parallel(input: &Image, kernel: &Kernel) -> Result<Image> {
    convolve_parallel_with_threads(input, kernel, num_cpus::get())
}

/// Like [`convolve_parallel`], with an explicit worker count.
///
/// The worker pool lives for the duration of this call only.
pub fn convolve_parallel_with_threads(
    input: &Image,
    kernel: &Kernel,
    threads: usize,
) -> Result<Image> {
    let geometry = kernel.validate()?;
    let thread_pool = build_thread_pool(threads)?;

    let mut output = Image::blank_like(input);
    convolve_rows_parallel(
        input,
        &geometry,
        0..input.height(),
        output.pixels_mut(),
        &thread_pool,
    );

    Ok(output)
}

pub(crate) fn build_thread_pool(threads: usize) -> Result<ThreadPool> {
    if threads == 0 {
        return Err(ConvolutionError::InvalidThreadCount(threads));
    }

    Ok(ThreadPoolBuilder::new().num_threads(threads).build()?)
}

/// Splits the pixels of `rows` evenly across the pool and convolves each
/// chunk on its own worker. Returns once every chunk is done.
///
/// `out` holds exactly the bytes of `rows`, as for
/// [`convolve_rows`](crate::convolve_rows).
pub(crate) fn convolve_rows_parallel(
    input: &Image,
    kernel: &KernelGeometry,
    rows: Range<usize>,
    out: &mut [u8],
    thread_pool: &ThreadPool,
) {
    if rows.is_empty() {
        return;
    }

    let num_threads = thread_pool.current_num_threads();
    let chunk_size_pixels = (out.len() / CHANNELS).div_ceil(num_threads);
    let first_pixel = rows.start * input.width();

    debug!(
        "splitting rows {}..{} into chunks of {} pixels over {} threads",
        rows.start, rows.end, chunk_size_pixels, num_threads
    );

    thread_pool.install(|| {
        out.par_chunks_mut(chunk_size_pixels * CHANNELS)
            .enumerate()
            .for_each(|(i, chunk)| {
                convolve_pixels(input, kernel, first_pixel + i * chunk_size_pixels, chunk);
            });
    });
}
