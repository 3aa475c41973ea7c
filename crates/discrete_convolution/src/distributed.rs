// Distributed convolution over a world of cooperating ranks.
//
// Every rank holds the complete input image, so neighbourhoods that cross a
// block boundary are read locally and no halo exchange is needed. Ranks
// compute their block of output rows, then the non-coordinators ship their
// block to rank 0, which receives them in rank order.

use std::ops::Range;
use std::thread;

use log::{debug, info};

use crate::error::{ConvolutionError, Result};
use crate::image::Image;
use crate::kernel::Kernel;
use crate::parallel::{build_thread_pool, convolve_rows_parallel};
use crate::transport::{COORDINATOR, Communicator, LocalCommunicator};

/// The block of output rows assigned to `rank`.
///
/// Every rank gets `height / world_size` rows, and the last rank also takes
/// the remainder. When there are more ranks than rows the leading blocks are
/// empty.
pub fn row_block(height: usize, rank: usize, world_size: usize) -> Result<Range<usize>> {
    if rank >= world_size {
        return Err(ConvolutionError::InvalidTopology { rank, world_size });
    }

    let rows_per_process = height / world_size;
    let start = rank * rows_per_process;
    let end = if rank == world_size - 1 {
        height
    } else {
        start + rows_per_process
    };

    Ok(start..end)
}

/// Runs this rank's share of a distributed convolution, using one worker
/// thread per available hardware thread for the rank's block.
///
/// Only the coordinator's result is complete. Other ranks return a buffer in
/// which only their own block is filled in.
pub fn convolve_distributed<C>(
    input: &Image,
    kernel: &Kernel,
    communicator: &mut C,
) -> Result<Image>
where
    C: Communicator + ?Sized,
{
    convolve_distributed_with_threads(input, kernel, communicator, num_cpus::get())
}

/// Like [`convolve_distributed`], with an explicit per-rank worker count.
///
/// __Arguments:__
///
/// + `input` - the full input image, identical on every rank
///
/// + `kernel` - the kernel, identical on every rank
///
/// + `communicator` - supplies this process's rank and the world size, and
///   carries the row blocks to the coordinator
///
/// + `threads` - size of the worker pool used for this rank's block
///
pub fn convolve_distributed_with_threads<C>(
    input: &Image,
    kernel: &Kernel,
    communicator: &mut C,
    threads: usize,
) -> Result<Image>
where
    C: Communicator + ?Sized,
{
    let geometry = kernel.validate()?;

    let rank = communicator.rank();
    let world_size = communicator.world_size();
    let height = input.height();

    let block = row_block(height, rank, world_size)?;
    let block_bytes = input.row_bytes(block.clone());

    info!(
        "rank {rank}/{world_size}: convolving rows {}..{}",
        block.start, block.end
    );

    let mut output = Image::blank_like(input);

    {
        let thread_pool = build_thread_pool(threads)?;
        convolve_rows_parallel(
            input,
            &geometry,
            block,
            &mut output.pixels_mut()[block_bytes.clone()],
            &thread_pool,
        );
    }

    if rank != COORDINATOR {
        debug!(
            "rank {rank}: sending {} bytes to the coordinator",
            block_bytes.len()
        );
        communicator.send(COORDINATOR, &output.pixels()[block_bytes])?;
        return Ok(output);
    }

    // gather, strictly in rank order
    for source in 1..world_size {
        let source_bytes = input.row_bytes(row_block(height, source, world_size)?);
        debug!(
            "coordinator: receiving {} bytes from rank {source}",
            source_bytes.len()
        );
        communicator.recv(source, &mut output.pixels_mut()[source_bytes])?;
    }

    info!("coordinator: gathered {world_size} row blocks");

    Ok(output)
}

/// Runs a whole world in this process, one thread per rank, over
/// [`LocalCommunicator`]s, and returns the coordinator's image.
///
/// A failure on a non-coordinator rank is reported in preference to the
/// coordinator's own error, since the coordinator usually only fails because
/// a block never arrived.
pub fn run_local_world(
    input: &Image,
    kernel: &Kernel,
    world_size: usize,
    threads: usize,
) -> Result<Image> {
    let communicators = LocalCommunicator::world(world_size)?;

    let mut results: Vec<Result<Image>> = thread::scope(|scope| {
        let handles: Vec<_> = communicators
            .into_iter()
            .map(|mut communicator| {
                scope.spawn(move || {
                    convolve_distributed_with_threads(input, kernel, &mut communicator, threads)
                })
            })
            .collect();

        handles
            .into_iter()
            .enumerate()
            .map(|(rank, handle)| {
                handle.join().unwrap_or_else(|_| {
                    Err(ConvolutionError::TransportFailure(format!(
                        "rank {rank} panicked"
                    )))
                })
            })
            .collect()
    });

    let coordinator = results.remove(COORDINATOR);
    for result in results {
        result?;
    }

    coordinator
}
