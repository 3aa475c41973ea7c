// Process management for distributed runs.
//
// A process started with an explicit rank joins an existing world. A process
// started without one becomes the coordinator and spawns the other ranks as
// copies of the current executable.

use std::env;
use std::ffi::OsString;
use std::net::{SocketAddr, TcpListener};
use std::process::{Child, Command};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use discrete_convolution::{
    COORDINATOR, Image, Kernel, TcpCommunicator, convolve_distributed_with_threads,
};
use log::{info, warn};

use crate::cli::DistributedArgs;
use crate::timed;

/// Takes part in a distributed convolution as described by `args`.
///
/// Returns the gathered image and the time spent on the coordinator, and
/// `None` on every other rank.
pub fn run_distributed(
    args: &DistributedArgs,
    input: &Image,
    kernel: &Kernel,
) -> Result<Option<(Image, Duration)>> {
    let threads = args.threads.unwrap_or_else(num_cpus::get);
    let timeout = Duration::from_secs(args.connect_timeout);

    match args.rank {
        None => launch(args, input, kernel).map(Some),
        Some(COORDINATOR) => {
            let listener = TcpListener::bind(args.coordinator)
                .with_context(|| format!("failed to listen on {}", args.coordinator))?;
            let mut communicator =
                TcpCommunicator::coordinator(listener, args.world_size, timeout)?;

            Ok(Some(timed(|| {
                convolve_distributed_with_threads(input, kernel, &mut communicator, threads)
            })?))
        }
        Some(rank) => {
            let mut communicator =
                TcpCommunicator::worker(args.coordinator, rank, args.world_size, timeout)?;

            let (_, elapsed) = timed(|| {
                convolve_distributed_with_threads(input, kernel, &mut communicator, threads)
            })
            .with_context(|| format!("rank {rank} failed"))?;
            info!("rank {rank} finished its block in {elapsed:?}");

            Ok(None)
        }
    }
}

fn launch(
    args: &DistributedArgs,
    input: &Image,
    kernel: &Kernel,
) -> Result<(Image, Duration)> {
    // fail before any process is started
    kernel.validate()?;

    let listener = TcpListener::bind(args.coordinator)
        .with_context(|| format!("failed to listen on {}", args.coordinator))?;
    let address = listener.local_addr()?;
    let program = env::current_exe().context("failed to locate the current executable")?;

    info!(
        "launching {} worker processes, coordinator at {address}",
        args.world_size.saturating_sub(1)
    );

    let workers = spawn_workers((1..args.world_size).map(|rank| {
        let mut command = Command::new(&program);
        command.args(worker_args(args, kernel, rank, address));
        (rank, command)
    }))?;

    let threads = args.threads.unwrap_or_else(num_cpus::get);
    let timeout = Duration::from_secs(args.connect_timeout);

    let result = TcpCommunicator::coordinator(listener, args.world_size, timeout)
        .map_err(anyhow::Error::from)
        .and_then(|mut communicator| {
            timed(|| convolve_distributed_with_threads(input, kernel, &mut communicator, threads))
        });

    // reap every worker, even when the gather failed
    let mut failed = Vec::new();
    for (rank, mut child) in workers {
        let status = child
            .wait()
            .with_context(|| format!("failed to wait for rank {rank}"))?;
        if !status.success() {
            warn!("rank {rank} exited with {status}");
            failed.push(rank);
        }
    }

    let filtered = result?;
    if !failed.is_empty() {
        bail!("worker ranks {failed:?} failed");
    }

    Ok(filtered)
}

/// Starts one process per rank. If any of them fails to start, the ones
/// already running are killed and reaped before the error is returned.
pub(crate) fn spawn_workers(
    commands: impl IntoIterator<Item = (usize, Command)>,
) -> Result<Vec<(usize, Child)>> {
    let mut workers = Vec::new();

    for (rank, mut command) in commands {
        match command.spawn() {
            Ok(child) => workers.push((rank, child)),
            Err(e) => {
                stop_workers(workers);
                return Err(anyhow::Error::new(e).context(format!("failed to start rank {rank}")));
            }
        }
    }

    Ok(workers)
}

fn stop_workers(workers: Vec<(usize, Child)>) {
    for (rank, mut child) in workers {
        if let Err(e) = child.kill().and_then(|_| child.wait()) {
            warn!("failed to stop rank {rank}: {e}");
        }
    }
}

/// The command line for a worker process. The kernel is passed explicitly so
/// every rank convolves with exactly the coordinator's coefficients.
pub(crate) fn worker_args(
    args: &DistributedArgs,
    kernel: &Kernel,
    rank: usize,
    coordinator: SocketAddr,
) -> Vec<OsString> {
    let mut argv: Vec<OsString> = vec![
        "distributed".into(),
        format!("--world-size={}", args.world_size).into(),
        format!("--rank={rank}").into(),
        format!("--coordinator={coordinator}").into(),
        format!("--connect-timeout={}", args.connect_timeout).into(),
    ];

    if let Some(threads) = args.threads {
        argv.push(format!("--threads={threads}").into());
    }

    // everything after this is positional, whatever it starts with
    argv.push("--".into());
    argv.push(args.filter.input.clone().into());
    argv.push(args.filter.output.clone().into());
    argv.push(kernel.width.to_string().into());
    argv.push(kernel.height.to_string().into());
    argv.extend(
        kernel
            .coefficients
            .iter()
            .map(|c| OsString::from(c.to_string())),
    );

    argv
}
