// A multi-process world over TCP.
//
// The coordinator listens; every other rank connects to it and introduces
// itself with an empty frame carrying its rank. After that each connection
// carries frames of
//
//   [sender rank: u32 LE][payload length: u64 LE][payload]
//
// Only the coordinator has a connection to every rank, so workers can talk to
// the coordinator and nobody else.

use std::io::{self, ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info};

use crate::error::{ConvolutionError, Result};
use crate::transport::{COORDINATOR, Communicator};

const HEADER_LEN: usize = 12;
const RETRY_INTERVAL: Duration = Duration::from_millis(50);
const MIN_HELLO_WAIT: Duration = Duration::from_millis(1);

pub struct TcpCommunicator {
    rank: usize,
    world_size: usize,
    // indexed by rank
    streams: Vec<Option<TcpStream>>,
}

fn transport_failure(context: impl std::fmt::Display, err: io::Error) -> ConvolutionError {
    ConvolutionError::TransportFailure(format!("{context}: {err}"))
}

impl TcpCommunicator {
    /// Sets up rank 0 on an already bound listener and waits until all
    /// `world_size - 1` workers have connected, or `timeout` runs out.
    ///
    /// A peer that connects but does not send its hello before the deadline
    /// fails the setup as well.
    pub fn coordinator(
        listener: TcpListener,
        world_size: usize,
        timeout: Duration,
    ) -> Result<Self> {
        if world_size == 0 {
            return Err(ConvolutionError::InvalidTopology {
                rank: COORDINATOR,
                world_size,
            });
        }

        let mut streams: Vec<Option<TcpStream>> = (0..world_size).map(|_| None).collect();

        listener
            .set_nonblocking(true)
            .map_err(|e| transport_failure("configuring listener", e))?;

        let deadline = Instant::now() + timeout;
        let mut connected = 1;

        while connected < world_size {
            let (mut stream, peer) = match listener.accept() {
                Ok(accepted) => accepted,
                Err(e) if e.kind() == ErrorKind::WouldBlock && Instant::now() < deadline => {
                    thread::sleep(RETRY_INTERVAL);
                    continue;
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    return Err(ConvolutionError::TransportFailure(format!(
                        "only {connected} of {world_size} ranks connected within {timeout:?}"
                    )));
                }
                Err(e) => return Err(transport_failure("accepting worker", e)),
            };

            // a zero read timeout is rejected, so wait at least a moment
            let remaining = deadline
                .saturating_duration_since(Instant::now())
                .max(MIN_HELLO_WAIT);

            stream
                .set_nonblocking(false)
                .and_then(|_| stream.set_nodelay(true))
                .and_then(|_| stream.set_read_timeout(Some(remaining)))
                .map_err(|e| transport_failure(format!("configuring stream from {peer}"), e))?;

            let (rank, len) = read_header(&mut stream, &format!("hello from {peer}"))?;

            stream
                .set_read_timeout(None)
                .map_err(|e| transport_failure(format!("configuring stream from {peer}"), e))?;

            if len != 0 || rank == COORDINATOR || rank >= world_size || streams[rank].is_some() {
                return Err(ConvolutionError::TransportFailure(format!(
                    "unexpected hello from {peer}: rank {rank}, {len} bytes"
                )));
            }

            debug!("rank {rank} connected from {peer}");
            streams[rank] = Some(stream);
            connected += 1;
        }

        info!("coordinator: all {world_size} ranks connected");

        Ok(Self {
            rank: COORDINATOR,
            world_size,
            streams,
        })
    }

    /// Connects rank `rank` to the coordinator at `coordinator`, retrying
    /// until `timeout` runs out so workers may start before the coordinator
    /// listens.
    pub fn worker(
        coordinator: SocketAddr,
        rank: usize,
        world_size: usize,
        timeout: Duration,
    ) -> Result<Self> {
        if rank == COORDINATOR || rank >= world_size {
            return Err(ConvolutionError::InvalidTopology { rank, world_size });
        }

        let deadline = Instant::now() + timeout;

        let mut stream = loop {
            match TcpStream::connect(coordinator) {
                Ok(stream) => break stream,
                Err(e) if Instant::now() < deadline => {
                    debug!("rank {rank}: coordinator at {coordinator} not reachable yet ({e})");
                    thread::sleep(RETRY_INTERVAL);
                }
                Err(e) => {
                    return Err(transport_failure(
                        format!("rank {rank} connecting to {coordinator}"),
                        e,
                    ));
                }
            }
        };

        stream
            .set_nodelay(true)
            .map_err(|e| transport_failure("configuring stream", e))?;

        write_frame(&mut stream, rank, &[])
            .map_err(|e| transport_failure(format!("rank {rank} saying hello"), e))?;

        let mut streams: Vec<Option<TcpStream>> = (0..world_size).map(|_| None).collect();
        streams[COORDINATOR] = Some(stream);

        Ok(Self {
            rank,
            world_size,
            streams,
        })
    }

    fn stream(&mut self, peer: usize) -> Result<&mut TcpStream> {
        let (rank, world_size) = (self.rank, self.world_size);

        self.streams
            .get_mut(peer)
            .and_then(Option::as_mut)
            .ok_or_else(|| {
                ConvolutionError::TransportFailure(format!(
                    "rank {rank} has no connection to rank {peer} in a world of size {world_size}"
                ))
            })
    }
}

fn write_frame(stream: &mut TcpStream, rank: usize, payload: &[u8]) -> io::Result<()> {
    let rank = u32::try_from(rank).map_err(|e| io::Error::new(ErrorKind::InvalidInput, e))?;

    let mut header = [0u8; HEADER_LEN];
    header[..4].copy_from_slice(&rank.to_le_bytes());
    header[4..].copy_from_slice(&(payload.len() as u64).to_le_bytes());

    stream.write_all(&header)?;
    stream.write_all(payload)?;
    stream.flush()
}

fn read_header(stream: &mut TcpStream, context: &str) -> Result<(usize, usize)> {
    let mut header = [0u8; HEADER_LEN];
    stream
        .read_exact(&mut header)
        .map_err(|e| transport_failure(context, e))?;

    let rank = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
    let len = u64::from_le_bytes([
        header[4], header[5], header[6], header[7], header[8], header[9], header[10], header[11],
    ]);
    let len = usize::try_from(len).map_err(|_| {
        ConvolutionError::TransportFailure(format!("{context}: frame of {len} bytes is too large"))
    })?;

    Ok((rank, len))
}

impl Communicator for TcpCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn world_size(&self) -> usize {
        self.world_size
    }

    fn send(&mut self, dest: usize, data: &[u8]) -> Result<()> {
        let rank = self.rank;
        let stream = self.stream(dest)?;

        write_frame(stream, rank, data)
            .map_err(|e| transport_failure(format!("rank {rank} sending to rank {dest}"), e))
    }

    fn recv(&mut self, source: usize, buf: &mut [u8]) -> Result<()> {
        let rank = self.rank;
        let stream = self.stream(source)?;
        let context = format!("rank {rank} receiving from rank {source}");

        let (tag, len) = read_header(stream, &context)?;

        if tag != source {
            return Err(ConvolutionError::TransportFailure(format!(
                "{context}: frame is tagged with rank {tag}"
            )));
        }
        if len != buf.len() {
            return Err(ConvolutionError::TransportFailure(format!(
                "{context}: expected {} bytes, frame holds {len}",
                buf.len()
            )));
        }

        stream
            .read_exact(buf)
            .map_err(|e| transport_failure(&context, e))
    }
}
