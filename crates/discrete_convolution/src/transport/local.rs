// An in-process world: ranks are threads, messages travel over channels.

use std::collections::{HashMap, VecDeque};
use std::sync::mpsc::{self, Receiver, Sender};

use crate::error::{ConvolutionError, Result};
use crate::transport::Communicator;

// (sender rank, payload)
type Message = (usize, Vec<u8>);

pub struct LocalCommunicator {
    rank: usize,
    world_size: usize,
    // indexed by rank; no channel to ourselves
    peers: Vec<Option<Sender<Message>>>,
    inbox: Receiver<Message>,
    // messages that arrived while we were waiting on another rank
    pending: HashMap<usize, VecDeque<Vec<u8>>>,
}

impl LocalCommunicator {
    /// Creates a connected world; the communicator at index `i` is rank `i`.
    pub fn world(world_size: usize) -> Result<Vec<Self>> {
        if world_size == 0 {
            return Err(ConvolutionError::InvalidTopology {
                rank: 0,
                world_size,
            });
        }

        let (senders, receivers): (Vec<_>, Vec<_>) =
            (0..world_size).map(|_| mpsc::channel::<Message>()).unzip();

        let world = receivers
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| Self {
                rank,
                world_size,
                peers: senders
                    .iter()
                    .enumerate()
                    .map(|(peer, sender)| (peer != rank).then(|| sender.clone()))
                    .collect(),
                inbox,
                pending: HashMap::new(),
            })
            .collect();

        Ok(world)
    }

    fn next_from(&mut self, source: usize) -> Result<Vec<u8>> {
        if let Some(payload) = self
            .pending
            .get_mut(&source)
            .and_then(VecDeque::pop_front)
        {
            return Ok(payload);
        }

        loop {
            let (sender, payload) = self.inbox.recv().map_err(|_| {
                ConvolutionError::TransportFailure(format!(
                    "rank {}: every peer hung up before rank {source} sent its message",
                    self.rank
                ))
            })?;

            if sender == source {
                return Ok(payload);
            }

            self.pending.entry(sender).or_default().push_back(payload);
        }
    }

    fn check_peer(&self, peer: usize) -> Result<()> {
        if peer >= self.world_size || peer == self.rank {
            return Err(ConvolutionError::TransportFailure(format!(
                "rank {} has no channel to rank {peer} in a world of size {}",
                self.rank, self.world_size
            )));
        }
        Ok(())
    }
}

impl Communicator for LocalCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn world_size(&self) -> usize {
        self.world_size
    }

    fn send(&mut self, dest: usize, data: &[u8]) -> Result<()> {
        self.check_peer(dest)?;

        let delivered = self.peers[dest]
            .as_ref()
            .is_some_and(|sender| sender.send((self.rank, data.to_vec())).is_ok());

        if !delivered {
            return Err(ConvolutionError::TransportFailure(format!(
                "rank {dest} is gone, cannot deliver {} bytes from rank {}",
                data.len(),
                self.rank
            )));
        }

        Ok(())
    }

    fn recv(&mut self, source: usize, buf: &mut [u8]) -> Result<()> {
        self.check_peer(source)?;

        let payload = self.next_from(source)?;
        if payload.len() != buf.len() {
            return Err(ConvolutionError::TransportFailure(format!(
                "expected {} bytes from rank {source}, received {}",
                buf.len(),
                payload.len()
            )));
        }

        buf.copy_from_slice(&payload);
        Ok(())
    }
}
