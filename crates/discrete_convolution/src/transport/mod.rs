// Point-to-point message passing between ranks.

pub mod local;
pub mod tcp;

pub use local::LocalCommunicator;
pub use tcp::TcpCommunicator;

use crate::error::Result;

/// The rank that gathers the row blocks.
pub const COORDINATOR: usize = 0;

/// A member of a world of `world_size` ranks that can exchange byte messages.
///
/// Messages between a given pair of ranks arrive in the order they were
/// sent. Every call blocks until it completes or fails; there is no timeout
/// or cancellation once a world is up.
pub trait Communicator {
    fn rank(&self) -> usize;

    fn world_size(&self) -> usize;

    /// Sends `data` to `dest`, tagged with this rank.
    fn send(&mut self, dest: usize, data: &[u8]) -> Result<()>;

    /// Receives the next message from `source` into `buf`.
    ///
    /// Fails with a transport failure unless the message carries `source`'s
    /// tag and is exactly `buf.len()` bytes long.
    fn recv(&mut self, source: usize, buf: &mut [u8]) -> Result<()>;
}
