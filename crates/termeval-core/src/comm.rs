//! Abstract distributed-execution context.
//!
//! Trees never communicate. The context is handed to the calculator untouched
//! and used by the tree only to label diagnostics with the worker's rank.
//! Real deployments inject an MPI- or channel-backed implementation.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::id::Rank;

pub trait DistContext: Send + Sync {
    /// This worker's rank within the group.
    fn rank(&self) -> Rank;

    /// Number of workers in the group.
    fn size(&self) -> usize;

    /// Block until every worker has reached the barrier.
    fn barrier(&self) -> Result<()>;

    fn send(&self, dest: Rank, payload: &[u8]) -> Result<()>;

    fn recv(&self, src: Rank) -> Result<Vec<u8>>;
}

/// Single-process context: rank 0 of a group of one. Messages addressed to
/// rank 0 are queued and handed back by `recv` in FIFO order.
#[derive(Default)]
pub struct LocalContext {
    inbox: Mutex<VecDeque<Vec<u8>>>,
}

impl LocalContext {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DistContext for LocalContext {
    fn rank(&self) -> Rank {
        Rank::new(0)
    }

    fn size(&self) -> usize {
        1
    }

    fn barrier(&self) -> Result<()> {
        Ok(())
    }

    fn send(&self, dest: Rank, payload: &[u8]) -> Result<()> {
        if dest.get() != 0 {
            return Err(Error::Comm(format!("no such rank {dest} in a local context")));
        }
        let mut q = self
            .inbox
            .lock()
            .map_err(|_| Error::Comm("inbox poisoned".into()))?;
        q.push_back(payload.to_vec());
        Ok(())
    }

    fn recv(&self, src: Rank) -> Result<Vec<u8>> {
        if src.get() != 0 {
            return Err(Error::Comm(format!("no such rank {src} in a local context")));
        }
        let mut q = self
            .inbox
            .lock()
            .map_err(|_| Error::Comm("inbox poisoned".into()))?;
        q.pop_front()
            .ok_or_else(|| Error::Comm("recv on an empty local inbox".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_context_loops_back() {
        let ctx = LocalContext::new();
        assert_eq!(ctx.rank(), Rank::new(0));
        assert_eq!(ctx.size(), 1);
        ctx.barrier().unwrap();
        ctx.send(Rank::new(0), b"a").unwrap();
        ctx.send(Rank::new(0), b"b").unwrap();
        assert_eq!(ctx.recv(Rank::new(0)).unwrap(), b"a");
        assert_eq!(ctx.recv(Rank::new(0)).unwrap(), b"b");
        assert!(ctx.recv(Rank::new(0)).is_err());
        assert!(ctx.send(Rank::new(1), b"x").is_err());
    }
}
