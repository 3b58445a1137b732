//! Per-replica counters.

/// Identity and clocks of one replica, threaded explicitly through
/// translation so several replicas can live in one process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplicaContext {
    pub client_id: String,
    /// Counter of the next local mutation.
    pub client_counter: u64,
    /// Lamport clock for formatting marks.
    pub lamport: u64,
}

impl ReplicaContext {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_counter: 0,
            lamport: 0,
        }
    }

    /// Take the counter for a new mutation.
    pub fn next_counter(&mut self) -> u64 {
        let counter = self.client_counter;
        self.client_counter += 1;
        counter
    }

    /// Timestamp for a new local mark.
    pub fn tick(&mut self) -> u64 {
        self.lamport += 1;
        self.lamport
    }

    /// Account for a timestamp seen on a remote mark.
    pub fn observe(&mut self, timestamp: u64) {
        self.lamport = self.lamport.max(timestamp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let mut ctx = ReplicaContext::new("a");
        assert_eq!(ctx.next_counter(), 0);
        assert_eq!(ctx.next_counter(), 1);
        assert_eq!(ctx.tick(), 1);
        ctx.observe(7);
        assert_eq!(ctx.tick(), 8);
        ctx.observe(3);
        assert_eq!(ctx.tick(), 9);
    }
}
