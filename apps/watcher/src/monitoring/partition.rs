//! Static sharding of the endpoint registry across cooperating instances.
//!
//! Every instance must run with the same `count`; changing it requires a
//! restart of the whole fleet, otherwise an endpoint can end up with zero or
//! two owners.

use std::fmt;

use thiserror::Error;

use super::endpoint::Endpoint;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PartitionError {
    #[error("partition count must be at least 1, got {0}")]
    Count(i64),
    #[error("partition id {id} is out of range for partition count {count}")]
    OutOfRange { id: i64, count: i64 },
}

/// `(partition_count, partition_id)` pair owned by this process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    count: i64,
    id: i64,
}

impl Partition {
    pub fn new(count: i64, id: i64) -> Result<Self, PartitionError> {
        if count < 1 {
            return Err(PartitionError::Count(count));
        }
        if !(0..count).contains(&id) {
            return Err(PartitionError::OutOfRange { id, count });
        }
        Ok(Self { count, id })
    }

    /// The whole registry in one partition
    pub fn single() -> Self {
        Self { count: 1, id: 0 }
    }

    pub fn count(&self) -> i64 {
        self.count
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    /// `endpoint_id mod count == id`, with a non-negative remainder
    pub fn owns(&self, endpoint_id: i64) -> bool {
        endpoint_id.rem_euclid(self.count) == self.id
    }

    /// Keep the endpoints this partition owns, preserving input order
    pub fn assign(&self, registry: impl IntoIterator<Item = Endpoint>) -> Vec<Endpoint> {
        registry.into_iter().filter(|endpoint| self.owns(endpoint.id())).collect()
    }
}

impl Default for Partition {
    fn default() -> Self {
        Self::single()
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.id, self.count)
    }
}
