//! Cart Repositories

mod items;
mod lease;
mod session;

pub(crate) use items::KvCartItemsRepository;
pub(crate) use lease::{KvLeaseRepository, Lease, LeaseSettings};
pub(crate) use session::KvSessionRepository;
