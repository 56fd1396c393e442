//! Loan state: model, loader, codec and split-key cache
//!
//! The working set of one proposal flows through three tiers: the system of
//! record (loader), the remote split-key store (cache) and the
//! request-scoped copy handed to the evaluator. The cache owns every
//! mutation; evaluators only ever read.

mod cache;
mod codec;
mod loader;
mod model;

pub use cache::{
    MemoryStateStore, RedisStateStore, StateCache, StateStore, STATE_TTL,
};
pub use codec::{decode, encode, EncodedState, StateParts};
pub use loader::StateLoader;
pub use model::{EntityGraph, EntityRef, LoanState};
