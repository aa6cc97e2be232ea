//! Fragment cache: best-effort, cost-bounded, TTL-based byte cache for
//! rendered page fragments and full pages.

pub mod keys;
pub(crate) mod lock;
pub mod store;
pub mod writer;

pub use keys::{CacheSetting, FULL_SEGMENT, fragment_key};
pub use store::FragmentStore;
pub use writer::FragmentCache;
