pub mod eval;
pub mod executor;
pub mod mem;
pub mod persistent;
pub mod snapshot;
pub mod traits;
pub mod wal;

pub use executor::{execute, PageResult, Pagination};
pub use mem::InMemoryStore;
pub use persistent::PersistentStore;
pub use traits::*;
