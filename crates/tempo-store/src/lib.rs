pub mod error;
pub mod memory;
pub mod sqlite;
pub mod store;

pub use error::{StoreError, StoreOperation};
pub use memory::MemoryTimerStore;
pub use sqlite::SqliteTimerStore;
pub use store::TimerStore;
