pub mod map;
pub mod store;
pub mod txn;

pub use map::StoreMap;
pub use store::Store;
pub use txn::{Transaction, TransactionEngine};
