pub mod order_store;

pub use order_store::{update_with, InMemoryOrderStore, OrderFilter, OrderStore};
