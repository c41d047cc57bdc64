pub mod connection;
pub mod cosmos;
pub mod memory;
pub mod store;

pub use connection::connect;
pub use cosmos::{CosmosDocumentStore, CosmosSettings};
pub use memory::InMemoryDocumentStore;
pub use store::{DocumentPage, DocumentStore, PageRequest, StoreError};
