pub mod request;

pub use request::QueryRequest;
