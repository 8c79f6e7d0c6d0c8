pub mod store;

pub use store::ChatStore;
