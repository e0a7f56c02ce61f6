//! Shared service layer.

mod offline_store;

pub use offline_store::OfflineStore;
