//! scalegrid-state — embedded state store for ScaleGrid.
//!
//! Backed by [redb](https://docs.rs/redb), keeps registered service
//! configs, ingested metric samples, reported instance counts and the
//! bounded log of issued scaling actions.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
