pub mod auth;
pub mod error;
pub mod health;
pub mod identity;
pub mod memos;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod storage;

#[cfg(test)]
pub(crate) mod testing;

pub use error::ApiError;
pub use state::{AppState, AppStateInner};
