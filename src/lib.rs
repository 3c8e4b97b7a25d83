pub mod config;
pub mod context;
pub mod error;
pub mod flows;
pub mod pairing;
pub mod protocol;
pub mod session;
pub mod store;
pub mod transport;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
