pub mod approval;
pub mod config;
pub mod dedup;
pub mod error;
pub mod io;
pub mod item;
pub mod paths;
pub mod record;
pub mod store;

pub use error::{CoreError, Result};
