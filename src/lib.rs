pub mod app;
pub mod artwork;
pub mod catalog;
pub mod error;
pub mod logging;
pub mod player;

pub use error::{Error, Result};
