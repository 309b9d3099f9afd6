//! Pre-made transactions.

#![cfg(feature = "transactions")]

mod download_and_extract_archive;
mod download_archive;
mod extract_archive;

pub use download_and_extract_archive::*;
pub use download_archive::*;
pub use extract_archive::*;
