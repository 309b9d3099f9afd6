//! Aggregates the per-branch preview builds of a GitHub repository into one static site.
//!
//! The site root serves the latest release; each fresh branch build is served below
//! `branches/<owner>/<branch>/`, and `branches/index.html` lists every known branch.

pub mod directory;
pub mod env;
pub mod error;
pub mod framework;
pub mod github;
pub mod layout;
pub mod pulls;
pub mod reconcile;
pub mod release;
pub mod render;
pub mod report;
pub mod site;
pub mod status;
pub mod transactions;
pub mod workflow;
