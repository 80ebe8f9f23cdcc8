//! Installed package bookkeeping
//!
//! Receipts record what was installed where, so later runs can detect
//! reinstalls and upgrades, list packages, and uninstall safely.

mod receipt;
mod repository;

pub use receipt::InstalledArtifact;
pub use repository::ReceiptStore;
