// src/lib.rs
// ────────────────────────────────────────────────────────────────────────────
// Public library entry point.  Re-export everything for both `main.rs` and
// integration tests.

pub mod config;
pub mod logging;
pub mod monitor;
pub mod render;
pub mod sim;
