// handlers/public/mod.rs - Public handlers (no authentication required)
//
// Security Level: None
// Middleware: global chain only

pub mod health;

pub use health::{Health, MetricsExport};
pub use test::test;
