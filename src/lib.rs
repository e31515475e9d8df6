// Re-export modules for benchmarking and testing
pub mod display;
pub mod error;
pub mod http;
pub mod parser;
pub mod process_lookup;
pub mod processor;
pub mod router;
pub mod tracer;
pub mod types;
