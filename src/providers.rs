pub mod base;
pub mod configs;
pub mod formatter;
pub mod interpreter;
pub mod stream;
pub mod types;
pub mod utils;
