pub mod configuration;
pub mod errors;
pub mod providers;
pub mod token_counter;
pub mod tools;
