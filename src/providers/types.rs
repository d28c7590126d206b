pub mod chunk;
pub mod content;
pub mod message;
pub mod objectid;
