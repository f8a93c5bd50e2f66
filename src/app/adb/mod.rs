pub mod bridge;
pub mod parse;
pub mod runner;
