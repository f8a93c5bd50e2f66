pub mod locator;
pub mod paths;
pub mod tools;
