pub mod process;
pub mod session;
