pub mod system;
pub mod triggers;
