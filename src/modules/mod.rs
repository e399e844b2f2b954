pub mod system;
pub mod team;
