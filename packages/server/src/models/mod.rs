pub mod problem;
pub mod shared;
