pub mod registry;
pub mod storage;
pub mod tokens;
