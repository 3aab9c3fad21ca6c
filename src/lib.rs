pub mod access;
pub mod storage;
