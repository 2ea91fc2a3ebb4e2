pub mod schedule;
pub mod storage;
