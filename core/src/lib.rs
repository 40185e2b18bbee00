pub mod export;
pub mod output;
pub mod storage;
