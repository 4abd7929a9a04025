pub mod access_log;
pub mod cors;
