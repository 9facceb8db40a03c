pub mod download;
pub mod playerdb;
pub mod query;
pub mod rcon;
