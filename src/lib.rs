pub mod catalog;
pub mod command;
pub mod config;
pub mod context;
pub mod flow;
pub mod logger;
pub mod persistence;
pub mod realtime;
pub mod schema;
