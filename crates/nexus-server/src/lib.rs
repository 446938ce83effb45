pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod storage;
pub mod store;

pub use config::Config;
pub use db::DbPool;
