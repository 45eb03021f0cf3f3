pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod services;
pub mod session;
pub mod state;
pub mod sync;
