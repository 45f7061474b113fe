//! Shared persistence and configuration for the Ascend daemon.
//!
//! The stores are plain functions over a `rusqlite::Connection` so the
//! settlement transaction can compose them inside one atomic unit; the
//! async [`db::Db`] handle owns the connection and runs closures on the
//! blocking pool.

pub mod activity_store;
pub mod config;
pub mod db;
pub mod level_store;
pub mod settle;
pub mod subject_store;
pub mod xp_store;

pub use config::Config;
pub use db::{Db, DbLocation};
