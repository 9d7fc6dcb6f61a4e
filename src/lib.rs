pub mod catalog;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod memory;
pub mod model;
pub mod reconcile;
pub mod run;
pub mod sink;
pub mod source;
