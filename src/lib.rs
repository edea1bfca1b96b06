pub mod api;
pub mod config;
pub mod db;
pub mod sampling;
pub mod sensors;
