//! Core library for playback-history-agent
pub mod agent;
pub mod api;
pub mod config;
pub mod credentials;
pub mod db;
pub mod models;
pub mod poller;
pub mod refresher;
pub mod scheduler;
