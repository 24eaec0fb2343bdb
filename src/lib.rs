// src/lib.rs

pub mod config;
pub mod poller;
pub mod server;
