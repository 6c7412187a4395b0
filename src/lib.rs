pub mod api;
pub mod app;
pub mod config;
pub mod controller;
pub mod error;
pub mod export;
pub mod filter;
pub mod logging;
pub mod map;
pub mod model;
pub mod poller;
pub mod runtime;
pub mod ui;
