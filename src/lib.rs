// src/lib.rs
pub mod config;
pub mod errors;
pub mod snapshot;
pub mod question;
pub mod comparator;
pub mod engine;
pub mod session;
pub mod resolvers;
pub mod runner;
pub mod models;
pub mod database;
pub mod banner;
pub mod api;
