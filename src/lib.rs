pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;
pub mod keystore;
pub mod metrics;
pub mod middleware;
pub mod policy;
pub mod web;
