//! Nestling storefront library.
//!
//! This crate provides the storefront, registry and admin web application
//! as a library, allowing it to be tested and driven from the CLI.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod filters;
pub mod integrations;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
