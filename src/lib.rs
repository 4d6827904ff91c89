//! Photo storage service: accounts, per-owner private buckets, a shared public
//! bucket, and signed download links.

pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod state;
pub mod storage;
