// src/lib.rs

//! cinesync: multi-source movie catalog reconciliation crawler.

pub mod config;
pub mod error;
pub mod models;
pub mod notify;
pub mod reconcile;
pub mod sources;
pub mod store;
pub mod sync;
pub mod utils;
