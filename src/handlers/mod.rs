//! API Handlers

pub mod products;
