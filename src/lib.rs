//! Procure-to-pay reconciliation engine.
//!
//! Purchasing documents (orders, receipts, invoices, returns) move through a
//! declarative state machine, and invoice/return posting reconciles their
//! quantities and values against goods receipt and purchase order lines under
//! row-level locks.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod audit;
pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod logging;
pub mod rounding;
pub mod services;
pub mod state_machine;

use std::sync::Arc;

use sea_orm::DatabaseConnection;

/// Shared application state: pool, configuration and the wired services.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub services: services::AppServices,
}

impl AppState {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        deps: services::ServiceDependencies,
    ) -> Self {
        let services = services::AppServices::new(Arc::clone(&db), &config, deps);
        Self {
            db,
            config,
            services,
        }
    }
}
