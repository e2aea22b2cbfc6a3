//! Parish donations - payment initiation and gateway reconciliation
//!
//! Donors pay parish campaigns through Pagar.me (credit card, PIX or boleto).
//! This crate creates the charges, keeps the donation ledger, and reconciles
//! it against the gateway's webhooks.

pub mod checkout;
pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod id;
pub mod models;
pub mod payments;
pub mod rate_limit;
pub mod reconcile;
