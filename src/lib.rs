//! TEPPAN — Risk-Controlled Stake Sizing and Bankroll Engine
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod backtest;
pub mod commands;
pub mod config;
pub mod engine;
pub mod ledger;
pub mod risk;
pub mod settlement;
pub mod staking;
pub mod storage;
pub mod types;
