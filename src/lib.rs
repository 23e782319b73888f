//! # Lodestone - Milestone Progress & Claim Engine
//!
//! Lodestone tracks long-running resource-gathering milestones for game
//! servers: per-player counters keyed by resource type, shared progress
//! pools across linked resource groups, threshold crossing detection, and
//! one-time claimable rewards. It is built for bursty concurrent updates
//! (many gather events per player per second, from multiple code paths)
//! against a persistence gateway that only offers asynchronous load/save.
//!
//! ## Guarantees
//!
//! - **No lost updates**: every read-modify-write cycle for a player runs
//!   under that player's serialized critical section.
//! - **No double grants**: claims are idempotent; a level pays out at most
//!   once between administrative resets.
//! - **No phantom rewards**: side effects fire strictly after the
//!   triggering write is confirmed durable, never before, never on failure.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use lodestone::config::Config;
//! use lodestone::milestone::{MilestoneEngine, MilestoneRegistry};
//! use lodestone::storage::SledGateway;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("lodestone.toml").await?;
//!     let (registry, _issues) = MilestoneRegistry::load(&config);
//!     let gateway = Arc::new(SledGateway::open(&config.storage.data_dir)?);
//!     let engine = MilestoneEngine::new(registry, gateway);
//!
//!     // A gather event from the host server:
//!     if let Some(receipt) = engine.record_gather("steve", "iron_ore", 1).await? {
//!         for crossed in &receipt.crossed {
//!             println!("reached {} level {}", crossed.resource, crossed.level);
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`milestone`] - the engine: registry, progress store, threshold
//!   evaluation, claim coordination, per-player update serialization
//! - [`storage`] - the asynchronous persistence gateway and its sled and
//!   in-memory implementations
//! - [`config`] - TOML configuration schema and loading
//! - [`validation`] - resource key, player name, and template validation
//! - [`metrics`] - process-wide engine counters
//! - [`logutil`] - log line sanitization helpers

pub mod config;
pub mod logutil;
pub mod metrics;
pub mod milestone;
pub mod storage;
pub mod validation;
