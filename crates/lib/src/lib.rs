//! resforge-lib: two-phase build pipeline for contracts that embed other contracts.
//!
//! A workspace holds ordinary modules and embedding modules. An embedding
//! module bundles the compiled bytecode of other modules, read from the
//! Resource Store at compile time, so a single build of the whole workspace
//! leaves every embedding binary one generation behind. This crate runs the
//! build twice in a fixed order and keeps a ledger proving the result is fresh:
//!
//! - `workspace`: module model and build scopes
//! - `build`: the Workspace Builder and the `Compiler` seam (Cargo in production)
//! - `collect`: stages binaries from a build output into the store
//! - `store`: the Resource Store, its manifest and run lock
//! - `pipeline`: the Embedding Rebuild Trigger and the freshness verifier

pub mod build;
pub mod collect;
pub mod config;
pub mod consts;
pub mod pipeline;
pub mod store;
pub mod util;
pub mod workspace;
