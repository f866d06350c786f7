//! # Silo coordinator
//!
//! The coordinator half of the Silo federated learning pipeline. It owns
//! the single live [`engine::GlobalModel`], combines participant updates
//! into new global weights under a weighted-average policy, and persists
//! aggregation results as immutable, documented releases.
//!
//! - [`engine`]: the aggregation engine. Rounds are fail-closed: either
//!   every update of a round decrypts and validates, or the round is
//!   rejected and the global model is left untouched.
//! - [`registry`]: the versioned model registry — write-once releases keyed
//!   by `(model_name, version)`, plus generated model cards.
//! - [`storage`]: the persistence seam the registry writes through.
//! - [`settings`]: loading and validation of the coordinator configuration.
//!
//! The wire protocol that moves encrypted updates between participants and
//! the coordinator is out of scope: updates enter the engine as opaque
//! blobs fetched from an external store.
#[macro_use]
extern crate tracing;

pub mod engine;
pub mod registry;
pub mod settings;
pub mod storage;
