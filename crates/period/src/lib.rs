//! `strata-period`: stratum classification and period reconciliation.
//!
//! Pure engine crate: receives pre-loaded records, returns classified and
//! reconciled results. Storage, queues and notification sit behind the
//! traits in [`pipeline`].

pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod input;
pub mod model;
pub mod pipeline;
pub mod reconcile;
pub mod runner;
pub mod summary;

pub use classify::classify;
pub use config::{MarkerVocabulary, ReconcileFields, StrataConfig};
pub use engine::{run, StrataResult};
pub use error::StrataError;
pub use model::{AnomalyPair, Batch, ClassifiedBatch, PeriodKey, Record, Reconciliation};
pub use reconcile::reconcile;
pub use runner::classify_batch;
