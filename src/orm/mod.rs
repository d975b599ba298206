//! Minimal query layer used by the shortcuts.
//!
//! Models are plain `serde` structs mapped onto one table. A [`Manager`] is the
//! entry point for a model; it hands out [`QuerySet`]s that are built up with
//! equality filters and run against the model's connection alias.

pub mod error;
pub mod model;
pub mod queryset;

pub use error::{MAX_GET_RESULTS, OrmError, OrmResult};
pub use model::{IntoQuerySet, Manager, Model, ModelClass};
pub use queryset::{Filters, QuerySet};
