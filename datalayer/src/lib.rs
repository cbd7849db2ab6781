//! The datalayer core: configuration, connection lifecycle, query
//! dispatch, row mapping, continuation tokens, change extraction and
//! write-back. Everything here is transport-agnostic; the `web` crate
//! is the only thing that knows about HTTP.

pub mod change_extractor;
pub mod codec;
pub mod config;
pub mod connection_manager;
pub mod entity;
pub mod fmt_util;
pub mod query_builder;
pub mod row_mapper;
pub mod token;
pub mod writeback;

pub use change_extractor::{change_set, dataset_exists, list_datasets, DatasetEndpoint};
pub use config::{ColumnMapping, Datalayer, FieldMapping, PostMapping, TableMapping};
pub use connection_manager::ConnectionManager;
pub use entity::{Entity, PropValue, RefValue};
pub use query_builder::{DatasetRequest, QueryKind};
