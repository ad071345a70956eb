//! Shared building blocks for the zfs clone manager: error taxonomy,
//! configuration, logging, property typing, the dataset model and the
//! `DatasetProvider` seam implemented by the system-backed crate.

pub mod config;
pub mod dataset;
pub mod error;
pub mod hierarchy;
pub mod logging;
pub mod property;
pub mod provider;

pub use config::ZcmConfig;
pub use dataset::{
    ChangeType, CloneOptions, CreateOptions, DatasetKind, DatasetRecord, DestroyOptions,
    DiffOptions, DiffRecord, FileType, ListOptions, SetOptions, TypeFilter,
    DEFAULT_LIST_PROPERTIES,
};
pub use error::{ZcmError, ZcmResult};
pub use property::{type_property, PropertyValue, MANAGEMENT_PATH_PROPERTY};
pub use provider::DatasetProvider;
