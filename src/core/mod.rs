//! Core mapping and session abstractions
//!
//! This module contains the store-independent pieces: the value and row
//! model, type conversions, mapper resolution, and the transactional
//! session protocol the backends implement.

pub mod convert;
pub mod error;
pub mod fetch;
pub mod mapper;
pub mod query;
pub mod registry;
pub mod row;
pub mod session;
pub mod value;

pub use convert::{default_conversions, TypeConversions};
pub use error::{Error, Result};
pub use mapper::{
    ErasedRowMapper, FieldSpec, Mapped, MapperSource, Parts, RecordDescriptor, RowMapper,
    StructuralMapper, TypeDescriptor,
};
pub use query::{Outcome, Query};
pub use registry::{MapperRegistry, MapperRegistryBuilder};
pub use row::{Column, Row, RowBuilder};
pub use session::{
    DataSource, JobTracker, ParamStream, RowStream, Session, StreamingJob, SuspendingDataSource,
    SuspendingSession,
};
pub use value::{FromValue, Value, ValueKind};
