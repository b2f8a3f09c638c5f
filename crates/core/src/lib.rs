pub mod audit;
pub mod config;
pub mod directory;
pub mod domain;
pub mod errors;
pub mod lifecycle;
pub mod session;
pub mod store;

pub use audit::{AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use directory::{Directory, DirectoryError};
pub use domain::identity::{Identity, Role};
pub use domain::request::{
    AssignedRequests, Decision, ExpenseDraft, ExpenseRequest, RequestStatus, RowId, StoredRequest,
};
pub use errors::{ApplicationError, DomainError, InterfaceError, ValidationError};
pub use lifecycle::{LifecycleEngine, LifecycleSettings};
pub use session::{Portal, Session};
pub use store::{InMemoryRecordStore, RecordStore, Revision, StoreError, TableSnapshot};
