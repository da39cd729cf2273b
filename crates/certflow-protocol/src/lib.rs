//! Dashboard API types
//!
//! Shared between the HTTP server and the CLI. Requests deserialize
//! leniently and are turned into validated values before any service call.

pub mod error;
pub mod types;

pub use error::{ProtocolError, ProtocolResult};
pub use types::{
    AuthStatus, CreateBatch, CreateBatchRequest, CreateBatchResponse, Credentials, ErrorCode,
    ErrorResponse, MessageResponse, RELAY_PARAMS, SendBatch, SendBatchRequest, SendBatchResponse,
    SheetDataRequest, SheetDataResponse, SheetTarget, Upload, UploadRequest,
};
