pub mod error;
pub mod request;
pub mod result;
pub mod target;

pub use error::{CallError, ErrorClassifier, ErrorKind, GatewayError, Result, RetryPolicy};
pub use request::{CallOptions, CallRequest, CorrelationId};
pub use result::{AttemptRecord, CallOutcome, CallResult};
pub use target::ProviderTarget;
