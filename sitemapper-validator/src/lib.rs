pub mod error;
pub mod gate;
pub mod job;
pub mod log;
pub mod result;
pub mod service;
pub mod validator;

pub use error::ValidateError;
pub use job::{JobState, JobStatus, JobStore};
pub use result::{Outcome, ValidationRow};
pub use service::ValidationService;
pub use validator::{Validator, ValidatorConfig};
