pub mod request_id;
pub mod security_headers;

pub use request_id::{RequestId, RequestIdExt};