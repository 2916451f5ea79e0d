//! Request and response types shared by the dispatcher and its workers.

mod request;
mod response;

pub use hyper::{HeaderMap, Method, StatusCode, Uri};
pub use request::EdgeRequest;
pub use response::EdgeResponse;
