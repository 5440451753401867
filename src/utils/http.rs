use serde::{Deserialize, Serialize};

/// Response envelope shared by all handlers. `code` 0 means success;
/// non-zero mirrors the nearest HTTP status for the failure.
#[derive(Debug, Deserialize, Serialize)]
pub struct HttpResponse<T> {
    pub code: u16,
    pub message: String,
    pub body: T,
}

impl<T> HttpResponse<T> {
    pub fn new(code: u16, message: String, body: T) -> Self {
        Self { code, message, body }
    }

    pub fn ok(message: String, body: T) -> Self {
        Self::new(0, message, body)
    }
}
