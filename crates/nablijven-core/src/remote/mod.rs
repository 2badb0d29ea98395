//! Remote detention API: request model, transport trait, and typed fetches

mod http;

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

use crate::models::{DayOfWeek, Detention, EntityKind, OperationType, PendingOperation, Student};

pub use http::HttpRemoteApi;

/// Failure of a single remote call
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Transport failure: no response was received
    #[error("Network failure: {0}")]
    Network(String),
    /// The API answered with a non-2xx status
    #[error("Remote rejected request: {message} ({status})")]
    Rejected { status: u16, message: String },
    /// The request could not be built or the response could not be read
    #[error("Invalid remote payload: {0}")]
    InvalidPayload(String),
    #[error("Invalid remote configuration: {0}")]
    InvalidConfiguration(String),
}

impl From<reqwest::Error> for RemoteError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            Self::InvalidPayload(error.to_string())
        } else {
            Self::Network(error.to_string())
        }
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

/// One call against the remote API, relative to its base URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRequest {
    pub method: HttpMethod,
    pub path: &'static str,
    pub query: Vec<(&'static str, String)>,
    pub body: Option<Value>,
}

impl RemoteRequest {
    #[must_use]
    pub const fn get(path: &'static str) -> Self {
        Self {
            method: HttpMethod::Get,
            path,
            query: Vec::new(),
            body: None,
        }
    }

    #[must_use]
    pub fn with_query(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.query.push((key, value.into()));
        self
    }

    #[must_use]
    pub const fn health() -> Self {
        Self::get("/health")
    }

    /// Replay request for a queued mutation.
    ///
    /// `delete` becomes `DELETE {endpoint}?id=..`, `update` a `PUT` and
    /// `create` a `POST` carrying the stored payload as JSON body.
    pub fn for_operation(operation: &PendingOperation) -> RemoteResult<Self> {
        let path = operation.entity.endpoint();
        let request = match operation.op_type {
            OperationType::Delete => {
                let id = operation.record_id().ok_or_else(|| {
                    RemoteError::InvalidPayload(format!(
                        "pending operation #{} has no record id",
                        operation.id
                    ))
                })?;
                Self {
                    method: HttpMethod::Delete,
                    path,
                    query: vec![("id", id.to_string())],
                    body: None,
                }
            }
            OperationType::Update => Self {
                method: HttpMethod::Put,
                path,
                query: Vec::new(),
                body: Some(operation.data.clone()),
            },
            OperationType::Create => Self {
                method: HttpMethod::Post,
                path,
                query: Vec::new(),
                body: Some(operation.data.clone()),
            },
        };
        Ok(request)
    }

    /// Path plus encoded query string, e.g. `/detentions?id=d42`
    #[must_use]
    pub fn path_and_query(&self) -> String {
        if self.query.is_empty() {
            return self.path.to_string();
        }

        let query = self
            .query
            .iter()
            .map(|(key, value)| format!("{key}={}", urlencoding::encode(value)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{query}", self.path)
    }
}

impl fmt::Display for RemoteRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method.as_str(), self.path_and_query())
    }
}

/// Transport to the remote API.
///
/// Implementations return the decoded JSON body of a 2xx response
/// (`Value::Null` for an empty body) and map everything else to
/// [`RemoteError`].
#[async_trait]
pub trait RemoteApi: Send + Sync {
    async fn execute(&self, request: &RemoteRequest) -> RemoteResult<Value>;
}

/// `GET /students[?day=]`
pub async fn fetch_students(
    api: &dyn RemoteApi,
    day: Option<DayOfWeek>,
) -> RemoteResult<Vec<Student>> {
    let mut request = RemoteRequest::get(EntityKind::Student.endpoint());
    if let Some(day) = day {
        request = request.with_query("day", day.as_str());
    }
    decode_list(api.execute(&request).await?)
}

/// `GET /detentions[?date=]`
pub async fn fetch_detentions(
    api: &dyn RemoteApi,
    date: Option<&str>,
) -> RemoteResult<Vec<Detention>> {
    let mut request = RemoteRequest::get(EntityKind::Detention.endpoint());
    if let Some(date) = date {
        request = request.with_query("date", date);
    }
    decode_list(api.execute(&request).await?)
}

fn decode_list<T: serde::de::DeserializeOwned>(value: Value) -> RemoteResult<Vec<T>> {
    if value.is_null() {
        return Ok(Vec::new());
    }
    serde_json::from_value(value).map_err(|error| RemoteError::InvalidPayload(error.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewPendingOperation, PendingId};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn pending(op: NewPendingOperation) -> PendingOperation {
        op.into_pending(PendingId::new(1), 0)
    }

    #[test]
    fn delete_maps_to_query_id() {
        let op = pending(NewPendingOperation::delete(EntityKind::Detention, "d42").unwrap());
        let request = RemoteRequest::for_operation(&op).unwrap();

        assert_eq!(request.method, HttpMethod::Delete);
        assert_eq!(request.body, None);
        assert_eq!(request.to_string(), "DELETE /detentions?id=d42");
    }

    #[test]
    fn create_and_update_carry_payload() {
        let student = Student::new("s1", "Jan", "2A", DayOfWeek::Maandag);
        let create = pending(NewPendingOperation::create_student(&student).unwrap());
        let request = RemoteRequest::for_operation(&create).unwrap();
        assert_eq!(request.to_string(), "POST /students");
        assert_eq!(
            request.body,
            Some(json!({"id": "s1", "name": "Jan", "grade": "2A", "day": "MAANDAG"}))
        );

        let detention = Detention::new("d1", 1, "2024-09-16", DayOfWeek::Maandag, "Jan - 2A");
        let update = pending(NewPendingOperation::update_detention(&detention).unwrap());
        let request = RemoteRequest::for_operation(&update).unwrap();
        assert_eq!(request.method, HttpMethod::Put);
        assert_eq!(request.path, "/detentions");
    }

    #[test]
    fn query_values_are_encoded() {
        let request = RemoteRequest::get("/students").with_query("id", "a b&c");
        assert_eq!(request.path_and_query(), "/students?id=a%20b%26c");
    }

    #[test]
    fn decode_list_treats_null_as_empty() {
        let students: Vec<Student> = decode_list(Value::Null).unwrap();
        assert!(students.is_empty());
        assert!(decode_list::<Student>(json!({"oops": true})).is_err());
    }
}
