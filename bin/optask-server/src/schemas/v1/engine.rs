use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct EnginesResponse {
    /// Names accepted in the `solver` field of a submission.
    pub engines: Vec<String>,
    /// Engine used when a submission does not name one.
    pub default_engine: String,
}
