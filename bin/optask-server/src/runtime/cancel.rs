use tracing::info;

use super::{CancelAck, RuntimeError};
use crate::entities::TaskStore;

/// Ask the runner of task `id` to stop.
///
/// Returns as soon as the flag is stored; the runner notices it within one
/// polling interval.  Repeated requests are harmless, and a request against
/// an already finished task changes nothing.
pub async fn cancel_task<S: TaskStore>(store: &S, id: &str) -> Result<CancelAck, RuntimeError> {
    let ack = store
        .request_cancel(id)
        .await?
        .ok_or_else(|| RuntimeError::NotFound(id.to_owned()))?;
    info!(task_id = %id, outcome = ack.as_str(), "cancellation requested");
    Ok(ack)
}
