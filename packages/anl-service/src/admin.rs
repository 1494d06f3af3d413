use serde::Serialize;

use anl_storage::{outbox, queries};

use crate::{AnlService, Result};

#[derive(Clone, Debug, Serialize)]
pub struct RebuildReport {
	pub enqueued: u64,
}

impl AnlService {
	/// Queues a `VECTORIZE` job for every user with a non-empty trait map.
	pub async fn rebuild_vectors(&self) -> Result<RebuildReport> {
		let user_ids = queries::list_user_ids_with_traits(&self.db).await?;
		let payload = serde_json::json!({ "reason": "rebuild" });
		let mut enqueued = 0_u64;

		for user_id in user_ids {
			outbox::enqueue_job(&self.db, user_id, outbox::OP_VECTORIZE, &payload).await?;

			enqueued += 1;
		}

		tracing::info!(enqueued, "Vector rebuild queued.");

		Ok(RebuildReport { enqueued })
	}
}
