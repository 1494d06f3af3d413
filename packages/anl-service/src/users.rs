use serde::Deserialize;
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use anl_domain::{age, chart};
use anl_storage::{models::NewUser, queries};

use crate::{AnlService, Error, Result};

/// Registration data owned by the surrounding app. The chart comes from an external chart
/// provider and is stored as-is.
#[derive(Clone, Debug, Deserialize)]
pub struct UpsertUserRequest {
	pub user_id: Uuid,
	pub display_name: Option<String>,
	pub gender: Option<String>,
	pub birthdate: Option<String>,
	pub age: Option<u32>,
	pub chart: Option<Value>,
	#[serde(default = "default_discoverable")]
	pub discoverable: bool,
	pub profile_pic_url: Option<String>,
	#[serde(default, with = "anl_domain::time_serde::option")]
	pub last_active_at: Option<OffsetDateTime>,
}

impl AnlService {
	pub async fn upsert_user(&self, req: UpsertUserRequest) -> Result<()> {
		if req.user_id.is_nil() {
			return Err(Error::InvalidRequest { message: "user_id must not be nil.".to_string() });
		}

		let birthdate = non_blank(req.birthdate);

		if let Some(raw) = birthdate.as_deref()
			&& age::parse_birthdate(raw).is_none()
		{
			return Err(Error::InvalidRequest {
				message: "birthdate must start with YYYY-MM-DD.".to_string(),
			});
		}

		let age = req
			.age
			.map(|age| {
				i32::try_from(age).map_err(|_| Error::InvalidRequest {
					message: "age is out of range.".to_string(),
				})
			})
			.transpose()?;
		let chart = req
			.chart
			.filter(|raw| !matches!(chart::parse_chart(raw), Err(chart::ChartIssue::Missing)));
		let user = NewUser {
			user_id: req.user_id,
			display_name: non_blank(req.display_name),
			gender: non_blank(req.gender),
			birthdate,
			age,
			chart,
			discoverable: req.discoverable,
			profile_pic_url: non_blank(req.profile_pic_url),
			last_active_at: req.last_active_at,
		};

		queries::upsert_user(&self.db, &user).await?;

		tracing::info!(user_id = %req.user_id, "User upserted.");

		Ok(())
	}
}

fn default_discoverable() -> bool {
	true
}

fn non_blank(value: Option<String>) -> Option<String> {
	value.map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}
