pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("Qdrant error: {message}")]
	Qdrant { message: String },
}
impl From<sqlx::Error> for Error {
	fn from(err: sqlx::Error) -> Self {
		Self::Storage { message: err.to_string() }
	}
}
impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		Self::Storage { message: err.to_string() }
	}
}
impl From<anl_storage::Error> for Error {
	fn from(err: anl_storage::Error) -> Self {
		match err {
			anl_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
			anl_storage::Error::SerdeJson(inner) => Self::Storage { message: inner.to_string() },
			anl_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			anl_storage::Error::NotFound(message) => Self::NotFound { message },
			anl_storage::Error::Qdrant(inner) => Self::Qdrant { message: inner.to_string() },
		}
	}
}
impl From<anl_providers::Error> for Error {
	fn from(err: anl_providers::Error) -> Self {
		Self::Provider { message: err.to_string() }
	}
}
