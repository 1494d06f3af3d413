pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Storage(#[from] anl_storage::Error),
	#[error(transparent)]
	Service(#[from] anl_service::Error),
}
