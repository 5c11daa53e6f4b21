pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Connection to the search endpoint failed: {message}")]
	ConnectionFailed { message: String, errno: Option<i32> },
	#[error("Smoke test query failed: {message}")]
	SmokeTestFailed { message: String, errno: Option<i32> },
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Search backend rejected the credentials: {message}")]
	Authentication { message: String },
	#[error("Search backend error: {message}")]
	Backend { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
}
impl Error {
	pub fn errno(&self) -> Option<i32> {
		match self {
			Self::ConnectionFailed { errno, .. } | Self::SmokeTestFailed { errno, .. } => *errno,
			_ => None,
		}
	}
}

impl From<ranklab_storage::Error> for Error {
	fn from(err: ranklab_storage::Error) -> Self {
		match err {
			ranklab_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
			ranklab_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			ranklab_storage::Error::NotFound(message) => Self::NotFound { message },
			ranklab_storage::Error::InvalidData(message) => Self::Storage { message },
		}
	}
}

impl From<ranklab_backends::Error> for Error {
	fn from(err: ranklab_backends::Error) -> Self {
		match err {
			ranklab_backends::Error::Authentication { message } => Self::Authentication { message },
			err => Self::Backend { message: err.to_string() },
		}
	}
}

impl From<ranklab_domain::credentials::Error> for Error {
	fn from(err: ranklab_domain::credentials::Error) -> Self {
		Self::Storage { message: format!("Search endpoint credentials: {err}") }
	}
}
