use ranklab_domain::endpoint::BackendType;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Http(#[from] reqwest::Error),
	#[error("Authentication failed: {message}")]
	Authentication { message: String },
	#[error("Query expansion failed: {message}")]
	Expansion { message: String },
	#[error("Search backend returned status {status}: {message}")]
	Backend { status: u16, message: String },
	#[error("Search endpoint type {backend} is not implemented.")]
	Unimplemented { backend: BackendType },
	#[error("Invalid backend response: {message}")]
	InvalidResponse { message: String },
	#[error("Invalid query template: {message}")]
	InvalidTemplate { message: String },
}
impl Error {
	/// OS error number of the underlying socket failure, if the request never got a response.
	pub fn errno(&self) -> Option<i32> {
		match self {
			Self::Http(err) => os_errno(err),
			_ => None,
		}
	}

	pub(crate) fn invalid_response(message: impl Into<String>) -> Self {
		Self::InvalidResponse { message: message.into() }
	}

	pub(crate) fn invalid_template(message: impl Into<String>) -> Self {
		Self::InvalidTemplate { message: message.into() }
	}
}

const AUTH_PATTERNS: [&str; 3] = ["security_exception", "unauthorized", "authenticat"];
const MAX_MESSAGE_CHARS: usize = 500;

/// Maps a non-2xx backend response to an error, separating authentication failures.
pub(crate) fn classify_failure(status: u16, body: &str) -> Error {
	let message = failure_message(body);
	let lowered = body.to_lowercase();

	if status == 401 || status == 403 || AUTH_PATTERNS.iter().any(|p| lowered.contains(p)) {
		return Error::Authentication { message };
	}

	Error::Backend { status, message }
}

/// Pulls the human readable reason out of Elasticsearch and Solr error bodies.
fn failure_message(body: &str) -> String {
	let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
	let reason = parsed.as_ref().and_then(|json| {
		let error = json.get("error")?;

		error
			.get("root_cause")
			.and_then(|causes| causes.get(0))
			.and_then(|cause| cause.get("reason"))
			.or_else(|| error.get("reason"))
			.or_else(|| error.get("msg"))
			.and_then(|reason| reason.as_str())
			.or_else(|| error.as_str())
			.map(str::to_string)
	});

	match reason {
		Some(reason) => reason,
		None => {
			let trimmed = body.trim();

			if trimmed.is_empty() {
				"empty response body".to_string()
			} else {
				trimmed.chars().take(MAX_MESSAGE_CHARS).collect()
			}
		},
	}
}

fn os_errno(err: &(dyn std::error::Error + 'static)) -> Option<i32> {
	let mut current = Some(err);

	while let Some(err) = current {
		if let Some(code) = err.downcast_ref::<std::io::Error>().and_then(|io| io.raw_os_error()) {
			return Some(code);
		}

		current = err.source();
	}

	None
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn status_401_is_an_authentication_failure() {
		assert!(matches!(classify_failure(401, ""), Error::Authentication { .. }));
	}

	#[test]
	fn security_exception_body_is_an_authentication_failure() {
		let reason = "missing authentication credentials";
		let body = serde_json::json!({
			"error": {
				"root_cause": [{ "type": "security_exception", "reason": reason }],
				"type": "security_exception",
				"reason": reason
			},
			"status": 500
		});

		match classify_failure(500, &body.to_string()) {
			Error::Authentication { message } =>
				assert_eq!(message, "missing authentication credentials"),
			other => panic!("Unexpected error: {other:?}"),
		}
	}

	#[test]
	fn solr_error_message_is_extracted() {
		let body = r#"{"error":{"msg":"undefined field foo","code":400}}"#;

		match classify_failure(400, body) {
			Error::Backend { status, message } => {
				assert_eq!(status, 400);
				assert_eq!(message, "undefined field foo");
			},
			other => panic!("Unexpected error: {other:?}"),
		}
	}

	#[test]
	fn plain_text_body_is_kept() {
		match classify_failure(502, "Bad Gateway\n") {
			Error::Backend { message, .. } => assert_eq!(message, "Bad Gateway"),
			other => panic!("Unexpected error: {other:?}"),
		}
	}
}
