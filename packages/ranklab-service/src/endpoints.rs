//! Search endpoint introspection used while authoring templates and rules.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, RanklabService, Result};
use ranklab_backends::{ConnectionStatus, Document, FieldFilters};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionTestRequest {
	pub search_endpoint_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldsRequest {
	pub search_endpoint_id: Uuid,
	#[serde(flatten)]
	pub filters: FieldFilters,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldsResponse {
	pub fields: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldValuesRequest {
	pub search_endpoint_id: Uuid,
	pub field: String,
	pub prefix: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldValuesResponse {
	pub values: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentsRequest {
	pub search_endpoint_id: Uuid,
	pub ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentsResponse {
	pub documents: Vec<Document>,
}

impl RanklabService {
	/// Backend failures are reported in the status rather than as an error.
	pub async fn test_endpoint_connection(
		&self,
		req: ConnectionTestRequest,
	) -> Result<ConnectionStatus> {
		let interface = self.interface_for(req.search_endpoint_id).await?;

		Ok(interface.test_connection().await)
	}

	pub async fn endpoint_fields(&self, req: FieldsRequest) -> Result<FieldsResponse> {
		let interface = self.interface_for(req.search_endpoint_id).await?;
		let fields = interface.get_fields(&req.filters).await?;

		Ok(FieldsResponse { fields })
	}

	pub async fn endpoint_field_values(
		&self,
		req: FieldValuesRequest,
	) -> Result<FieldValuesResponse> {
		let field = req.field.trim();

		if field.is_empty() {
			return Err(Error::InvalidRequest { message: "field must be non-empty.".to_string() });
		}

		let interface = self.interface_for(req.search_endpoint_id).await?;
		let values = interface.get_field_values(field, req.prefix.as_deref()).await?;

		Ok(FieldValuesResponse { values })
	}

	pub async fn endpoint_documents(&self, req: DocumentsRequest) -> Result<DocumentsResponse> {
		if req.ids.iter().any(|id| id.trim().is_empty()) {
			return Err(Error::InvalidRequest {
				message: "ids must not contain empty values.".to_string(),
			});
		}
		if req.ids.is_empty() {
			return Ok(DocumentsResponse { documents: Vec::new() });
		}

		let interface = self.interface_for(req.search_endpoint_id).await?;
		let documents = interface.get_documents_by_id(&req.ids).await?;

		Ok(DocumentsResponse { documents })
	}
}
