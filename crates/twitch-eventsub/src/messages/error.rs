/// Errors raised while decoding a single inbound frame
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
	#[error("JSON parsing error: {0}")]
	JsonParse(#[from] serde_json::Error),

	#[error("Invalid {message_type} payload: {source}")]
	Payload {
		message_type: &'static str,
		#[source]
		source: serde_json::Error,
	},

	#[error("Missing required field: {field} in message type: {message_type}")]
	MissingField { field: &'static str, message_type: &'static str },
}
