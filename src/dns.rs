use anyhow::{anyhow, Result};
use hickory_proto::op::{Message, MessageType, Query, ResponseCode};
use hickory_proto::rr::Name;

use crate::transport::QuerySpec;

/// DNS response information extracted from a parsed message
#[derive(Debug)]
pub struct DnsResponse {
	pub rcode: ResponseCode,
	pub answer_count: usize,
	pub truncated: bool,
}

/// Build a DNS query message for the given catalog entry.
///
/// Returns the serialized query bytes ready to send over UDP.
pub fn build_query(query: &QuerySpec, txid: u16) -> Result<Vec<u8>> {
	let name = Name::from_ascii(&query.name)
		.map_err(|e| anyhow!("invalid domain name '{}': {}", query.name, e))?;

	let mut message = Message::new();
	message.set_id(txid);
	message.set_recursion_desired(true);
	message.add_query(Query::query(name, query.record_type));

	let bytes = message.to_vec()
		.map_err(|e| anyhow!("failed to serialize DNS query: {}", e))?;
	Ok(bytes)
}

/// Peek at the transaction ID of a datagram without a full parse.
///
/// Returns None for datagrams shorter than a DNS header.
pub fn peek_txid(bytes: &[u8]) -> Option<u16> {
	if bytes.len() < 12 {
		return None;
	}
	Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

/// Parse a DNS response, validating the transaction ID and message type.
///
/// Returns an error if the response cannot be parsed, the txid does not match,
/// or the message is a query rather than a response.
pub fn parse_response(bytes: &[u8], expected_txid: u16) -> Result<DnsResponse> {
	let message = Message::from_vec(bytes)
		.map_err(|e| anyhow!("failed to parse DNS response: {}", e))?;

	// Validate transaction ID
	if message.id() != expected_txid {
		return Err(anyhow!(
			"txid mismatch: expected {}, got {}",
			expected_txid, message.id()
		));
	}

	// Verify this is a response, not a query
	if message.message_type() != MessageType::Response {
		return Err(anyhow!("received a query instead of a response"));
	}

	Ok(DnsResponse {
		rcode: message.response_code(),
		answer_count: message.answer_count() as usize,
		truncated: message.truncated(),
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use hickory_proto::rr::RecordType;

	fn query(name: &str, record_type: RecordType) -> QuerySpec {
		QuerySpec { name: name.to_string(), record_type }
	}

	#[test]
	fn test_build_a_query() {
		let bytes = build_query(&query("example.com", RecordType::A), 1234).unwrap();
		// DNS header is 12 bytes minimum
		assert!(bytes.len() >= 12);
		// Verify txid in first two bytes (big-endian)
		assert_eq!(bytes[0], (1234 >> 8) as u8);
		assert_eq!(bytes[1], (1234 & 0xff) as u8);
	}

	#[test]
	fn test_build_query_carries_record_type() {
		let bytes = build_query(&query("example.com", RecordType::CNAME), 5678).unwrap();
		let message = Message::from_vec(&bytes).unwrap();
		assert_eq!(message.queries().len(), 1);
		assert_eq!(message.queries()[0].query_type(), RecordType::CNAME);
		assert!(message.recursion_desired());
	}

	#[test]
	fn test_peek_txid() {
		let bytes = build_query(&query("example.com", RecordType::A), 4321).unwrap();
		assert_eq!(peek_txid(&bytes), Some(4321));
		assert_eq!(peek_txid(&[0u8; 5]), None);
	}

	#[test]
	fn test_parse_nxdomain_response() {
		// Build a query, then turn it into an NXDOMAIN response
		let query_bytes = build_query(&query("nope.example.com", RecordType::A), 9999).unwrap();
		let mut response = Message::from_vec(&query_bytes).unwrap();
		response.set_message_type(MessageType::Response);
		response.set_response_code(ResponseCode::NXDomain);
		let response_bytes = response.to_vec().unwrap();

		let dns_resp = parse_response(&response_bytes, 9999).unwrap();
		assert_eq!(dns_resp.rcode, ResponseCode::NXDomain);
		assert_eq!(dns_resp.answer_count, 0);
		assert!(!dns_resp.truncated);
	}

	#[test]
	fn test_txid_mismatch() {
		let query_bytes = build_query(&query("example.com", RecordType::A), 1111).unwrap();
		let mut response = Message::from_vec(&query_bytes).unwrap();
		response.set_message_type(MessageType::Response);
		let response_bytes = response.to_vec().unwrap();

		// Parse with wrong expected txid
		let result = parse_response(&response_bytes, 2222);
		assert!(result.is_err());
		assert!(result.unwrap_err().to_string().contains("txid mismatch"));
	}

	#[test]
	fn test_query_is_not_a_response() {
		let query_bytes = build_query(&query("example.com", RecordType::A), 3333).unwrap();
		assert!(parse_response(&query_bytes, 3333).is_err());
	}

	#[test]
	fn test_truncated_buffer() {
		// Only 5 bytes -- too short for a valid DNS message
		let bytes = vec![0u8; 5];
		assert!(parse_response(&bytes, 0).is_err());
	}
}
