//! Message framing for newline-delimited JSON.

use crate::types::{Message, ProtocolError, ProtocolResult};

/// Parse a single line of text as a message.
pub fn parse_message(line: &str) -> ProtocolResult<Message> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(ProtocolError::Parse("empty message".to_string()));
    }

    Message::decode(trimmed)
}

/// Serialize a message to a JSON line (with trailing newline).
///
/// Compact JSON escapes every newline inside strings, so the only raw
/// newline in the output is the delimiter.
pub fn frame_message(message: &Message) -> Result<String, serde_json::Error> {
    let mut json = message.encode()?;
    json.push('\n');
    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Request, RequestId};
    use serde_json::json;

    #[test]
    fn test_frame_has_single_trailing_newline() {
        let msg = Message::from(Request::new(
            RequestId::Number(1),
            "tools/call",
            Some(json!({"arguments": {"text": "line one\nline two"}})),
        ));
        let framed = frame_message(&msg).unwrap();
        assert!(framed.ends_with('\n'));
        assert_eq!(framed.matches('\n').count(), 1);
        assert_eq!(parse_message(&framed).unwrap(), msg);
    }

    #[test]
    fn test_parse_empty_line() {
        assert!(matches!(parse_message("   \r\n"), Err(ProtocolError::Parse(_))));
    }
}
