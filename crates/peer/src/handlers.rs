use {
    ackbridge_protocol::events,
    serde_json::{Value, json},
};

/// Marker placed in every acknowledgment this peer produces.
pub const ACK_MARKER: &str = "Acknowledged";

/// Acknowledgment echoing the received payload.
pub fn acknowledge(data: &Value) -> Value {
    json!({ "message": ACK_MARKER, "receivedData": data })
}

/// Reply for an inbound request, or `None` when this peer does not serve it.
pub fn respond(event: &str, data: &Value) -> Option<Value> {
    match event {
        events::LOGIN => Some(acknowledge(data)),
        _ => None,
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_echoes_payload() {
        let payload = json!({"email": "intern@example.com", "password": "secret"});
        assert_eq!(
            respond(events::LOGIN, &payload),
            Some(json!({"message": "Acknowledged", "receivedData": payload}))
        );
    }

    #[test]
    fn other_requests_are_not_served() {
        assert_eq!(respond(events::LEAVE_GET_ALL, &Value::Null), None);
        assert_eq!(respond(events::LOGOUT, &json!({})), None);
    }
}
