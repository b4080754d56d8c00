use uuid::Uuid;
use ws_gateway_cell::ClientMessage;

#[test]
fn subscribe_message_parses_group_list() {
    let text = r#"{"type":"subscribe","groups":["queue:11111111-1111-1111-1111-111111111111","notifications:user-1"]}"#;
    let message: ClientMessage = serde_json::from_str(text).unwrap();
    match message {
        ClientMessage::Subscribe { groups } => assert_eq!(groups.len(), 2),
        other => panic!("unexpected variant: {other:?}"),
    }
}

#[test]
fn join_queue_requires_explicit_queue_id() {
    let queue_id = Uuid::new_v4();
    let customer_id = Uuid::new_v4();
    let text = format!(r#"{{"type":"join_queue","queue_id":"{queue_id}","customer_id":"{customer_id}","service_id":null}}"#);
    let message: ClientMessage = serde_json::from_str(&text).unwrap();
    match message {
        ClientMessage::JoinQueue { queue_id: q, customer_id: c, service_id } => {
            assert_eq!(q, queue_id);
            assert_eq!(c, customer_id);
            assert!(service_id.is_none());
        }
        other => panic!("unexpected variant: {other:?}"),
    }
}

#[test]
fn unknown_message_type_fails_to_parse() {
    let text = r#"{"type":"not_a_real_message"}"#;
    let result: Result<ClientMessage, _> = serde_json::from_str(text);
    assert!(result.is_err());
}
