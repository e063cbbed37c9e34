//! Integration tests for protocol serialization

use matchline::protocol::{
    deserialize, frame_message, serialize, unframe_message, ChatPayload, ClientEvent, Currency,
    Envelope, GenderFilter, Role, ServerEvent, MAX_MESSAGE_SIZE,
};
use uuid::Uuid;

#[test]
fn test_client_event_roundtrip() {
    let events = vec![
        ClientEvent::Hello {
            protocol_version: 1,
            role: Role::User,
            external_user_id: Some("user-42".to_string()),
            gender_filter: Some(GenderFilter::Female),
            slow_mode_secs: None,
        },
        ClientEvent::Search,
        ClientEvent::CancelSearch,
        ClientEvent::Identify {
            room_id: "chat_a_b".to_string(),
            display_name: "anon".to_string(),
        },
        ClientEvent::Chat {
            room_id: "chat_a_b".to_string(),
            payload: ChatPayload::Text {
                content: "hi".to_string(),
            },
        },
        ClientEvent::Chat {
            room_id: "chat_a_b".to_string(),
            payload: ChatPayload::Gift {
                amount: 500,
                currency: Currency::Inr,
                gift_id: Some("rose".to_string()),
            },
        },
        ClientEvent::EndChat {
            room_id: "chat_a_b".to_string(),
        },
    ];

    for event in events {
        let encoded = serialize(&event).expect("serialize failed");
        let decoded: ClientEvent = deserialize(&encoded).expect("deserialize failed");

        // Compare debug representations since ClientEvent doesn't derive PartialEq
        assert_eq!(format!("{:?}", event), format!("{:?}", decoded));
    }
}

#[test]
fn test_server_event_roundtrip() {
    let events = vec![
        ServerEvent::Welcome {
            connection_id: Uuid::new_v4(),
            protocol_version: 1,
        },
        ServerEvent::Searching { delay_ms: 4200 },
        ServerEvent::ChatConnected {
            room_id: "chat_a_b".to_string(),
            slow_mode_secs: Some(5),
        },
        ServerEvent::ChatMessage(Envelope {
            id: 1700000000001,
            sender: Role::User,
            room_id: "chat_a_b".to_string(),
            payload: ChatPayload::Text {
                content: "hello".to_string(),
            },
        }),
        ServerEvent::ChatGift(Envelope {
            id: 1700000000002,
            sender: Role::User,
            room_id: "chat_a_b".to_string(),
            payload: ChatPayload::Gift {
                amount: 100,
                currency: Currency::Usd,
                gift_id: None,
            },
        }),
        ServerEvent::ChatEnded {
            room_id: "chat_a_b".to_string(),
        },
        ServerEvent::NoModAvailable,
    ];

    for event in events {
        let encoded = serialize(&event).expect("serialize failed");
        let decoded: ServerEvent = deserialize(&encoded).expect("deserialize failed");

        assert_eq!(event, decoded);
    }
}

#[test]
fn test_frame_and_unframe() {
    let payload = b"some payload".to_vec();
    let framed = frame_message(&payload);

    assert_eq!(framed.len(), payload.len() + 4);

    let (unframed, remaining) = unframe_message(&framed)
        .expect("unframe failed")
        .expect("incomplete frame");

    assert_eq!(unframed, payload);
    assert!(remaining.is_empty());
}

#[test]
fn test_unframe_incomplete_buffer() {
    let payload = b"some payload".to_vec();
    let framed = frame_message(&payload);

    // Truncated frame: not enough data yet
    let result = unframe_message(&framed[..framed.len() - 1]).expect("unframe failed");
    assert!(result.is_none());

    // Not even a length prefix
    let result = unframe_message(&framed[..2]).expect("unframe failed");
    assert!(result.is_none());
}

#[test]
fn test_unframe_rejects_oversized_message() {
    let mut framed = Vec::new();
    framed.extend_from_slice(&(MAX_MESSAGE_SIZE + 1).to_be_bytes());
    framed.extend_from_slice(b"x");

    assert!(unframe_message(&framed).is_err());
}

#[test]
fn test_malformed_bytes_fail_to_decode() {
    let garbage = vec![0xff, 0x00, 0xab, 0xcd];
    let result: anyhow::Result<ClientEvent> = deserialize(&garbage);
    assert!(result.is_err());
}
