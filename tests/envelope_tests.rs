use loqa_converse::{CapturedImage, MessageEnvelope, ServerMessage};

#[test]
fn test_escaping_roundtrip() {
    let samples = [
        r#"plain"#,
        r#"a "quoted" word"#,
        r#"back\slash"#,
        r#"\"both\" \\ at once"#,
        "",
    ];

    for text in samples {
        let json = MessageEnvelope::stt_final(text).to_json().unwrap();
        let parsed = MessageEnvelope::parse(&json).unwrap();
        assert_eq!(parsed.text, text, "roundtrip changed {:?}", text);
    }
}

#[test]
fn test_ordinary_text_is_not_corrupted() {
    let text = "Tab\there, newline\nthere, and café ☕, fine";
    let json = MessageEnvelope::stt_final(text).to_json().unwrap();
    assert_eq!(MessageEnvelope::parse(&json).unwrap().text, text);
}

#[test]
fn test_reply_deserialization() {
    let msg = MessageEnvelope::parse(r#"{"type":"reply","text":"hi there"}"#)
        .unwrap()
        .into_server_message();
    assert_eq!(msg, ServerMessage::Reply("hi there".to_string()));
}

#[test]
fn test_missing_text_is_empty() {
    let envelope = MessageEnvelope::parse(r#"{"type":"reply"}"#).unwrap();
    assert_eq!(envelope.text, "");
    assert_eq!(
        envelope.into_server_message(),
        ServerMessage::Reply(String::new())
    );
}

#[test]
fn test_server_error_message() {
    let msg = MessageEnvelope::parse(r#"{"type":"error","message":"invalid json"}"#)
        .unwrap()
        .into_server_message();
    assert_eq!(msg, ServerMessage::Error("invalid json".to_string()));
}

#[test]
fn test_unparseable_input_is_rejected() {
    for raw in ["", "not json", "[1,2]", r#"{"text":"no type"}"#, r#"{"type":""}"#, r#"{"type":5}"#] {
        assert!(MessageEnvelope::parse(raw).is_err(), "accepted {:?}", raw);
    }
}

#[test]
fn test_extra_fields_are_ignored() {
    let envelope =
        MessageEnvelope::parse(r#"{"type":"reply","text":"ok","latency_ms":120}"#).unwrap();
    assert_eq!(envelope.text, "ok");
}

#[test]
fn test_server_null_text_is_empty() {
    assert_eq!(
        ServerMessage::parse(r#"{"type":"reply","text":null}"#).unwrap(),
        ServerMessage::Reply(String::new())
    );
}

#[test]
fn test_server_message_ignores_odd_extra_fields() {
    for raw in [
        r#"{"type":"reply","text":"hi","image_w":"640"}"#,
        r#"{"type":"reply","text":"hi","image_b64":42,"image_h":null}"#,
        r#"{"type":"reply","text":"hi","message":{"code":1}}"#,
        r#"{"type":"reply","text":"hi","meta":[1,"two",{"three":3}]}"#,
    ] {
        assert_eq!(
            ServerMessage::parse(raw).unwrap(),
            ServerMessage::Reply("hi".to_string()),
            "rejected {:?}",
            raw
        );
    }
}

#[test]
fn test_server_error_with_structured_message() {
    assert_eq!(
        ServerMessage::parse(r#"{"type":"error","message":{"code":1}}"#).unwrap(),
        ServerMessage::Error(r#"{"code":1}"#.to_string())
    );
    assert_eq!(
        ServerMessage::parse(r#"{"type":"error","text":"rate limited","message":null}"#).unwrap(),
        ServerMessage::Error("rate limited".to_string())
    );
}

#[test]
fn test_server_message_needs_a_type() {
    for raw in ["", "not json", "[1,2]", r#"{"text":"no type"}"#, r#"{"type":""}"#, r#"{"type":5}"#] {
        assert!(ServerMessage::parse(raw).is_err(), "accepted {:?}", raw);
    }
}

#[test]
fn test_image_envelope_layout() {
    let image = CapturedImage {
        jpeg: b"jpeg-bytes".to_vec(),
        width: 1280,
        height: 720,
    };
    let json = MessageEnvelope::stt_final("see").with_image(&image).to_json().unwrap();

    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["type"], "stt_final");
    assert_eq!(value["text"], "see");
    assert_eq!(value["image_w"], 1280);
    assert_eq!(value["image_h"], 720);
    assert_eq!(value["image_b64"], "anBlZy1ieXRlcw==");
    assert!(value.get("message").is_none());

    let parsed = MessageEnvelope::parse(&json).unwrap();
    assert_eq!(parsed.image().unwrap(), Some(image));
}

#[test]
fn test_text_only_envelope_has_no_image() {
    let envelope = MessageEnvelope::stt_final("hello");
    assert!(!envelope.has_image());
    assert_eq!(envelope.image().unwrap(), None);
}
