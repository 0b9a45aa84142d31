//! Tests for the universal request/response contract types.

use manta_core::{
    Content, ContentPart, EnvSecrets, ImageAttachment, InputItem, ToolCall, UniversalRequest,
    encode_tool_arguments, guess_mime, resolve_secret,
};
use serde_json::json;

#[test]
fn content_flattens_parts_to_text() {
    let content = Content::Parts(vec![
        ContentPart::Text {
            text: "first".into(),
        },
        ContentPart::Image {
            media_type: "image/png".into(),
            data: "AAAA".into(),
        },
        ContentPart::Text {
            text: "second".into(),
        },
    ]);

    assert_eq!(content.text(), "first\nsecond");
}

#[test]
fn mime_guess_defaults_to_jpeg() {
    assert_eq!(guess_mime("chart.png"), "image/png");
    assert_eq!(guess_mime("photo.JPG"), "image/jpeg");
    assert_eq!(guess_mime("anim.webp"), "image/webp");
    assert_eq!(guess_mime("no-extension"), "image/jpeg");
}

#[test]
fn attachment_renders_data_uri() {
    let img = ImageAttachment {
        name: "chart.png".into(),
        base64: "AAAA".into(),
    };
    assert_eq!(img.data_uri(), "data:image/png;base64,AAAA");
}

#[test]
fn tool_arguments_native_structure_round_trips() {
    let encoded = encode_tool_arguments(&json!({"query": "select 1"}));
    assert_eq!(encoded, r#"{"query":"select 1"}"#);

    let call = ToolCall::new("call_1", "run_query", encoded);
    let parsed = call.parse_arguments().unwrap();
    assert_eq!(parsed["query"], "select 1");
}

#[test]
fn tool_arguments_string_forms_stay_valid_json() {
    // Already a JSON string: kept as-is.
    assert_eq!(
        encode_tool_arguments(&json!(r#"{"a": 1}"#)),
        r#"{"a": 1}"#
    );
    // Not valid JSON: wrapped so the invariant holds.
    let wrapped = encode_tool_arguments(&json!("plain words"));
    let parsed: serde_json::Value = serde_json::from_str(&wrapped).unwrap();
    assert_eq!(parsed["value"], "plain words");
    // Null becomes the empty object.
    assert_eq!(encode_tool_arguments(&serde_json::Value::Null), "{}");
}

#[test]
fn last_user_turn_skips_tool_outputs() {
    let req = UniversalRequest::new(
        "gpt-4o",
        vec![
            InputItem::system("be brief"),
            InputItem::user("first"),
            InputItem::assistant("ok"),
            InputItem::user("second"),
            InputItem::function_call_output("call_1", json!({"rows": 3})),
        ],
    );

    assert_eq!(req.last_user_turn(), Some(3));

    let no_user = UniversalRequest::new("gpt-4o", vec![InputItem::system("be brief")]);
    assert_eq!(no_user.last_user_turn(), None);
}

#[test]
fn blank_secret_refs_resolve_to_none() {
    assert_eq!(resolve_secret(&EnvSecrets, "acme", ""), None);
    assert_eq!(resolve_secret(&EnvSecrets, "acme", "   "), None);
}

#[test]
fn input_items_serialize_in_wire_shape() {
    let item = InputItem::function_call_output("call_9", json!({"ok": true}));
    let value = serde_json::to_value(&item).unwrap();
    assert_eq!(value["type"], "function_call_output");
    assert_eq!(value["call_id"], "call_9");

    let msg = InputItem::user("hello");
    let value = serde_json::to_value(&msg).unwrap();
    assert_eq!(value["role"], "user");
    assert_eq!(value["content"], "hello");
}
