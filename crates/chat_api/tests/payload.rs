use chat_api::{ChatMessage, ChatRequest, ChatTool, ChatToolCall};
use serde_json::json;

#[test]
fn request_serializes_openai_wire_shape() {
    let mut assistant = ChatMessage::new("assistant", "");
    assistant.tool_calls = vec![ChatToolCall::function("call_1", "list_dir", "{\"path\":\".\"}")];
    let mut tool = ChatMessage::new("tool", "{\"entries\":[]}");
    tool.tool_call_id = Some("call_1".to_string());

    let request = ChatRequest::new(
        "gpt-4o-mini",
        vec![ChatMessage::new("user", "hi"), assistant, tool],
    )
    .with_tools(vec![ChatTool::function(
        "list_dir",
        "List a directory",
        json!({"type": "object", "properties": {}, "required": [], "additionalProperties": false}),
    )]);

    let value = serde_json::to_value(&request).expect("request should serialize");

    assert_eq!(value["model"], "gpt-4o-mini");
    assert_eq!(value["stream"], true);
    assert_eq!(value["messages"][0], json!({"role": "user", "content": "hi"}));
    assert_eq!(
        value["messages"][1]["tool_calls"][0],
        json!({
            "id": "call_1",
            "type": "function",
            "function": {"name": "list_dir", "arguments": "{\"path\":\".\"}"}
        })
    );
    assert_eq!(value["messages"][2]["tool_call_id"], "call_1");
    assert_eq!(value["tools"][0]["type"], "function");
    assert_eq!(value["tools"][0]["function"]["name"], "list_dir");
    assert!(value.get("tool_choice").is_none());
}

#[test]
fn request_omits_empty_tools() {
    let value = serde_json::to_value(ChatRequest::new("m", Vec::new())).expect("serialize");
    assert!(value.get("tools").is_none());
}
