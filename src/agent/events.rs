//! Agent event stream parsing
//!
//! The agent subprocess emits line-delimited JSON. Three event shapes
//! matter to the orchestrator: the init event (agent-side session id and
//! model), assistant messages (text plus tool-use content blocks, from
//! which claimed completions are counted), and the terminal result event
//! carrying usage and cost. Everything else is passed through as `Other`
//! so it can be logged without being understood.

use serde_json::Value;

/// One parsed event from the agent's output stream
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// The stream opened: agent-side session identifier and model name
    SystemInit { session_id: String, model: String },
    /// An assistant turn with its content blocks
    Assistant { blocks: Vec<ContentBlock> },
    /// Terminal event; the subprocess exits after emitting it
    Result(ResultEvent),
    /// Recognized JSON we do not act on
    Other { kind: String },
}

/// A content block inside an assistant message
#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlock {
    Text(String),
    ToolUse { name: String, input: Value },
}

/// Final usage and cost summary
#[derive(Debug, Clone, PartialEq)]
pub struct ResultEvent {
    pub success: bool,
    pub subtype: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
}

/// Parse one stream line. Returns `None` for blank or non-JSON lines,
/// which the observer logs as plain text.
pub fn parse_line(line: &str) -> Option<AgentEvent> {
    if line.trim().is_empty() {
        return None;
    }
    let json: Value = serde_json::from_str(line).ok()?;
    Some(parse_event(&json))
}

fn parse_event(json: &Value) -> AgentEvent {
    let kind = extract_str(json, "type", "");
    match kind {
        "system" if extract_str(json, "subtype", "") == "init" => AgentEvent::SystemInit {
            session_id: extract_str(json, "session_id", "unknown").to_string(),
            model: extract_str(json, "model", "unknown").to_string(),
        },
        "assistant" => AgentEvent::Assistant {
            blocks: parse_content_blocks(json),
        },
        "result" => AgentEvent::Result(parse_result(json)),
        other => AgentEvent::Other {
            kind: if other.is_empty() { "unknown" } else { other }.to_string(),
        },
    }
}

fn parse_content_blocks(json: &Value) -> Vec<ContentBlock> {
    let Some(content) = json
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_array())
    else {
        return Vec::new();
    };

    content
        .iter()
        .filter_map(|block| match extract_str(block, "type", "") {
            "text" => Some(ContentBlock::Text(
                extract_str(block, "text", "").to_string(),
            )),
            "tool_use" => Some(ContentBlock::ToolUse {
                name: extract_str(block, "name", "unknown").to_string(),
                input: block.get("input").cloned().unwrap_or(Value::Null),
            }),
            _ => None,
        })
        .collect()
}

fn parse_result(json: &Value) -> ResultEvent {
    let subtype = extract_str(json, "subtype", "unknown").to_string();
    let usage = json.get("usage").cloned().unwrap_or(Value::Null);
    ResultEvent {
        success: subtype == "success",
        subtype,
        input_tokens: extract_u64(&usage, "input_tokens", 0),
        output_tokens: extract_u64(&usage, "output_tokens", 0),
        cost_usd: json
            .get("total_cost_usd")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0),
    }
}

/// If this tool-use block claims a feature completion, return the feature
/// id. Tool names are suffix-matched so MCP-prefixed forms
/// (`mcp__features__feature_status`) count too.
pub fn claimed_completion(name: &str, input: &Value) -> Option<i64> {
    if !name.ends_with("feature_status") {
        return None;
    }
    if extract_str(input, "status", "") != "completed" {
        return None;
    }
    input.get("id").and_then(|v| v.as_i64())
}

fn extract_str<'a>(json: &'a Value, field: &str, default: &'a str) -> &'a str {
    json.get(field).and_then(|v| v.as_str()).unwrap_or(default)
}

fn extract_u64(json: &Value, field: &str, default: u64) -> u64 {
    json.get(field).and_then(|v| v.as_u64()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_system_init() {
        let line = r#"{"type":"system","subtype":"init","session_id":"abc","model":"claude-sonnet"}"#;
        assert_eq!(
            parse_line(line),
            Some(AgentEvent::SystemInit {
                session_id: "abc".into(),
                model: "claude-sonnet".into(),
            })
        );
    }

    #[test]
    fn parses_assistant_text_and_tool_use() {
        let line = r#"{"type":"assistant","message":{"content":[
            {"type":"text","text":"working on it"},
            {"type":"tool_use","name":"feature_status","input":{"id":4,"status":"completed"}}
        ]}}"#;
        let Some(AgentEvent::Assistant { blocks }) = parse_line(line) else {
            panic!("expected assistant event");
        };
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0], ContentBlock::Text("working on it".into()));
        let ContentBlock::ToolUse { name, input } = &blocks[1] else {
            panic!("expected tool_use block");
        };
        assert_eq!(name, "feature_status");
        assert_eq!(input["id"], 4);
    }

    #[test]
    fn parses_result_success_with_usage() {
        let line = r#"{"type":"result","subtype":"success",
            "usage":{"input_tokens":1200,"output_tokens":340},"total_cost_usd":0.42}"#;
        assert_eq!(
            parse_line(line),
            Some(AgentEvent::Result(ResultEvent {
                success: true,
                subtype: "success".into(),
                input_tokens: 1200,
                output_tokens: 340,
                cost_usd: 0.42,
            }))
        );
    }

    #[test]
    fn result_error_subtype_is_not_success() {
        let line = r#"{"type":"result","subtype":"error_during_execution"}"#;
        let Some(AgentEvent::Result(result)) = parse_line(line) else {
            panic!("expected result event");
        };
        assert!(!result.success);
        assert_eq!(result.input_tokens, 0);
        assert_eq!(result.cost_usd, 0.0);
    }

    #[test]
    fn unknown_types_become_other() {
        assert_eq!(
            parse_line(r#"{"type":"user","noise":true}"#),
            Some(AgentEvent::Other { kind: "user".into() })
        );
        assert_eq!(
            parse_line(r#"{"no_type":1}"#),
            Some(AgentEvent::Other { kind: "unknown".into() })
        );
    }

    #[test]
    fn non_json_lines_are_not_events() {
        assert_eq!(parse_line("plain text output"), None);
        assert_eq!(parse_line("   "), None);
    }

    #[test]
    fn claimed_completion_matches_suffix_and_status() {
        let input = json!({"id": 7, "status": "completed"});
        assert_eq!(claimed_completion("feature_status", &input), Some(7));
        assert_eq!(
            claimed_completion("mcp__features__feature_status", &input),
            Some(7)
        );

        let in_progress = json!({"id": 7, "status": "in_progress"});
        assert_eq!(claimed_completion("feature_status", &in_progress), None);
        assert_eq!(claimed_completion("get_stats", &input), None);
        assert_eq!(claimed_completion("feature_status", &json!({"status":"completed"})), None);
    }
}
