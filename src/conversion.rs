use crate::models::responses::{
    OutputItem, OutputText, ResponsesResponse, ResponsesUsage, SummaryText,
};
use serde_json::{Map, Value};

/// Wall-clock capability used for `created_at` and synthetic-id fallbacks.
///
/// Injected at call time so tests can pin the clock and assert exact ids.
pub trait Clock: Send + Sync {
    /// Current time as whole seconds since the Unix epoch.
    fn unix_secs(&self) -> u64;
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn unix_secs(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// Convert a Chat Completions result document into a Responses API result.
///
/// Total over any input: non-applicable documents are returned unchanged.
/// See [`try_convert`] for the mapping rules and the decline conditions.
pub fn convert(value: Value, clock: &dyn Clock) -> Value {
    match try_convert(&value, clock) {
        Some(converted) => converted,
        None => value,
    }
}

/// Attempt the Chat Completions -> Responses mapping, declining with `None`
/// when the input is not a convertible Chat Completions result.
///
/// Decline conditions (identity for the caller):
/// - input is not a JSON object,
/// - input is already a Responses document (`object == "response"`),
/// - input has no `choices` array.
///
/// Mapping rules:
/// - only `choices[0]` is consulted; an empty `choices` array degrades to an
///   empty choice rather than failing,
/// - `message.reasoning_content` (when truthy) becomes one reasoning item
///   wrapping a single summary-text block, coerced to a string,
/// - each `message.tool_calls` entry becomes a function-call item in source
///   order (`arguments` defaults to "{}", `name` to "", missing call ids get
///   a time-based synthetic id),
/// - string `message.content` is used verbatim; an array of parts is
///   concatenated over each part's `text`; the assistant message item is
///   emitted only when the assembled text is non-empty,
/// - usage counters default to 0 and `total_tokens` is recomputed from the
///   two components when the upstream omitted it.
///
/// Malformed nested fields degrade to defaults or omission; this function has
/// no error conditions.
pub fn try_convert(value: &Value, clock: &dyn Clock) -> Option<Value> {
    let source = value.as_object()?;
    if source.get("object").and_then(|o| o.as_str()) == Some("response") {
        return None;
    }
    let choices = source.get("choices").and_then(|c| c.as_array())?;

    // Empty choices: proceed with an empty choice, not an error.
    let empty = Value::Object(Map::new());
    let first_choice = choices.first().unwrap_or(&empty);
    let message = first_choice.get("message").unwrap_or(&empty);

    let created_at = source
        .get("created")
        .and_then(|c| c.as_u64())
        .filter(|n| *n != 0)
        .unwrap_or_else(|| clock.unix_secs());

    let response_id = match source
        .get("id")
        .and_then(|i| i.as_str())
        .filter(|s| !s.is_empty())
    {
        Some(src) => format!("resp_{src}"),
        None => format!("resp_{}", clock.unix_secs()),
    };

    let mut output: Vec<OutputItem> = Vec::new();

    if let Some(reasoning) = message.get("reasoning_content").filter(|r| is_truthy(r)) {
        output.push(OutputItem::Reasoning {
            id: format!("rs_{response_id}"),
            summary: vec![SummaryText::new(coerce_to_string(reasoning))],
        });
    }

    if let Some(calls) = message.get("tool_calls").and_then(|t| t.as_array()) {
        for (ordinal, call) in calls.iter().enumerate() {
            let function = call.get("function");
            let arguments = match function.and_then(|f| f.get("arguments")) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => "{}".to_string(),
                // Non-string arguments are kept as their JSON text.
                Some(other) => other.to_string(),
            };
            let name = function
                .and_then(|f| f.get("name"))
                .and_then(|n| n.as_str())
                .unwrap_or("")
                .to_string();
            let call_id = match call
                .get("id")
                .and_then(|i| i.as_str())
                .filter(|s| !s.is_empty())
            {
                Some(id) => id.to_string(),
                None => format!("call_{}", clock.unix_secs()),
            };
            output.push(OutputItem::FunctionCall {
                id: format!("fc_{response_id}_{ordinal}"),
                arguments,
                call_id,
                name,
            });
        }
    }

    let text = assemble_text(message.get("content"));
    if !text.is_empty() {
        output.push(OutputItem::Message {
            id: format!("msg_{response_id}"),
            role: "assistant".to_string(),
            content: vec![OutputText::new(text)],
        });
    }

    let converted = ResponsesResponse {
        id: response_id,
        object: "response".to_string(),
        created_at,
        status: "completed".to_string(),
        model: source.get("model").cloned(),
        output,
        usage: map_usage(source.get("usage")),
    };

    // ResponsesResponse serializes through plain data types; this cannot fail.
    serde_json::to_value(converted).ok()
}

/// Assemble the assistant text from a Chat Completions `content` field.
///
/// A string is used verbatim; an array concatenates each part's `text`
/// (missing -> empty); any other shape yields the empty string.
fn assemble_text(content: Option<&Value>) -> String {
    match content {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(parts)) => parts
            .iter()
            .map(|part| part.get("text").and_then(|t| t.as_str()).unwrap_or(""))
            .collect(),
        _ => String::new(),
    }
}

fn map_usage(usage: Option<&Value>) -> ResponsesUsage {
    let counter = |key: &str| {
        usage
            .and_then(|u| u.get(key))
            .and_then(|n| n.as_u64())
            .unwrap_or(0)
    };
    let input_tokens = counter("prompt_tokens");
    let output_tokens = counter("completion_tokens");
    let total_tokens = usage
        .and_then(|u| u.get("total_tokens"))
        .and_then(|n| n.as_u64())
        .unwrap_or(input_tokens + output_tokens);
    ResponsesUsage {
        input_tokens,
        output_tokens,
        total_tokens,
    }
}

/// JavaScript-style truthiness over JSON values: null, false, 0 and the
/// empty string are falsy; everything else (including empty containers in
/// line with JS objects) is truthy.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn coerce_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct FixedClock(u64);

    impl Clock for FixedClock {
        fn unix_secs(&self) -> u64 {
            self.0
        }
    }

    #[test]
    fn declines_non_object_input() {
        let clock = FixedClock(1000);
        assert!(try_convert(&json!("not an object"), &clock).is_none());
        assert!(try_convert(&json!([1, 2, 3]), &clock).is_none());
        assert!(try_convert(&Value::Null, &clock).is_none());
    }

    #[test]
    fn declines_already_converted_document() {
        let clock = FixedClock(1000);
        let doc = json!({"id": "resp_x", "object": "response", "output": []});
        assert!(try_convert(&doc, &clock).is_none());
    }

    #[test]
    fn declines_when_choices_is_missing_or_not_an_array() {
        let clock = FixedClock(1000);
        assert!(try_convert(&json!({"id": "c1"}), &clock).is_none());
        assert!(try_convert(&json!({"id": "c1", "choices": "nope"}), &clock).is_none());
    }

    #[test]
    fn empty_choices_array_produces_empty_output() {
        let clock = FixedClock(1000);
        let out = try_convert(
            &json!({"id": "c1", "created": 42, "choices": []}),
            &clock,
        )
        .expect("should convert");
        assert_eq!(out["id"], "resp_c1");
        assert_eq!(out["created_at"], 42);
        assert_eq!(out["status"], "completed");
        assert_eq!(out["output"].as_array().map(Vec::len), Some(0));
    }

    #[test]
    fn synthesizes_id_and_created_from_clock_when_absent() {
        let clock = FixedClock(1_700_000_000);
        let out = try_convert(&json!({"choices": []}), &clock).expect("should convert");
        assert_eq!(out["id"], "resp_1700000000");
        assert_eq!(out["created_at"], 1_700_000_000u64);
    }

    #[test]
    fn zero_created_falls_back_to_clock() {
        let clock = FixedClock(77);
        let out =
            try_convert(&json!({"id": "c", "created": 0, "choices": []}), &clock).unwrap();
        assert_eq!(out["created_at"], 77);
    }

    #[test]
    fn reasoning_content_is_coerced_to_string() {
        let clock = FixedClock(1);
        let out = try_convert(
            &json!({
                "id": "c",
                "choices": [{"message": {"reasoning_content": 42}}]
            }),
            &clock,
        )
        .unwrap();
        assert_eq!(out["output"][0]["type"], "reasoning");
        assert_eq!(out["output"][0]["summary"][0]["type"], "summary_text");
        assert_eq!(out["output"][0]["summary"][0]["text"], "42");
    }

    #[test]
    fn empty_reasoning_content_is_skipped() {
        let clock = FixedClock(1);
        let out = try_convert(
            &json!({
                "id": "c",
                "choices": [{"message": {"reasoning_content": "", "content": "hi"}}]
            }),
            &clock,
        )
        .unwrap();
        assert_eq!(out["output"][0]["type"], "message");
    }

    #[test]
    fn non_string_arguments_are_kept_as_json_text() {
        let clock = FixedClock(1);
        let out = try_convert(
            &json!({
                "id": "c",
                "choices": [{"message": {"tool_calls": [
                    {"id": "t1", "type": "function",
                     "function": {"name": "f", "arguments": {"x": 1}}}
                ]}}]
            }),
            &clock,
        )
        .unwrap();
        assert_eq!(out["output"][0]["arguments"], r#"{"x":1}"#);
    }

    #[test]
    fn convert_is_identity_on_declined_input() {
        let clock = FixedClock(1);
        let doc = json!({"object": "response", "output": [{"type": "message"}]});
        assert_eq!(convert(doc.clone(), &clock), doc);
    }
}
