use serde::{Deserialize, Serialize};

/// Instruction sent ahead of every food description.
pub const SYSTEM_PROMPT: &str = "You are a nutrition assistant. The user sends the name of a dish or \
a product and you reply with only a number: roughly how many kilocalories it contains. No words, \
only the number. For a prepared dish or meal count a typical serving, not 100 grams.";

pub const DEFAULT_MODEL: &str = "yandexgpt/latest";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRequest {
    pub model_uri: String,
    pub completion_options: CompletionOptions,
    pub messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionOptions {
    pub stream: bool,
    pub temperature: f64,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub text: String,
}

impl CompletionRequest {
    #[must_use]
    pub fn new(folder_id: &str, model: &str, food: &str) -> Self {
        Self {
            model_uri: format!("gpt://{folder_id}/{model}"),
            completion_options: CompletionOptions {
                stream: false,
                temperature: 0.3,
                max_tokens: 20,
            },
            messages: vec![
                Message {
                    role: "system".to_string(),
                    text: SYSTEM_PROMPT.to_string(),
                },
                Message {
                    role: "user".to_string(),
                    text: food.to_string(),
                },
            ],
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CompletionResponse {
    pub result: CompletionResult,
}

#[derive(Debug, Deserialize)]
pub struct CompletionResult {
    pub alternatives: Vec<Alternative>,
}

#[derive(Debug, Deserialize)]
pub struct Alternative {
    pub message: Message,
}

impl CompletionResponse {
    /// Text of the first alternative, trimmed.
    #[must_use]
    pub fn answer_text(&self) -> Option<&str> {
        self.result
            .alternatives
            .first()
            .map(|alt| alt.message.text.trim())
    }
}

/// Takes the first run of ASCII digits in a model answer. Numbers are never
/// summed, and a run too large for a calorie count yields `None`.
#[must_use]
pub fn extract_calories(answer: &str) -> Option<i64> {
    let start = answer.find(|c: char| c.is_ascii_digit())?;
    let digits: &str = answer[start..]
        .split(|c: char| !c.is_ascii_digit())
        .next()?;
    digits.parse::<u32>().ok().map(i64::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_first_number() {
        assert_eq!(extract_calories("about 95 calories"), Some(95));
        assert_eq!(extract_calories("250"), Some(250));
        assert_eq!(extract_calories("200-300 kcal"), Some(200));
        assert_eq!(extract_calories("0"), Some(0));
    }

    #[test]
    fn test_extract_no_digits() {
        assert_eq!(extract_calories("I don't know"), None);
        assert_eq!(extract_calories(""), None);
    }

    #[test]
    fn test_extract_overflow_is_none() {
        assert_eq!(extract_calories("99999999999999999999"), None);
    }

    #[test]
    fn test_extract_ignores_non_ascii_digits() {
        assert_eq!(extract_calories("около ٣ or 120"), Some(120));
    }

    #[test]
    fn test_request_shape() {
        let req = CompletionRequest::new("b1gfolder", DEFAULT_MODEL, "apple");
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["modelUri"], "gpt://b1gfolder/yandexgpt/latest");
        assert_eq!(json["completionOptions"]["stream"], false);
        assert_eq!(json["completionOptions"]["maxTokens"], 20);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["text"], "apple");
    }

    #[test]
    fn test_parse_response() {
        let raw = r#"{
            "result": {
                "alternatives": [
                    {"message": {"role": "assistant", "text": " 95\n"}, "status": "ALTERNATIVE_STATUS_FINAL"}
                ],
                "usage": {"inputTextTokens": "60", "completionTokens": "2", "totalTokens": "62"},
                "modelVersion": "23.10.2024"
            }
        }"#;
        let resp: CompletionResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(resp.answer_text(), Some("95"));
    }

    #[test]
    fn test_parse_response_without_alternatives() {
        let resp: CompletionResponse =
            serde_json::from_str(r#"{"result": {"alternatives": []}}"#).unwrap();
        assert!(resp.answer_text().is_none());
    }
}
