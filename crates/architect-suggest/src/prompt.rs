use serde_json::{json, Value};

/// Number of variations the assistant is asked for.
pub const VARIATION_COUNT: usize = 3;

pub fn system_prompt() -> String {
    format!(
        "You are an expert prompt engineer using PromptArchitect. Your goal is to provide \
{VARIATION_COUNT} distinct, high-quality variations of the user's prompt based on their request. \
Analyze the user's input and the current prompt context. Provide options that range from \
subtle refinements to creative reimaginings.\n\n\
Output ONLY a JSON array. \
Each item: {{\"title\":\"<short, catchy label>\",\"content\":\"<the full, refined prompt text \
ready for generation>\",\"reasoning\":\"<brief explanation of why this improves the prompt>\"}}. \
All three fields are required strings.\n\n\
Output ONLY the JSON array, nothing else."
    )
}

/// JSON schema of the reply payload: an array of `{title, content, reasoning}`.
pub fn response_schema() -> Value {
    json!({
        "type": "array",
        "items": {
            "type": "object",
            "properties": {
                "title": {
                    "type": "string",
                    "description": "A short, catchy title for this variation (e.g., 'Cinematic & Moody')"
                },
                "content": {
                    "type": "string",
                    "description": "The full, refined prompt text ready for generation"
                },
                "reasoning": {
                    "type": "string",
                    "description": "Brief explanation of why this improves the prompt"
                }
            },
            "required": ["title", "content", "reasoning"]
        }
    })
}

/// The message actually sent for one request: the prompt as it was when the
/// user hit send, then their ask.
pub fn outbound_message(current_prompt: &str, user_text: &str) -> String {
    format!(
        "[Current Prompt Context]:\n\"\"\"{}\"\"\"\n\n[User Request]:\n{}",
        current_prompt, user_text
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbound_message_quotes_prompt_then_request() {
        assert_eq!(
            outbound_message("a fox, forest", "make it darker"),
            "[Current Prompt Context]:\n\"\"\"a fox, forest\"\"\"\n\n[User Request]:\nmake it darker"
        );
    }

    #[test]
    fn system_prompt_pins_count_and_shape() {
        let system = system_prompt();
        assert!(system.contains("3 distinct"));
        assert!(system.contains("\"reasoning\""));
    }

    #[test]
    fn schema_requires_all_three_fields() {
        let schema = response_schema();
        assert_eq!(schema["type"], "array");
        assert_eq!(
            schema["items"]["required"],
            json!(["title", "content", "reasoning"])
        );
    }
}
