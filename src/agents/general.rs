//! General agent
//!
//! Fallback for requests no specialist claims. Answers a handful of
//! small-talk queries locally (time, date, greetings) and otherwise admits
//! it did not understand. Its baseline score keeps the registry from ever
//! reporting no agent while it is registered.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::agents::Agent;
use crate::session::TurnId;

/// Score low enough that any specialist outranks it
const BASELINE_SCORE: f32 = 0.1;

/// Fallback agent
#[derive(Default)]
pub struct GeneralAgent {
    assistant_name: String,
}

impl GeneralAgent {
    /// Create the fallback agent
    #[must_use]
    pub fn new(assistant_name: impl Into<String>) -> Self {
        Self {
            assistant_name: assistant_name.into(),
        }
    }

    fn respond(&self, text: &str) -> String {
        let lower = text.to_lowercase();

        if lower.contains("what time") || lower.contains("the time") {
            let now = chrono::Local::now();
            return format!("It's {}.", now.format("%-I:%M %p"));
        }
        if lower.contains("what day") || lower.contains("today's date") || lower.contains("the date")
        {
            let now = chrono::Local::now();
            return format!("Today is {}.", now.format("%A, %B %-d"));
        }
        if lower.contains("hello") || lower.contains("hi ") || lower == "hi" {
            return format!("Hello! I'm {}. How can I help?", self.assistant_name);
        }
        if lower.contains("thank") {
            return "You're welcome.".to_string();
        }
        if lower.contains("who are you") || lower.contains("your name") {
            return format!("I'm {}, your voice assistant.", self.assistant_name);
        }

        format!("I heard \"{text}\", but I'm not sure how to help with that.")
    }
}

#[async_trait]
impl Agent for GeneralAgent {
    fn name(&self) -> &str {
        "general"
    }

    fn can_handle(&self, _text: &str) -> f32 {
        BASELINE_SCORE
    }

    async fn execute(
        &self,
        turn_id: TurnId,
        text: &str,
        _cancel: &CancellationToken,
    ) -> Result<String> {
        tracing::info!(turn = %turn_id, "general agent reply");
        Ok(self.respond(text))
    }
}
