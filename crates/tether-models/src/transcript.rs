//! Plain-text transcripts for completion-style backends.

use std::fmt::Write;
use tether_abstraction::ChatTurn;

const HUMAN_MARKER: &str = "Human:";
const ASSISTANT_MARKER: &str = "Assistant:";

/// Renders a history as a `Human:`/`Assistant:` transcript ending with an
/// open `Assistant:` line for the model to complete.
#[must_use]
pub fn render(history: &[ChatTurn]) -> String {
    let mut transcript = String::new();
    for turn in history {
        let _ = writeln!(transcript, "{HUMAN_MARKER} {}", turn.prompt);
        if let Some(answer) = &turn.answer {
            let _ = writeln!(transcript, "{ASSISTANT_MARKER} {answer}");
        }
    }
    transcript.push_str(ASSISTANT_MARKER);
    transcript.push(' ');
    transcript
}

/// Extracts the assistant reply from generated text: everything after the
/// last `Assistant:` marker, trimmed.
#[must_use]
pub fn extract_reply(generated: &str) -> &str {
    generated.rsplit(ASSISTANT_MARKER).next().unwrap_or(generated).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_few_shot_history() {
        let history = vec![
            ChatTurn::answered("What is the capital of France?", "Paris."),
            ChatTurn::prompt("And of Spain?"),
        ];
        assert_eq!(
            render(&history),
            "Human: What is the capital of France?\nAssistant: Paris.\nHuman: And of Spain?\nAssistant: "
        );
    }

    #[test]
    fn test_extract_reply_takes_last_segment() {
        let generated = "Human: hi\nAssistant: hello\nHuman: joke?\nAssistant:  Why not. ";
        assert_eq!(extract_reply(generated), "Why not.");
    }

    #[test]
    fn test_extract_reply_without_marker() {
        assert_eq!(extract_reply("  plain text \n"), "plain text");
    }
}
