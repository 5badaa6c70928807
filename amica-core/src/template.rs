//! Turn templates and reply extraction.
//!
//! Templates are split once into a literal prefix and suffix around their
//! single `{placeholder}`. Rendering is plain concatenation, so nothing in a
//! user message is ever interpreted as a formatting directive.

use amica_common::config::TemplatesConfig;
use amica_common::util::placeholder_spans;
use thiserror::Error;

/// Marker closing an instruction block; the reply follows its last occurrence.
pub const INSTRUCTION_CLOSE: &str = "[/INST]";

/// Turn-boundary markers stripped from the edges of an extracted reply.
pub const TURN_MARKERS: &[&str] = &["</s>", "<s>", "[INST]", "[/INST]"];

/// Markers that end the model's turn; anything after them is a hallucinated
/// continuation of the dialogue.
const END_OF_TURN_MARKERS: &[&str] = &["</s>", "[INST]"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("template must contain exactly one {{placeholder}}, found {found}: {template:?}")]
    PlaceholderCount { template: String, found: usize },
}

/// A turn template with exactly one placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnTemplate {
    pattern: String,
    prefix: String,
    suffix: String,
}

impl TurnTemplate {
    pub fn parse(pattern: &str) -> Result<Self, TemplateError> {
        let spans = placeholder_spans(pattern);
        if spans.len() != 1 {
            return Err(TemplateError::PlaceholderCount {
                template: pattern.to_string(),
                found: spans.len(),
            });
        }

        let span = &spans[0];
        Ok(Self {
            pattern: pattern.to_string(),
            prefix: pattern[..span.start].to_string(),
            suffix: pattern[span.end..].to_string(),
        })
    }

    /// Wrap `text` in the template. `text` is inserted verbatim.
    pub fn render(&self, text: &str) -> String {
        let mut out = String::with_capacity(self.prefix.len() + text.len() + self.suffix.len());
        out.push_str(&self.prefix);
        out.push_str(text);
        out.push_str(&self.suffix);
        out
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Speaker label in front of the placeholder (`"Friend:"`), if any.
    pub fn label(&self) -> Option<&str> {
        let label = self.prefix.trim();
        (!label.is_empty()).then_some(label)
    }
}

/// The pair of templates used to build a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnTemplates {
    pub user: TurnTemplate,
    pub model: TurnTemplate,
}

impl TurnTemplates {
    pub fn from_config(config: &TemplatesConfig) -> Result<Self, TemplateError> {
        Ok(Self {
            user: TurnTemplate::parse(&config.user_turn)?,
            model: TurnTemplate::parse(&config.model_turn)?,
        })
    }

    /// Pull the model's reply out of raw generated text.
    ///
    /// Takes everything after the last `[/INST]`, cuts it at the first
    /// end-of-turn marker, then strips whitespace, residual markers and the
    /// model speaker label. Returns `None` when there is no `[/INST]` or
    /// nothing is left.
    pub fn extract_reply(&self, generated: &str) -> Option<String> {
        let idx = generated.rfind(INSTRUCTION_CLOSE)?;
        let tail = strip_markers(&generated[idx + INSTRUCTION_CLOSE.len()..]);

        let mut reply = tail;
        if let Some(label) = self.model.label() {
            if let Some(rest) = reply.strip_prefix(label) {
                reply = strip_markers(rest);
            }
        }

        let end = END_OF_TURN_MARKERS
            .iter()
            .filter_map(|m| reply.find(m))
            .min()
            .unwrap_or(reply.len());
        let reply = strip_markers(&reply[..end]);

        (!reply.is_empty()).then(|| reply.to_string())
    }
}

impl Default for TurnTemplates {
    fn default() -> Self {
        Self {
            user: TurnTemplate {
                pattern: "User: {user_message} [/INST]".into(),
                prefix: "User: ".into(),
                suffix: " [/INST]".into(),
            },
            model: TurnTemplate {
                pattern: "Friend: {model_answer} </s><s>[INST]".into(),
                prefix: "Friend: ".into(),
                suffix: " </s><s>[INST]".into(),
            },
        }
    }
}

/// Trim whitespace and whole turn markers from both ends until stable.
fn strip_markers(s: &str) -> &str {
    let mut current = s.trim();
    loop {
        let mut next = current;
        for marker in TURN_MARKERS {
            if let Some(rest) = next.strip_prefix(marker) {
                next = rest.trim_start();
            }
            if let Some(rest) = next.strip_suffix(marker) {
                next = rest.trim_end();
            }
        }
        if next.len() == current.len() {
            return next;
        }
        current = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_render() {
        let t = TurnTemplate::parse("User: {user_message} [/INST]").unwrap();
        assert_eq!(t.render("hi"), "User: hi [/INST]");
        assert_eq!(t.label(), Some("User:"));
    }

    #[test]
    fn test_render_is_literal() {
        let t = TurnTemplate::parse("{user_message} [/INST]").unwrap();
        assert_eq!(
            t.render("{model_answer} {0} %s {{x}}"),
            "{model_answer} {0} %s {{x}} [/INST]"
        );
        assert_eq!(t.label(), None);
    }

    #[test]
    fn test_parse_rejects_wrong_placeholder_count() {
        assert_eq!(
            TurnTemplate::parse("no placeholder"),
            Err(TemplateError::PlaceholderCount {
                template: "no placeholder".into(),
                found: 0
            })
        );
        assert!(TurnTemplate::parse("{a} and {b}").is_err());
    }

    #[test]
    fn test_default_matches_config_defaults() {
        let parsed = TurnTemplates::from_config(&TemplatesConfig::default()).unwrap();
        assert_eq!(parsed, TurnTemplates::default());
    }

    #[test]
    fn test_extract_reply_from_echoed_prompt() {
        let templates = TurnTemplates::default();
        let raw = "<s>[INST] <<SYS>>\nbe nice\n<</SYS>>\n\n User: hi [/INST] Friend: hello </s><s>[INST]";
        assert_eq!(templates.extract_reply(raw).as_deref(), Some("hello"));
    }

    #[test]
    fn test_extract_reply_uses_last_marker() {
        let templates = TurnTemplates::default();
        let raw = "User: a [/INST] Friend: one </s><s>[INST] User: b [/INST] Friend: two";
        assert_eq!(templates.extract_reply(raw).as_deref(), Some("two"));
    }

    #[test]
    fn test_extract_reply_cuts_hallucinated_user_turn() {
        let templates = TurnTemplates::default();
        let raw = "User: hi [/INST] Friend: hey there! </s><s>[INST] User: and then";
        assert_eq!(templates.extract_reply(raw).as_deref(), Some("hey there!"));
    }

    #[test]
    fn test_extract_reply_keeps_words_starting_with_marker_letters() {
        let templates = TurnTemplates::default();
        let raw = "User: hi [/INST] Sure, I'm In! ";
        assert_eq!(templates.extract_reply(raw).as_deref(), Some("Sure, I'm In!"));
    }

    #[test]
    fn test_extract_reply_without_marker_fails() {
        let templates = TurnTemplates::default();
        assert_eq!(templates.extract_reply("just some text"), None);
    }

    #[test]
    fn test_extract_reply_empty_continuation_fails() {
        let templates = TurnTemplates::default();
        assert_eq!(templates.extract_reply("User: hi [/INST]"), None);
        assert_eq!(templates.extract_reply("User: hi [/INST] Friend: </s>"), None);
    }

    #[test]
    fn test_strip_markers() {
        assert_eq!(strip_markers("  </s><s>[INST] hello [/INST] "), "hello");
        assert_eq!(strip_markers("plain"), "plain");
        assert_eq!(strip_markers("</s>"), "");
    }
}
