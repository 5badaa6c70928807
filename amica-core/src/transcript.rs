//! Structured conversation transcript.

use serde::{Deserialize, Serialize};

use crate::persona::{Persona, Preambles};
use crate::template::TurnTemplates;

/// Speaker of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Model => "model",
        }
    }
}

/// One utterance, stored without template decoration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

/// A persona preamble slot followed by ordered turns.
///
/// The preamble is held as a [`Persona`] rather than as text, so swapping it
/// never touches turn content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    preamble: Persona,
    #[serde(default)]
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new(preamble: Persona) -> Self {
        Self {
            preamble,
            turns: Vec::new(),
        }
    }

    pub fn persona(&self) -> Persona {
        self.preamble
    }

    /// Replace the preamble. Returns `true` if it changed.
    pub fn set_persona(&mut self, persona: Persona) -> bool {
        if self.preamble == persona {
            return false;
        }
        self.preamble = persona;
        true
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Prompt text: the preamble followed by every turn formatted through its
    /// role's template, each joined with a single space.
    pub fn render(&self, templates: &TurnTemplates, preambles: &Preambles) -> String {
        let mut out = preambles.text(self.preamble).to_string();
        for turn in &self.turns {
            let template = match turn.role {
                Role::User => &templates.user,
                Role::Model => &templates.model,
            };
            out.push(' ');
            out.push_str(&template.render(&turn.text));
        }
        out
    }
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new(Persona::Initial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_empty_is_preamble() {
        let preambles = Preambles::default();
        let transcript = Transcript::default();
        assert_eq!(
            transcript.render(&TurnTemplates::default(), &preambles),
            preambles.text(Persona::Initial)
        );
    }

    #[test]
    fn test_render_turns() {
        let preambles = Preambles::default();
        let mut transcript = Transcript::default();
        transcript.push(Turn::user("hi"));
        transcript.push(Turn::model("hello"));
        transcript.push(Turn::user("how are you?"));

        let rendered = transcript.render(&TurnTemplates::default(), &preambles);
        let expected = format!(
            "{} User: hi [/INST] Friend: hello </s><s>[INST] User: how are you? [/INST]",
            preambles.text(Persona::Initial)
        );
        assert_eq!(rendered, expected);
    }

    #[test]
    fn test_set_persona_is_idempotent() {
        let mut transcript = Transcript::default();
        transcript.push(Turn::user("hi"));
        assert!(transcript.set_persona(Persona::Familiar));
        assert!(!transcript.set_persona(Persona::Familiar));
        assert_eq!(transcript.persona(), Persona::Familiar);
        assert_eq!(transcript.turns(), &[Turn::user("hi")]);
    }

    #[test]
    fn test_swapped_preamble_renders_new_text_only() {
        let preambles = Preambles::default();
        let mut transcript = Transcript::default();
        transcript.push(Turn::user("hi"));
        transcript.set_persona(Persona::Intimate);

        let rendered = transcript.render(&TurnTemplates::default(), &preambles);
        assert!(rendered.starts_with(preambles.text(Persona::Intimate)));
        assert!(!rendered.contains(preambles.text(Persona::Initial)));
        assert!(rendered.ends_with("User: hi [/INST]"));
    }

    #[test]
    fn test_serde_shape() {
        let mut transcript = Transcript::default();
        transcript.push(Turn::model("hey"));
        let json = serde_json::to_value(&transcript).unwrap();
        assert_eq!(json["preamble"], "initial");
        assert_eq!(json["turns"][0]["role"], "model");

        let back: Transcript = serde_json::from_value(json).unwrap();
        assert_eq!(back, transcript);
    }
}
