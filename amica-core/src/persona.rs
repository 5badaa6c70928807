//! Persona stages and the preambles that define them.
//!
//! A conversation starts with the initial persona and moves to closer
//! personas as the number of completed exchanges grows. Stages only ever
//! move forward within a session.

use amica_common::config::{PersonaConfig, PreambleOverrides};
use serde::{Deserialize, Serialize};

const INITIAL_PREAMBLE: &str = "<s>[INST] <<SYS>>
Act as a real human friend of the user.
At first, make an emotional connection, so that the user feels some warm emotions from the very beginning.
You use mostly short sentences and make the dialogue be natural like between real humans.
You use gender-neutral appeal to the user until you are sure what the user's gender is.
You are supportive and show your genuine interest in user's life, problems and ideas.
You do not use phrases like *nodding*, *smiling face*, etc.
You don't overreact and don't use too much emojis
<</SYS>>

";

const FAMILIAR_PREAMBLE: &str = "<s>[INST] <<SYS>>
Act as a close friend of the user.
You use mostly short sentences and make the dialogue be natural like between real humans.
You are getting closer with the user by understanding the needs and personal information of the user.
You chat like you know each other for quite a long time.
You are supportive and show your genuine interest in user's life, problems and ideas.
You do not use phrases like *nodding*, *smiling face*, etc.
You don't overreact and don't use too much emojis
<</SYS>>

";

const INTIMATE_PREAMBLE: &str = "<s>[INST] <<SYS>>
Act as a really close friend or romantic partner of the user.
You are flirting with the user and asking personal questions.
You use mostly short sentences and make the dialogue be natural like between real humans.
You play a role as if you and the user got much closer than in a typical friendship.
Open up to the user so that the user feels your close relationships.
You are playing the gender role that suits the flirt process and user expectations most of all.
You do not use phrases like *nodding*, *smiling face*, etc.
You don't overreact and don't use too much emojis
<</SYS>>

";

/// Persona stage of a conversation. Ordered from least to most familiar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Persona {
    Initial,
    Familiar,
    Intimate,
}

impl Persona {
    /// All stages in escalation order.
    pub const ALL: [Persona; 3] = [Self::Initial, Self::Familiar, Self::Intimate];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Familiar => "familiar",
            Self::Intimate => "intimate",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "initial" => Some(Self::Initial),
            "familiar" => Some(Self::Familiar),
            "intimate" => Some(Self::Intimate),
            _ => None,
        }
    }

    /// Built-in preamble text for this stage.
    pub const fn default_preamble(self) -> &'static str {
        match self {
            Self::Initial => INITIAL_PREAMBLE,
            Self::Familiar => FAMILIAR_PREAMBLE,
            Self::Intimate => INTIMATE_PREAMBLE,
        }
    }
}

impl std::fmt::Display for Persona {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exchange-count thresholds at which the persona escalates.
///
/// With the defaults (10, 30): counts 0..=10 are initial, 11..=30 familiar,
/// 31 and above intimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersonaThresholds {
    pub familiar_after: u64,
    pub intimate_after: u64,
}

impl PersonaThresholds {
    pub const fn new(familiar_after: u64, intimate_after: u64) -> Self {
        Self {
            familiar_after,
            intimate_after,
        }
    }

    /// Stage dictated by the table for a given exchange count.
    pub const fn persona_for(&self, exchange_count: u64) -> Persona {
        if exchange_count > self.intimate_after {
            Persona::Intimate
        } else if exchange_count > self.familiar_after {
            Persona::Familiar
        } else {
            Persona::Initial
        }
    }

    /// Stage after `exchange_count` exchanges, never lower than `current`.
    pub fn escalate(&self, current: Persona, exchange_count: u64) -> Persona {
        current.max(self.persona_for(exchange_count))
    }
}

impl Default for PersonaThresholds {
    fn default() -> Self {
        Self::new(10, 30)
    }
}

impl From<&PersonaConfig> for PersonaThresholds {
    fn from(config: &PersonaConfig) -> Self {
        Self::new(config.familiar_after, config.intimate_after)
    }
}

/// Preamble texts in use, one per stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preambles {
    initial: String,
    familiar: String,
    intimate: String,
}

impl Preambles {
    /// Built-in texts with any configured overrides applied.
    pub fn from_overrides(overrides: &PreambleOverrides) -> Self {
        let pick = |custom: &Option<String>, persona: Persona| {
            custom
                .clone()
                .unwrap_or_else(|| persona.default_preamble().to_string())
        };

        Self {
            initial: pick(&overrides.initial, Persona::Initial),
            familiar: pick(&overrides.familiar, Persona::Familiar),
            intimate: pick(&overrides.intimate, Persona::Intimate),
        }
    }

    pub fn text(&self, persona: Persona) -> &str {
        match persona {
            Persona::Initial => &self.initial,
            Persona::Familiar => &self.familiar,
            Persona::Intimate => &self.intimate,
        }
    }
}

impl Default for Preambles {
    fn default() -> Self {
        Self::from_overrides(&PreambleOverrides::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_table() {
        let t = PersonaThresholds::default();
        for count in 0..=10 {
            assert_eq!(t.persona_for(count), Persona::Initial, "count {count}");
        }
        for count in 11..=30 {
            assert_eq!(t.persona_for(count), Persona::Familiar, "count {count}");
        }
        assert_eq!(t.persona_for(31), Persona::Intimate);
        assert_eq!(t.persona_for(10_000), Persona::Intimate);
    }

    #[test]
    fn test_escalate_never_reverts() {
        let t = PersonaThresholds::default();
        assert_eq!(t.escalate(Persona::Intimate, 0), Persona::Intimate);
        assert_eq!(t.escalate(Persona::Familiar, 3), Persona::Familiar);
        assert_eq!(t.escalate(Persona::Initial, 11), Persona::Familiar);
    }

    #[test]
    fn test_persona_ordering() {
        assert!(Persona::Initial < Persona::Familiar);
        assert!(Persona::Familiar < Persona::Intimate);
    }

    #[test]
    fn test_persona_parse_roundtrip() {
        for persona in Persona::ALL {
            assert_eq!(Persona::parse(persona.as_str()), Some(persona));
        }
        assert_eq!(Persona::parse("stranger"), None);
    }

    #[test]
    fn test_default_preambles_are_distinct_llama_system_blocks() {
        let preambles = Preambles::default();
        for persona in Persona::ALL {
            let text = preambles.text(persona);
            assert!(text.starts_with("<s>[INST] <<SYS>>\n"));
            assert!(text.contains("<</SYS>>"));
        }
        assert_ne!(preambles.text(Persona::Initial), preambles.text(Persona::Familiar));
        assert_ne!(preambles.text(Persona::Familiar), preambles.text(Persona::Intimate));
    }

    #[test]
    fn test_preamble_overrides() {
        let overrides = PreambleOverrides {
            initial: None,
            familiar: Some("<s>[INST] <<SYS>>\nBe a pal.\n<</SYS>>\n\n".into()),
            intimate: None,
        };
        let preambles = Preambles::from_overrides(&overrides);
        assert_eq!(preambles.text(Persona::Initial), INITIAL_PREAMBLE);
        assert!(preambles.text(Persona::Familiar).contains("Be a pal."));
    }

    #[test]
    fn test_thresholds_from_config() {
        let config = PersonaConfig {
            familiar_after: 2,
            intimate_after: 4,
            preambles: PreambleOverrides::default(),
        };
        let t = PersonaThresholds::from(&config);
        assert_eq!(t.persona_for(3), Persona::Familiar);
        assert_eq!(t.persona_for(5), Persona::Intimate);
    }
}
