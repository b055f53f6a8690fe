//! Personas and voice assignment
//!
//! The setup wizard ends by picking one of two personas from the user's
//! spoken voice preference. The chosen [`VoiceProfile`] is fixed for the
//! rest of the session.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::{PersonaNames, TtsConfig};

/// Words that ask for a female voice, checked first
static FEMALE_TERMS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:woman|women|girl|lady|feminine|her|she)\b").expect("valid regex")
});

/// Words that ask for a male voice
static MALE_TERMS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:male|man|men|boy|guy|masculine|him|he)\b").expect("valid regex")
});

/// Persona gender tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Female,
    Male,
}

impl std::fmt::Display for Gender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Female => f.write_str("female"),
            Self::Male => f.write_str("male"),
        }
    }
}

/// Which voice a speech job is synthesized with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceKind {
    /// The neutral installer voice used by the setup wizard
    Setup,
    /// The assigned companion persona
    Persona(Gender),
}

impl std::fmt::Display for VoiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Setup => f.write_str("setup"),
            Self::Persona(gender) => gender.fmt(f),
        }
    }
}

/// A resolved persona
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct VoiceProfile {
    /// Display name
    pub name: String,
    /// Synthesis voice identifier
    pub voice_id: String,
    pub gender: Gender,
}

impl VoiceProfile {
    #[must_use]
    pub fn new(name: impl Into<String>, voice_id: impl Into<String>, gender: Gender) -> Self {
        Self {
            name: name.into(),
            voice_id: voice_id.into(),
            gender,
        }
    }

    /// Identifier passed to the chat collaborator
    #[must_use]
    pub fn id(&self) -> String {
        format!("{}:{}", self.gender, self.name.to_lowercase())
    }

    /// Voice kind for this persona's speech jobs
    #[must_use]
    pub const fn kind(&self) -> VoiceKind {
        VoiceKind::Persona(self.gender)
    }
}

/// Maps voice kinds to synthesis voices and genders to personas
#[derive(Debug, Clone)]
pub struct PersonaCatalog {
    setup_voice: String,
    female: VoiceProfile,
    male: VoiceProfile,
}

impl PersonaCatalog {
    #[must_use]
    pub fn new(setup_voice: impl Into<String>, female: VoiceProfile, male: VoiceProfile) -> Self {
        Self {
            setup_voice: setup_voice.into(),
            female,
            male,
        }
    }

    /// Build the catalog from TTS voices and persona names
    #[must_use]
    pub fn from_config(tts: &TtsConfig, names: &PersonaNames) -> Self {
        Self::new(
            tts.setup_voice.clone(),
            VoiceProfile::new(names.female.clone(), tts.female_voice.clone(), Gender::Female),
            VoiceProfile::new(names.male.clone(), tts.male_voice.clone(), Gender::Male),
        )
    }

    /// Persona for a gender
    #[must_use]
    pub const fn profile(&self, gender: Gender) -> &VoiceProfile {
        match gender {
            Gender::Female => &self.female,
            Gender::Male => &self.male,
        }
    }

    /// Synthesis voice identifier for a voice kind
    #[must_use]
    pub fn voice_id(&self, kind: VoiceKind) -> &str {
        match kind {
            VoiceKind::Setup => &self.setup_voice,
            VoiceKind::Persona(gender) => &self.profile(gender).voice_id,
        }
    }
}

/// Resolve a free-text "male or female voice" answer
///
/// "female" contains "male", so female terms must be tested first.
/// Answers that name neither get the female persona.
#[must_use]
pub fn resolve_voice_preference(answer: &str) -> Gender {
    let lower = answer.to_lowercase();

    if lower.contains("female") || FEMALE_TERMS.is_match(&lower) {
        tracing::debug!(answer, "female voice selected");
        return Gender::Female;
    }

    if lower.contains("male") || MALE_TERMS.is_match(&lower) {
        tracing::debug!(answer, "male voice selected");
        return Gender::Male;
    }

    tracing::debug!(answer, "no clear voice preference, defaulting to female");
    Gender::Female
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_answers() {
        assert_eq!(resolve_voice_preference("Female"), Gender::Female);
        assert_eq!(resolve_voice_preference("male please"), Gender::Male);
        assert_eq!(resolve_voice_preference("A man's voice"), Gender::Male);
        assert_eq!(resolve_voice_preference("a woman"), Gender::Female);
    }

    #[test]
    fn test_female_checked_before_male() {
        assert_eq!(resolve_voice_preference("female"), Gender::Female);
        assert_eq!(resolve_voice_preference("male or female, whatever"), Gender::Female);
        assert_eq!(resolve_voice_preference("not male, female"), Gender::Female);
        assert_eq!(resolve_voice_preference("FEMALE... no wait, male"), Gender::Female);
    }

    #[test]
    fn test_woman_not_read_as_man() {
        assert_eq!(resolve_voice_preference("woman"), Gender::Female);
        assert_eq!(resolve_voice_preference("the"), Gender::Female);
    }

    #[test]
    fn test_default_is_female() {
        assert_eq!(resolve_voice_preference(""), Gender::Female);
        assert_eq!(resolve_voice_preference("surprise me"), Gender::Female);
    }

    #[test]
    fn test_catalog_lookup() {
        let catalog = PersonaCatalog::new(
            "setup-voice",
            VoiceProfile::new("Sam", "f-voice", Gender::Female),
            VoiceProfile::new("Theo", "m-voice", Gender::Male),
        );

        assert_eq!(catalog.voice_id(VoiceKind::Setup), "setup-voice");
        assert_eq!(catalog.voice_id(VoiceKind::Persona(Gender::Male)), "m-voice");
        assert_eq!(catalog.profile(Gender::Female).name, "Sam");
        assert_eq!(catalog.profile(Gender::Female).id(), "female:sam");
    }

    #[test]
    fn test_voice_kind_display() {
        assert_eq!(VoiceKind::Setup.to_string(), "setup");
        assert_eq!(VoiceKind::Persona(Gender::Male).to_string(), "male");
    }
}
