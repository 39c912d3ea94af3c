//! Persona scoring.
//!
//! Each persona is scored against the request's signals; the highest score
//! wins and ties go to the persona with the lowest `priority` value.
//!
//! | Signal                               | Points |
//! |--------------------------------------|--------|
//! | Event names the persona as target    | 10     |
//! | Caller profile prefers the persona   | 5      |
//! | Persona has affinity for event kind  | 3      |
//! | Persona has affinity for the tone    | 2      |
//! | Persona allows the requested task    | 2      |

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::EventKind;
use crate::domain::catalog::{EmotionalTone, Persona, TaskKind};

const TARGET_POINTS: u32 = 10;
const PREFERRED_POINTS: u32 = 5;
const KIND_POINTS: u32 = 3;
const TONE_POINTS: u32 = 2;
const TASK_POINTS: u32 = 2;

static TONE_LEXICON: Lazy<HashMap<&'static str, EmotionalTone>> = Lazy::new(|| {
    let mut lexicon = HashMap::new();
    for word in [
        "panic", "panicking", "desperate", "hopeless", "overwhelmed", "terrified", "crisis",
        "emergency", "helpless", "unbearable",
    ] {
        lexicon.insert(word, EmotionalTone::Distressed);
    }
    for word in [
        "sad", "angry", "upset", "frustrated", "annoyed", "worried", "stressed", "disappointed",
        "hate", "awful", "terrible", "broken", "stuck",
    ] {
        lexicon.insert(word, EmotionalTone::Negative);
    }
    for word in [
        "happy", "great", "excited", "love", "thanks", "thank", "awesome", "glad", "wonderful",
        "amazing", "fun",
    ] {
        lexicon.insert(word, EmotionalTone::Positive);
    }
    lexicon
});

/// Reads a coarse emotional tone from message text.
///
/// Any distress word wins outright; otherwise the majority of positive and
/// negative words decides, with a tie reading as neutral.
pub fn detect_tone(text: &str) -> EmotionalTone {
    let mut positive = 0usize;
    let mut negative = 0usize;
    for word in text
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| !w.is_empty())
    {
        match TONE_LEXICON.get(word.to_lowercase().as_str()) {
            Some(EmotionalTone::Distressed) => return EmotionalTone::Distressed,
            Some(EmotionalTone::Negative) => negative += 1,
            Some(EmotionalTone::Positive) => positive += 1,
            _ => {}
        }
    }
    match positive.cmp(&negative) {
        std::cmp::Ordering::Greater => EmotionalTone::Positive,
        std::cmp::Ordering::Less => EmotionalTone::Negative,
        std::cmp::Ordering::Equal => EmotionalTone::Neutral,
    }
}

/// What a request tells us about the persona it wants.
#[derive(Debug, Clone, Copy)]
pub struct PersonaSignals<'a> {
    pub kind: EventKind,
    pub tone: EmotionalTone,
    pub task: TaskKind,
    pub target: Option<&'a str>,
    pub preferred: Option<&'a str>,
}

/// The winning persona and how it scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaChoice {
    pub persona_id: String,
    pub score: u32,
    pub tone: EmotionalTone,
}

pub fn score_persona(persona: &Persona, signals: &PersonaSignals<'_>) -> u32 {
    let mut score = 0;
    if signals.target == Some(persona.id.as_str()) {
        score += TARGET_POINTS;
    }
    if signals.preferred == Some(persona.id.as_str()) {
        score += PREFERRED_POINTS;
    }
    if persona.event_affinity.contains(&signals.kind) {
        score += KIND_POINTS;
    }
    if persona.tone_affinity.contains(&signals.tone) {
        score += TONE_POINTS;
    }
    if persona.allows_task(signals.task) {
        score += TASK_POINTS;
    }
    score
}

/// Highest-scoring persona; `None` only when `personas` is empty.
pub fn select_persona(personas: &[Persona], signals: &PersonaSignals<'_>) -> Option<PersonaChoice> {
    personas
        .iter()
        .map(|p| (p, score_persona(p, signals)))
        .max_by(|(a, sa), (b, sb)| sa.cmp(sb).then_with(|| b.priority.cmp(&a.priority)))
        .map(|(persona, score)| PersonaChoice {
            persona_id: persona.id.clone(),
            score,
            tone: signals.tone,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::Catalog;

    fn signals(text: &str) -> PersonaSignals<'_> {
        PersonaSignals {
            kind: EventKind::Chat,
            tone: detect_tone(text),
            task: TaskKind::Chat,
            target: None,
            preferred: None,
        }
    }

    #[test]
    fn tone_detection() {
        assert_eq!(detect_tone("What's the capital of France?"), EmotionalTone::Neutral);
        assert_eq!(detect_tone("I'm so frustrated and stuck"), EmotionalTone::Negative);
        assert_eq!(detect_tone("Thanks, that was AWESOME!"), EmotionalTone::Positive);
        assert_eq!(
            detect_tone("great day but I feel hopeless"),
            EmotionalTone::Distressed
        );
    }

    #[test]
    fn neutral_chat_picks_assistant() {
        let catalog = Catalog::default();
        let choice = select_persona(catalog.personas(), &signals("hello there")).unwrap();
        assert_eq!(choice.persona_id, "assistant");
    }

    #[test]
    fn distressed_message_routes_to_coach() {
        let catalog = Catalog::default();
        let choice = select_persona(catalog.personas(), &signals("I'm overwhelmed")).unwrap();
        assert_eq!(choice.persona_id, "coach");
        assert_eq!(choice.tone, EmotionalTone::Distressed);
    }

    #[test]
    fn explicit_target_outweighs_everything() {
        let catalog = Catalog::default();
        let mut s = signals("I'm overwhelmed");
        s.target = Some("storyteller");
        s.preferred = Some("engineer");
        let choice = select_persona(catalog.personas(), &s).unwrap();
        assert_eq!(choice.persona_id, "storyteller");
    }

    #[test]
    fn caller_preference_raises_score() {
        let catalog = Catalog::default();
        let mut s = signals("hello");
        s.task = TaskKind::Coding;
        s.preferred = Some("engineer");
        let choice = select_persona(catalog.personas(), &s).unwrap();
        assert_eq!(choice.persona_id, "engineer");
        assert_eq!(choice.score, 7);
    }

    #[test]
    fn ties_go_to_lowest_priority() {
        let base = Catalog::default().personas()[0].clone();
        let personas = vec![
            Persona {
                id: "second".into(),
                priority: 2,
                ..base.clone()
            },
            Persona {
                id: "first".into(),
                priority: 1,
                ..base
            },
        ];
        let choice = select_persona(&personas, &signals("hello")).unwrap();
        assert_eq!(choice.persona_id, "first");
    }

    #[test]
    fn empty_catalog_selects_nothing() {
        assert!(select_persona(&[], &signals("hi")).is_none());
    }
}
