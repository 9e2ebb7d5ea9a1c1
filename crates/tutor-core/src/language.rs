//! Language detection and the templated messages the engine emits on its
//! own (fallback replies, forced completions, the no-content sentinel).

use serde::{Deserialize, Serialize};

use crate::turn::ForceReason;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
  #[default]
  English,
  Spanish,
}

/// Picks the language of templated messages from the student's text.
pub trait LanguageDetector: Send + Sync {
  fn detect(&self, text: &str) -> Language;
}

const ENGLISH_WORDS: &[&str] = &[
  "the", "and", "of", "to", "is", "that", "in", "for", "it", "with", "this", "are", "be",
  "because", "which", "would",
];

const SPANISH_WORDS: &[&str] = &[
  "el", "la", "de", "que", "y", "en", "los", "las", "por", "para", "es", "una", "con",
  "porque", "del", "se",
];

/// Counts hits against two fixed stop-word lists. Ties go to English.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordListDetector;

impl LanguageDetector for WordListDetector {
  fn detect(&self, text: &str) -> Language {
    let (mut en, mut es) = (0usize, 0usize);
    for word in text.split(|c: char| !c.is_alphabetic()).filter(|w| !w.is_empty()) {
      let word = word.to_lowercase();
      if ENGLISH_WORDS.contains(&word.as_str()) {
        en += 1;
      }
      if SPANISH_WORDS.contains(&word.as_str()) {
        es += 1;
      }
    }
    if es > en { Language::Spanish } else { Language::English }
  }
}

// ─── Templates ───────────────────────────────────────────────────────────────

impl Language {
  /// Shown when the evaluator's reply could not be validated.
  pub fn retry_message(self) -> &'static str {
    match self {
      Self::English => {
        "I could not evaluate your last answer properly. Please restate it, \
         adding the reasoning behind your conclusions."
      }
      Self::Spanish => {
        "No pude evaluar correctamente tu última respuesta. Por favor, \
         reformúlala incluyendo el razonamiento detrás de tus conclusiones."
      }
    }
  }

  /// Per-skill feedback for a conservative forced completion.
  pub fn insufficient_development(self, skill_name: &str) -> String {
    match self {
      Self::English => format!(
        "The conversation ended before \"{skill_name}\" was developed enough to \
         demonstrate a higher level."
      ),
      Self::Spanish => format!(
        "La conversación terminó antes de que \"{skill_name}\" se desarrollara lo \
         suficiente para demostrar un nivel superior."
      ),
    }
  }

  /// Rendered into the prompt when retrieval found nothing.
  pub fn no_relevant_content(self) -> &'static str {
    match self {
      Self::English => "No relevant source content was found for this answer.",
      Self::Spanish => "No se encontró contenido de las fuentes relevante para esta respuesta.",
    }
  }

  /// The closing message of a forced completion.
  pub fn forced_closing(self, reason: ForceReason) -> &'static str {
    match (self, reason) {
      (Self::English, ForceReason::TurnLimit) => {
        "You have used all the turns available for this assessment. Your attempt \
         has been completed and graded."
      }
      (Self::English, ForceReason::Stagnation) => {
        "The conversation is no longer making progress, so your attempt has been \
         completed and graded."
      }
      (Self::English, ForceReason::FinishEarly) => {
        "You chose to finish early. Your attempt has been completed and graded."
      }
      (Self::Spanish, ForceReason::TurnLimit) => {
        "Has utilizado todos los turnos disponibles para esta evaluación. Tu \
         intento ha sido completado y calificado."
      }
      (Self::Spanish, ForceReason::Stagnation) => {
        "La conversación ya no avanza, por lo que tu intento ha sido completado y \
         calificado."
      }
      (Self::Spanish, ForceReason::FinishEarly) => {
        "Elegiste terminar antes. Tu intento ha sido completado y calificado."
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn detects_spanish() {
    let d = WordListDetector;
    assert_eq!(d.detect("La empresa debe reducir los costos porque el mercado es competitivo"), Language::Spanish);
  }

  #[test]
  fn detects_english() {
    let d = WordListDetector;
    assert_eq!(d.detect("The firm should cut costs because the market is competitive"), Language::English);
  }

  #[test]
  fn empty_and_ties_default_to_english() {
    let d = WordListDetector;
    assert_eq!(d.detect(""), Language::English);
    assert_eq!(d.detect("ok 42"), Language::English);
  }
}
