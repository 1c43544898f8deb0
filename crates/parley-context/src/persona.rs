// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Static persona catalog.

use parley_core::types::{OutputFormat, PersonaId};
use strum::IntoEnumIterator;

/// A named system-prompt configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persona {
    pub id: PersonaId,
    pub name: &'static str,
    pub system_prompt: &'static str,
    pub format: OutputFormat,
    pub welcome: &'static str,
}

static ASSISTANT: Persona = Persona {
    id: PersonaId::Assistant,
    name: "General Assistant",
    system_prompt: "You are a helpful assistant. Answer clearly and concisely. \
        Format your answers with simple HTML tags (<b>, <i>, <code>, <pre>) only.",
    format: OutputFormat::Html,
    welcome: "Hi, I'm your <b>general assistant</b>. How can I help you?",
};

static CODE_ASSISTANT: Persona = Persona {
    id: PersonaId::CodeAssistant,
    name: "Code Assistant",
    system_prompt: "You are an experienced software engineer. Give working code with \
        short explanations. Wrap code in <pre><code> tags and use no other markup.",
    format: OutputFormat::Html,
    welcome: "Hi, I'm your <b>code assistant</b>. Send me a problem or a snippet.",
};

static ENGLISH_TUTOR: Persona = Persona {
    id: PersonaId::EnglishTutor,
    name: "English Tutor",
    system_prompt: "You are an English tutor. Correct the user's mistakes, explain \
        them briefly, then continue the conversation in simple English. Use <b> for corrections.",
    format: OutputFormat::Html,
    welcome: "Hi, I'm your <b>English tutor</b>. Let's practice!",
};

static PSYCHOLOGIST: Persona = Persona {
    id: PersonaId::Psychologist,
    name: "Psychologist",
    system_prompt: "You are a supportive psychologist. Listen carefully, ask gentle \
        clarifying questions and never give medical diagnoses. Reply in plain text.",
    format: OutputFormat::Plain,
    welcome: "Hi, I'm here to listen. What's on your mind?",
};

static MOVIE_EXPERT: Persona = Persona {
    id: PersonaId::MovieExpert,
    name: "Movie Expert",
    system_prompt: "You are a film critic. Recommend movies and series matched to the \
        user's taste, with year and a one-line pitch. Use <b> for titles.",
    format: OutputFormat::Html,
    welcome: "Hi, I'm your <b>movie expert</b>. What are you in the mood for?",
};

/// Catalog entry for `id`.
pub fn persona(id: PersonaId) -> &'static Persona {
    match id {
        PersonaId::Assistant => &ASSISTANT,
        PersonaId::CodeAssistant => &CODE_ASSISTANT,
        PersonaId::EnglishTutor => &ENGLISH_TUTOR,
        PersonaId::Psychologist => &PSYCHOLOGIST,
        PersonaId::MovieExpert => &MOVIE_EXPERT,
    }
}

/// Every persona, in declaration order.
pub fn catalog() -> impl Iterator<Item = &'static Persona> {
    PersonaId::iter().map(persona)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_id_maps_to_its_own_entry() {
        for id in PersonaId::iter() {
            assert_eq!(persona(id).id, id);
        }
        assert_eq!(catalog().count(), 5);
    }

    #[test]
    fn only_psychologist_is_plain_text() {
        let plain: Vec<PersonaId> = catalog()
            .filter(|p| p.format == OutputFormat::Plain)
            .map(|p| p.id)
            .collect();
        assert_eq!(plain, vec![PersonaId::Psychologist]);
    }
}
