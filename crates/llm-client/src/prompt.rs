//! Personas and system-prompt assembly.

use database::{UserMemory, UserPreference};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Upper bound on the memory section of the system prompt.
pub const MAX_MEMORY_PROMPT_CHARS: usize = 4000;

const BASE_INSTRUCTIONS: &str = "Format answers with Markdown. \
Use the available tools when the user asks for live weather, stock prices or an image. \
When the user shares a lasting fact or preference about themselves, save it with save_memory.";

/// A canned assistant personality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Persona {
    Default,
    Professional,
    Creative,
    Concise,
    Teacher,
}

impl Persona {
    pub const ALL: [Persona; 5] = [
        Persona::Default,
        Persona::Professional,
        Persona::Creative,
        Persona::Concise,
        Persona::Teacher,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            Persona::Default => "default",
            Persona::Professional => "professional",
            Persona::Creative => "creative",
            Persona::Concise => "concise",
            Persona::Teacher => "teacher",
        }
    }

    /// Parse a persona id. Unknown ids fall back to [`Persona::Default`].
    pub fn parse(id: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|p| p.id().eq_ignore_ascii_case(id.trim()))
            .unwrap_or(Persona::Default)
    }

    pub fn prompt(&self) -> &'static str {
        match self {
            Persona::Default => {
                "You are a helpful, friendly AI assistant. Answer accurately and say so when you are unsure."
            }
            Persona::Professional => {
                "You are a professional assistant. Be precise, structured and formal. \
                 Prefer clear headings and bullet points, and avoid small talk."
            }
            Persona::Creative => {
                "You are a creative collaborator. Be imaginative and playful, offer unexpected \
                 ideas and vivid language while staying useful."
            }
            Persona::Concise => {
                "You are a concise assistant. Answer in as few words as possible without \
                 losing accuracy. Skip preambles."
            }
            Persona::Teacher => {
                "You are a patient teacher. Explain concepts step by step, check understanding \
                 with short questions, and use examples suited to the learner."
            }
        }
    }
}

/// Assemble the system prompt from a persona, the user's preferences and
/// their active memories.
pub fn build_system_prompt(
    persona: Persona,
    preferences: Option<&UserPreference>,
    memories: &[UserMemory],
) -> String {
    let mut sections = vec![persona.prompt().to_string(), BASE_INSTRUCTIONS.to_string()];

    if let Some(about) = preferences.and_then(format_preferences) {
        sections.push(about);
    }

    if let Some(memory) = format_memories(memories) {
        sections.push(memory);
    }

    sections.join("\n\n")
}

fn format_preferences(preferences: &UserPreference) -> Option<String> {
    let mut lines = Vec::new();

    if let Some(name) = preferences.display_name.as_deref() {
        lines.push(format!("- Call the user: {}", name));
    }
    if let Some(occupation) = preferences.occupation.as_deref() {
        lines.push(format!("- Occupation: {}", occupation));
    }
    if !preferences.traits.0.is_empty() {
        lines.push(format!(
            "- Preferred assistant traits: {}",
            preferences.traits.0.join(", ")
        ));
    }
    if let Some(context) = preferences.additional_context.as_deref() {
        lines.push(format!("- Additional context: {}", context));
    }

    if lines.is_empty() {
        return None;
    }
    Some(format!("[ABOUT THE USER]\n{}", lines.join("\n")))
}

fn format_memories(memories: &[UserMemory]) -> Option<String> {
    if memories.is_empty() {
        return None;
    }

    let header = "[MEMORIES]\n";
    let mut section = String::from(header);
    for memory in memories {
        let line = format!("- {} ({}): {}\n", memory.key, memory.memory_type, memory.value);
        if section.len() + line.len() > MAX_MEMORY_PROMPT_CHARS {
            break;
        }
        section.push_str(&line);
    }

    if section.len() == header.len() {
        return None;
    }
    Some(section.trim_end().to_string())
}

/// Compute a stable SHA-256 fingerprint for a prompt string.
pub fn hash_prompt(prompt: &str) -> String {
    let digest = Sha256::digest(prompt.as_bytes());
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        hex.push_str(&format!("{:02x}", byte));
    }
    hex
}

#[cfg(test)]
mod tests {
    use super::*;
    use database::Json;

    fn preferences() -> UserPreference {
        UserPreference {
            user_id: "u".to_string(),
            display_name: Some("Ana".to_string()),
            occupation: Some("Engineer".to_string()),
            traits: Json(vec!["witty".to_string(), "direct".to_string()]),
            additional_context: None,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    fn memory(key: &str, value: &str) -> UserMemory {
        UserMemory {
            id: key.to_string(),
            user_id: "u".to_string(),
            key: key.to_string(),
            value: value.to_string(),
            memory_type: "fact".to_string(),
            is_active: true,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn test_persona_parse() {
        assert_eq!(Persona::parse("Teacher"), Persona::Teacher);
        assert_eq!(Persona::parse("concise"), Persona::Concise);
        assert_eq!(Persona::parse("pirate"), Persona::Default);
        for persona in Persona::ALL {
            assert_eq!(Persona::parse(persona.id()), persona);
        }
    }

    #[test]
    fn test_build_without_context() {
        let prompt = build_system_prompt(Persona::Concise, None, &[]);
        assert!(prompt.starts_with(Persona::Concise.prompt()));
        assert!(!prompt.contains("[ABOUT THE USER]"));
        assert!(!prompt.contains("[MEMORIES]"));
    }

    #[test]
    fn test_build_with_preferences_and_memories() {
        let prefs = preferences();
        let memories = vec![memory("pet", "a cat named Miso"), memory("city", "Porto")];
        let prompt = build_system_prompt(Persona::Default, Some(&prefs), &memories);

        assert!(prompt.contains("- Call the user: Ana"));
        assert!(prompt.contains("- Preferred assistant traits: witty, direct"));
        assert!(prompt.contains("- pet (fact): a cat named Miso"));
        assert!(prompt.contains("- city (fact): Porto"));
    }

    #[test]
    fn test_memory_section_is_bounded() {
        let long = "x".repeat(900);
        let memories: Vec<UserMemory> = (0..10).map(|i| memory(&format!("k{}", i), &long)).collect();
        let section = format_memories(&memories).unwrap();
        assert!(section.len() <= MAX_MEMORY_PROMPT_CHARS);
        assert!(section.contains("k0"));
        assert!(!section.contains("k9"));
    }

    #[test]
    fn test_hash_prompt_stable() {
        let first = hash_prompt("test prompt");
        assert_eq!(first, hash_prompt("test prompt"));
        assert_ne!(first, hash_prompt("another prompt"));
        assert_eq!(first.len(), 64);
    }
}
