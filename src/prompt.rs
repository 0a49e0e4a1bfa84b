/// Prompt construction for the help desk and the free-form assistant.
use serde::{Deserialize, Serialize};

use crate::matcher::MatchResult;

const FOLLOW_UP: &str = "Please let me know if you have any further questions.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Help-desk prompt for one resolved question.
///
/// A matched section is quoted under its label. Without a match the user's
/// own question stands in for the section; the backend is not told that
/// nothing matched.
pub fn desk_prompt(user_name: &str, resolved: &MatchResult) -> String {
    match resolved {
        MatchResult::ExactMatch { label, content }
        | MatchResult::SemanticMatch { label, content, .. } => format!(
            "Thank you, {user_name}, for your question.\nSection: {label}\n\n{content}\n\n{FOLLOW_UP}"
        ),
        MatchResult::NoMatch { raw_query } => {
            format!("Thank you, {user_name}, for your question: {raw_query}\n{FOLLOW_UP}")
        }
    }
}

/// Render a transcript as `[System]:` / `User:` / `Assistant:` lines ending
/// with an open `Assistant:` cue.
pub fn chat_prompt(turns: &[ChatTurn]) -> String {
    let mut prompt = String::new();
    for turn in turns {
        let speaker = match turn.role {
            Role::System => "[System]",
            Role::User => "User",
            Role::Assistant => "Assistant",
        };
        prompt.push_str(speaker);
        prompt.push_str(": ");
        prompt.push_str(&turn.content);
        prompt.push('\n');
    }
    prompt.push_str("Assistant:");
    prompt
}

/// Uppercase the first letter of every word, lowercase the rest.
pub fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_desk_prompt_with_section() {
        let resolved = MatchResult::SemanticMatch {
            label: "Loan".to_string(),
            content: "Loans start at 4.5% APR.".to_string(),
            score: 0.8,
        };
        assert_eq!(
            desk_prompt("Dana", &resolved),
            "Thank you, Dana, for your question.\nSection: Loan\n\nLoans start at 4.5% APR.\n\n\
             Please let me know if you have any further questions."
        );
    }

    #[test]
    fn test_desk_prompt_fallback_uses_raw_query() {
        let resolved = MatchResult::NoMatch {
            raw_query: "Where is my card?".to_string(),
        };
        let prompt = desk_prompt("User", &resolved);
        assert_eq!(
            prompt,
            "Thank you, User, for your question: Where is my card?\n\
             Please let me know if you have any further questions."
        );
        assert!(!prompt.contains("Section:"));
    }

    #[test]
    fn test_chat_prompt_layout() {
        let turns = [
            ChatTurn::new(Role::System, "Be brief."),
            ChatTurn::new(Role::User, "Hi"),
            ChatTurn::new(Role::Assistant, "Hello!"),
            ChatTurn::new(Role::User, "What is Rust?"),
        ];
        assert_eq!(
            chat_prompt(&turns),
            "[System]: Be brief.\nUser: Hi\nAssistant: Hello!\nUser: What is Rust?\nAssistant:"
        );
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("online banking"), "Online Banking");
        assert_eq!(title_case("  ATM   fees "), "Atm Fees");
        assert_eq!(title_case(""), "");
    }
}
