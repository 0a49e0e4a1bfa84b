/// Interactive terminal loops.
///
/// Generic over input and output so sessions can be scripted in tests.
use std::io::{BufRead, Write};

use anyhow::{Context, Result};

use crate::assistant::ChatSession;
use crate::context::InferenceContext;
use crate::desk::Desk;

const RULE_WIDTH: usize = 60;

fn read_line(input: &mut impl BufRead) -> Result<Option<String>> {
    let mut line = String::new();
    let read = input.read_line(&mut line).context("failed to read input")?;
    if read == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

fn prompt_line(input: &mut impl BufRead, out: &mut impl Write, label: &str) -> Result<Option<String>> {
    write!(out, "{label}")?;
    out.flush()?;
    read_line(input)
}

/// Help-desk session: ask the user's name, then answer until `quit` or EOF.
pub fn run_desk(desk: &Desk, input: &mut impl BufRead, out: &mut impl Write) -> Result<()> {
    let bot = desk.persona();

    writeln!(out, "\nHello, I'm {bot}! I'm your help-desk chatbot.")?;
    let Some(name) = prompt_line(input, out, "May I have your name, please? ")? else {
        return Ok(());
    };
    let user = desk.user_name(&name).to_string();
    writeln!(out, "Nice to meet you, {user}! How can I assist you today?")?;
    writeln!(out, "{}", "-".repeat(RULE_WIDTH))?;

    loop {
        let Some(line) = prompt_line(input, out, &format!("{user}: "))? else {
            break;
        };
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("quit") {
            writeln!(out, "{bot}: Thank you for using our service. Have a great day!")?;
            break;
        }

        match desk.reply(&user, &line) {
            Ok(reply) if reply.contains('\n') => writeln!(out, "{bot}:\n{reply}")?,
            Ok(reply) => writeln!(out, "{bot}: {reply}")?,
            Err(e) => writeln!(out, "[Error] {e:#}")?,
        }
        writeln!(out, "{}", "-".repeat(RULE_WIDTH))?;
    }

    Ok(())
}

/// Free-form assistant session until `exit` or EOF.
pub fn run_assistant(
    session: &mut ChatSession,
    ctx: &InferenceContext,
    input: &mut impl BufRead,
    out: &mut impl Write,
) -> Result<()> {
    writeln!(out, "Chatbot ready ({}). Type 'exit' to quit.", ctx.model_id())?;

    loop {
        let Some(line) = prompt_line(input, out, "You: ")? else {
            break;
        };
        if line.eq_ignore_ascii_case("exit") {
            writeln!(out, "Goodbye!")?;
            break;
        }
        if line.is_empty() {
            continue;
        }

        match session.ask(ctx, &line) {
            Ok(reply) => writeln!(out, "Assistant: {reply}")?,
            Err(e) => writeln!(out, "[Error] {e}")?,
        }
    }

    Ok(())
}

/// Pick a model from a numbered menu answer.
///
/// Blank or unrecognised answers select `default`; `1..=n` selects that entry.
pub fn choose_model(models: &[String], default: &str, answer: &str) -> String {
    answer
        .trim()
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| models.get(i))
        .cloned()
        .unwrap_or_else(|| default.to_string())
}

/// Print the model menu and read the user's choice.
pub fn select_model(
    models: &[String],
    default: &str,
    input: &mut impl BufRead,
    out: &mut impl Write,
) -> Result<String> {
    writeln!(out, "Available models:")?;
    for (i, model) in models.iter().enumerate() {
        writeln!(out, "  [{}] {model}", i + 1)?;
    }
    let answer = prompt_line(input, out, &format!("Select a model [default={default}]: "))?;
    let chosen = choose_model(models, default, answer.as_deref().unwrap_or(""));
    writeln!(out, "Using model: {chosen}")?;
    Ok(chosen)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AssistantConfig, DeskConfig, EmbeddingErrorPolicy};
    use crate::embedder::mock::StaticEmbedder;
    use crate::generation::mock::MockGenerator;
    use crate::matcher::SectionMatcher;
    use crate::topics::TopicSet;
    use std::io::Cursor;
    use std::sync::Arc;

    fn desk() -> Desk {
        let topics = TopicSet::from_pairs([("Loan", "Loan info...")]).unwrap();
        let matcher = SectionMatcher::new(topics, Arc::new(StaticEmbedder::new()));
        let ctx = InferenceContext::fixed(Arc::new(MockGenerator::new("m").with_reply("")));
        let cfg = DeskConfig {
            echo_prompt: false,
            ..DeskConfig::default()
        };
        Desk::new("Alex (AI)", matcher, Arc::new(ctx), cfg, EmbeddingErrorPolicy::Abort)
    }

    fn models() -> Vec<String> {
        vec!["alpha".to_string(), "beta".to_string()]
    }

    #[test]
    fn test_choose_model() {
        assert_eq!(choose_model(&models(), "alpha", ""), "alpha");
        assert_eq!(choose_model(&models(), "alpha", " 2 "), "beta");
        assert_eq!(choose_model(&models(), "alpha", "0"), "alpha");
        assert_eq!(choose_model(&models(), "alpha", "7"), "alpha");
        assert_eq!(choose_model(&models(), "alpha", "beta"), "alpha");
    }

    #[test]
    fn test_select_model_prints_menu() {
        let mut out = Vec::new();
        let chosen = select_model(&models(), "alpha", &mut Cursor::new("2\n"), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(chosen, "beta");
        assert!(text.contains("  [1] alpha\n  [2] beta\n"));
        assert!(text.ends_with("Using model: beta\n"));
    }

    #[test]
    fn test_desk_session_script() {
        let mut out = Vec::new();
        let script = "\nhello\nwhat's the weather\nquit\n";
        run_desk(&desk(), &mut Cursor::new(script), &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Hello, I'm Alex (AI)!"));
        assert!(text.contains("Nice to meet you, User!"));
        assert!(text.contains("Alex (AI): Hello User! How can I assist you today?"));
        assert!(text.contains("Alex (AI): I'm sorry, I can only answer bank-related questions."));
        assert!(text.contains("Have a great day!"));
    }

    #[test]
    fn test_desk_session_reports_errors_and_continues() {
        let mut out = Vec::new();
        // Embedding fails under the abort policy; the loop keeps going until EOF.
        let script = "Sam\nhow do loans work\nhi\n";
        run_desk(&desk(), &mut Cursor::new(script), &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("[Error] topic matching failed"));
        assert!(text.contains("Hello Sam!"));
    }

    #[test]
    fn test_assistant_session_script() {
        let ctx = InferenceContext::fixed(Arc::new(MockGenerator::new("m").with_reply("Sure.")));
        let mut session = ChatSession::new(&AssistantConfig::default());
        let mut out = Vec::new();

        run_assistant(&mut session, &ctx, &mut Cursor::new("Hi\n\nexit\n"), &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Assistant: Sure."));
        assert!(text.ends_with("Goodbye!\n"));
        assert_eq!(session.history().len(), 2);
    }
}
