use anyhow::{Result, anyhow};
use std::io::{BufRead, Write};

/// Operator interaction: free-text questions and yes/no confirmations.
pub trait Prompter {
    fn ask(&mut self, question: &str) -> Result<String>;

    /// Anything starting with "y" counts as yes
    fn confirm(&mut self, question: &str) -> Result<bool> {
        let answer = self.ask(&format!("{question} [y/N]"))?;
        Ok(answer.trim().to_lowercase().starts_with('y'))
    }

    /// Shows progress or context; silent by default
    fn show(&mut self, _text: &str) {}
}

/// Reads answers from stdin
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsolePrompter;

#[allow(clippy::print_stdout)]
impl Prompter for ConsolePrompter {
    fn ask(&mut self, question: &str) -> Result<String> {
        print!("{question} ");
        std::io::stdout().flush()?;
        let mut line = String::new();
        let read = std::io::stdin().lock().read_line(&mut line)?;
        if read == 0 {
            return Err(anyhow!("stdin closed while waiting for an answer"));
        }
        Ok(line.trim().to_string())
    }

    fn show(&mut self, text: &str) {
        println!("{text}");
    }
}

/// Confirms everything and leaves every question unanswered.
/// Used for unattended runs (`--yes`).
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoConfirm;

impl Prompter for AutoConfirm {
    fn ask(&mut self, _question: &str) -> Result<String> {
        Ok(String::new())
    }

    fn confirm(&mut self, _question: &str) -> Result<bool> {
        Ok(true)
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::collections::VecDeque;

    /// Replays a fixed list of answers and records the questions
    #[derive(Debug, Default)]
    pub struct ScriptedPrompter {
        pub answers: VecDeque<String>,
        pub questions: Vec<String>,
    }

    impl ScriptedPrompter {
        pub fn new(answers: &[&str]) -> Self {
            Self {
                answers: answers.iter().map(|s| s.to_string()).collect(),
                questions: vec![],
            }
        }
    }

    impl Prompter for ScriptedPrompter {
        fn ask(&mut self, question: &str) -> Result<String> {
            self.questions.push(question.to_string());
            self.answers
                .pop_front()
                .ok_or_else(|| anyhow!("no scripted answer for '{question}'"))
        }
    }
}
