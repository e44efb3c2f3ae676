//! Operator input for interactive runs.

use super::types::MigrationError;
use crate::remote::RemoteError;
use async_trait::async_trait;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

/// Source of operator answers.
#[async_trait]
pub trait OperatorPrompt: Send {
    /// Show `question` and return the next line of input, or `None` once
    /// input is exhausted.
    async fn ask(&mut self, question: &str) -> Result<Option<String>, MigrationError>;

    /// Show `message` and wait for the operator to continue.
    async fn acknowledge(&mut self, message: &str) -> Result<(), MigrationError> {
        self.ask(message).await?;
        Ok(())
    }
}

/// Reads answers from the process's stdin.
pub struct StdinPrompt {
    lines: Lines<BufReader<Stdin>>,
}

impl StdinPrompt {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }
}

impl Default for StdinPrompt {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OperatorPrompt for StdinPrompt {
    async fn ask(&mut self, question: &str) -> Result<Option<String>, MigrationError> {
        print!("{}", question);
        std::io::stdout().flush().map_err(RemoteError::from)?;
        Ok(self.lines.next_line().await.map_err(RemoteError::from)?)
    }
}

/// Answer to "apply/revert this step?".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAnswer {
    Yes,
    No,
    Quit,
}

impl StepAnswer {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "y" => Some(StepAnswer::Yes),
            "n" => Some(StepAnswer::No),
            "q" | "quit" => Some(StepAnswer::Quit),
            _ => None,
        }
    }
}

/// Ask until the operator gives a recognised answer.
///
/// Closed input counts as quitting.
pub async fn ask_step(
    prompt: &mut dyn OperatorPrompt,
    question: &str,
) -> Result<StepAnswer, MigrationError> {
    loop {
        match prompt.ask(question).await? {
            None => return Ok(StepAnswer::Quit),
            Some(line) => {
                if let Some(answer) = StepAnswer::parse(&line) {
                    return Ok(answer);
                }
            }
        }
    }
}
