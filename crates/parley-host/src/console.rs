//! Terminal dialogs.
//!
//! Blocking prompts on the controlling terminal, used as the broker's
//! fallback when no UI surface is registered. Prompts are serialized so
//! concurrent requests never interleave on the terminal.

use std::io::Write;
use std::sync::{Mutex, PoisonError};

use dialoguer::{Input, MultiSelect, Select};
use serde_json::Value;
use tracing::warn;

use parley_core::exchange::{Answer, Answers, Question};
use parley_core::paths::extract_candidate_path;
use parley_core::permissions::{PermissionDecision, PermissionMode};

use crate::permission::{FallbackDialog, PermissionPrompt, PlanPrompt, PlanVerdict, QuestionPrompt};

/// Dialogs on the terminal, via `dialoguer`.
#[derive(Default)]
pub struct ConsoleDialog {
    lock: Mutex<()>,
}

impl ConsoleDialog {
    pub fn new() -> Self {
        Self::default()
    }
}

/// One-line description of what a tool invocation touches.
pub fn summarize_inputs(tool_name: &str, inputs: &serde_json::Map<String, Value>) -> String {
    if let Some(command) = inputs.get("command").and_then(Value::as_str) {
        return format!("{tool_name}: {command}");
    }
    match extract_candidate_path(inputs) {
        Some(path) => format!("{tool_name}: {path}"),
        None if inputs.is_empty() => tool_name.to_string(),
        None => format!("{tool_name}: {}", Value::Object(inputs.clone())),
    }
}

fn ask_question(question: &Question) -> dialoguer::Result<Option<Answer>> {
    let title = question.header.as_ref().map_or_else(
        || question.question.clone(),
        |header| format!("[{header}] {}", question.question),
    );

    if question.options.is_empty() {
        let text: String = Input::new()
            .with_prompt(title)
            .allow_empty(true)
            .interact_text()?;
        return Ok((!text.trim().is_empty()).then(|| Answer::Single(text)));
    }

    let labels: Vec<String> = question
        .options
        .iter()
        .map(|o| match &o.description {
            Some(description) => format!("{} - {description}", o.label),
            None => o.label.clone(),
        })
        .collect();

    if question.multi_select {
        let picked = MultiSelect::new()
            .with_prompt(title)
            .items(&labels)
            .interact_opt()?;
        Ok(picked.map(|indices| {
            Answer::Multiple(
                indices
                    .into_iter()
                    .filter_map(|i| question.options.get(i).map(|o| o.label.clone()))
                    .collect(),
            )
        }))
    } else {
        let picked = Select::new()
            .with_prompt(title)
            .items(&labels)
            .default(0)
            .interact_opt()?;
        Ok(picked
            .and_then(|i| question.options.get(i))
            .map(|o| Answer::Single(o.label.clone())))
    }
}

impl FallbackDialog for ConsoleDialog {
    fn confirm_permission(&self, prompt: &PermissionPrompt) -> PermissionDecision {
        let _terminal = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let items = [
            "Allow once".to_string(),
            format!("Always allow {}", prompt.tool_name),
            "Deny".to_string(),
        ];
        let picked = Select::new()
            .with_prompt(format!(
                "Allow {}?",
                summarize_inputs(&prompt.tool_name, &prompt.inputs)
            ))
            .items(&items)
            .default(0)
            .interact_opt();
        match picked {
            Ok(Some(0)) => PermissionDecision::Allow,
            Ok(Some(1)) => PermissionDecision::AllowAlways,
            Ok(_) => PermissionDecision::Deny,
            Err(e) => {
                warn!(error = %e, "Terminal prompt failed, denying");
                PermissionDecision::Deny
            }
        }
    }

    fn answer_questions(&self, prompt: &QuestionPrompt) -> Option<Answers> {
        let _terminal = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut answers = Answers::new();
        for question in &prompt.questions {
            match ask_question(question) {
                Ok(Some(answer)) => {
                    answers.insert(question.question.clone(), answer);
                }
                Ok(None) => return None,
                Err(e) => {
                    warn!(error = %e, "Terminal prompt failed");
                    return None;
                }
            }
        }
        Some(answers)
    }

    fn review_plan(&self, prompt: &PlanPrompt) -> PlanVerdict {
        let _terminal = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(plan) = &prompt.plan {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "\n{plan}\n");
        }
        let items = [
            "Approve, auto-accept edits",
            "Approve, ask before each tool",
            "Keep planning",
        ];
        let picked = Select::new()
            .with_prompt("Proceed with this plan?")
            .items(&items)
            .default(1)
            .interact_opt();
        match picked {
            Ok(Some(0)) => PlanVerdict::approve(PermissionMode::AcceptEdits),
            Ok(Some(1)) => PlanVerdict::approve(PermissionMode::Default),
            Ok(_) => PlanVerdict::reject(),
            Err(e) => {
                warn!(error = %e, "Terminal prompt failed, rejecting plan");
                PlanVerdict::reject()
            }
        }
    }
}
