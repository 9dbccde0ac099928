//! Human feedback on final answers.
//!
//! The default provider is a blocking stdin loop: training mode shows a
//! training prompt and accepts one round; otherwise the loop runs until
//! the user submits empty input. A process-wide slot lets hosts swap in
//! their own provider; tests reset it.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

/// Handles the human feedback flow around an agent's final answer.
pub trait HumanInputProvider: Send + Sync {
    /// Called before standard message setup. Return `true` when the
    /// provider set the messages up itself (resuming a conversation).
    fn setup_messages(&self) -> bool {
        false
    }

    /// Called after standard message setup, only when
    /// [`setup_messages`](Self::setup_messages) returned `false`.
    fn post_setup_messages(&self) {}

    /// Run the feedback flow and return the final answer.
    fn handle_feedback(&self, formatted_answer: &str, is_training_mode: bool) -> String;
}

/// Blocking stdin provider.
pub struct ConsoleHumanInput;

impl ConsoleHumanInput {
    fn prompt(is_training_mode: bool) -> String {
        if is_training_mode {
            println!(
                "\n--- Training Feedback Required ---\n\
                 Provide feedback to improve the agent's performance."
            );
        } else {
            println!(
                "\n--- Human Feedback Required ---\n\
                 Press Enter to accept the result, or type improvement requests."
            );
        }
        print!("> ");
        let _ = io::stdout().flush();
        let mut line = String::new();
        let _ = io::stdin().lock().read_line(&mut line);
        line.trim().to_string()
    }
}

impl HumanInputProvider for ConsoleHumanInput {
    fn handle_feedback(&self, formatted_answer: &str, is_training_mode: bool) -> String {
        let mut answer = formatted_answer.to_string();
        loop {
            let feedback = Self::prompt(is_training_mode);
            if feedback.is_empty() {
                break;
            }
            answer = feedback;
            if is_training_mode {
                break;
            }
        }
        answer
    }
}

static PROVIDER: Lazy<Mutex<Option<Arc<dyn HumanInputProvider>>>> = Lazy::new(|| Mutex::new(None));

/// Install a provider process-wide.
pub fn set_provider(provider: Arc<dyn HumanInputProvider>) {
    *PROVIDER.lock() = Some(provider);
}

/// Clear the installed provider, restoring the console default.
pub fn reset_provider() {
    *PROVIDER.lock() = None;
}

/// Run the feedback flow through the installed provider, or the console
/// default when none is installed.
pub fn handle_feedback(formatted_answer: &str, is_training_mode: bool) -> String {
    let provider = PROVIDER.lock().clone();
    match provider {
        Some(provider) => provider.handle_feedback(formatted_answer, is_training_mode),
        None => ConsoleHumanInput.handle_feedback(formatted_answer, is_training_mode),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ScriptedInput(&'static str);

    impl HumanInputProvider for ScriptedInput {
        fn handle_feedback(&self, answer: &str, _is_training_mode: bool) -> String {
            if self.0.is_empty() {
                answer.to_string()
            } else {
                self.0.to_string()
            }
        }
    }

    #[test]
    fn installed_provider_intercepts_feedback() {
        set_provider(Arc::new(ScriptedInput("amended answer")));
        assert_eq!(handle_feedback("original", false), "amended answer");

        set_provider(Arc::new(ScriptedInput("")));
        assert_eq!(handle_feedback("original", false), "original");

        reset_provider();
    }
}
