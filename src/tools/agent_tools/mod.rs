//! Built-in tools agents get from the runtime itself: delegation between
//! coworkers, image attachment, and file reading.

pub mod add_image_tool;
pub mod ask_question_tool;
pub mod delegate_work_tool;
pub mod read_file_tool;

pub use add_image_tool::AddImageTool;
pub use ask_question_tool::AskQuestionTool;
pub use delegate_work_tool::{CoworkerExecutor, DelegateWorkTool};
pub use read_file_tool::ReadFileTool;

/// Normalize an agent role for matching: collapsed whitespace, quotes
/// stripped, lowercase. Models routinely mangle role strings.
pub fn sanitize_agent_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('"', "")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_names_normalize() {
        assert_eq!(sanitize_agent_name("Senior  Writer"), "senior writer");
        assert_eq!(sanitize_agent_name("\"Critic\"\n"), "critic");
        assert_eq!(sanitize_agent_name(""), "");
    }
}
