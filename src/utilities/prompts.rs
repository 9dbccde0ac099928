//! Prompt scaffolding for agent execution.
//!
//! Two modes: the ReAct text protocol (tool definitions embedded in the
//! prompt, the model emits `Action:` lines) and native tool calling (the
//! provider carries the tool schemas; the prompt only sets the persona
//! and the task). Templates can be overridden per agent.

/// Inputs for prompt assembly.
pub struct PromptContext<'a> {
    pub role: &'a str,
    pub goal: &'a str,
    pub backstory: &'a str,
    pub tool_names: &'a str,
    pub tool_descriptions: &'a str,
}

/// System + user prompt pair handed to the executor.
#[derive(Debug, Clone)]
pub struct AssembledPrompt {
    pub system: String,
    pub user: String,
}

const ROLE_PLAYING: &str = "You are {role}. {backstory}\nYour personal goal is: {goal}";

const REACT_TOOLS: &str = "\nYou ONLY have access to the following tools, and should NEVER make up tools that are not listed here:\n\n{tools}\n\nIMPORTANT: Use the following format in your response:\n\n```\nThought: you should always think about what to do\nAction: the action to take, only one name of [{tool_names}], just the name, exactly as it's written.\nAction Input: the input to the action, just a simple JSON object, enclosed in curly braces, using \" to wrap keys and values.\nObservation: the result of the action\n```\n\nOnce all necessary information is gathered, return the following format:\n\n```\nThought: I now know the final answer\nFinal Answer: the final answer to the original input question\n```";

const REACT_NO_TOOLS: &str = "\nTo give my best complete final answer to the task respond using the exact following format:\n\nThought: I now can give a great answer\nFinal Answer: Your final answer must be the great and the most complete as possible, it must be outcome described.\n\nI MUST use these formats, my job depends on it!";

const NATIVE_TOOLS: &str = "\nYou can use the available tools when they help you complete the task. When you have everything you need, reply with your complete final answer.";

const TASK_TEMPLATE: &str = "\nCurrent Task: {input}\n\nBegin! This is VERY important to you, use the tools available and give your best Final Answer, your job depends on it!\n\nThought:";

const NATIVE_TASK_TEMPLATE: &str = "\nCurrent Task: {input}\n\nThis is VERY important to you: give your best, most complete final answer.";

fn fill(template: &str, ctx: &PromptContext<'_>) -> String {
    template
        .replace("{role}", ctx.role)
        .replace("{goal}", ctx.goal)
        .replace("{backstory}", ctx.backstory)
        .replace("{tools}", ctx.tool_descriptions)
        .replace("{tool_names}", ctx.tool_names)
}

/// Prompt builder bound to an agent's optional template overrides.
pub struct Prompts {
    pub system_template: Option<String>,
    pub prompt_template: Option<String>,
    pub response_template: Option<String>,
}

impl Prompts {
    pub fn new(
        system_template: Option<String>,
        prompt_template: Option<String>,
        response_template: Option<String>,
    ) -> Self {
        Self {
            system_template,
            prompt_template,
            response_template,
        }
    }

    /// Assemble the system/user pair for a task execution.
    ///
    /// `has_tools` selects the tool scaffolding; `native_tools` switches
    /// between the ReAct protocol and native tool-call framing.
    pub fn task_execution(
        &self,
        ctx: &PromptContext<'_>,
        task_prompt: &str,
        has_tools: bool,
        native_tools: bool,
    ) -> AssembledPrompt {
        let system_body = match &self.system_template {
            Some(template) => fill(template, ctx),
            None => {
                let scaffold = if !has_tools {
                    REACT_NO_TOOLS
                } else if native_tools {
                    NATIVE_TOOLS
                } else {
                    REACT_TOOLS
                };
                format!("{}{}", fill(ROLE_PLAYING, ctx), fill(scaffold, ctx))
            }
        };

        let user_body = match &self.prompt_template {
            Some(template) => fill(template, ctx).replace("{input}", task_prompt),
            None => {
                let template = if native_tools && has_tools {
                    NATIVE_TASK_TEMPLATE
                } else {
                    TASK_TEMPLATE
                };
                template.replace("{input}", task_prompt)
            }
        };

        let user_body = match &self.response_template {
            Some(template) => format!("{}\n{}", user_body, fill(template, ctx)),
            None => user_body,
        };

        AssembledPrompt {
            system: system_body,
            user: user_body,
        }
    }

    /// Prompt for the reasoning pre-step: ask the model to plan before
    /// executing.
    pub fn reasoning_plan(task_description: &str) -> String {
        format!(
            "Before executing, think through the task below and produce a short, \
             numbered plan of the steps you will take. Reply with the plan only.\n\n\
             Task:\n{}",
            task_description
        )
    }
}

impl Default for Prompts {
    fn default() -> Self {
        Self::new(None, None, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx<'a>() -> PromptContext<'a> {
        PromptContext {
            role: "writer",
            goal: "write well",
            backstory: "An expert.",
            tool_names: "search, read",
            tool_descriptions: "- search: find things\n- read: read things",
        }
    }

    #[test]
    fn react_prompt_embeds_tools_and_protocol() {
        let prompts = Prompts::default();
        let assembled = prompts.task_execution(&ctx(), "Do the thing", true, false);
        assert!(assembled.system.contains("You are writer."));
        assert!(assembled.system.contains("- search: find things"));
        assert!(assembled.system.contains("Action Input:"));
        assert!(assembled.user.contains("Current Task: Do the thing"));
        assert!(assembled.user.trim_end().ends_with("Thought:"));
    }

    #[test]
    fn native_prompt_omits_the_react_protocol() {
        let prompts = Prompts::default();
        let assembled = prompts.task_execution(&ctx(), "Do the thing", true, true);
        assert!(!assembled.system.contains("Action Input:"));
        assert!(assembled.system.contains("available tools"));
    }

    #[test]
    fn overrides_replace_the_defaults() {
        let prompts = Prompts::new(
            Some("SYSTEM for {role}".into()),
            Some("USER: {input}".into()),
            None,
        );
        let assembled = prompts.task_execution(&ctx(), "task body", true, false);
        assert_eq!(assembled.system, "SYSTEM for writer");
        assert_eq!(assembled.user, "USER: task body");
    }
}
