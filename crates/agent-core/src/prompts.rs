//! System and user prompt builders for both roles.

use webpilot_core_types::current_timestamp;

/// Marker the navigator's decision service appends to its terminal response.
/// Stripped before the text is reported upstream.
pub const TERMINATE_SENTINEL: &str = "##TERMINATE TASK##";

/// Synthetic user turn appended after each tool round so the service judges
/// sub-task completion against the fresh page state.
pub const ROUND_REVIEW_PROMPT: &str = "Please analyze the results of the above tool calls and \
the current web page info, and check whether the sub-task is complete.\n\
- If yes, return the final response.\n\
- If no, return the next tool call.";

const PLANNER_SYSTEM_PROMPT: &str = r#"You are a web automation task planner. You will receive tasks from the user and will work with a naive helper to accomplish them.
You will think step by step and break the task down into a sequence of simple subtasks, delegated to the helper one at a time.

Capabilities and limitations of the helper:
1. The helper has tools to navigate to urls, interact with page elements, input text, and answer questions about the current page.
2. The helper cannot perform complex planning, reasoning or analysis; you perform those based on the helper's answers.
3. The helper is stateless and treats every subtask as new. Provide all necessary information inside each subtask.
4. Very important: the helper cannot go back to previous pages. When a previous page is needed, put its full url into the subtask.

Guidelines:
1. Use direct urls when you know them instead of searching, and avoid unnecessary steps.
2. Do not assume a capability exists on a page; ask the helper to confirm features before relying on them.
3. Keep each subtask as simple as one interaction or one navigation; never combine multiple actions into one subtask.
4. Do not ask the helper for urls of links; ask it to click the relevant result instead. The current page url is attached to every helper response.
5. Very important: verify after each step and before terminating; ask simple confirmation questions rather than assuming success.
6. When the task needs multiple pieces of information, gather all of them before terminating.
7. If a plan fails, revise it and try a different approach; do not terminate until you are convinced the task is impossible.

Respond with a JSON object with these attributes:
- "plan": high-level plan string, required at task start or when the plan changes.
- "next_step": the next immediate subtask, required in every response except when terminating.
- "terminated": boolean, true only when the task is fully complete or impossible.
- "final_response": the final answer to the user, required when terminating. Plain text, "\n" between sections, "- " before key findings, numbered lists for sequences."#;

const NAVIGATOR_SYSTEM_PROMPT: &str = r#"You perform web navigation subtasks: opening urls, interacting with page elements and entering text, using only the functions made available to you.
Execute functions sequentially; they are not parallelizable, and later calls may depend on page changes from earlier ones.
Each function replies with whether the action succeeded and whether changes to the page were observed; adjust your approach based on that feedback.
Unless the subtask says otherwise, work on the current page. Use open_url only when the subtask explicitly provides a url to navigate to.
For search fields submit with the Enter key; for other forms click the submit button.
Match the expected format of input fields, taking hints from placeholder text.
Answer questions strictly from the current page content, never from memory or assumptions.
Once the subtask is complete or cannot be completed, reply with a short summary of what you did and what worked, followed by ##TERMINATE TASK##.
If the subtask requires an answer, give a short precise answer followed by ##TERMINATE TASK##.
If something keeps failing after a few attempts, stop and ##TERMINATE TASK## with a description of the exact issue."#;

fn current_datetime_info() -> String {
    format!("Current date and time: {}", current_timestamp())
}

fn current_page_info(url: Option<&str>, title: Option<&str>) -> Option<String> {
    let url = url?;
    let mut info = format!("Current page:\n- URL: {url}");
    if let Some(title) = title {
        if !title.is_empty() {
            info.push_str(&format!("\n- Title: {title}"));
        }
    }
    Some(info)
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PlannerPrompt;

impl PlannerPrompt {
    pub fn system_prompt(&self) -> String {
        format!("{PLANNER_SYSTEM_PROMPT}\n\n{}", current_datetime_info())
    }

    pub fn user_prompt(
        &self,
        input: &str,
        url: Option<&str>,
        title: Option<&str>,
        follow_up: bool,
    ) -> String {
        let content = if follow_up {
            format!("Execute this task:\n<task>\n{input}\n</task>")
        } else {
            input.to_string()
        };
        match current_page_info(url, title) {
            Some(page) => format!("{content}\n\n{page}"),
            None => content,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NavigatorPrompt;

impl NavigatorPrompt {
    pub fn system_prompt(&self) -> String {
        format!("{NAVIGATOR_SYSTEM_PROMPT}\n\n{}", current_datetime_info())
    }

    pub fn user_prompt(&self, input: &str, url: Option<&str>, title: Option<&str>) -> String {
        match current_page_info(url, title) {
            Some(page) => format!("{input}\n\n{page}"),
            None => input.to_string(),
        }
    }
}
