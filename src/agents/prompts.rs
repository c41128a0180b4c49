//! 各 Agent 使用的 prompt 模板

use serde_json::{Map, Value};

use crate::tools::ToolSchema;

/// 摘要 prompt 中数据 JSON 的最大字符数
pub const SUMMARY_DATA_LIMIT: usize = 3000;

const PLANNER_INTRO: &str = "You are the Planner Agent in an AI Operations system. Your role is to:
1. Understand the user's natural language task
2. Break it down into discrete, executable steps
3. Select appropriate tools for each step
4. Define the execution order and dependencies";

const PLANNER_FORMAT: &str = r#"## Output Format:
You MUST respond with valid JSON matching this exact shape:
```json
{
  "task_understanding": "Your interpretation of what the user wants",
  "steps": [
    {
      "step_number": 1,
      "tool": "tool_name",
      "action": "action_name",
      "parameters": {"param1": "value1"},
      "reasoning": "Why this step is needed",
      "depends_on": []
    }
  ],
  "expected_output": "Description of what the final output should contain"
}
```

## Rules:
- Each step must use an available tool and action
- Steps are executed in order unless depends_on specifies otherwise
- Be specific with parameters - use exact city names, search queries, etc.
- Include reasoning for transparency
- Keep plans concise - typically 1-5 steps"#;

const PLANNER_EXAMPLE: &str = r#"## Example:
User: "Get weather in Paris and find top JavaScript repos"

Response:
```json
{
  "task_understanding": "User wants current weather for Paris and popular JavaScript repositories on GitHub",
  "steps": [
    {
      "step_number": 1,
      "tool": "weather",
      "action": "get_current_weather",
      "parameters": {"city": "Paris", "units": "metric"},
      "reasoning": "Fetch current weather conditions for Paris",
      "depends_on": []
    },
    {
      "step_number": 2,
      "tool": "github",
      "action": "search_repositories",
      "parameters": {"query": "language:javascript", "sort": "stars", "limit": 5},
      "reasoning": "Search for most starred JavaScript repositories",
      "depends_on": []
    }
  ],
  "expected_output": "Weather conditions in Paris and a list of top 5 JavaScript repositories with stars and descriptions"
}
```"#;

/// 工具说明段落
pub fn tool_descriptions(schemas: &[ToolSchema]) -> String {
    if schemas.is_empty() {
        return "No tools available.".to_string();
    }
    schemas
        .iter()
        .map(ToolSchema::to_prompt_section)
        .collect::<Vec<_>>()
        .join("\n")
}

/// 完整规划 prompt；最后一行固定为 "Task: <task>"
pub fn planner_prompt(task: &str, schemas: &[ToolSchema]) -> String {
    format!(
        "{PLANNER_INTRO}\n\n## Available Tools:\n{}\n{PLANNER_FORMAT}\n\n{PLANNER_EXAMPLE}\n\nNow plan for the following task:\nTask: {task}",
        tool_descriptions(schemas)
    )
}

/// 摘要 prompt：任务 + 已收集数据（截断）
pub fn summary_prompt(task: &str, data: &Map<String, Value>) -> String {
    let json = serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string());
    let truncated: String = json.chars().take(SUMMARY_DATA_LIMIT).collect();
    format!(
        "Summarize the following results for the task: \"{task}\"\n\n\
         Results:\n{truncated}\n\n\
         Provide a clear, concise 2-3 sentence summary of what was found. \
         Focus on the key information the user asked for."
    )
}
