//! 工具 Schema：动作与参数描述，供 Planner 拼入 prompt

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 动作参数定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: String,
    pub description: String,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
}

impl ToolParameter {
    pub fn required(name: &str, param_type: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            param_type: param_type.to_string(),
            description: description.to_string(),
            required: true,
            default: None,
            enum_values: None,
        }
    }

    pub fn optional(name: &str, param_type: &str, description: &str) -> Self {
        Self {
            required: false,
            ..Self::required(name, param_type, description)
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_enum(mut self, values: &[&str]) -> Self {
        self.enum_values = Some(values.iter().map(|v| v.to_string()).collect());
        self
    }
}

/// 工具上的一个动作
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolAction {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub parameters: Vec<ToolParameter>,
}

impl ToolAction {
    pub fn new(name: &str, description: &str, parameters: Vec<ToolParameter>) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
        }
    }
}

/// 单个工具的完整 Schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub actions: Vec<String>,
    pub action_details: Vec<ToolAction>,
}

impl ToolSchema {
    pub fn new(name: &str, description: &str, actions: Vec<ToolAction>) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            actions: actions.iter().map(|a| a.name.clone()).collect(),
            action_details: actions,
        }
    }

    /// prompt 中的一段工具说明
    pub fn to_prompt_section(&self) -> String {
        let mut s = format!("**{}**: {}\n", self.name, self.description);
        s.push_str(&format!("  Actions: {}\n", self.actions.join(", ")));
        for action in &self.action_details {
            if action.parameters.is_empty() {
                continue;
            }
            let params: Vec<String> = action
                .parameters
                .iter()
                .map(|p| {
                    let mut desc = format!("{} ({}", p.name, p.param_type);
                    if !p.required {
                        desc.push_str(", optional");
                    }
                    if let Some(values) = &p.enum_values {
                        desc.push_str(&format!(", one of: {}", values.join("|")));
                    }
                    desc.push(')');
                    desc
                })
                .collect();
            s.push_str(&format!("  Parameters for {}: {}\n", action.name, params.join(", ")));
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_lists_actions_and_params() {
        let schema = ToolSchema::new(
            "weather",
            "Weather lookups",
            vec![ToolAction::new(
                "get_current_weather",
                "Current weather",
                vec![
                    ToolParameter::required("city", "string", "City name"),
                    ToolParameter::optional("units", "string", "Units")
                        .with_default(serde_json::json!("metric"))
                        .with_enum(&["metric", "imperial"]),
                ],
            )],
        );
        assert_eq!(schema.actions, vec!["get_current_weather".to_string()]);
        let section = schema.to_prompt_section();
        assert!(section.contains("**weather**"));
        assert!(section.contains("city (string)"));
        assert!(section.contains("units (string, optional, one of: metric|imperial)"));

        let v = serde_json::to_value(&schema).unwrap();
        assert_eq!(v["action_details"][0]["parameters"][1]["type"], "string");
        assert_eq!(v["action_details"][0]["parameters"][1]["enum"][1], "imperial");
    }
}
