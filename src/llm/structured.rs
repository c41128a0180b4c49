//! 结构化输出：从模型文本中提取 JSON 并反序列化为目标类型
//!
//! 提取顺序：```json 代码块 → 整段文本 → 第一个 `{` 到最后一个 `}`。
//! 解析或校验失败按同一有界策略重新生成。

use regex::Regex;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;

use crate::llm::{LlmClient, LlmError, LlmRequest, RetryConfig};

/// 从模型输出中提取 JSON 文本
pub fn extract_json(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(re) = Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```") {
        if let Some(body) = re.captures(trimmed).and_then(|c| c.get(1)) {
            let body = body.as_str().trim();
            if serde_json::from_str::<serde_json::Value>(body).is_ok() {
                return Some(body.to_string());
            }
        }
    }

    if serde_json::from_str::<serde_json::Value>(trimmed).is_ok() {
        return Some(trimmed.to_string());
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| trimmed[start..=end].to_string())
}

/// 把提取出的 JSON 反序列化为 T；区分“不是 JSON”和“结构不符”
pub fn parse_structured<T: DeserializeOwned>(text: &str) -> Result<T, LlmError> {
    let json = extract_json(text).ok_or_else(|| {
        let preview: String = text.chars().take(200).collect();
        LlmError::JsonParse(format!("no JSON found in: {preview}"))
    })?;
    let value: serde_json::Value =
        serde_json::from_str(&json).map_err(|e| LlmError::JsonParse(e.to_string()))?;
    serde_json::from_value(value).map_err(|e| LlmError::SchemaValidation(e.to_string()))
}

/// 目标类型的 JSON Schema 文本，拼入 prompt 约束输出格式
pub fn schema_hint<T: JsonSchema>() -> String {
    let schema = schemars::schema_for!(T);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

/// 请求模型输出并解析为 T；传输错误由客户端自身重试，这里只重试输出不合格的情况
pub async fn generate_structured<T>(
    llm: &dyn LlmClient,
    retry: &RetryConfig,
    request: &LlmRequest,
) -> Result<T, LlmError>
where
    T: DeserializeOwned + JsonSchema,
{
    let prompt = format!(
        "{}\n\nRespond with a single JSON object matching this schema:\n{}",
        request.prompt,
        schema_hint::<T>()
    );
    let request = &LlmRequest {
        prompt,
        ..request.clone()
    };

    retry
        .run("generate_structured", LlmError::is_malformed_output, || async move {
            let text = llm.generate(request).await?;
            if text.trim().is_empty() {
                return Err(LlmError::EmptyResponse);
            }
            parse_structured::<T>(&text)
        })
        .await
}
