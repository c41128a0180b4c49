//! 动作参数读取与 HTTP JSON 小工具（各工具共用）

use serde_json::{Map, Value};

/// 参数表中的缓存旁路开关
pub const SKIP_CACHE: &str = "skip_cache";

pub fn required_str(params: &Map<String, Value>, name: &str) -> Result<String, String> {
    match params.get(name) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(format!("Missing required parameter: {name}")),
    }
}

pub fn optional_str(params: &Map<String, Value>, name: &str) -> Option<String> {
    match params.get(name) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

pub fn str_or(params: &Map<String, Value>, name: &str, default: &str) -> String {
    optional_str(params, name).unwrap_or_else(|| default.to_string())
}

/// 整数参数，兼容 LLM 输出成字符串的数字
pub fn u64_or(params: &Map<String, Value>, name: &str, default: u64) -> u64 {
    match params.get(name) {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(default),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(default),
        _ => default,
    }
}

pub fn skip_cache(params: &Map<String, Value>) -> bool {
    matches!(params.get(SKIP_CACHE), Some(Value::Bool(true)))
}

/// 按 JSON Pointer 取必需字段，缺失时报错（如 "/main/temp"）
pub fn pick(data: &Value, pointer: &str) -> Result<Value, String> {
    data.pointer(pointer)
        .cloned()
        .ok_or_else(|| format!("Missing field in API response: {}", pointer.trim_start_matches('/').replace('/', ".")))
}

/// 按 JSON Pointer 取字段，缺失或为 null 时取默认值
pub fn pick_or(data: &Value, pointer: &str, default: Value) -> Value {
    match data.pointer(pointer) {
        Some(Value::Null) | None => default,
        Some(v) => v.clone(),
    }
}

/// GET 并解析 JSON；非 2xx 转为错误文本
pub async fn get_json(
    request: reqwest::RequestBuilder,
) -> Result<Value, String> {
    let resp = request
        .send()
        .await
        .map_err(|e| format!("Request failed: {e}"))?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        let detail: String = body.chars().take(200).collect();
        return Err(format!("HTTP {status}: {detail}"));
    }
    resp.json::<Value>()
        .await
        .map_err(|e| format!("Invalid JSON response: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_required_and_defaults() {
        let p = params(json!({"city": " Paris ", "limit": "7", "skip_cache": true}));
        assert_eq!(required_str(&p, "city").unwrap(), "Paris");
        assert!(required_str(&p, "query").unwrap_err().contains("query"));
        assert_eq!(str_or(&p, "units", "metric"), "metric");
        assert_eq!(u64_or(&p, "limit", 5), 7);
        assert_eq!(u64_or(&p, "missing", 5), 5);
        assert!(skip_cache(&p));
    }

    #[test]
    fn test_pick() {
        let data = json!({"main": {"temp": 21.5}, "name": null});
        assert_eq!(pick(&data, "/main/temp").unwrap(), json!(21.5));
        assert_eq!(pick(&data, "/sys/country").unwrap_err(), "Missing field in API response: sys.country");
        assert_eq!(pick_or(&data, "/name", json!("Unknown")), json!("Unknown"));
    }
}
