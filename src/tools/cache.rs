//! 工具结果缓存：TTL 过期、容量上限、命中率统计
//!
//! 缓存键 = 操作标识 + 字符串化参数（位置参数有序，关键字参数按名排序）的 SHA-256。
//! 只缓存成功的抓取结果；读写都在短临界区内完成，不跨 await 持锁。

use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// 缓存键构造器
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    operation: String,
    args: Vec<String>,
    kwargs: BTreeMap<String, String>,
}

impl CacheKey {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            args: Vec::new(),
            kwargs: BTreeMap::new(),
        }
    }

    /// 位置参数（顺序敏感）
    pub fn arg(mut self, value: impl Display) -> Self {
        self.args.push(value.to_string());
        self
    }

    /// 关键字参数（顺序无关）
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Display) -> Self {
        self.kwargs.insert(name.into(), value.to_string());
        self
    }

    /// 将参数表全部作为关键字参数；字符串取原值，其余取 JSON 文本
    pub fn kwargs_from(mut self, params: &Map<String, Value>) -> Self {
        for (k, v) in params {
            let s = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            self.kwargs.insert(k.clone(), s);
        }
        self
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// 稳定的十六进制摘要
    pub fn digest(&self) -> String {
        let payload = serde_json::json!({
            "func": self.operation,
            "args": self.args,
            "kwargs": self.kwargs,
        });
        let mut hasher = Sha256::new();
        hasher.update(payload.to_string().as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

struct CacheEntry {
    value: Value,
    /// 写入序号，淘汰时取最小者
    seq: u64,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// 缓存统计快照
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub size: usize,
    pub max_size: usize,
}

/// get_or_fetch 的返回：值以及是否来自缓存
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    pub value: T,
    pub cached: bool,
}

/// 进程级结果缓存（由调用方以 Arc 注入，不做全局单例）
pub struct ResultCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    default_ttl: Duration,
    max_size: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    next_seq: AtomicU64,
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(300), 1000)
    }
}

impl ResultCache {
    pub fn new(default_ttl: Duration, max_size: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_ttl,
            max_size: max_size.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            next_seq: AtomicU64::new(0),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// 读取未过期的条目；过期条目顺手删除。不计入命中统计
    pub fn get(&self, key: &CacheKey) -> Option<Value> {
        let digest = key.digest();
        let now = Instant::now();
        {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            match entries.get(&digest) {
                Some(entry) if entry.is_live(now) => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if entries.get(&digest).is_some_and(|e| !e.is_live(now)) {
            entries.remove(&digest);
        }
        None
    }

    /// 写入（同键覆盖）；满容量时先清过期条目，再淘汰最早写入的条目
    pub fn insert(&self, key: &CacheKey, value: Value, ttl: Option<Duration>) {
        let digest = key.digest();
        let now = Instant::now();
        let ttl = ttl.unwrap_or(self.default_ttl);
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());

        if !entries.contains_key(&digest) && entries.len() >= self.max_size {
            entries.retain(|_, e| e.is_live(now));
            if entries.len() >= self.max_size {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, e)| e.seq)
                    .map(|(k, _)| k.clone());
                if let Some(k) = oldest {
                    entries.remove(&k);
                }
            }
        }

        entries.insert(
            digest,
            CacheEntry {
                value,
                seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
                expires_at: now + ttl,
            },
        );
    }

    /// 命中则直接返回（cached=true）；未命中则调用 fetch，成功结果写回缓存。
    /// bypass=true 时既不读也不写，也不计入统计。
    pub async fn get_or_fetch<F, Fut>(
        &self,
        key: &CacheKey,
        ttl: Option<Duration>,
        bypass: bool,
        fetch: F,
    ) -> Result<Fetched<Value>, String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, String>>,
    {
        if bypass {
            let value = fetch().await?;
            return Ok(Fetched { value, cached: false });
        }

        if let Some(value) = self.get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(operation = key.operation(), "cache hit");
            return Ok(Fetched { value, cached: true });
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let value = fetch().await?;
        self.insert(key, value.clone(), ttl);
        Ok(Fetched { value, cached: false })
    }

    /// 当前未过期条目数
    pub fn len(&self) -> usize {
        let now = Instant::now();
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.values().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 统计快照（只读，不修改缓存）
    pub fn metrics(&self) -> CacheMetrics {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheMetrics {
            hits,
            misses,
            hit_rate: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
            size: self.len(),
            max_size: self.max_size,
        }
    }

    /// 清空缓存，返回清空前的未过期条目数
    pub fn clear(&self) -> usize {
        let count = self.len();
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.clear();
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_fetch(
        counter: &AtomicUsize,
        value: Value,
    ) -> impl Future<Output = Result<Value, String>> + '_ {
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(value)
        }
    }

    #[test]
    fn test_kwargs_order_independent() {
        let a = CacheKey::new("weather.current").kwarg("city", "Paris").kwarg("units", "metric");
        let b = CacheKey::new("weather.current").kwarg("units", "metric").kwarg("city", "Paris");
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn test_positional_order_dependent() {
        let a = CacheKey::new("op").arg("x").arg("y");
        let b = CacheKey::new("op").arg("y").arg("x");
        assert_ne!(a.digest(), b.digest());
        assert_ne!(
            CacheKey::new("op_a").arg("x").digest(),
            CacheKey::new("op_b").arg("x").digest()
        );
    }

    #[test]
    fn test_kwargs_from_params() {
        let mut params = Map::new();
        params.insert("limit".to_string(), serde_json::json!(5));
        params.insert("query".to_string(), serde_json::json!("rust"));
        let a = CacheKey::new("github.search").kwargs_from(&params);
        let b = CacheKey::new("github.search").kwarg("query", "rust").kwarg("limit", 5);
        assert_eq!(a.digest(), b.digest());
    }

    #[tokio::test]
    async fn test_second_call_within_ttl_is_cached() {
        let cache = ResultCache::default();
        let calls = AtomicUsize::new(0);
        let key = CacheKey::new("weather.current").kwarg("city", "Tokyo");

        let first = cache
            .get_or_fetch(&key, None, false, || counting_fetch(&calls, serde_json::json!({"t": 20})))
            .await
            .unwrap();
        let second = cache
            .get_or_fetch(&key, None, false, || counting_fetch(&calls, serde_json::json!({"t": 99})))
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(second.value, serde_json::json!({"t": 20}));

        let m = cache.metrics();
        assert_eq!((m.hits, m.misses, m.size), (1, 1, 1));
        assert!((m.hit_rate - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_expired_entry_refetched() {
        let cache = ResultCache::default();
        let calls = AtomicUsize::new(0);
        let key = CacheKey::new("news.headlines");
        let ttl = Some(Duration::from_millis(20));

        cache
            .get_or_fetch(&key, ttl, false, || counting_fetch(&calls, Value::Bool(true)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let again = cache
            .get_or_fetch(&key, ttl, false, || counting_fetch(&calls, Value::Bool(true)))
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!again.cached);
    }

    #[tokio::test]
    async fn test_bypass_skips_read_and_write() {
        let cache = ResultCache::default();
        let calls = AtomicUsize::new(0);
        let key = CacheKey::new("github.user").kwarg("username", "octocat");

        cache
            .get_or_fetch(&key, None, true, || counting_fetch(&calls, Value::Null))
            .await
            .unwrap();
        assert!(cache.is_empty());

        cache
            .get_or_fetch(&key, None, false, || counting_fetch(&calls, Value::Null))
            .await
            .unwrap();
        let bypassed = cache
            .get_or_fetch(&key, None, true, || counting_fetch(&calls, Value::Null))
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(!bypassed.cached);
        let m = cache.metrics();
        assert_eq!((m.hits, m.misses), (0, 1));
    }

    #[tokio::test]
    async fn test_failed_fetch_not_cached() {
        let cache = ResultCache::default();
        let key = CacheKey::new("weather.current").kwarg("city", "Atlantis");
        let err = cache
            .get_or_fetch(&key, None, false, || async { Err::<Value, _>("404".to_string()) })
            .await
            .unwrap_err();
        assert_eq!(err, "404");
        assert!(cache.is_empty());
    }

    #[test]
    fn test_max_size_evicts_oldest() {
        let cache = ResultCache::new(Duration::from_secs(60), 2);
        let k1 = CacheKey::new("op").arg(1);
        let k2 = CacheKey::new("op").arg(2);
        let k3 = CacheKey::new("op").arg(3);
        cache.insert(&k1, Value::from(1), None);
        cache.insert(&k2, Value::from(2), None);
        cache.insert(&k3, Value::from(3), None);
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&k1).is_none());
        assert_eq!(cache.get(&k3), Some(Value::from(3)));
    }

    #[test]
    fn test_clear_returns_prior_count() {
        let cache = ResultCache::default();
        cache.insert(&CacheKey::new("a"), Value::Null, None);
        cache.insert(&CacheKey::new("b"), Value::Null, None);
        let before = cache.metrics();
        assert_eq!(before.size, 2);
        assert_eq!(cache.clear(), 2);
        assert_eq!(cache.clear(), 0);
        assert_eq!(cache.metrics().max_size, 1000);
    }
}
