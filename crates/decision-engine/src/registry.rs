//! 规则集注册表
//!
//! 进程内保存已编译规则集的结构描述和最近的运行记录，供可视化和排查使用。
//! 注册表是可注入的服务：引擎不依赖它存在，只在配置了记录器时上报运行结果。

use crate::condition::ConditionShape;
use crate::rule::RuleMeta;
use crate::trace::RuleTrace;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// 默认每个规则集保留的运行记录数
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// 运行结果上报钩子，每次运行结束调用一次
///
/// 运行失败时同样会调用，此时 `trace` 只包含中止前已评估的规则。
pub trait RunRecorder<F>: Send + Sync {
    fn record(&self, ruleset: &str, trace: &[RuleTrace], fired: &[String], facts: &F);
}

/// 规则集结构描述
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RulesetDescription {
    pub name: String,
    /// 按编译后的执行顺序排列
    pub rules: Vec<RuleDescription>,
}

/// 单条规则的结构描述
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleDescription {
    pub id: String,
    pub priority: i64,
    pub order: u64,
    pub is_async: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<RuleMeta>,
    pub conditions: Vec<ConditionShape>,
}

/// 一次运行的记录
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub ruleset: String,
    pub recorded_at: DateTime<Utc>,
    pub facts: Value,
    pub fired: Vec<String>,
    pub trace: Vec<RuleTrace>,
}

type History = Arc<Mutex<VecDeque<RunRecord>>>;

/// 规则集注册表
#[derive(Clone)]
pub struct RulesetRegistry {
    rulesets: Arc<DashMap<String, RulesetDescription>>,
    histories: Arc<DashMap<String, History>>,
    history_limit: usize,
}

impl RulesetRegistry {
    pub fn new() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }

    /// 指定每个规则集保留的运行记录数（至少为 1）
    pub fn with_history_limit(limit: usize) -> Self {
        Self {
            rulesets: Arc::new(DashMap::new()),
            histories: Arc::new(DashMap::new()),
            history_limit: limit.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.rulesets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rulesets.is_empty()
    }

    /// 注册规则集描述，同名规则集会被覆盖
    #[instrument(skip(self, description), fields(ruleset = %description.name))]
    pub fn register(&self, description: RulesetDescription) {
        let name = description.name.clone();
        let rules = description.rules.len();
        if self.rulesets.insert(name.clone(), description).is_some() {
            info!("规则集已更新: {} ({} 条规则)", name, rules);
        } else {
            info!("规则集已注册: {} ({} 条规则)", name, rules);
        }
    }

    /// 注销规则集，同时删除其运行记录
    #[instrument(skip(self))]
    pub fn unregister(&self, name: &str) -> bool {
        self.histories.remove(name);
        if self.rulesets.remove(name).is_some() {
            info!("规则集已注销: {}", name);
            true
        } else {
            warn!("注销不存在的规则集: {}", name);
            false
        }
    }

    pub fn get(&self, name: &str) -> Option<RulesetDescription> {
        self.rulesets.get(name).map(|r| r.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.rulesets.contains_key(name)
    }

    /// 获取所有规则集名称（已排序）
    pub fn list_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.rulesets.iter().map(|r| r.key().clone()).collect();
        ids.sort();
        ids
    }

    /// 获取运行记录，最新的在前
    pub fn history(&self, name: &str) -> Vec<RunRecord> {
        self.histories
            .get(name)
            .map(|h| h.lock().iter().rev().cloned().collect())
            .unwrap_or_default()
    }

    /// 清空所有规则集和运行记录
    #[instrument(skip(self))]
    pub fn clear(&self) {
        let count = self.rulesets.len();
        self.rulesets.clear();
        self.histories.clear();
        info!("已清空 {} 个规则集", count);
    }

    fn push_record(&self, record: RunRecord) {
        let history = self
            .histories
            .entry(record.ruleset.clone())
            .or_insert_with(|| Arc::new(Mutex::new(VecDeque::new())))
            .clone();

        // 先释放 DashMap 分片锁，同一规则集的记录由互斥锁串行化
        let mut records = history.lock();
        if records.len() >= self.history_limit {
            records.pop_front();
        }
        records.push_back(record);
    }
}

impl Default for RulesetRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Serialize> RunRecorder<F> for RulesetRegistry {
    fn record(&self, ruleset: &str, trace: &[RuleTrace], fired: &[String], facts: &F) {
        let facts = serde_json::to_value(facts).unwrap_or_else(|e| {
            warn!("事实序列化失败，运行记录中省略: {}", e);
            Value::Null
        });

        self.push_record(RunRecord {
            run_id: Uuid::new_v4(),
            ruleset: ruleset.to_string(),
            recorded_at: Utc::now(),
            facts,
            fired: fired.to_vec(),
            trace: trace.to_vec(),
        });
    }
}
