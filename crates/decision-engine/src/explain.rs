//! 追踪渲染
//!
//! 将结构化追踪转换为多行可读说明，每条规则一行标题，
//! 其下缩进列出条件结果、备注和错误。

use crate::condition::ConditionTrace;
use crate::trace::RuleTrace;
use std::fmt::Write;

const INDENT: &str = "  ";

/// 渲染整个运行追踪
pub fn render(trace: &[RuleTrace]) -> String {
    let mut out = String::new();
    for rule in trace {
        render_rule(&mut out, rule);
    }
    out
}

fn render_rule(out: &mut String, rule: &RuleTrace) {
    let status = match (rule.skipped_reason, rule.matched) {
        (Some(reason), _) => format!("SKIPPED ({})", reason),
        (None, true) => "MATCHED".to_string(),
        (None, false) => "NOT_MATCHED".to_string(),
    };
    let _ = write!(out, "rule {}: {}", rule.rule_id, status);

    if let Some(code) = rule.meta.as_ref().and_then(|m| m.reason_code.as_deref()) {
        let _ = write!(out, " [{}]", code);
    }
    out.push('\n');

    for condition in &rule.conditions {
        render_condition(out, condition, 1);
    }
    for note in &rule.notes {
        let _ = writeln!(out, "{}note: {}", INDENT, note);
    }
    if let Some(error) = &rule.error {
        let _ = writeln!(out, "{}error: {}", INDENT, error);
    }
}

fn render_condition(out: &mut String, condition: &ConditionTrace, depth: usize) {
    let mark = if condition.result { "✓" } else { "✗" };
    let _ = write!(out, "{}{} {}", INDENT.repeat(depth), mark, condition.label);

    if condition.children.is_empty() {
        match (&condition.left, &condition.op, &condition.right) {
            (Some(left), Some(op), Some(right)) => {
                let _ = write!(out, " [{} {} {}]", left, op, right);
            }
            (Some(left), Some(op), None) => {
                let _ = write!(out, " [{} over {}]", op, left);
            }
            _ => {}
        }
    }

    if let Some(code) = &condition.reason_code {
        let _ = write!(out, " ({})", code);
    }
    out.push('\n');

    for child in &condition.children {
        render_condition(out, child, depth + 1);
    }
}
