//! JSON 修复引擎
//!
//! 模型经常输出夹带散文、Markdown 围栏、尾逗号或被截断的 JSON。本模块按固定顺序
//! 尝试一组可独立测试的具名策略：去围栏 -> 平衡括号提取 -> 常见问题修复 -> 正则
//! 兜底扫描 -> 截断修复，第一个成功者即返回。只闭合结构、修正语法，绝不编造字段值。

pub mod scan;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

pub use scan::{extract_balanced, repair_truncated, scan};

/// 诊断样本最大字符数
const SAMPLE_CHARS: usize = 160;

/// 所有策略都无法产出含预期顶层键的 JSON 对象
#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error("no recoverable JSON containing key \"{key}\" (input sample: {sample})")]
    Unrecoverable { key: String, sample: String },
}

/// 从任意模型文本中恢复一个含 `expected_key` 顶层键的 JSON 对象。
///
/// 策略按序尝试，成功即止；全部失败返回携带输入样本的 [`RecoveryError`]。
pub fn recover(raw: &str, expected_key: &str) -> Result<Value, RecoveryError> {
    let text = strip_code_fences(raw);

    // 平衡括号提取 + 常见问题修复
    if let Some(candidate) = extract_balanced(&text) {
        if contains_key(candidate, expected_key) {
            if let Some(v) = decode_with_fixes(candidate, expected_key) {
                return Ok(v);
            }
        }
    }

    // 正则兜底：全文扫描含预期键的 {...} 片段，逐个重试提取与截断修复
    let pattern = format!(r#"\{{[\s\S]*"{}"[\s\S]*\}}"#, regex::escape(expected_key));
    if let Ok(re) = Regex::new(&pattern) {
        for m in re.find_iter(&text) {
            // 从匹配起点取到全文末尾：正则吃不到的残缺尾部（悬挂逗号、中断的
            // 字符串）正是截断修复区分完整/可疑元素的依据
            let frag = &text[m.start()..];
            if let Some(candidate) = extract_balanced(frag) {
                if contains_key(candidate, expected_key) {
                    if let Some(v) = decode_with_fixes(candidate, expected_key) {
                        return Ok(v);
                    }
                }
            }
            if let Some(repaired) = repair_truncated(frag) {
                if let Some(v) = decode_with_fixes(&repaired, expected_key) {
                    return Ok(v);
                }
            }
        }
    }

    // 最后手段：对首个 { 起的全文做截断修复（尾部连一个闭括号都没有时正则不会命中）
    if let Some(start) = text.find('{') {
        if let Some(repaired) = repair_truncated(&text[start..]) {
            if let Some(v) = decode_with_fixes(&repaired, expected_key) {
                return Ok(v);
            }
        }
    }

    Err(RecoveryError::Unrecoverable {
        key: expected_key.to_string(),
        sample: sample(raw),
    })
}

/// 去除 Markdown 代码围栏标记（```json / ```）
fn strip_code_fences(raw: &str) -> String {
    raw.replace("```json", "\n").replace("```", "\n")
}

/// 文本层面预判候选片段是否包含 "expected_key"
fn contains_key(candidate: &str, expected_key: &str) -> bool {
    candidate.contains(&format!("\"{}\"", expected_key))
}

/// 先按原样解码；失败则套用常见问题修复后重试。
/// 只接受「顶层为对象且含预期键」的结果。
fn decode_with_fixes(candidate: &str, expected_key: &str) -> Option<Value> {
    if let Some(v) = decode_checked(candidate, expected_key) {
        return Some(v);
    }
    decode_checked(&apply_common_fixes(candidate), expected_key)
}

fn decode_checked(candidate: &str, expected_key: &str) -> Option<Value> {
    let v: Value = serde_json::from_str(candidate).ok()?;
    if v.as_object()?.contains_key(expected_key) {
        Some(v)
    } else {
        None
    }
}

/// 常见问题修复：去掉 `]`/`}` 前的尾逗号；把字符串字面量内的裸换行转义为 `\n`。
/// 字符串内外分别处理，避免误伤字符串内容。
pub fn apply_common_fixes(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if in_string {
            if escaped {
                escaped = false;
                out.push(c);
            } else if c == '\\' {
                escaped = true;
                out.push(c);
            } else if c == '"' {
                in_string = false;
                out.push(c);
            } else if c == '\n' {
                out.push_str("\\n");
            } else if c == '\r' {
                out.push_str("\\r");
            } else {
                out.push(c);
            }
        } else if c == '"' {
            in_string = true;
            out.push(c);
        } else if c == ',' {
            // 尾逗号：后面第一个非空白是闭括号则丢弃
            let mut j = i + 1;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            if !(j < chars.len() && (chars[j] == ']' || chars[j] == '}')) {
                out.push(c);
            }
        } else {
            out.push(c);
        }
        i += 1;
    }
    out
}

fn sample(raw: &str) -> String {
    let s: String = raw.chars().take(SAMPLE_CHARS).collect();
    if raw.chars().count() > SAMPLE_CHARS {
        format!("{}...", s)
    } else {
        s
    }
}
