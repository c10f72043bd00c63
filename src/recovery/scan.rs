//! 括号/字符串扫描器
//!
//! 修复截断 JSON 的基础设施：按字节扫描文本，跟踪未闭合的 `{`/`[` 栈与是否处于
//! 字符串字面量内（未转义的 `"` 切换字符串态，字符串内的括号不计数）。

/// 一次扫描的结果
#[derive(Debug, Default)]
pub struct ScanState {
    /// 仍未闭合的开括号栈（`{` / `[`），按打开顺序
    pub stack: Vec<char>,
    /// 扫描结束时是否停在字符串字面量内部
    pub in_string: bool,
    /// 首个开括号的配对闭括号之后的位置（文本平衡时存在）
    pub balanced_end: Option<usize>,
    /// 最后一个「`}`/`]` 后紧跟逗号、且逗号后仍有内容」的完整元素边界
    /// （闭括号之后的位置）。尾部悬挂的逗号不产生边界：它前面的元素
    /// 正是截断修复要丢弃的可疑尾部
    pub last_boundary: Option<usize>,
}

/// 扫描文本，统计括号栈、字符串态、平衡终点与最后完整元素边界。
/// 结构字符均为 ASCII，按字节扫描即可；与栈顶不匹配的闭括号按噪声忽略。
pub fn scan(text: &str) -> ScanState {
    let bytes = text.as_bytes();
    let mut st = ScanState::default();
    let mut escaped = false;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if st.in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                st.in_string = false;
            }
        } else {
            match b {
                b'"' => st.in_string = true,
                b'{' | b'[' => st.stack.push(b as char),
                b'}' | b']' => {
                    let opener = if b == b'}' { '{' } else { '[' };
                    if st.stack.last() == Some(&opener) {
                        st.stack.pop();
                        if st.stack.is_empty() && st.balanced_end.is_none() {
                            st.balanced_end = Some(i + 1);
                        }
                        // 闭括号后紧跟逗号（忽略空白）、逗号后仍有内容且仍在
                        // 容器内，视为完整元素边界
                        if !st.stack.is_empty() {
                            let mut j = i + 1;
                            while j < bytes.len() && bytes[j].is_ascii_whitespace() {
                                j += 1;
                            }
                            if j < bytes.len() && bytes[j] == b',' {
                                let mut k = j + 1;
                                while k < bytes.len() && bytes[k].is_ascii_whitespace() {
                                    k += 1;
                                }
                                if k < bytes.len() {
                                    st.last_boundary = Some(i + 1);
                                }
                            }
                        }
                    }
                }
                _ => {}
            }
        }
        i += 1;
    }
    st
}

/// 从首个 `{` 起做平衡括号提取，返回深度归零处截取的子串
pub fn extract_balanced(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let st = scan(&text[start..]);
    st.balanced_end.map(|end| &text[start..start + end])
}

/// 截断修复：文本不平衡时闭合结构。尾部停在闭括号上（且不在字符串内）说明
/// 最后一个元素是完整的，全部保留只补闭括号；否则尾部残缺（字符串中断、
/// 悬挂逗号或值中断），截到最后一个完整元素边界——残缺元素不可猜测只能
/// 丢弃。只闭合结构，绝不编造字段值。已平衡的文本返回 None。
pub fn repair_truncated(candidate: &str) -> Option<String> {
    let st = scan(candidate);
    if st.stack.is_empty() && !st.in_string {
        return None;
    }

    let tail = candidate.trim_end();
    let tail_complete = !st.in_string && (tail.ends_with('}') || tail.ends_with(']'));
    let truncated = if tail_complete {
        candidate
    } else {
        match st.last_boundary {
            Some(pos) => &candidate[..pos],
            None => candidate,
        }
    };

    // 截断点之后栈可能不同，重扫后再闭合
    let st = scan(truncated);
    let mut repaired = truncated.to_string();
    if st.in_string {
        repaired.push('"');
    }
    for opener in st.stack.iter().rev() {
        repaired.push(if *opener == '{' { '}' } else { ']' });
    }
    Some(repaired)
}
