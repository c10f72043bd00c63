//! 批处理骨架
//!
//! 把大工作量按固定批量顺序处理（刻意不并发，尊重外部限流）；单批失败时按
//! 输入逐项替换为确定性兜底结果而非中止整轮——输出条数恒等于输入条数。
//! 唯一的整体失败：每一批都死在网关（网关不可达），此时上抛错误而不是返回
//! 一份全兜底的空壳结果。末尾可选一次合并调用，失败时静默退回未合并结果，
//! 绝不丢数据。

use std::future::Future;
use std::pin::Pin;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::core::AgentError;
use crate::llm::{Content, ModelClient, ModelTurn, ToolMode};
use crate::recovery::recover;

/// 单批处理的装箱 Future（与派发回调同风格）
pub type BatchFuture<'a, R> = Pin<Box<dyn Future<Output = Result<Vec<R>, AgentError>> + Send + 'a>>;

/// 顺序批处理。worker 返回 Err 或结果条数与该批不符时，整批逐项替换为
/// fallback(item)；每批完成后回调 progress(已完成条数, 总条数)。
/// 所有批都因网关错误失败时返回 Err（网关不可达不是可降级的局部故障）。
pub async fn process_in_batches<'a, T, R>(
    items: &'a [T],
    batch_size: usize,
    worker: impl Fn(&'a [T]) -> BatchFuture<'a, R>,
    fallback: impl Fn(&T) -> R,
    mut progress: impl FnMut(usize, usize),
) -> Result<Vec<R>, AgentError> {
    let total = items.len();
    let mut results: Vec<R> = Vec::with_capacity(total);
    if total == 0 {
        return Ok(results);
    }

    let batch_size = batch_size.max(1);
    let mut batches = 0usize;
    let mut gateway_failures = 0usize;
    let mut last_gateway_error = String::new();
    for chunk in items.chunks(batch_size) {
        batches += 1;
        match worker(chunk).await {
            Ok(batch_results) if batch_results.len() == chunk.len() => {
                results.extend(batch_results);
            }
            Ok(batch_results) => {
                tracing::warn!(
                    expected = chunk.len(),
                    got = batch_results.len(),
                    "batch result count mismatch, substituting fallbacks"
                );
                results.extend(chunk.iter().map(&fallback));
            }
            Err(AgentError::Gateway(e)) => {
                tracing::warn!(error = %e, "batch failed at gateway, substituting fallbacks");
                gateway_failures += 1;
                last_gateway_error = e;
                results.extend(chunk.iter().map(&fallback));
            }
            Err(e) => {
                tracing::warn!(error = %e, "batch failed, substituting fallbacks");
                results.extend(chunk.iter().map(&fallback));
            }
        }
        progress(results.len(), total);
    }

    if gateway_failures == batches {
        return Err(AgentError::Gateway(format!(
            "unreachable for all {} batches: {}",
            batches, last_gateway_error
        )));
    }
    Ok(results)
}

/// 合并阶段：把全部结果交给模型去重/合并一次。模型调用失败、修复失败、
/// 反序列化失败或返回空集时，原样返回未合并结果。
pub async fn merge_pass<R>(
    client: &dyn ModelClient,
    system: &str,
    instruction: &str,
    expected_key: &str,
    items: Vec<R>,
) -> Vec<R>
where
    R: Serialize + DeserializeOwned,
{
    if items.len() < 2 {
        return items;
    }
    let payload = match serde_json::to_string(&items) {
        Ok(p) => p,
        Err(_) => return items,
    };
    let prompt = format!("{}\n\nItems:\n{}", instruction, payload);

    let text = match client
        .complete(system, &[Content::user_text(prompt)], &ToolMode::JsonOnly)
        .await
    {
        Ok(ModelTurn::Text(t)) => t,
        Ok(ModelTurn::ToolCalls(_)) | Err(_) => {
            tracing::warn!("merge pass failed, returning unmerged results");
            return items;
        }
    };

    let value = match recover(&text, expected_key) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "merge pass produced unrecoverable output");
            return items;
        }
    };
    match serde_json::from_value::<Vec<R>>(value[expected_key].clone()) {
        Ok(merged) if !merged.is_empty() => merged,
        _ => items,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockModelClient;

    fn worker_failing_batch(
        fail_batch_index: usize,
    ) -> impl Fn(&[u32]) -> BatchFuture<'_, u32> {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let counter = std::sync::Arc::new(AtomicUsize::new(0));
        move |chunk: &[u32]| {
            let index = counter.fetch_add(1, Ordering::SeqCst);
            let chunk = chunk.to_vec();
            Box::pin(async move {
                if index == fail_batch_index {
                    Err(AgentError::Gateway("unreachable".to_string()))
                } else {
                    Ok(chunk.iter().map(|x| x * 10).collect())
                }
            })
        }
    }

    #[tokio::test]
    async fn test_output_count_equals_input_count_under_failure() {
        // 10 项、批量 3，第 2 批（下标 1，即第 4-6 项）每次都挂
        let items: Vec<u32> = (1..=10).collect();
        let mut updates = Vec::new();
        let results = process_in_batches(
            &items,
            3,
            worker_failing_batch(1),
            |item| item + 1000,
            |done, total| updates.push((done, total)),
        )
        .await
        .unwrap();

        assert_eq!(results.len(), 10);
        let fallbacks: Vec<&u32> = results.iter().filter(|r| **r >= 1000).collect();
        assert_eq!(fallbacks.len(), 3);
        assert_eq!(results[0], 10);
        assert_eq!(results[3], 1004);
        assert_eq!(updates, vec![(3, 10), (6, 10), (9, 10), (10, 10)]);
    }

    #[tokio::test]
    async fn test_count_mismatch_triggers_fallback() {
        let items = vec![1u32, 2, 3];
        let results = process_in_batches(
            &items,
            3,
            |_chunk| Box::pin(async { Ok(vec![7u32]) }),
            |item| *item,
            |_, _| {},
        )
        .await
        .unwrap();
        assert_eq!(results, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let items: Vec<u32> = vec![];
        let results =
            process_in_batches(&items, 3, |_c| Box::pin(async { Ok(vec![]) }), |i| *i, |_, _| {})
                .await
                .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_all_batches_failing_at_gateway_is_error() {
        let items = vec![1u32, 2, 3, 4];
        let err = process_in_batches(
            &items,
            2,
            |_chunk| {
                Box::pin(async {
                    Err::<Vec<u32>, AgentError>(AgentError::Gateway("unreachable".to_string()))
                })
            },
            |item| *item,
            |_, _| {},
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AgentError::Gateway(_)));
    }

    #[tokio::test]
    async fn test_all_batches_failing_at_recovery_still_degrades() {
        // 非网关类失败即使全军覆没也按兜底降级，不上抛
        let items = vec![1u32, 2];
        let results = process_in_batches(
            &items,
            1,
            |_chunk| {
                Box::pin(async {
                    Err::<Vec<u32>, AgentError>(
                        crate::recovery::RecoveryError::Unrecoverable {
                            key: "items".to_string(),
                            sample: "prose".to_string(),
                        }
                        .into(),
                    )
                })
            },
            |item| *item + 100,
            |_, _| {},
        )
        .await
        .unwrap();
        assert_eq!(results, vec![101, 102]);
    }

    #[tokio::test]
    async fn test_merge_pass_returns_merged() {
        let client = MockModelClient::with_texts(vec![r#"{"items": [1, 2]}"#]);
        let merged = merge_pass(&client, "sys", "dedupe", "items", vec![1u32, 1, 2]).await;
        assert_eq!(merged, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_merge_pass_failure_returns_unmerged() {
        let client = MockModelClient::with_texts(vec!["no json here at all"]);
        let merged = merge_pass(&client, "sys", "dedupe", "items", vec![1u32, 1, 2]).await;
        assert_eq!(merged, vec![1, 1, 2]);
    }

    #[tokio::test]
    async fn test_merge_pass_empty_result_returns_unmerged() {
        let client = MockModelClient::with_texts(vec![r#"{"items": []}"#]);
        let merged = merge_pass(&client, "sys", "dedupe", "items", vec![1u32, 2]).await;
        assert_eq!(merged, vec![1, 2]);
    }
}
