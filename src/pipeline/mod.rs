//! 管线层：批处理骨架与三条领域管线（生成 / 购物清单润色 / 配料归类）

pub mod batch;
pub mod categorize;
pub mod generation;
pub mod grocery;
pub mod types;

use tokio::sync::mpsc::UnboundedSender;

use crate::jobs::ProgressSnapshot;

pub use batch::{merge_pass, process_in_batches, BatchFuture};
pub use categorize::{CategorizationPipeline, CategorizationRequest};
pub use generation::{GenerationPipeline, GenerationRequest};
pub use grocery::{GroceryPolishPipeline, GroceryPolishRequest};
pub use types::{CategorizedIngredient, GroceryItem, MealOutline, Recipe};

/// 进度上报：没有接收端时静默丢弃
pub(crate) fn send_progress(
    tx: Option<&UnboundedSender<ProgressSnapshot>>,
    snapshot: ProgressSnapshot,
) {
    if let Some(tx) = tx {
        let _ = tx.send(snapshot);
    }
}
