use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Per-epoch accuracy and loss for the train and held-out sets.
///
/// Accepts both `train_acc`/`test_acc`/`train_loss`/`test_loss` keys and the
/// `accuracy`/`val_accuracy`/`loss`/`val_loss` keys written by Keras callbacks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    #[serde(alias = "accuracy")]
    pub train_acc: Vec<f64>,
    #[serde(alias = "val_accuracy")]
    pub test_acc: Vec<f64>,
    #[serde(alias = "loss")]
    pub train_loss: Vec<f64>,
    #[serde(alias = "val_loss")]
    pub test_loss: Vec<f64>,
}

impl TrainingHistory {
    pub fn epochs(&self) -> usize {
        [
            self.train_acc.len(),
            self.test_acc.len(),
            self.train_loss.len(),
            self.test_loss.len(),
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }
}

pub fn read_history(path: &Path) -> Result<TrainingHistory> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing history {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_torch_and_keras_keys() {
        let torch: TrainingHistory = serde_json::from_str(
            r#"{"train_acc":[0.5,0.7],"test_acc":[0.4,0.6],"train_loss":[1.0,0.6],"test_loss":[1.1,0.8]}"#,
        )
        .unwrap();
        let keras: TrainingHistory = serde_json::from_str(
            r#"{"accuracy":[0.5,0.7],"val_accuracy":[0.4,0.6],"loss":[1.0,0.6],"val_loss":[1.1,0.8]}"#,
        )
        .unwrap();
        assert_eq!(torch, keras);
        assert_eq!(torch.epochs(), 2);
    }
}
