//! Loss functions for binary segmentation training.
//!
//! Both criteria operate on raw logits and float binary targets, and
//! follow Burn's loss conventions: a `Config` struct with defaults, a
//! `forward` with configurable reduction and a shape-preserving
//! `forward_no_reduction`.

mod dice;
mod focal;

pub use dice::{DiceLoss, DiceLossConfig};
pub use focal::{FocalLoss, FocalLossConfig};

use burn::tensor::{backend::Backend, Tensor};

use crate::error::{RoadSegError, RoadSegResult};

/// Loss function selected by a trial configuration.
///
/// The registry is fixed: `"dice_loss"` and `"focal_loss"`. Unknown keys
/// fail the trial before any epoch executes.
#[derive(Debug, Clone)]
pub enum SegCriterion {
    Dice(DiceLoss),
    Focal(FocalLoss),
}

impl SegCriterion {
    /// Look up a criterion by its registry key.
    ///
    /// # Errors
    ///
    /// Returns [`RoadSegError::UnknownCriterion`] for any key outside the
    /// registry.
    pub fn from_name(name: &str) -> RoadSegResult<Self> {
        match name {
            "dice_loss" => Ok(Self::Dice(DiceLossConfig::new().init())),
            "focal_loss" => Ok(Self::Focal(FocalLossConfig::new().init())),
            _ => Err(RoadSegError::UnknownCriterion {
                name: name.to_owned(),
            }),
        }
    }

    /// The registry key of this criterion.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Dice(_) => "dice_loss",
            Self::Focal(_) => "focal_loss",
        }
    }

    /// Mean loss of a batch of logits against float binary targets.
    ///
    /// # Shapes
    ///
    /// - logits: `[batch_size, 1, height, width]`
    /// - targets: `[batch_size, 1, height, width]`
    /// - output: `[1]`
    pub fn forward<B: Backend>(
        &self,
        logits: Tensor<B, 4>,
        targets: Tensor<B, 4>,
    ) -> Tensor<B, 1> {
        use burn::nn::loss::Reduction;
        match self {
            Self::Dice(loss) => loss.forward(logits, targets, Reduction::Mean),
            Self::Focal(loss) => loss.forward(logits, targets, Reduction::Mean),
        }
    }
}
