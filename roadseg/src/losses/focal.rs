//! Focal loss for binary segmentation.
//!
//! Down-weights well-classified pixels so training focuses on the hard
//! ones, which matters here because road pixels are a small minority of
//! most satellite patches:
//!
//! ```text
//! FL(pt) = -(1 - pt)^gamma * log(pt)
//! ```

use burn::{
    config::Config,
    module::Module,
    nn::loss::Reduction,
    tensor::{activation, backend::Backend, Tensor},
};

/// Configuration for creating a [focal loss](FocalLoss).
#[derive(Config, Debug)]
pub struct FocalLossConfig {
    /// Focusing parameter. Default: 2.0
    #[config(default = 2.0)]
    pub gamma: f64,
    /// Optional class-balance weight for the positive class.
    #[config(default = "None")]
    pub alpha: Option<f64>,
}

impl FocalLossConfig {
    /// Initialize [focal loss](FocalLoss).
    pub fn init(&self) -> FocalLoss {
        self.assertions();
        FocalLoss {
            gamma: self.gamma,
            alpha: self.alpha,
        }
    }

    fn assertions(&self) {
        assert!(
            self.gamma >= 0.0,
            "Gamma for FocalLoss must be non-negative, got {}",
            self.gamma
        );
        if let Some(alpha) = self.alpha {
            assert!(
                (0.0..=1.0).contains(&alpha),
                "Alpha for FocalLoss must be in [0, 1], got {alpha}"
            );
        }
    }
}

/// Focal loss operating on raw logits.
#[derive(Module, Clone, Debug)]
pub struct FocalLoss {
    /// Focusing parameter.
    pub gamma: f64,
    /// Optional class-balance weight for the positive class.
    pub alpha: Option<f64>,
}

impl Default for FocalLoss {
    fn default() -> Self {
        FocalLossConfig::new().init()
    }
}

impl FocalLoss {
    /// Compute the criterion on the input tensor with reduction.
    ///
    /// # Shapes
    ///
    /// - logits: `[batch_size, channels, height, width]`
    /// - targets: `[batch_size, channels, height, width]`
    /// - output: `[1]`
    pub fn forward<B: Backend>(
        &self,
        logits: Tensor<B, 4>,
        targets: Tensor<B, 4>,
        reduction: Reduction,
    ) -> Tensor<B, 1> {
        let loss = self.forward_no_reduction(logits, targets);
        match reduction {
            Reduction::Mean | Reduction::Auto => loss.mean(),
            Reduction::Sum => loss.sum(),
        }
    }

    /// Compute the criterion on the input tensor without reduction.
    ///
    /// Each sample's loss is the mean focal loss over its pixels.
    ///
    /// # Shapes
    ///
    /// - logits: `[batch_size, channels, height, width]`
    /// - targets: `[batch_size, channels, height, width]`
    /// - output: `[batch_size]`
    pub fn forward_no_reduction<B: Backend>(
        &self,
        logits: Tensor<B, 4>,
        targets: Tensor<B, 4>,
    ) -> Tensor<B, 1> {
        let logit_dims = logits.dims();
        let target_dims = targets.dims();
        assert_eq!(
            logit_dims, target_dims,
            "Shape of logits ({logit_dims:?}) must match targets ({target_dims:?})"
        );

        let [batch_size, ..] = logits.dims();

        // log(pt) via log-sigmoid keeps the computation stable for large
        // magnitude logits.
        let log_p = activation::log_sigmoid(logits.clone());
        let log_not_p = activation::log_sigmoid(logits.neg());
        let log_pt = targets.clone() * log_p
            + (Tensor::ones_like(&targets) - targets.clone()) * log_not_p;

        let pt = log_pt.clone().exp();
        let focal_term = (Tensor::ones_like(&pt) - pt).powf_scalar(self.gamma as f32);
        let mut loss = focal_term * log_pt.neg();

        if let Some(alpha) = self.alpha {
            let weight = targets.clone().mul_scalar(alpha)
                + (Tensor::ones_like(&targets) - targets).mul_scalar(1.0 - alpha);
            loss = loss * weight;
        }

        // Per-sample mean over all pixels: [B, C*H*W] -> [B]
        loss.reshape([batch_size as i32, -1])
            .mean_dim(1)
            .reshape([batch_size])
    }
}

#[cfg(test)]
mod tests {
    use burn::tensor::{ElementConversion, TensorData};

    use super::*;
    use crate::tests::TestBackend;

    #[test]
    fn focal_loss_confident_correct_prediction_is_near_zero() {
        let device = Default::default();
        let loss = FocalLossConfig::new().init();

        let logits = Tensor::<TestBackend, 4>::from_data(
            TensorData::from([[[[10.0, -10.0], [-10.0, 10.0]]]]),
            &device,
        );
        let targets = Tensor::<TestBackend, 4>::from_data(
            TensorData::from([[[[1.0, 0.0], [0.0, 1.0]]]]),
            &device,
        );

        let value = loss
            .forward(logits, targets, Reduction::Mean)
            .into_scalar()
            .elem::<f64>();
        assert!(value < 1e-6, "expected near-zero loss, got {value}");
    }

    #[test]
    fn focal_loss_matches_reference_for_uncertain_prediction() {
        let device = Default::default();
        let loss = FocalLossConfig::new().init();

        // Logit 0 on a positive pixel: pt = 0.5,
        // FL = (1 - 0.5)^2 * -ln(0.5) = 0.25 * 0.693147 = 0.173287
        let logits =
            Tensor::<TestBackend, 4>::from_data(TensorData::from([[[[0.0]]]]), &device);
        let targets =
            Tensor::<TestBackend, 4>::from_data(TensorData::from([[[[1.0]]]]), &device);

        let value = loss
            .forward(logits, targets, Reduction::Mean)
            .into_scalar()
            .elem::<f64>();
        assert!(
            (value - 0.25 * std::f64::consts::LN_2).abs() < 1e-5,
            "got {value}"
        );
    }

    #[test]
    fn focal_loss_gamma_zero_reduces_to_cross_entropy() {
        let device = Default::default();
        let loss = FocalLossConfig::new().with_gamma(0.0).init();

        let logits =
            Tensor::<TestBackend, 4>::from_data(TensorData::from([[[[0.0]]]]), &device);
        let targets =
            Tensor::<TestBackend, 4>::from_data(TensorData::from([[[[1.0]]]]), &device);

        let value = loss
            .forward(logits, targets, Reduction::Mean)
            .into_scalar()
            .elem::<f64>();
        assert!((value - std::f64::consts::LN_2).abs() < 1e-5, "got {value}");
    }

    #[test]
    fn focal_loss_alpha_downweights_negative_class() {
        let device = Default::default();
        let weighted = FocalLossConfig::new().with_alpha(Some(0.75)).init();
        let unweighted = FocalLossConfig::new().init();

        let logits =
            Tensor::<TestBackend, 4>::from_data(TensorData::from([[[[1.0]]]]), &device);
        let targets =
            Tensor::<TestBackend, 4>::from_data(TensorData::from([[[[0.0]]]]), &device);

        let weighted_value = weighted
            .forward(logits.clone(), targets.clone(), Reduction::Mean)
            .into_scalar()
            .elem::<f64>();
        let unweighted_value = unweighted
            .forward(logits, targets, Reduction::Mean)
            .into_scalar()
            .elem::<f64>();

        assert!((weighted_value - 0.25 * unweighted_value).abs() < 1e-6);
    }

    #[test]
    #[should_panic = "Gamma for FocalLoss must be non-negative"]
    fn focal_loss_config_negative_gamma_panics() {
        let _loss = FocalLossConfig::new().with_gamma(-1.0).init();
    }
}
