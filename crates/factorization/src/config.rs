//! Hyper-parameters of the fused factorization model.

use crate::error::{Result, TrainError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactorizationConfig {
    /// Latent dimension `k`
    pub factors: usize,
    /// L2 penalty on user factors
    pub reg_user: f64,
    /// L2 penalty on item and relation factors
    pub reg_item: f64,
    /// Ridge penalty on the content projection
    pub reg_content: f64,
    /// Confidence scale, `w = 1 + alpha * r`
    pub alpha: f64,
    /// Weight of the item relation term
    pub beta: f64,
    /// Weight of the content term
    pub gamma: f64,
    /// Outer iterations (upper bound when early stopping is used)
    pub iterations: usize,
    pub seed: u64,
    /// Standard deviation of the initial factors
    pub init_std: f64,
}

impl Default for FactorizationConfig {
    fn default() -> Self {
        Self {
            factors: 10,
            reg_user: 0.01,
            reg_item: 0.01,
            reg_content: 1000.0,
            alpha: 10.0,
            beta: 1.0,
            gamma: 1.0,
            iterations: 10,
            seed: 1,
            init_std: 0.01,
        }
    }
}

impl FactorizationConfig {
    pub fn with_factors(mut self, factors: usize) -> Self {
        self.factors = factors;
        self
    }

    pub fn with_regularization(mut self, reg_user: f64, reg_item: f64) -> Self {
        self.reg_user = reg_user;
        self.reg_item = reg_item;
        self
    }

    pub fn with_reg_content(mut self, reg_content: f64) -> Self {
        self.reg_content = reg_content;
        self
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_beta(mut self, beta: f64) -> Self {
        self.beta = beta;
        self
    }

    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }

    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Reject settings the sweeps cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.factors == 0 {
            return Err(TrainError::InvalidConfig("factors must be at least 1".into()));
        }
        if !(self.init_std > 0.0 && self.init_std.is_finite()) {
            return Err(TrainError::InvalidConfig(format!(
                "init_std must be positive, got {}",
                self.init_std
            )));
        }
        let weights = [
            ("reg_user", self.reg_user),
            ("reg_item", self.reg_item),
            ("reg_content", self.reg_content),
            ("alpha", self.alpha),
            ("beta", self.beta),
            ("gamma", self.gamma),
        ];
        for (name, value) in weights {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(TrainError::InvalidConfig(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(FactorizationConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let zero_k = FactorizationConfig::default().with_factors(0);
        assert!(matches!(zero_k.validate(), Err(TrainError::InvalidConfig(_))));

        let negative = FactorizationConfig::default().with_alpha(-1.0);
        assert!(negative.validate().is_err());

        let nan = FactorizationConfig::default().with_gamma(f64::NAN);
        assert!(nan.validate().is_err());
    }
}
