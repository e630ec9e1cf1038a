/// Configuration for the NFSP networks and action-selection rule.
#[derive(Debug, Clone)]
pub struct NfspConfig {
    /// Width of every hidden layer and embedding
    pub hidden_dim: usize,
    /// Number of filters in the rank/suit convolutions
    pub n_filters: usize,
    /// Size of the action (bucket) space
    pub num_actions: usize,
    /// Adam learning rate shared by both heads
    pub learning_rate: f64,
    /// Anticipatory parameter: probability of acting through the value head
    pub eta: f64,
    /// Exploration rate inside the best-response branch
    pub eps: f64,
    /// Episodes between target network synchronizations
    pub target_sync_period: u64,
    /// Discount applied to bootstrapped value targets
    pub gamma: f64,
    /// Element-wise gradient bound for the value head
    pub grad_clip: f64,
    /// Alpha-dropout rate inside the card featurizer while training
    pub dropout: f64,
    /// Greedy (argmax) or softmax sampling in the best-response branch
    pub greedy: bool,
    /// Random seed for action selection
    pub seed: u64,
}

impl Default for NfspConfig {
    fn default() -> Self {
        Self {
            hidden_dim: 64,
            n_filters: 10,
            num_actions: 16,
            learning_rate: 1e-3,
            eta: 0.1,
            eps: 0.01,
            target_sync_period: 300,
            gamma: 0.95,
            grad_clip: 10.0,
            dropout: 0.1,
            greedy: true,
            seed: 42,
        }
    }
}

impl NfspConfig {
    pub fn validate(&self) -> Result<(), crate::NfspError> {
        if self.hidden_dim == 0 {
            return Err(crate::NfspError::Config("hidden_dim must be > 0".into()));
        }
        if self.n_filters == 0 {
            return Err(crate::NfspError::Config("n_filters must be > 0".into()));
        }
        // Buckets are i8 starting at -1 (fold).
        if !(2..=128).contains(&self.num_actions) {
            return Err(crate::NfspError::Config(
                "num_actions must be in 2..=128".into(),
            ));
        }
        if self.learning_rate <= 0.0 {
            return Err(crate::NfspError::Config(
                "learning_rate must be > 0".into(),
            ));
        }
        check_probability("eta", self.eta)?;
        check_probability("eps", self.eps)?;
        check_probability("gamma", self.gamma)?;
        if self.target_sync_period == 0 {
            return Err(crate::NfspError::Config(
                "target_sync_period must be > 0".into(),
            ));
        }
        if self.grad_clip <= 0.0 {
            return Err(crate::NfspError::Config("grad_clip must be > 0".into()));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(crate::NfspError::Config(
                "dropout must be in [0, 1)".into(),
            ));
        }
        Ok(())
    }
}

pub(crate) fn check_probability(name: &str, value: f64) -> Result<(), crate::NfspError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(crate::NfspError::Config(format!(
            "{name} must be in [0, 1], got {value}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        NfspConfig::default().validate().unwrap();
    }

    #[test]
    fn zero_hidden_dim_is_invalid() {
        let config = NfspConfig {
            hidden_dim: 0,
            ..NfspConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn single_action_space_is_invalid() {
        let config = NfspConfig {
            num_actions: 1,
            ..NfspConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn eta_above_one_is_invalid() {
        let config = NfspConfig {
            eta: 1.5,
            ..NfspConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn full_dropout_is_invalid() {
        let config = NfspConfig {
            dropout: 1.0,
            ..NfspConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn extreme_mixing_parameters_are_valid() {
        let config = NfspConfig {
            eta: 1.0,
            eps: 0.0,
            ..NfspConfig::default()
        };
        config.validate().unwrap();
    }
}
