use crate::error::{DdpError, DdpResult};

/// Solver parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct DdpConfig {
    /// Outer iteration budget.
    pub max_iter: usize,
    /// Stop once an accepted iteration improves the cost by less than this.
    pub cost_tolerance: f64,
    /// Line-search trials per forward pass. Default: 20
    pub max_backtracking: usize,
    /// Step scale shrink factor per rejected trial. Default: 0.6
    pub step_decay: f64,
    /// `Quu += base^regulate * I`. Default: 1.5
    pub regularization_base: f64,
    /// Highest regularization level tried before giving up. Default: 100
    pub max_regularization: u32,
    /// Relative Frobenius tolerance for the `Quu` symmetry test. Default: 1e-12
    pub symmetry_tolerance: f64,
}

impl Default for DdpConfig {
    fn default() -> Self {
        Self {
            max_iter: 100,
            cost_tolerance: 1e-2,
            max_backtracking: 20,
            step_decay: 0.6,
            regularization_base: 1.5,
            max_regularization: 100,
            symmetry_tolerance: 1e-12,
        }
    }
}

impl DdpConfig {
    #[must_use]
    pub fn new(max_iter: usize, cost_tolerance: f64) -> Self {
        Self {
            max_iter,
            cost_tolerance,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_max_backtracking(mut self, trials: usize) -> Self {
        self.max_backtracking = trials;
        self
    }

    #[must_use]
    pub fn with_step_decay(mut self, decay: f64) -> Self {
        self.step_decay = decay;
        self
    }

    #[must_use]
    pub fn with_regularization_base(mut self, base: f64) -> Self {
        self.regularization_base = base;
        self
    }

    #[must_use]
    pub fn with_max_regularization(mut self, level: u32) -> Self {
        self.max_regularization = level;
        self
    }

    #[must_use]
    pub fn with_symmetry_tolerance(mut self, tol: f64) -> Self {
        self.symmetry_tolerance = tol;
        self
    }

    pub fn validate(&self) -> DdpResult<()> {
        if self.max_iter == 0 {
            return Err(DdpError::InvalidConfig("max_iter must be positive".into()));
        }
        if !(self.cost_tolerance > 0.0 && self.cost_tolerance.is_finite()) {
            return Err(DdpError::InvalidConfig(format!(
                "cost_tolerance must be positive and finite (got {})",
                self.cost_tolerance
            )));
        }
        if self.max_backtracking == 0 {
            return Err(DdpError::InvalidConfig(
                "max_backtracking must be positive".into(),
            ));
        }
        if !(self.step_decay > 0.0 && self.step_decay < 1.0) {
            return Err(DdpError::InvalidConfig(format!(
                "step_decay must lie in (0, 1) (got {})",
                self.step_decay
            )));
        }
        if !(self.regularization_base > 1.0 && self.regularization_base.is_finite()) {
            return Err(DdpError::InvalidConfig(format!(
                "regularization_base must be greater than 1 (got {})",
                self.regularization_base
            )));
        }
        if !(self.symmetry_tolerance >= 0.0) {
            return Err(DdpError::InvalidConfig(
                "symmetry_tolerance must be non-negative".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_line_search_rules() {
        let c = DdpConfig::default();
        assert_eq!(c.max_backtracking, 20);
        assert_eq!(c.step_decay, 0.6);
        assert_eq!(c.regularization_base, 1.5);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        assert!(DdpConfig::new(0, 1e-2).validate().is_err());
        assert!(DdpConfig::new(10, 0.0).validate().is_err());
        assert!(DdpConfig::new(10, f64::NAN).validate().is_err());
        assert!(DdpConfig::new(10, 1e-2)
            .with_step_decay(1.0)
            .validate()
            .is_err());
        assert!(DdpConfig::new(10, 1e-2)
            .with_regularization_base(1.0)
            .validate()
            .is_err());
        assert!(DdpConfig::new(10, 1e-2)
            .with_max_backtracking(0)
            .validate()
            .is_err());
    }
}
