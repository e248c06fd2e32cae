/// Monitors convergence of an iterative variance-component fit.
///
/// Converged when both the relative parameter change and the relative
/// log-likelihood change of the last iteration are below `tol`.
#[derive(Debug)]
pub struct ConvergenceMonitor {
    tol: f64,
    max_iter: usize,
    history: Vec<ConvergenceRecord>,
}

#[derive(Debug, Clone)]
struct ConvergenceRecord {
    log_likelihood: f64,
    param_change: f64,
    logl_change: f64,
}

impl ConvergenceMonitor {
    pub fn new(tol: f64, max_iter: usize) -> Self {
        Self {
            tol,
            max_iter,
            history: Vec::new(),
        }
    }

    /// Record a new iteration.
    pub fn record(&mut self, log_likelihood: f64, param_change: f64) {
        let logl_change = if let Some(prev) = self.history.last() {
            (log_likelihood - prev.log_likelihood).abs() / (1.0 + log_likelihood.abs())
        } else {
            f64::INFINITY
        };

        self.history.push(ConvergenceRecord {
            log_likelihood,
            param_change,
            logl_change,
        });
    }

    /// Check if convergence criterion is met. Never true after a single
    /// iteration.
    pub fn is_converged(&self) -> bool {
        match self.history.last() {
            Some(last) if self.history.len() > 1 => {
                last.param_change < self.tol && last.logl_change < self.tol
            }
            _ => false,
        }
    }

    /// Check if maximum iterations reached.
    pub fn max_reached(&self) -> bool {
        self.history.len() >= self.max_iter
    }

    /// The larger of the last parameter and log-likelihood changes.
    pub fn last_change(&self) -> f64 {
        self.history
            .last()
            .map(|r| r.param_change.max(r.logl_change))
            .unwrap_or(f64::INFINITY)
    }

    /// Get the last log-likelihood value.
    pub fn last_logl(&self) -> Option<f64> {
        self.history.last().map(|r| r.log_likelihood)
    }

    /// Number of iterations recorded.
    pub fn n_iterations(&self) -> usize {
        self.history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_two_iterations() {
        let mut m = ConvergenceMonitor::new(1e-6, 10);
        m.record(-10.0, 0.0);
        assert!(!m.is_converged());
        m.record(-10.0, 1e-9);
        assert!(m.is_converged());
        assert_eq!(m.n_iterations(), 2);
        assert_eq!(m.last_logl(), Some(-10.0));
    }

    #[test]
    fn test_loglik_change_blocks_convergence() {
        let mut m = ConvergenceMonitor::new(1e-6, 10);
        m.record(-10.0, 1e-9);
        m.record(-9.0, 1e-9);
        assert!(!m.is_converged());
        assert!(m.last_change() > 0.05);
    }

    #[test]
    fn test_max_reached() {
        let mut m = ConvergenceMonitor::new(1e-6, 2);
        m.record(-1.0, 1.0);
        assert!(!m.max_reached());
        m.record(-1.0, 1.0);
        assert!(m.max_reached());
    }
}
