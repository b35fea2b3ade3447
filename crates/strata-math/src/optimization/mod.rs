//! Damped Gauss-Newton (Levenberg-Marquardt) least-squares driver.
//!
//! The curve calibrator expresses "reprice every instrument to its market
//! quote" as a nonlinear least-squares problem over the knot ordinates. This
//! module owns only the iteration: residuals and analytic Jacobian rows come
//! from the [`LeastSquaresProblem`] implementor.

use log::{debug, trace};
use nalgebra::{DMatrix, DVector};

use crate::error::{MathError, MathResult};

/// Configuration for the Levenberg-Marquardt driver.
#[derive(Debug, Clone, Copy)]
pub struct LmConfig {
    /// Maximum number of accepted or rejected steps.
    pub max_iterations: usize,
    /// Convergence threshold on the residual RMS.
    pub residual_tolerance: f64,
    /// Convergence threshold on the relative parameter step.
    pub step_tolerance: f64,
    /// Convergence threshold on the gradient infinity norm.
    pub gradient_tolerance: f64,
    /// Initial damping parameter.
    pub initial_lambda: f64,
    /// Multiplicative damping adjustment per accept/reject.
    pub lambda_factor: f64,
    /// Lower damping bound.
    pub min_lambda: f64,
    /// Upper damping bound; exceeding it aborts the iteration.
    pub max_lambda: f64,
}

impl Default for LmConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            residual_tolerance: 1e-10,
            step_tolerance: 1e-12,
            gradient_tolerance: 1e-12,
            initial_lambda: 1e-3,
            lambda_factor: 10.0,
            min_lambda: 1e-12,
            max_lambda: 1e10,
        }
    }
}

impl LmConfig {
    /// Sets the maximum iterations.
    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Sets the residual RMS tolerance.
    #[must_use]
    pub fn with_residual_tolerance(mut self, tolerance: f64) -> Self {
        self.residual_tolerance = tolerance;
        self
    }
}

/// Outcome of a least-squares minimization.
#[derive(Debug, Clone)]
pub struct LmReport {
    /// Number of iterations consumed.
    pub iterations: usize,
    /// Final residual RMS.
    pub residual_rms: f64,
    /// Final residual vector.
    pub residuals: Vec<f64>,
    /// Whether a convergence criterion was met.
    pub converged: bool,
}

/// A nonlinear least-squares problem with analytic Jacobian.
///
/// Parameters are owned by the implementor (for curve calibration: the
/// non-fixed knot ordinates of the model); the driver reads and writes them
/// through this trait so the model stays consistent between iterations.
pub trait LeastSquaresProblem {
    /// Number of free parameters.
    fn parameter_count(&self) -> usize;

    /// Number of residuals.
    fn residual_count(&self) -> usize;

    /// Returns the current parameter vector.
    fn parameters(&self) -> Vec<f64>;

    /// Installs a parameter vector.
    fn set_parameters(&mut self, params: &[f64]) -> MathResult<()>;

    /// Writes the residual vector at the current parameters.
    fn residuals(&self, out: &mut [f64]) -> MathResult<()>;

    /// Writes the Jacobian (`residual_count x parameter_count`) at the
    /// current parameters.
    fn jacobian(&self, out: &mut DMatrix<f64>) -> MathResult<()>;
}

/// Levenberg-Marquardt minimizer.
///
/// Classic damped normal equations: solve `(JᵀJ + λI) δ = Jᵀr`, step
/// `p ← p − δ`, shrink λ on improvement and grow it on rejection.
#[derive(Debug, Clone, Default)]
pub struct LevenbergMarquardt {
    config: LmConfig,
}

impl LevenbergMarquardt {
    /// Creates a driver with the given configuration.
    #[must_use]
    pub fn new(config: LmConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &LmConfig {
        &self.config
    }

    /// Minimizes the problem in place.
    ///
    /// The problem is left at the best parameters found whether or not the
    /// iteration converged; the report says which.
    ///
    /// # Errors
    ///
    /// Propagates residual/Jacobian evaluation failures. Non-convergence is
    /// not an error here; callers decide how to surface it.
    pub fn minimize(&self, problem: &mut dyn LeastSquaresProblem) -> MathResult<LmReport> {
        let n = problem.parameter_count();
        let m = problem.residual_count();
        if n == 0 {
            return Err(MathError::invalid_input("no free parameters"));
        }
        if m < n {
            return Err(MathError::insufficient_data(n, m));
        }

        let mut params = DVector::from_vec(problem.parameters());
        let mut residuals = vec![0.0; m];
        let mut jacobian = DMatrix::zeros(m, n);
        let mut lambda = self.config.initial_lambda;

        problem.set_parameters(params.as_slice())?;
        problem.residuals(&mut residuals)?;
        let mut cost = dot(&residuals, &residuals);

        for iteration in 0..self.config.max_iterations {
            let rms = (cost / m as f64).sqrt();
            if rms < self.config.residual_tolerance {
                debug!("LM converged on residual after {iteration} iterations (rms {rms:.3e})");
                return Ok(self.report(iteration, residuals, true));
            }

            problem.jacobian(&mut jacobian)?;
            let r = DVector::from_column_slice(&residuals);
            let jt = jacobian.transpose();
            let gradient = &jt * &r;
            if gradient.amax() < self.config.gradient_tolerance {
                debug!("LM converged on gradient after {iteration} iterations");
                return Ok(self.report(iteration, residuals, true));
            }
            let jtj = &jt * &jacobian;

            // Damped step; grow lambda until the system is solvable and the
            // step improves the cost.
            loop {
                let mut damped = jtj.clone();
                for i in 0..n {
                    damped[(i, i)] += lambda;
                }

                let step = match damped.cholesky() {
                    Some(chol) => chol.solve(&gradient),
                    None => {
                        lambda *= self.config.lambda_factor;
                        if lambda > self.config.max_lambda {
                            return Err(MathError::SingularMatrix);
                        }
                        continue;
                    }
                };

                let candidate = &params - &step;
                problem.set_parameters(candidate.as_slice())?;
                problem.residuals(&mut residuals)?;
                let new_cost = dot(&residuals, &residuals);

                trace!(
                    "LM iter {iteration}: lambda {lambda:.3e}, cost {cost:.6e} -> {new_cost:.6e}"
                );

                if new_cost < cost {
                    let step_norm = step.norm();
                    let param_norm = params.norm();
                    params = candidate;
                    cost = new_cost;
                    lambda = (lambda / self.config.lambda_factor).max(self.config.min_lambda);

                    if step_norm <= self.config.step_tolerance * (1.0 + param_norm) {
                        debug!("LM converged on step size after {iteration} iterations");
                        return Ok(self.report(iteration + 1, residuals, true));
                    }
                    break;
                }

                lambda *= self.config.lambda_factor;
                if lambda > self.config.max_lambda {
                    // Stuck: restore best parameters and stop.
                    problem.set_parameters(params.as_slice())?;
                    problem.residuals(&mut residuals)?;
                    return Ok(self.report(iteration + 1, residuals, false));
                }
            }
        }

        // Iteration budget exhausted at the best parameters found.
        problem.set_parameters(params.as_slice())?;
        problem.residuals(&mut residuals)?;
        let rms = (dot(&residuals, &residuals) / m as f64).sqrt();
        let converged = rms < self.config.residual_tolerance;
        Ok(self.report(self.config.max_iterations, residuals, converged))
    }

    fn report(&self, iterations: usize, residuals: Vec<f64>, converged: bool) -> LmReport {
        let m = residuals.len().max(1);
        let rms = (dot(&residuals, &residuals) / m as f64).sqrt();
        LmReport {
            iterations,
            residual_rms: rms,
            residuals,
            converged,
        }
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
