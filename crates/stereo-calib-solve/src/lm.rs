//! Dense Levenberg–Marquardt backend.

use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt};
use nalgebra::{storage::Owned, DMatrix, DVector, Dyn};
use serde::{Deserialize, Serialize};
use stereo_calib_core::TermCriteria;

/// Non-linear least squares problem with dense parameter/residual vectors.
pub trait NllsProblem {
    fn num_params(&self) -> usize;
    fn num_residuals(&self) -> usize;

    fn residuals(&self, x: &DVector<f64>) -> DVector<f64>;

    /// Central-difference Jacobian unless the problem provides an analytic one.
    fn jacobian(&self, x: &DVector<f64>) -> DMatrix<f64> {
        numeric_jacobian(self, x)
    }
}

/// Central differences with a step relative to each parameter's magnitude.
pub fn numeric_jacobian<P: NllsProblem + ?Sized>(problem: &P, x: &DVector<f64>) -> DMatrix<f64> {
    let mut jac = DMatrix::zeros(problem.num_residuals(), x.len());
    let mut xp = x.clone();
    for j in 0..x.len() {
        let h = 1e-6 * x[j].abs().max(1e-2);
        let orig = xp[j];
        xp[j] = orig + h;
        let r_plus = problem.residuals(&xp);
        xp[j] = orig - h;
        let r_minus = problem.residuals(&xp);
        xp[j] = orig;
        jac.set_column(j, &((r_plus - r_minus) / (2.0 * h)));
    }
    jac
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolveOptions {
    /// MINPACK patience: the evaluation cap is `patience * (n + 1)`.
    pub patience: usize,
    /// Relative tolerance on the cost reduction.
    pub ftol: f64,
    /// Relative tolerance on the trust-region size.
    pub xtol: f64,
    pub gtol: f64,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self::from_criteria(&TermCriteria::default())
    }
}

impl SolveOptions {
    pub fn from_criteria(criteria: &TermCriteria) -> Self {
        Self {
            patience: criteria.max_iterations.max(1),
            ftol: criteria.epsilon,
            xtol: f64::EPSILON.sqrt(),
            gtol: 0.0,
        }
    }
}

/// Outcome of one optimization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveReport {
    /// Residual evaluations spent.
    pub iterations: usize,
    /// `0.5 * |r|^2` at the returned parameters.
    pub final_cost: f64,
    pub converged: bool,
    /// Solver termination reason, for diagnostics.
    pub termination: String,
}

struct LmWrapper<'a, P: NllsProblem> {
    problem: &'a P,
    params: DVector<f64>,
}

impl<P: NllsProblem> LeastSquaresProblem<f64, Dyn, Dyn> for LmWrapper<'_, P> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &DVector<f64>) {
        self.params.clone_from(x);
    }

    fn params(&self) -> DVector<f64> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        let r = self.problem.residuals(&self.params);
        r.iter().all(|v| v.is_finite()).then_some(r)
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        let j = self.problem.jacobian(&self.params);
        j.iter().all(|v| v.is_finite()).then_some(j)
    }
}

#[derive(Debug, Default, Clone)]
pub struct LmBackend;

impl LmBackend {
    pub fn solve<P: NllsProblem>(
        &self,
        problem: &P,
        x0: DVector<f64>,
        opts: &SolveOptions,
    ) -> (DVector<f64>, SolveReport) {
        let lm = LevenbergMarquardt::new()
            .with_ftol(opts.ftol)
            .with_xtol(opts.xtol)
            .with_gtol(opts.gtol)
            .with_patience(opts.patience);

        let wrapper = LmWrapper {
            problem,
            params: x0,
        };

        let (wrapper, report) = lm.minimize(wrapper);
        (
            wrapper.params,
            SolveReport {
                iterations: report.number_of_evaluations,
                final_cost: report.objective_function,
                converged: report.termination.was_successful(),
                termination: format!("{:?}", report.termination),
            },
        )
    }
}
