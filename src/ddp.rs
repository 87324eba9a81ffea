use crate::config::DdpConfig;
use crate::derivative::{CentralDifference, Derivatives, Partial, SecondPartial};
use crate::error::{DdpError, DdpResult};
use crate::model::{Control, Model, Problem, State};
use crate::observer::{DdpObserver, IterationInfo};

/// Why [`Ddp::solve`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    /// An accepted iteration improved the cost by less than the tolerance.
    Converged,
    /// No line-search trial reduced the cost.
    LineSearchExhausted,
    /// The iteration budget ran out first.
    MaxIterations,
}

/// Outcome of one forward pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LineSearch {
    Accepted { step: f64, cost: f64, trials: usize },
    Exhausted,
}

/// Differential Dynamic Programming solver.
///
/// Owns the trajectory (`X`: `dim_x x (N+1)`, `U`: `dim_u x N`, one column per
/// time step), the gains of the last backward pass and the cost history.
pub struct Ddp<M, D = CentralDifference> {
    model: M,
    oracle: D,
    config: DdpConfig,

    n: usize,
    dim_x: usize,
    dim_u: usize,
    x: na::DMatrix<f64>,
    u: na::DMatrix<f64>,

    // フィードフォワード (dim_u x N) / フィードバック (dim_u x dim_x)
    k: na::DMatrix<f64>,
    big_k: Vec<na::DMatrix<f64>>,
    quu: Vec<na::DMatrix<f64>>,
    regulate: u32,

    all_cost: Vec<f64>,
    prev_total_cost: f64,
    is_finished: bool,
    in_tolerance: bool,
    iterations: usize,

    observers: Vec<Box<dyn DdpObserver>>,
}

impl<M: Model> Ddp<M> {
    /// Builds a solver with the finite-difference oracle and the default configuration.
    pub fn new(problem: Problem<M>) -> DdpResult<Self> {
        Self::with_oracle(problem, CentralDifference::default())
    }
}

impl<M: Model, D: Derivatives> Ddp<M, D> {
    pub fn with_oracle(problem: Problem<M>, oracle: D) -> DdpResult<Self> {
        problem.validate()?;
        let Problem {
            horizon,
            dim_x,
            dim_u,
            states,
            controls,
            model,
        } = problem;
        let mut ddp = Self {
            model,
            oracle,
            config: DdpConfig::default(),
            n: horizon,
            dim_x,
            dim_u,
            x: states,
            u: controls,
            k: na::DMatrix::zeros(0, 0),
            big_k: Vec::new(),
            quu: Vec::new(),
            regulate: 0,
            all_cost: Vec::new(),
            prev_total_cost: f64::INFINITY,
            is_finished: false,
            in_tolerance: false,
            iterations: 0,
            observers: Vec::new(),
        };
        ddp.reset();
        Ok(ddp)
    }

    pub fn add_observer(&mut self, observer: impl DdpObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    pub fn init(&mut self, max_iter: usize, cost_tolerance: f64) -> DdpResult<()> {
        self.init_with_config(DdpConfig::new(max_iter, cost_tolerance))
    }

    /// Resets the per-solve state. The trajectory and the cost history are kept.
    pub fn init_with_config(&mut self, config: DdpConfig) -> DdpResult<()> {
        config.validate()?;
        self.config = config;
        self.reset();
        Ok(())
    }

    fn reset(&mut self) {
        self.regulate = 0;
        // 初回の試行は必ず受理される
        self.prev_total_cost = f64::INFINITY;
        self.is_finished = false;
        self.in_tolerance = false;
        self.iterations = 0;
        self.k = na::DMatrix::zeros(self.dim_u, self.n);
        self.big_k = vec![na::DMatrix::zeros(self.dim_u, self.dim_x); self.n];
        self.quu.clear();
    }

    /// `Σ q(x_t, u_t) + p(x_N)`
    pub fn total_cost(&self, x: &na::DMatrix<f64>, u: &na::DMatrix<f64>) -> f64 {
        let stage: f64 = (0..self.n)
            .map(|t| {
                self.model
                    .stage_cost(&x.column(t).into_owned(), &u.column(t).into_owned())
            })
            .sum();
        stage + self.model.terminal_cost(&x.column(self.n).into_owned())
    }

    /// Alternates backward and forward passes until a stop condition fires.
    ///
    /// Returns immediately if a previous call already stopped on a flag;
    /// call [`Ddp::init`] to start over from the current trajectory.
    pub fn solve(&mut self) -> DdpResult<SolveStatus> {
        if let Some(status) = self.stop_status() {
            return Ok(status);
        }
        let mut status = SolveStatus::MaxIterations;
        for _ in 0..self.config.max_iter {
            self.iterations += 1;
            log::debug!("iter {}: backward pass", self.iterations);
            self.backward_pass()?;

            log::debug!("iter {}: forward pass", self.iterations);
            let prev = self.prev_total_cost;
            if let LineSearch::Accepted { step, cost, .. } = self.forward_pass() {
                let info = IterationInfo {
                    iteration: self.iterations,
                    cost,
                    improvement: prev - cost,
                    step,
                    regularization: self.regulate,
                };
                self.notify(|o| o.on_iteration(&info));
            }

            if let Some(s) = self.stop_status() {
                status = s;
                break;
            }
        }
        self.notify(|o| o.on_finish(status));
        Ok(status)
    }

    /// Recomputes every feedforward/feedback gain.
    ///
    /// Whenever `Quu` is not symmetric positive-definite at some step the
    /// whole sweep restarts from the terminal step with `regulate + 1`.
    /// Fails once `regulate` exceeds [`DdpConfig::max_regularization`].
    pub fn backward_pass(&mut self) -> DdpResult<()> {
        while !self.sweep() {
            self.regulate += 1;
            if self.regulate > self.config.max_regularization {
                let err = DdpError::RegularizationDiverged {
                    level: self.regulate,
                };
                log::error!("{err}");
                return Err(err);
            }
            let level = self.regulate;
            self.notify(|o| o.on_regularize(level));
        }
        let level = self.regulate;
        self.notify(|o| o.on_backward_pass(level));
        Ok(())
    }

    // base^regulate (regulate = 0 なら減衰なし)
    fn damping(&self) -> Option<f64> {
        (self.regulate > 0).then(|| {
            self.config
                .regularization_base
                .powf(f64::from(self.regulate))
        })
    }

    // 1回分の後退パス. 失敗したら false (ゲインは更新しない)
    fn sweep(&mut self) -> bool {
        let (n, dim_x, dim_u) = (self.n, self.dim_x, self.dim_u);
        let model = &self.model;
        let oracle = &self.oracle;
        let f = |x: &State, u: &Control| model.dynamics(x, u);
        let q = |x: &State, u: &Control| model.stage_cost(x, u);
        let p = |x: &State| model.terminal_cost(x);

        let damping = self.damping();

        let x_n = self.x.column(n).into_owned();
        let mut vx = oracle.gradient(&p, &x_n);
        let mut vxx = oracle.hessian(&p, &x_n);

        let mut k = na::DMatrix::zeros(dim_u, n);
        let mut big_k = vec![na::DMatrix::zeros(dim_u, dim_x); n];
        let mut quu_seq = vec![na::DMatrix::zeros(dim_u, dim_u); n];

        for t in (0..n).rev() {
            let x = self.x.column(t).into_owned();
            let u = self.u.column(t).into_owned();

            let fx = oracle.jacobian(&f, &x, &u, Partial::X);
            let fu = oracle.jacobian(&f, &x, &u, Partial::U);
            let fxx = oracle.tensor(&f, &x, &u, SecondPartial::XX);
            let fxu = oracle.tensor(&f, &x, &u, SecondPartial::XU);
            let fuu = oracle.tensor(&f, &x, &u, SecondPartial::UU);

            let qx = oracle.partial_gradient(&q, &x, &u, Partial::X);
            let qu = oracle.partial_gradient(&q, &x, &u, Partial::U);
            let qxx = oracle.partial_hessian(&q, &x, &u, SecondPartial::XX);
            let qxu = oracle.partial_hessian(&q, &x, &u, SecondPartial::XU);
            let quu = oracle.partial_hessian(&q, &x, &u, SecondPartial::UU);

            // Q関数の2次近似. 縮約項がダイナミクスの曲率
            let fxt = fx.transpose();
            let fut = fu.transpose();
            let q_x = qx + &fxt * &vx;
            let q_u = qu + &fut * &vx;
            let q_xx = qxx + &fxt * &vxx * &fx + oracle.contract(&vx, &fxx);
            let q_xu = qxu + &fxt * &vxx * &fu + oracle.contract(&vx, &fxu);
            let mut q_uu = quu + &fut * &vxx * &fu + oracle.contract(&vx, &fuu);

            if let Some(mu) = damping {
                q_uu += na::DMatrix::<f64>::identity(dim_u, dim_u) * mu;
            }
            let Some(chol) = well_posed(&q_uu, self.config.symmetry_tolerance) else {
                log::debug!("Quu ill-posed at t = {t} (regulate = {})", self.regulate);
                return false;
            };

            let k_t = -chol.solve(&q_u);
            let big_k_t = -chol.solve(&q_xu.transpose());

            // 価値関数の更新
            vx = &q_x + &q_xu * &k_t;
            vxx = &q_xx + &q_xu * &big_k_t;
            // 対称性の維持
            vxx = (&vxx + vxx.transpose()) * 0.5;

            k.set_column(t, &k_t);
            big_k[t] = big_k_t;
            quu_seq[t] = q_uu;
        }

        self.k = k;
        self.big_k = big_k;
        self.quu = quu_seq;
        true
    }

    /// Rolls the policy out with a backtracking step scale.
    ///
    /// The first trial whose total cost is strictly below the previous
    /// accepted cost replaces the trajectory. If none does, the solver is
    /// marked finished and nothing else changes.
    pub fn forward_pass(&mut self) -> LineSearch {
        let n = self.n;
        let mut a = 1.0;
        let mut x_new = na::DMatrix::zeros(self.dim_x, n + 1);
        let mut u_new = na::DMatrix::zeros(self.dim_u, n);
        let mut accepted = None;

        for trial in 1..=self.config.max_backtracking {
            // 初期状態は固定
            x_new.set_column(0, &self.x.column(0));
            for t in 0..n {
                let dx = x_new.column(t) - self.x.column(t);
                let u_t: Control = self.u.column(t) + self.k.column(t) * a + &self.big_k[t] * dx;
                let x_next = self.model.dynamics(&x_new.column(t).into_owned(), &u_t);
                debug_assert_eq!(
                    x_next.len(),
                    self.dim_x,
                    "dynamics returned a wrong-length state"
                );
                u_new.set_column(t, &u_t);
                x_new.set_column(t + 1, &x_next);
            }
            let cost = self.total_cost(&x_new, &u_new);
            if cost < self.prev_total_cost {
                accepted = Some((a, cost, trial));
                break;
            }
            log::trace!("trial {trial}: a = {a:.4}, cost = {cost:.6} rejected");
            a *= self.config.step_decay;
        }

        let result = match accepted {
            Some((step, cost, trials)) => {
                self.x = x_new;
                self.u = u_new;
                if self.prev_total_cost - cost < self.config.cost_tolerance {
                    self.in_tolerance = true;
                }
                self.all_cost.push(cost);
                self.prev_total_cost = cost;
                LineSearch::Accepted { step, cost, trials }
            }
            None => {
                self.is_finished = true;
                LineSearch::Exhausted
            }
        };
        self.notify(|o| o.on_forward_pass(&result));
        result
    }

    fn stop_status(&self) -> Option<SolveStatus> {
        if self.in_tolerance {
            Some(SolveStatus::Converged)
        } else if self.is_finished {
            Some(SolveStatus::LineSearchExhausted)
        } else {
            None
        }
    }

    fn notify(&mut self, mut event: impl FnMut(&mut Box<dyn DdpObserver>)) {
        for o in self.observers.iter_mut() {
            event(o);
        }
    }

    pub fn states(&self) -> &na::DMatrix<f64> {
        &self.x
    }

    pub fn controls(&self) -> &na::DMatrix<f64> {
        &self.u
    }

    pub fn cost_history(&self) -> &[f64] {
        &self.all_cost
    }

    /// `k_t` as columns (`dim_u x N`).
    pub fn feedforward(&self) -> &na::DMatrix<f64> {
        &self.k
    }

    pub fn feedback(&self) -> &[na::DMatrix<f64>] {
        &self.big_k
    }

    /// The (regularized) `Quu` of each step from the last successful sweep.
    pub fn control_hessians(&self) -> &[na::DMatrix<f64>] {
        &self.quu
    }

    pub fn regularization(&self) -> u32 {
        self.regulate
    }

    /// Outer iterations run since the last [`Ddp::init`].
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn in_tolerance(&self) -> bool {
        self.in_tolerance
    }

    pub fn is_finished(&self) -> bool {
        self.is_finished
    }

    pub fn config(&self) -> &DdpConfig {
        &self.config
    }

    pub fn horizon(&self) -> usize {
        self.n
    }

    pub fn dim_x(&self) -> usize {
        self.dim_x
    }

    pub fn dim_u(&self) -> usize {
        self.dim_u
    }

    pub fn model(&self) -> &M {
        &self.model
    }
}

// 有限・対称 (Eigen の isApprox と同じ相対誤差) かつ Cholesky 分解可能
fn well_posed(quu: &na::DMatrix<f64>, tol: f64) -> Option<na::Cholesky<f64, na::Dyn>> {
    if !quu.iter().all(|v| v.is_finite()) {
        return None;
    }
    let qt = quu.transpose();
    let asym = (quu - &qt).norm();
    if !(asym <= tol * quu.norm()) {
        return None;
    }
    quu.clone().cholesky()
}
