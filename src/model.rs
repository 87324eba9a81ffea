use crate::error::{DdpError, DdpResult};

pub type State = na::DVector<f64>;
pub type Control = na::DVector<f64>;

/// 離散時間系と評価関数
///
/// Implementations must be deterministic: the solver re-evaluates the same
/// point during backward-sweep restarts and line-search retries.
pub trait Model {
    /// 状態遷移 x_{t+1} = f(x_t, u_t)
    ///
    /// Must return a vector of length `dim_x`; the rollout panics otherwise.
    fn dynamics(&self, x: &State, u: &Control) -> State;
    /// ステージコスト q(x_t, u_t)
    fn stage_cost(&self, x: &State, u: &Control) -> f64;
    /// 終端コスト p(x_N)
    fn terminal_cost(&self, x: &State) -> f64;
}

impl<M: Model + ?Sized> Model for &M {
    fn dynamics(&self, x: &State, u: &Control) -> State {
        (**self).dynamics(x, u)
    }
    fn stage_cost(&self, x: &State, u: &Control) -> f64 {
        (**self).stage_cost(x, u)
    }
    fn terminal_cost(&self, x: &State) -> f64 {
        (**self).terminal_cost(x)
    }
}

type DynamicsFn = Box<dyn Fn(&State, &Control) -> State>;
type StageCostFn = Box<dyn Fn(&State, &Control) -> f64>;
type TerminalCostFn = Box<dyn Fn(&State) -> f64>;

/// Model assembled from three closures.
pub struct FnModel {
    f: DynamicsFn,
    q: StageCostFn,
    p: TerminalCostFn,
}

impl FnModel {
    pub fn builder() -> FnModelBuilder {
        FnModelBuilder::default()
    }
}

impl Model for FnModel {
    fn dynamics(&self, x: &State, u: &Control) -> State {
        (self.f)(x, u)
    }
    fn stage_cost(&self, x: &State, u: &Control) -> f64 {
        (self.q)(x, u)
    }
    fn terminal_cost(&self, x: &State) -> f64 {
        (self.p)(x)
    }
}

#[derive(Default)]
pub struct FnModelBuilder {
    f: Option<DynamicsFn>,
    q: Option<StageCostFn>,
    p: Option<TerminalCostFn>,
}

impl FnModelBuilder {
    pub fn dynamics(mut self, f: impl Fn(&State, &Control) -> State + 'static) -> Self {
        self.f = Some(Box::new(f));
        self
    }

    pub fn stage_cost(mut self, q: impl Fn(&State, &Control) -> f64 + 'static) -> Self {
        self.q = Some(Box::new(q));
        self
    }

    pub fn terminal_cost(mut self, p: impl Fn(&State) -> f64 + 'static) -> Self {
        self.p = Some(Box::new(p));
        self
    }

    /// Fails with [`DdpError::MissingFunction`] when any closure is unset.
    pub fn build(self) -> DdpResult<FnModel> {
        Ok(FnModel {
            f: self.f.ok_or(DdpError::MissingFunction("dynamics"))?,
            q: self.q.ok_or(DdpError::MissingFunction("stage_cost"))?,
            p: self.p.ok_or(DdpError::MissingFunction("terminal_cost"))?,
        })
    }
}

/// 最適制御問題: ホライゾン、次元、初期軌道、モデル
///
/// `states` holds one column per time step (`dim_x x (horizon + 1)`),
/// `controls` likewise (`dim_u x horizon`).
pub struct Problem<M> {
    pub horizon: usize,
    pub dim_x: usize,
    pub dim_u: usize,
    pub states: na::DMatrix<f64>,
    pub controls: na::DMatrix<f64>,
    pub model: M,
}

impl<M> Problem<M> {
    /// Initial trajectory with a fixed start state and all controls at zero;
    /// the remaining states are a rollout of `model` from `x0`.
    pub fn from_initial_state(horizon: usize, dim_u: usize, x0: &State, model: M) -> Self
    where
        M: Model,
    {
        let controls = na::DMatrix::zeros(dim_u, horizon);
        Self::from_controls(x0, controls, model)
    }

    /// Rolls `model` out from `x0` under the given control sequence.
    pub fn from_controls(x0: &State, controls: na::DMatrix<f64>, model: M) -> Self
    where
        M: Model,
    {
        let (dim_u, horizon) = controls.shape();
        let mut states = na::DMatrix::zeros(x0.len(), horizon + 1);
        states.set_column(0, x0);
        for t in 0..horizon {
            let x = states.column(t).into_owned();
            let u = controls.column(t).into_owned();
            let x_next = model.dynamics(&x, &u);
            debug_assert_eq!(x_next.len(), x0.len(), "dynamics returned a wrong-length state");
            states.set_column(t + 1, &x_next);
        }
        Self {
            horizon,
            dim_x: x0.len(),
            dim_u,
            states,
            controls,
            model,
        }
    }

    pub(crate) fn validate(&self) -> DdpResult<()> {
        if self.horizon == 0 || self.dim_x == 0 || self.dim_u == 0 {
            return Err(DdpError::InvalidConfig(format!(
                "horizon, dim_x and dim_u must be non-zero (got {}, {}, {})",
                self.horizon, self.dim_x, self.dim_u
            )));
        }
        if self.states.is_empty() {
            return Err(DdpError::EmptyTrajectory("state"));
        }
        if self.controls.is_empty() {
            return Err(DdpError::EmptyTrajectory("control"));
        }
        let expected = (self.dim_x, self.horizon + 1);
        if self.states.shape() != expected {
            return Err(DdpError::DimensionMismatch {
                what: "states",
                expected,
                actual: self.states.shape(),
            });
        }
        let expected = (self.dim_u, self.horizon);
        if self.controls.shape() != expected {
            return Err(DdpError::DimensionMismatch {
                what: "controls",
                expected,
                actual: self.controls.shape(),
            });
        }
        Ok(())
    }
}
