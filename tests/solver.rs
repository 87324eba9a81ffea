use ddp::{
    CentralDifference, Control, CostRecorder, Ddp, DdpError, Derivatives, FnModel, Model,
    Partial, Problem, SecondPartial, SolveStatus, State, Tensor3,
};
use nalgebra::{dvector, DMatrix, DVector};
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use rand_xoshiro::Xoshiro256PlusPlus;
use std::cell::Cell;
use std::f64::consts::PI;
use std::rc::Rc;

const DT: f64 = 0.1;

// 減衰付き振り子 x = [θ, ω]
struct Pendulum;

impl Model for Pendulum {
    fn dynamics(&self, x: &State, u: &Control) -> State {
        let domega = -9.81 * x[0].sin() - 0.2 * x[1] + u[0];
        dvector![x[0] + x[1] * DT, x[1] + domega * DT]
    }
    fn stage_cost(&self, x: &State, u: &Control) -> f64 {
        (x[0] - PI).powi(2) + 0.1 * x[1].powi(2) + 0.01 * u[0].powi(2)
    }
    fn terminal_cost(&self, x: &State) -> f64 {
        10.0 * ((x[0] - PI).powi(2) + x[1].powi(2))
    }
}

struct Unreachable;

impl Model for Unreachable {
    fn dynamics(&self, _: &State, _: &Control) -> State {
        panic!("dynamics evaluated")
    }
    fn stage_cost(&self, _: &State, _: &Control) -> f64 {
        panic!("stage cost evaluated")
    }
    fn terminal_cost(&self, _: &State) -> f64 {
        panic!("terminal cost evaluated")
    }
}

fn random_controls(seed: u64, horizon: usize) -> DMatrix<f64> {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let dist = Normal::new(0.0, 0.5).unwrap();
    DMatrix::from_fn(1, horizon, |_, _| dist.sample(&mut rng))
}

#[test]
fn test_zero_dimension_fails_before_any_evaluation() {
    let problem = Problem {
        horizon: 2,
        dim_x: 0,
        dim_u: 1,
        states: DMatrix::zeros(0, 3),
        controls: DMatrix::zeros(1, 2),
        model: Unreachable,
    };
    assert!(matches!(Ddp::new(problem), Err(DdpError::InvalidConfig(_))));

    let problem = Problem {
        horizon: 2,
        dim_x: 1,
        dim_u: 1,
        states: DMatrix::zeros(1, 3),
        controls: DMatrix::zeros(0, 2),
        model: Unreachable,
    };
    assert!(matches!(
        Ddp::new(problem),
        Err(DdpError::EmptyTrajectory("control"))
    ));
}

#[test]
fn test_accepted_costs_strictly_decrease_and_start_is_fixed() {
    for seed in 0..3 {
        let x0 = dvector![0.0, 0.0];
        let problem = Problem::from_controls(&x0, random_controls(seed, 30), Pendulum);
        let mut ddp = Ddp::new(problem).unwrap();
        let recorder = CostRecorder::new();
        ddp.add_observer(recorder.clone());
        ddp.init(30, 1e-6).unwrap();

        let status = ddp.solve().unwrap();

        let history = ddp.cost_history();
        assert!(!history.is_empty());
        assert!(history.windows(2).all(|w| w[1] < w[0]), "{history:?}");
        assert_eq!(ddp.states().column(0), x0.column(0));
        assert!(ddp.iterations() <= 30);

        match status {
            SolveStatus::Converged => assert!(ddp.in_tolerance() && !ddp.is_finished()),
            SolveStatus::LineSearchExhausted => assert!(ddp.is_finished() && !ddp.in_tolerance()),
            SolveStatus::MaxIterations => {
                assert!(!ddp.is_finished() && !ddp.in_tolerance());
                assert_eq!(ddp.iterations(), 30);
            }
        }

        let records = recorder.records();
        assert_eq!(records.len(), history.len());
        assert!(records
            .windows(2)
            .all(|w| w[1].regularization >= w[0].regularization));
        assert!(records.iter().all(|r| r.improvement > 0.0));

        // 受理されたコストと軌道のコストが一致する
        let last = *history.last().unwrap();
        assert_eq!(ddp.total_cost(ddp.states(), ddp.controls()), last);
    }
}

#[test]
fn test_rollout_matches_dynamics_after_solve() {
    let x0 = dvector![0.0, 0.0];
    let problem = Problem::from_initial_state(25, 1, &x0, Pendulum);
    let mut ddp = Ddp::new(problem).unwrap();
    ddp.init(20, 1e-6).unwrap();
    ddp.solve().unwrap();

    let (x, u) = (ddp.states(), ddp.controls());
    for t in 0..ddp.horizon() {
        let next = Pendulum.dynamics(&x.column(t).into_owned(), &u.column(t).into_owned());
        assert_eq!(x.column(t + 1), next.column(0));
    }
}

#[test]
fn test_small_improvement_sets_tolerance_flag() {
    // 非線形なので1回の反復では最適にならない
    let model = FnModel::builder()
        .dynamics(|x, u| dvector![x[0] + u[0] + 0.1 * x[0] * x[0]])
        .stage_cost(|x, u| x[0] * x[0] + u[0] * u[0])
        .terminal_cost(|x| 10.0 * x[0] * x[0])
        .build()
        .unwrap();
    let problem = Problem::from_initial_state(5, 1, &dvector![1.0], model);
    let mut ddp = Ddp::new(problem).unwrap();
    ddp.init(10, 1e6).unwrap();

    let status = ddp.solve().unwrap();
    assert_eq!(status, SolveStatus::Converged);
    assert!(ddp.in_tolerance());
    assert_eq!(ddp.cost_history().len(), 2);
}

#[test]
fn test_single_iteration_never_meets_tolerance() {
    let problem = Problem::from_initial_state(10, 1, &dvector![0.5, 0.0], Pendulum);
    let mut ddp = Ddp::new(problem).unwrap();
    ddp.init(1, 1e3).unwrap();

    assert_eq!(ddp.solve().unwrap(), SolveStatus::MaxIterations);
    assert_eq!(ddp.cost_history().len(), 1);
    assert!(!ddp.in_tolerance());
}

// 呼び出し回数を数えるオラクル
#[derive(Clone, Default)]
struct Counting {
    inner: CentralDifference,
    tensors: Rc<Cell<usize>>,
}

impl Derivatives for Counting {
    fn gradient(&self, f: &dyn Fn(&State) -> f64, x: &State) -> DVector<f64> {
        self.inner.gradient(f, x)
    }
    fn hessian(&self, f: &dyn Fn(&State) -> f64, x: &State) -> DMatrix<f64> {
        self.inner.hessian(f, x)
    }
    fn partial_gradient(
        &self,
        f: &dyn Fn(&State, &Control) -> f64,
        x: &State,
        u: &Control,
        wrt: Partial,
    ) -> DVector<f64> {
        self.inner.partial_gradient(f, x, u, wrt)
    }
    fn partial_hessian(
        &self,
        f: &dyn Fn(&State, &Control) -> f64,
        x: &State,
        u: &Control,
        wrt: SecondPartial,
    ) -> DMatrix<f64> {
        self.inner.partial_hessian(f, x, u, wrt)
    }
    fn jacobian(
        &self,
        f: &dyn Fn(&State, &Control) -> State,
        x: &State,
        u: &Control,
        wrt: Partial,
    ) -> DMatrix<f64> {
        self.inner.jacobian(f, x, u, wrt)
    }
    fn tensor(
        &self,
        f: &dyn Fn(&State, &Control) -> State,
        x: &State,
        u: &Control,
        wrt: SecondPartial,
    ) -> Tensor3 {
        self.tensors.set(self.tensors.get() + 1);
        self.inner.tensor(f, x, u, wrt)
    }
}

#[test]
fn test_substituted_oracle_is_used_per_step() {
    let oracle = Counting::default();
    let counter = oracle.tensors.clone();
    let problem = Problem::from_initial_state(4, 1, &dvector![0.3, 0.0], Pendulum);
    let mut ddp = Ddp::with_oracle(problem, oracle).unwrap();
    ddp.init(1, 1e-2).unwrap();
    ddp.backward_pass().unwrap();

    // fxx, fxu, fuu を各ステップで1回ずつ
    if ddp.regularization() == 0 {
        assert_eq!(counter.get(), 3 * 4);
    } else {
        assert!(counter.get() > 3 * 4);
    }
    assert_eq!(ddp.feedback().len(), 4);
    assert_eq!(ddp.feedback()[0].shape(), (1, 2));
}
