use crate::model::{Control, State};
use crate::tensor::Tensor3;

/// 微分する変数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Partial {
    X,
    U,
}

/// 2階微分の変数の組
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecondPartial {
    XX,
    XU,
    UU,
}

/// Derivative oracle consumed by the backward pass.
///
/// For a vector-valued `f`, [`Derivatives::tensor`] returns `T[i,j,k]`, the
/// second derivative of output `i` with respect to inputs `j` and `k`.
/// Implementations must be deterministic for fixed inputs.
pub trait Derivatives {
    fn gradient(&self, f: &dyn Fn(&State) -> f64, x: &State) -> na::DVector<f64>;

    fn hessian(&self, f: &dyn Fn(&State) -> f64, x: &State) -> na::DMatrix<f64>;

    fn partial_gradient(
        &self,
        f: &dyn Fn(&State, &Control) -> f64,
        x: &State,
        u: &Control,
        wrt: Partial,
    ) -> na::DVector<f64>;

    fn partial_hessian(
        &self,
        f: &dyn Fn(&State, &Control) -> f64,
        x: &State,
        u: &Control,
        wrt: SecondPartial,
    ) -> na::DMatrix<f64>;

    fn jacobian(
        &self,
        f: &dyn Fn(&State, &Control) -> State,
        x: &State,
        u: &Control,
        wrt: Partial,
    ) -> na::DMatrix<f64>;

    fn tensor(
        &self,
        f: &dyn Fn(&State, &Control) -> State,
        x: &State,
        u: &Control,
        wrt: SecondPartial,
    ) -> Tensor3;

    /// `v` をテンソルの先頭軸で縮約
    fn contract(&self, v: &na::DVector<f64>, t: &Tensor3) -> na::DMatrix<f64> {
        t.contract(v)
    }
}

/// Central finite differences.
#[derive(Debug, Clone, Copy)]
pub struct CentralDifference {
    /// 1階微分の刻み幅
    pub first_order_step: f64,
    /// 2階微分の刻み幅
    pub second_order_step: f64,
}

impl Default for CentralDifference {
    fn default() -> Self {
        Self {
            first_order_step: 1e-6,
            second_order_step: 1e-4,
        }
    }
}

impl CentralDifference {
    pub fn new(first_order_step: f64, second_order_step: f64) -> Self {
        Self {
            first_order_step,
            second_order_step,
        }
    }

    // g(d) を d = 0 で微分: (g(h e_i) - g(-h e_i)) / 2h
    fn first<G>(&self, g: G, n: usize) -> na::DMatrix<f64>
    where
        G: Fn(&na::DVector<f64>) -> na::DVector<f64>,
    {
        let h = self.first_order_step;
        let mut d = na::DVector::zeros(n);
        let mut columns = Vec::with_capacity(n);
        for i in 0..n {
            d[i] = h;
            let posi = g(&d);
            d[i] = -h;
            let nega = g(&d);
            d[i] = 0.0;
            columns.push((posi - nega) / (2.0 * h));
        }
        if columns.is_empty() {
            let m = g(&d).len();
            return na::DMatrix::zeros(m, 0);
        }
        na::DMatrix::from_columns(&columns)
    }

    // g(d1, d2) の d1, d2 についての混合2階微分 (4点公式)
    // symmetric のときは j >= i のみ計算して鏡映する
    fn second<G>(&self, g: G, n1: usize, n2: usize, symmetric: bool) -> Tensor3
    where
        G: Fn(&na::DVector<f64>, &na::DVector<f64>) -> na::DVector<f64>,
    {
        let h = self.second_order_step;
        let mut d1 = na::DVector::zeros(n1);
        let mut d2 = na::DVector::zeros(n2);
        let m = g(&d1, &d2).len();
        let mut t = Tensor3::zeros(m, n1, n2);
        for i in 0..n1 {
            let start = if symmetric { i } else { 0 };
            for j in start..n2 {
                let mut eval = |si: f64, sj: f64| {
                    d1[i] = si * h;
                    d2[j] = sj * h;
                    let v = g(&d1, &d2);
                    d1[i] = 0.0;
                    d2[j] = 0.0;
                    v
                };
                let pp = eval(1.0, 1.0);
                let pn = eval(1.0, -1.0);
                let np = eval(-1.0, 1.0);
                let nn = eval(-1.0, -1.0);
                for l in 0..m {
                    let v = (pp[l] - pn[l] - np[l] + nn[l]) / (4.0 * h * h);
                    t[(l, i, j)] = v;
                    if symmetric {
                        t[(l, j, i)] = v;
                    }
                }
            }
        }
        t
    }
}

fn scalar(v: f64) -> na::DVector<f64> {
    na::DVector::from_element(1, v)
}

impl Derivatives for CentralDifference {
    fn gradient(&self, f: &dyn Fn(&State) -> f64, x: &State) -> na::DVector<f64> {
        self.first(|d| scalar(f(&(x + d))), x.len())
            .row(0)
            .transpose()
    }

    fn hessian(&self, f: &dyn Fn(&State) -> f64, x: &State) -> na::DMatrix<f64> {
        self.second(|d1, d2| scalar(f(&(x + d1 + d2))), x.len(), x.len(), true)
            .slice(0)
    }

    fn partial_gradient(
        &self,
        f: &dyn Fn(&State, &Control) -> f64,
        x: &State,
        u: &Control,
        wrt: Partial,
    ) -> na::DVector<f64> {
        self.jacobian(&|x, u| scalar(f(x, u)), x, u, wrt)
            .row(0)
            .transpose()
    }

    fn partial_hessian(
        &self,
        f: &dyn Fn(&State, &Control) -> f64,
        x: &State,
        u: &Control,
        wrt: SecondPartial,
    ) -> na::DMatrix<f64> {
        self.tensor(&|x, u| scalar(f(x, u)), x, u, wrt).slice(0)
    }

    fn jacobian(
        &self,
        f: &dyn Fn(&State, &Control) -> State,
        x: &State,
        u: &Control,
        wrt: Partial,
    ) -> na::DMatrix<f64> {
        match wrt {
            Partial::X => self.first(|d| f(&(x + d), u), x.len()),
            Partial::U => self.first(|d| f(x, &(u + d)), u.len()),
        }
    }

    fn tensor(
        &self,
        f: &dyn Fn(&State, &Control) -> State,
        x: &State,
        u: &Control,
        wrt: SecondPartial,
    ) -> Tensor3 {
        let (nx, nu) = (x.len(), u.len());
        match wrt {
            SecondPartial::XX => self.second(|d1, d2| f(&(x + d1 + d2), u), nx, nx, true),
            SecondPartial::XU => self.second(|d1, d2| f(&(x + d1), &(u + d2)), nx, nu, false),
            SecondPartial::UU => self.second(|d1, d2| f(x, &(u + d1 + d2)), nu, nu, true),
        }
    }
}
