extern crate nalgebra as na;

use anyhow::{bail, Result};
use ddp::{Control, Ddp, LogObserver, Model, Problem, SolveStatus, State};
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

// 振り子の振り上げ
// cargo run --example pendulum --release
// RUST_LOG=debug で各パスのログを表示

const T: f64 = 3.0;
const N: usize = 100;
const DT: f64 = T / N as f64;

const G: f64 = 9.81;
const L: f64 = 0.5;
const M: f64 = 0.3;
const B: f64 = 0.05; // 粘性摩擦

// x = [θ, ω], u = トルク
struct InvPend;

impl Model for InvPend {
    fn dynamics(&self, x: &State, u: &Control) -> State {
        let domega = -G / L * x[0].sin() - B / (M * L * L) * x[1] + u[0] / (M * L * L);
        na::dvector![x[0] + x[1] * DT, x[1] + domega * DT]
    }

    fn stage_cost(&self, x: &State, u: &Control) -> f64 {
        let err = x[0] - std::f64::consts::PI;
        (0.5 * err.powi(2) + 0.05 * x[1].powi(2) + 0.5 * u[0].powi(2)) * DT
    }

    fn terminal_cost(&self, x: &State) -> f64 {
        let err = x[0] - std::f64::consts::PI;
        100.0 * err.powi(2) + 10.0 * x[1].powi(2)
    }
}

fn main() -> Result<()> {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .env()
        .init()?;

    // 初期入力は小さなノイズ
    let mut rng = rand_xoshiro::Xoshiro256PlusPlus::seed_from_u64(0);
    let dist = Normal::new(0.0, 0.1)?;
    let u_init = na::DMatrix::from_fn(1, N, |_, _| dist.sample(&mut rng));
    let problem = Problem::from_controls(&na::dvector![0.0, 0.0], u_init, InvPend);
    let x_init = problem.states.clone();
    let u_init = problem.controls.clone();

    let mut solver = Ddp::new(problem)?;
    solver.add_observer(LogObserver);
    solver.init(100, 1e-2)?;
    let status = solver.solve()?;

    let x = solver.states();
    let u = solver.controls();
    let all_cost = solver.cost_history();

    std::fs::create_dir_all("logs")?;
    let mut wtr = csv::Writer::from_path("logs/ddp-pendulum.csv")?;
    wtr.write_record(["t", "theta_init", "omega_init", "u_init", "theta", "omega", "u"])?;
    for i in 0..=N {
        // 終端には入力がない
        let (u0, u1) = if i < N {
            (u_init[(0, i)].to_string(), u[(0, i)].to_string())
        } else {
            (String::new(), String::new())
        };
        wtr.write_record(&[
            (i as f64 * DT).to_string(),
            x_init[(0, i)].to_string(),
            x_init[(1, i)].to_string(),
            u0,
            x[(0, i)].to_string(),
            x[(1, i)].to_string(),
            u1,
        ])?;
    }
    wtr.flush()?;

    let mut wtr = csv::Writer::from_path("logs/ddp-pendulum-cost.csv")?;
    wtr.write_record(["iter", "cost"])?;
    for (i, c) in all_cost.iter().enumerate() {
        wtr.write_record(&[(i + 1).to_string(), c.to_string()])?;
    }
    wtr.flush()?;

    println!(
        "{} {:?}: {} iterations, cost {:.4}, x_N = ({:.3}, {:.3})",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        status,
        solver.iterations(),
        all_cost.last().copied().unwrap_or(f64::NAN),
        x[(0, N)],
        x[(1, N)],
    );

    if status == SolveStatus::LineSearchExhausted && all_cost.len() < 2 {
        bail!("line search failed before any improvement");
    }
    Ok(())
}
