//! Differential Dynamic Programming for finite-horizon discrete-time optimal control.
//!
//! ```no_run
//! use ddp::{Ddp, FnModel, Problem};
//! use nalgebra::dvector;
//!
//! let model = FnModel::builder()
//!     .dynamics(|x, u| x + u)
//!     .stage_cost(|x, u| x.norm_squared() + u.norm_squared())
//!     .terminal_cost(|x| x.norm_squared())
//!     .build()?;
//! let mut ddp = Ddp::new(Problem::from_initial_state(20, 1, &dvector![1.0], model))?;
//! ddp.init(100, 1e-2)?;
//! let status = ddp.solve()?;
//! println!("{status:?}: {:?}", ddp.cost_history());
//! # Ok::<(), ddp::DdpError>(())
//! ```

extern crate nalgebra as na;

pub mod config;
pub mod ddp;
pub mod derivative;
pub mod error;
pub mod model;
pub mod observer;
pub mod tensor;

pub use config::DdpConfig;
pub use ddp::{Ddp, LineSearch, SolveStatus};
pub use derivative::{CentralDifference, Derivatives, Partial, SecondPartial};
pub use error::{DdpError, DdpResult};
pub use model::{Control, FnModel, FnModelBuilder, Model, Problem, State};
pub use observer::{CostRecorder, DdpObserver, IterationInfo, LogObserver};
pub use tensor::Tensor3;
