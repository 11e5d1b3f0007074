pub mod error;
pub mod math;
pub mod model;
pub mod io;
pub mod r0;
pub mod sensitivity;

pub use error::{SimError, SimResult};
pub use model::params::{Params, Scenario, TimeUnit};
pub use model::tb::{TbModel, TbState, Trajectory};
