// Path planning module: reference splines and the tasks they are built from

pub mod cubic_spline;
pub mod task_generator;

pub use cubic_spline::*;
pub use task_generator::*;
