pub mod common;
pub mod domain;
pub mod grid;
pub mod likelihood;
pub mod numerics;
pub mod observed;
pub mod prior;
pub mod sampling;
pub mod serialization;
pub mod synthesis;
