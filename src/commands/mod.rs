pub mod latest;
pub mod status;
pub mod sync;
