pub mod dense_lu;
pub mod faer_ndarray;
pub mod sparse_lu;
pub(crate) mod utils;
