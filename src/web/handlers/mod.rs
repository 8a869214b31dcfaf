pub mod activate;
pub mod batches;
pub mod payment;
