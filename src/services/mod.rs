pub mod device_state;
pub mod estimator;
pub mod uploads;
