use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceTimeStoreError {
    #[error("sample rejected: duration {0} minutes outside the valid 0..180 range")]
    InvalidDuration(f64),
}
