use std::fmt::Debug;

pub trait LoggableErrorResult<T> {
    fn ok_or_log(self) -> Option<T>;
}

impl<T, E: Debug> LoggableErrorResult<T> for Result<T, E> {
    fn ok_or_log(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(e) => {
                log::error!("{:?}", e);
                None
            }
        }
    }
}

/// Current time as unix seconds, the way every timestamp column stores it.
pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

pub fn today() -> chrono::NaiveDate {
    chrono::Utc::now().date_naive()
}
