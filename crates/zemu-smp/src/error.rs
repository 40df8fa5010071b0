use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SmpError {
    #[error("{count} processors requested but at most {max} are supported")]
    TooManyProcessors { count: usize, max: usize },

    #[error("processor {cpu} is not configured (count {count})")]
    NoSuchProcessor { cpu: usize, count: usize },
}
