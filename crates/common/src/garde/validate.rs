use crate::domain::{DomainError, DomainResult};
use garde::{Report, Validate};

/// Run garde rules on a decoded request body
pub fn validate_request<T>(request: &T) -> DomainResult<()>
where
    T: Validate,
    T::Context: Default,
{
    request
        .validate()
        .map_err(|report| DomainError::ValidationError(describe(&report)))
}

fn describe(report: &Report) -> String {
    report
        .iter()
        .map(|(path, error)| {
            let path = path.to_string();
            if path.is_empty() {
                error.message().to_string()
            } else {
                format!("{path}: {}", error.message())
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}
