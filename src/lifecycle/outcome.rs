/// Result of one operation step.
///
/// `Failure` is an expected, operational outcome the step runner resolves
/// into an Error-status record; `Cancelled` marks a cooperative abort and is
/// never folded into `Failure`. Infrastructure problems (store access,
/// channel loss) stay on the `Err` side of the surrounding `Result`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome<T> {
    Success(T),
    Failure(String),
    Cancelled,
}

/// Payload of a successful Check step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckReport {
    pub intervention_required: bool,
    pub available_pbos: Vec<String>,
}

/// Payload of a successful Execute step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecuteReport {
    pub files_changed: bool,
}
