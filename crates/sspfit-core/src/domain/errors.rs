use std::error::Error;
use std::fmt::{Display, Formatter};

pub type FitResult<T> = Result<T, FitError>;

/// Every category is fatal; the exit code identifies it to calling scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FitErrorCategory {
    InputValidationError,
    IoSystemError,
    GridLookupError,
    ParameterConflictError,
    NumericDegeneracy,
    InternalError,
}

impl FitErrorCategory {
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::InputValidationError => 2,
            Self::IoSystemError => 3,
            Self::GridLookupError => 4,
            Self::ParameterConflictError => 5,
            Self::NumericDegeneracy => 6,
            Self::InternalError => 7,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InputValidationError => "InputValidationError",
            Self::IoSystemError => "IoSystemError",
            Self::GridLookupError => "GridLookupError",
            Self::ParameterConflictError => "ParameterConflictError",
            Self::NumericDegeneracy => "NumericDegeneracy",
            Self::InternalError => "InternalError",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FitError {
    category: FitErrorCategory,
    placeholder: &'static str,
    message: String,
}

impl FitError {
    pub fn new(
        category: FitErrorCategory,
        placeholder: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            placeholder,
            message: message.into(),
        }
    }

    pub fn input_validation(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(FitErrorCategory::InputValidationError, placeholder, message)
    }

    pub fn io_system(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(FitErrorCategory::IoSystemError, placeholder, message)
    }

    pub fn grid_lookup(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(FitErrorCategory::GridLookupError, placeholder, message)
    }

    pub fn parameter_conflict(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(
            FitErrorCategory::ParameterConflictError,
            placeholder,
            message,
        )
    }

    pub fn numeric_degeneracy(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(FitErrorCategory::NumericDegeneracy, placeholder, message)
    }

    pub fn internal(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(FitErrorCategory::InternalError, placeholder, message)
    }

    pub const fn category(&self) -> FitErrorCategory {
        self.category
    }

    pub const fn placeholder(&self) -> &'static str {
        self.placeholder
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn exit_code(&self) -> i32 {
        self.category.exit_code()
    }

    /// `ERROR: [PLACEHOLDER] message`, the first stderr line of a failed run.
    pub fn diagnostic_line(&self) -> String {
        format!("ERROR: [{}] {}", self.placeholder, self.message)
    }

    pub fn fatal_exit_line(&self) -> String {
        format!("FATAL EXIT CODE: {}", self.exit_code())
    }
}

impl Display for FitError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] {}",
            self.category.as_str(),
            self.placeholder,
            self.message
        )
    }
}

impl Error for FitError {}
