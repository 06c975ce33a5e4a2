use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoxError>;

#[derive(Error, Debug, Clone)]
pub enum CoxError {
    #[error("dimensions don't match: {message}")]
    InvalidDimensions { message: String },

    #[error("bad parameter: {parameter} = {value}")]
    InvalidParameter { parameter: String, value: String },

    #[error("numerical issues: {message}")]
    NumericalError { message: String },

    #[error("survival data is broken: {message}")]
    InvalidSurvivalData { message: String },

    #[error("model fit failed: {message}")]
    FitFailed { message: String },

    #[error("model not fitted yet - call fit() first")]
    ModelNotFitted,

    #[error("concordance undefined: {message}")]
    UndefinedScore { message: String },

    #[error("bootstrap draw {draw} failed: {source}")]
    BootstrapDrawFailed {
        draw: usize,
        #[source]
        source: Box<CoxError>,
    },

    #[error("validation cancelled after {completed} completed draws")]
    Cancelled { completed: usize },

    #[error("config didn't parse: {message}")]
    InvalidConfig { message: String },
}

impl CoxError {
    pub fn invalid_dimensions(message: impl Into<String>) -> Self {
        Self::InvalidDimensions { message: message.into() }
    }

    pub fn invalid_parameter(parameter: impl Into<String>, value: impl ToString) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            value: value.to_string(),
        }
    }

    pub fn numerical_error(message: impl Into<String>) -> Self {
        Self::NumericalError { message: message.into() }
    }

    pub fn invalid_survival_data(message: impl Into<String>) -> Self {
        Self::InvalidSurvivalData { message: message.into() }
    }

    pub fn fit_failed(message: impl Into<String>) -> Self {
        Self::FitFailed { message: message.into() }
    }

    pub fn undefined_score(message: impl Into<String>) -> Self {
        Self::UndefinedScore { message: message.into() }
    }

    /// tag an error with the bootstrap draw it came from
    pub fn in_draw(self, draw: usize) -> Self {
        Self::BootstrapDrawFailed { draw, source: Box::new(self) }
    }

    /// true for undefined concordance, including when wrapped in a draw failure
    pub fn is_undefined_score(&self) -> bool {
        match self {
            Self::UndefinedScore { .. } => true,
            Self::BootstrapDrawFailed { source, .. } => source.is_undefined_score(),
            _ => false,
        }
    }

    /// index of the failing bootstrap draw, if any
    pub fn draw_index(&self) -> Option<usize> {
        match self {
            Self::BootstrapDrawFailed { draw, .. } => Some(*draw),
            _ => None,
        }
    }
}

impl From<toml::de::Error> for CoxError {
    fn from(err: toml::de::Error) -> Self {
        Self::InvalidConfig { message: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draw_wrapping_keeps_kind() {
        let err = CoxError::undefined_score("no events").in_draw(7);
        assert!(err.is_undefined_score());
        assert_eq!(err.draw_index(), Some(7));
        assert!(err.to_string().contains("draw 7"));

        let fit = CoxError::fit_failed("singular").in_draw(2);
        assert!(!fit.is_undefined_score());
        assert_eq!(fit.draw_index(), Some(2));
    }
}
