use ratiolens_core::CoreError;
use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] ratiolens_core::ValidationError),

    #[error("command error: {0}")]
    Command(String),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error("warehouse error: {0}")]
    Warehouse(#[from] ratiolens_warehouse::WarehouseError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<CoreError> for CliError {
    fn from(error: CoreError) -> Self {
        match error {
            CoreError::Validation(error) => Self::Validation(error),
            CoreError::Serialization(error) => Self::Serialization(error),
            CoreError::Warehouse(error) => Self::Warehouse(error),
        }
    }
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) | Self::Command(_) => 2,
            Self::Serialization(_) => 4,
            Self::Warehouse(_) => 7,
            Self::Io(_) => 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use ratiolens_core::ValidationError;

    use super::*;

    #[test]
    fn core_errors_keep_their_exit_codes() {
        let validation: CliError = CoreError::Validation(ValidationError::EmptySymbol).into();
        assert_eq!(validation.exit_code(), 2);

        let warehouse: CliError = CoreError::Warehouse(
            ratiolens_warehouse::WarehouseError::QueryRejected(String::from("nope")),
        )
        .into();
        assert_eq!(warehouse.exit_code(), 7);
    }
}
