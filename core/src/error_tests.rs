#[cfg(test)]
mod tests {
    use crate::error::*;
    use std::error::Error;
    use std::io;

    #[test]
    fn test_core_error_display() {
        let err = CoreError::InvalidName("../etc/passwd".to_string());
        assert_eq!(err.to_string(), "Invalid script name: ../etc/passwd");

        let err = CoreError::NotFound("missing.py".to_string());
        assert_eq!(err.to_string(), "Script not found: missing.py");

        let err = CoreError::NotRunning("idle.py".to_string());
        assert_eq!(err.to_string(), "Script not running: idle.py");

        let err = CoreError::ExecutionFailure("spawn failed".to_string());
        assert_eq!(err.to_string(), "Execution failure: spawn failed");

        let err = CoreError::ConfigurationError("bad config".to_string());
        assert_eq!(err.to_string(), "Configuration error: bad config");
    }

    #[test]
    fn test_core_error_from_std_error() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let core_err: CoreError = io_err.into();

        if let CoreError::IoError(_) = core_err {
            // Expected variant
        } else {
            panic!("Expected CoreError::IoError variant");
        }
    }

    #[test]
    fn test_core_error_from_serde_error() {
        let serde_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let core_err: CoreError = serde_err.into();

        if let CoreError::SerializationError(_) = core_err {
            // Expected variant
        } else {
            panic!("Expected CoreError::SerializationError variant");
        }
    }

    #[test]
    fn test_error_source_chain() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let core_err = CoreError::from(io_err);
        assert!(core_err.source().is_some());

        let core_err = CoreError::AlreadyRunning("a.py".to_string());
        assert!(core_err.source().is_none());
    }
}
