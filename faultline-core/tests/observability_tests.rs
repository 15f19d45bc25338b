use faultline_core::config::LoggingConfig;
use faultline_core::observability::init_logging;

#[test]
fn test_init_logging_once() {
    let config = LoggingConfig {
        level: "debug".to_string(),
        format: "compact".to_string(),
        verbose: false,
    };

    assert!(init_logging(&config).is_ok());
    tracing::info!("subscriber installed");

    let err = init_logging(&config).unwrap_err();
    assert!(err.is_configuration());
}
