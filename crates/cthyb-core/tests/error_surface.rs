use cthyb_core::errors::{ErrorInfo, SolverError};

fn sample_info(code: &str, message: &str) -> ErrorInfo {
    ErrorInfo::new(code, message)
        .with_context("option", "worm")
        .with_context("reason", "example")
}

#[test]
fn configuration_error_surface() {
    let err = SolverError::Configuration(sample_info("complex-diagonal", "diagonal hybridization"));
    assert_eq!(err.info().code, "complex-diagonal");
    assert!(err.info().context.contains_key("option"));
    assert!(!err.is_fatal());
}

#[test]
fn consistency_error_surface() {
    let err = SolverError::Consistency(sample_info("orbital-mismatch", "norb differs"));
    assert_eq!(err.info().code, "orbital-mismatch");
    assert!(err.info().context.contains_key("reason"));
}

#[test]
fn unimplemented_sector_surface() {
    let err = SolverError::UnimplementedSector(sample_info("ambiguous-worm", "two toggles"));
    assert_eq!(err.info().code, "ambiguous-worm");
}

#[test]
fn engine_error_surface() {
    let err = SolverError::engine("engine-crash", "engine exited");
    assert_eq!(err.info().code, "engine-crash");
    assert!(err.to_string().starts_with("engine failure:"));
}

#[test]
fn fatal_error_is_flagged() {
    let err = SolverError::Fatal(sample_info("complex-worm", "not supported"));
    assert!(err.is_fatal());
}

#[test]
fn display_includes_context_and_hint() {
    let err = SolverError::Configuration(
        ErrorInfo::new("missing-h0", "quadratic term required")
            .with_context("delta_interface", "true")
            .with_hint("pass h_0"),
    );
    let text = err.to_string();
    assert!(text.contains("delta_interface=true"));
    assert!(text.contains("hint: pass h_0"));
}

#[test]
fn error_serializes_with_family_tag() {
    let err = SolverError::Consistency(sample_info("orbital-mismatch", "norb differs"));
    let json = serde_json::to_value(&err).unwrap();
    assert_eq!(json["family"], "Consistency");
    let back: SolverError = serde_json::from_value(json).unwrap();
    assert_eq!(back, err);
}
