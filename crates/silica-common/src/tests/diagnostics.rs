use super::*;
use crate::location::SourceLocation;

#[test]
fn fatal_kinds() {
    assert!(ErrorKind::ParseError.is_fatal());
    assert!(ErrorKind::InternalInvariant.is_fatal());
    assert!(!ErrorKind::TypeMismatch.is_fatal());
    assert!(!ErrorKind::OverloadAmbiguous.is_fatal());
}

#[test]
fn reporter_counts_errors_only() {
    let mut reporter = ErrorReporter::new();
    reporter.report(Diagnostic {
        category: DiagnosticCategory::Warning,
        kind: ErrorKind::TypeMismatch,
        location: SourceLocation::synthetic(),
        message: "just a warning".into(),
        related_information: Vec::new(),
    });
    assert!(!reporter.has_errors());

    reporter.report(Diagnostic::error(
        ErrorKind::TypeMismatch,
        SourceLocation::synthetic(),
        "an error",
    ));
    assert!(reporter.has_errors());
    assert_eq!(reporter.error_count(), 1);
    assert_eq!(reporter.diagnostics().len(), 2);
}

#[test]
fn emit_records_and_returns() {
    let mut reporter = ErrorReporter::new();
    let err = CompileError::new(
        ErrorKind::OverloadNotFound,
        SourceLocation::synthetic(),
        "no overload",
    )
    .with_related(SourceLocation::synthetic(), "candidate here");
    let back = reporter.emit(err.clone());
    assert_eq!(back, err);
    assert_eq!(reporter.diagnostics().len(), 1);
    assert_eq!(reporter.diagnostics()[0].related_information.len(), 1);
}

#[test]
fn diagnostics_serialize_for_drivers() {
    let diagnostic = Diagnostic::error(
        ErrorKind::CircularGlobal,
        SourceLocation::synthetic(),
        "circular dependency",
    )
    .with_related(SourceLocation::synthetic(), "participant");
    let json = serde_json::to_string(&diagnostic).unwrap();
    let back: Diagnostic = serde_json::from_str(&json).unwrap();
    assert_eq!(back, diagnostic);
}

#[test]
fn take_diagnostics_resets() {
    let mut reporter = ErrorReporter::new();
    reporter.report(Diagnostic::error(
        ErrorKind::MalformedTerm,
        SourceLocation::synthetic(),
        "bad term",
    ));
    let taken = reporter.take_diagnostics();
    assert_eq!(taken.len(), 1);
    assert!(!reporter.has_errors());
    assert!(reporter.diagnostics().is_empty());
}
