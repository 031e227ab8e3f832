//! Small shared helpers for classifying transport errors.

/// Walk `err`'s source chain looking for an `io::Error` whose kind is
/// `ConnectionRefused`. `reqwest` wraps the underlying transport error
/// rather than exposing its `io::ErrorKind` directly, so this is the most
/// reliable way to distinguish "peer process isn't running" from other
/// transport failures.
pub(crate) fn is_connection_refused(err: &reqwest::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = source {
        if let Some(io_err) = e.downcast_ref::<std::io::Error>() {
            if io_err.kind() == std::io::ErrorKind::ConnectionRefused {
                return true;
            }
        }
        source = e.source();
    }
    false
}
