use thiserror::Error;

/// Typed error kinds per the system's error handling design.
///
/// These are deliberately granular: callers at the process boundary (the
/// three `src/bin/*.rs` entrypoints) convert into `eyre::Report` with
/// `.into()` / `?`, but everything in the library speaks this enum so that
/// scale-up and the reaper can pattern-match on *kind* instead of string
/// matching an opaque error.
///
/// Signature/payload-invalid outcomes (spec §7) are not represented here:
/// ingress never raises, it *decides* (`ingress::IngressOutcome`), and that
/// decision never needs to travel as an `Err` anywhere in the tree.
/// Rate-limited and server-error responses are likewise states `ForgeClient`
/// retries through internally (`forge::retry::Classification`); once
/// retries are exhausted they surface as `ForgeClientError`, so they are not
/// separate terminal variants either.
#[derive(Debug, Error)]
pub enum ControlPlaneError {
    #[error("configuration unavailable: {0}")]
    ConfigUnavailable(String),

    #[error("forge client error: HTTP {status}: {body}")]
    ForgeClientError { status: u16, body: String },

    #[error("launch rejected for instance type {instance_type}: {reason}")]
    LaunchRejected {
        instance_type: String,
        reason: String,
    },

    #[error("terminate failed for instance {instance_id}: {reason}")]
    TerminateFailed {
        instance_id: String,
        reason: String,
    },
}
