//! Shorthands for building and returning [`crate::error::OutboxError`] values.

/// Creates an [`crate::error::OutboxError`] from a kind and a static description.
///
/// Accepts an optional detail (anything implementing `ToString`) and an optional `source:`.
#[macro_export]
macro_rules! outbox_error {
    ($kind:expr, $desc:expr) => {
        $crate::error::OutboxError::from(($kind, $desc))
    };
    ($kind:expr, $desc:expr, source: $source:expr) => {
        $crate::error::OutboxError::from(($kind, $desc)).with_source($source)
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        $crate::error::OutboxError::from(($kind, $desc, $detail.to_string()))
    };
    ($kind:expr, $desc:expr, $detail:expr, source: $source:expr) => {
        $crate::error::OutboxError::from(($kind, $desc, $detail.to_string())).with_source($source)
    };
}

/// Returns early with an [`crate::error::OutboxError`], see [`outbox_error!`].
#[macro_export]
macro_rules! bail {
    ($kind:expr, $desc:expr) => {
        return ::core::result::Result::Err($crate::outbox_error!($kind, $desc))
    };
    ($kind:expr, $desc:expr, source: $source:expr) => {
        return ::core::result::Result::Err($crate::outbox_error!($kind, $desc, source: $source))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        return ::core::result::Result::Err($crate::outbox_error!($kind, $desc, $detail))
    };
    ($kind:expr, $desc:expr, $detail:expr, source: $source:expr) => {
        return ::core::result::Result::Err($crate::outbox_error!(
            $kind,
            $desc,
            $detail,
            source: $source
        ))
    };
}
