use fail::fail_point;

use crate::bail;
use crate::error::{ErrorKind, OutboxResult};

/// Evaluated after the batch is encoded and before it is handed to the delivery.
pub const DRAIN_CYCLE_BEFORE_DELIVERY_FP: &str = "drain_cycle.before_delivery";
/// Evaluated after a successful delivery and before the delivered rows are deleted.
pub const DRAIN_CYCLE_BEFORE_DELETE_FP: &str = "drain_cycle.before_delete";

/// Evaluates the fail point `name`.
///
/// The `return` action fails with [`ErrorKind::InjectedFault`], using the action argument as
/// detail when present. The `panic` action panics inside the drain cycle.
pub fn outbox_fail_point(name: &str) -> OutboxResult<()> {
    fail_point!(name, |parameter: Option<String>| {
        let detail = parameter.unwrap_or_else(|| format!("fail point '{name}' returned an error"));

        bail!(
            ErrorKind::InjectedFault,
            "An error occurred in a fail point",
            detail
        );
    });

    Ok(())
}
