//! Coordination primitives between the publisher and the process hosting it.

pub mod shutdown;
