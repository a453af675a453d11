//! Command dispatcher outcomes (§4.2).

/// The outcome of presenting one inbound command record to the Framer.
///
/// `Abort` means the record was *not* consumed and must be re-delivered on
/// the next tick — this is how BACK_PRESSURED publications are retried
/// idempotently (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchResult {
    /// Record consumed; advance to the next one.
    Continue,
    /// Record not consumed; re-deliver on the next tick.
    Abort,
    /// Stop processing commands for this tick.
    Break,
}
