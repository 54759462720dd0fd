//! The hardware watchdog seam (spec.md §9 Design Note: "the hardware
//! watchdog is out-of-scope/external"). Embedded runtimes wire in their own
//! implementation; anything that isn't running on bare metal can ignore it
//! entirely via [`NullWatchdog`].

/// Something that must be kicked periodically or the device resets.
pub trait Watchdog: Send + Sync {
    /// Reset the watchdog timer. Called whenever the client proves the
    /// connection is still alive (pong received, message parsed).
    fn kick(&self);
}

/// The default watchdog: does nothing. Used whenever the caller has no
/// hardware watchdog to feed, or is running in a test/desktop environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullWatchdog;

impl Watchdog for NullWatchdog {
    fn kick(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_watchdog_kick_is_a_no_op() {
        let watchdog = NullWatchdog;
        watchdog.kick();
        watchdog.kick();
    }
}
