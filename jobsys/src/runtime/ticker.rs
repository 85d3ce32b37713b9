use bitflags::bitflags;

/// Counts event loop iterations of a worker and turns them into policy
/// events.
#[derive(Debug)]
pub(crate) struct Ticker {
    tick: u32,
}

impl Ticker {
    pub(crate) fn new() -> Self {
        Self { tick: 0 }
    }

    pub(crate) fn tick<T: TickerData>(&mut self, ctx: &T::Context, data: &mut T) -> TickerEvents {
        self.tick = self.tick.wrapping_add(1);
        data.update_and_check(ctx, self.tick)
    }
}

/// Implemented by the event loop policy of a worker, so the ticker only owns
/// the counter and the policy only owns the decisions.
pub(crate) trait TickerData {
    type Context;

    fn update_and_check(&mut self, ctx: &Self::Context, tick: u32) -> TickerEvents;
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub(crate) struct TickerEvents: u8 {
        /// Look at the global injector queue before the local deque on the
        /// next search for work.
        const POP_GLOBAL_QUEUE = 1;

        /// The pool is shutting down, drain and leave the event loop.
        const SHUTDOWN = 1 << 1;
    }
}
