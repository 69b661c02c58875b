use crate::channels::ChannelId;

/// Hardware seam for driving pulse-train outputs.
///
/// The engine calls these on every edge. Implementations must not block; the
/// firmware forwards straight to GPIO and the emulator records waveforms.
pub trait OutputSink {
    fn assert(&mut self, channel: ChannelId);

    fn deassert(&mut self, channel: ChannelId);

    /// Releases every output, e.g. on reset or standby.
    fn deassert_all(&mut self) {
        for channel in ChannelId::ALL {
            self.deassert(channel);
        }
    }
}

impl<T: OutputSink + ?Sized> OutputSink for &mut T {
    fn assert(&mut self, channel: ChannelId) {
        (**self).assert(channel);
    }

    fn deassert(&mut self, channel: ChannelId) {
        (**self).deassert(channel);
    }

    fn deassert_all(&mut self) {
        (**self).deassert_all();
    }
}

/// Sink that discards every edge.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopOutputSink;

impl NoopOutputSink {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl OutputSink for NoopOutputSink {
    fn assert(&mut self, _channel: ChannelId) {}

    fn deassert(&mut self, _channel: ChannelId) {}
}
