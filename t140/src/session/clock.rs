use std::time::Instant;

/// RTP clock for text: 1000 Hz from the session start (RFC 4103 Section 3),
/// shifted by a random offset.
#[derive(Debug, Clone, Copy)]
pub struct TextClock {
    epoch: Instant,
    offset: u32,
}

impl TextClock {
    pub const RATE: u32 = 1000;

    pub fn new(epoch: Instant, offset: u32) -> Self {
        Self { epoch, offset }
    }

    pub fn epoch(&self) -> Instant {
        self.epoch
    }

    /// RTP timestamp for `now`. Wraps after about 49 days.
    pub fn timestamp(&self, now: Instant) -> u32 {
        let elapsed = now.saturating_duration_since(self.epoch).as_millis() as u32;
        self.offset.wrapping_add(elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_millisecond_ticks() {
        let epoch = Instant::now();
        let clock = TextClock::new(epoch, u32::MAX - 10);
        assert_eq!(clock.timestamp(epoch), u32::MAX - 10);
        assert_eq!(clock.timestamp(epoch + Duration::from_millis(250)), 239);
    }
}
