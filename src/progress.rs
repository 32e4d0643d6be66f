/// A contiguous slice of the overall 0-100 progress scale.
///
/// Every step of the launch sequence reports progress as a fraction of its
/// own work; the span maps that fraction onto the global scale. Spans nest:
/// the acquisition engine receives the 50-90 span and carves its download,
/// extraction and relocation phases out of it with `slice`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSpan {
    start: f64,
    end: f64,
}

impl ProgressSpan {
    pub const fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// The whole scale, for flows that own the progress bar outright.
    pub const fn full() -> Self {
        Self::new(0.0, 100.0)
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn end(&self) -> f64 {
        self.end
    }

    /// Maps a completion fraction onto the global scale. The fraction is
    /// clamped to 0.0..=1.0 so a misreported total cannot escape the span.
    pub fn at(&self, fraction: f64) -> f64 {
        let fraction = fraction.clamp(0.0, 1.0);
        self.start + fraction * (self.end - self.start)
    }

    /// A sub-span covering the given fractional range of this span.
    pub fn slice(&self, from: f64, to: f64) -> ProgressSpan {
        ProgressSpan::new(self.at(from), self.at(to))
    }
}
