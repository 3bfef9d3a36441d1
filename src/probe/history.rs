//! Sliding probe history bitmaps
//!
//! Every probe criterion keeps a 64-bit record; bit 0 is the most recent
//! probe. The criteria are declared once in a descriptor table so that
//! shifting, the one-character summary, and the detail render all iterate
//! the same fixed order.

/// Smoothing denominator cap for the response time average
pub(crate) const AVG_RATE: f64 = 4.0;

/// Per-probe verdict criteria, in wire order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Criterion {
    GoodIpv4,
    GoodIpv6,
    ErrXmit,
    GoodXmit,
    ErrRecv,
    GoodRecv,
    Happy,
}

pub(crate) const CRITERIA: usize = 7;

/// Rendering metadata for one criterion
#[derive(Debug)]
pub(crate) struct BitmapDesc {
    pub criterion: Criterion,
    pub glyph: char,
    pub label: &'static str,
    /// Render the row even when the bitmap is all zeroes
    pub always_show: bool,
}

/// Fixed criterion order: summary strings, log lines, and the detail
/// render all follow this table
pub(crate) const BITMAPS: [BitmapDesc; CRITERIA] = [
    BitmapDesc { criterion: Criterion::GoodIpv4, glyph: '4', label: "Good IPv4", always_show: false },
    BitmapDesc { criterion: Criterion::GoodIpv6, glyph: '6', label: "Good IPv6", always_show: false },
    BitmapDesc { criterion: Criterion::ErrXmit, glyph: 'x', label: "Error Xmit", always_show: false },
    BitmapDesc { criterion: Criterion::GoodXmit, glyph: 'X', label: "Good Xmit", always_show: false },
    BitmapDesc { criterion: Criterion::ErrRecv, glyph: 'r', label: "Error Recv", always_show: false },
    BitmapDesc { criterion: Criterion::GoodRecv, glyph: 'R', label: "Good Recv", always_show: false },
    BitmapDesc { criterion: Criterion::Happy, glyph: 'H', label: "Happy", always_show: true },
];

/// Collected statistics for one probe target
#[derive(Debug, Default)]
pub(crate) struct History {
    bits: [u64; CRITERIA],
    /// Last probe's response time in seconds; 0 until a response arrives
    pub last: f64,
    /// Exponential moving average of happy response times
    pub avg: f64,
    rate: f64,
    /// Happy probes within the window, recounted after every probe
    pub good: u32,
    /// Saved response status line for logging
    pub resp: String,
}

impl History {
    /// Open a slot for the next probe: shift every bitmap and clear the
    /// per-probe fields
    pub fn shift(&mut self) {
        for bits in &mut self.bits {
            *bits <<= 1;
        }
        self.last = 0.0;
        self.resp.clear();
    }

    /// Record a verdict for the probe currently in flight
    pub fn set(&mut self, criterion: Criterion) {
        self.bits[criterion as usize] |= 1;
    }

    pub fn bitmap(&self, criterion: Criterion) -> u64 {
        self.bits[criterion as usize]
    }

    pub fn bitmaps(&self) -> [u64; CRITERIA] {
        self.bits
    }

    fn newest(&self, criterion: Criterion) -> bool {
        self.bits[criterion as usize] & 1 != 0
    }

    /// Fold the newest happy response time into the moving average
    pub fn update_avg(&mut self) {
        if self.newest(Criterion::Happy) {
            if self.rate < AVG_RATE {
                self.rate += 1.0;
            }
            self.avg += (self.last - self.avg) / self.rate;
        }
    }

    /// One character per criterion describing the newest probe
    pub fn summary(&self) -> String {
        BITMAPS
            .iter()
            .map(|desc| if self.newest(desc.criterion) { desc.glyph } else { '-' })
            .collect()
    }

    /// Recount happy probes over the low `window` bits
    pub fn recount(&mut self, window: u32) {
        let happy = self.bitmap(Criterion::Happy);
        self.good = (happy & window_mask(window)).count_ones();
    }
}

pub(crate) fn window_mask(window: u32) -> u64 {
    if window >= 64 {
        u64::MAX
    } else {
        (1u64 << window) - 1
    }
}
