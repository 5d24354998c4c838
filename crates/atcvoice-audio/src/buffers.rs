//! Aligned per-device PCM scratch buffers.
//!
//! Each output device (headset, speaker) owns one [`OutputDeviceState`].
//! The buffers are 16-byte aligned and a multiple of 4 samples long so the
//! mix primitive can use 4-wide single-precision SIMD loads.

use atcvoice_core::FRAME_SIZE_SAMPLES;

/// One frame of PCM, aligned for 4-wide SIMD access.
#[derive(Clone)]
#[repr(C, align(16))]
pub struct AlignedFrame(pub [f32; FRAME_SIZE_SAMPLES]);

impl AlignedFrame {
    /// A zeroed frame on the heap.
    pub fn boxed() -> Box<Self> {
        Box::new(AlignedFrame([0.0; FRAME_SIZE_SAMPLES]))
    }

    /// Zero every sample in place.
    #[inline]
    pub fn clear(&mut self) {
        self.0.fill(0.0);
    }
}

/// Per-output-device mixing scratch space.
///
/// Buffer roles within one mixer pass:
/// - `mixing` -- the device bus; zeroed at the start of each frame, radios
///   panned `Both` accumulate here.
/// - `left_mixing` / `right_mixing` -- the panned buses; zeroed with
///   `mixing`, radios panned `Left`/`Right` accumulate here.
/// - `channel` -- the per-radio bus; zeroed at the start of each radio pass.
/// - `fetch` -- transient scratch an effect frame is pulled into before
///   mixing.
pub struct OutputDeviceState {
    /// Per-radio channel bus.
    pub channel: Box<AlignedFrame>,
    /// Device main (center) bus.
    pub mixing: Box<AlignedFrame>,
    /// Effect fetch scratch.
    pub fetch: Box<AlignedFrame>,
    /// Device left-panned bus.
    pub left_mixing: Box<AlignedFrame>,
    /// Device right-panned bus.
    pub right_mixing: Box<AlignedFrame>,
}

impl OutputDeviceState {
    /// Allocate all five buffers, zeroed.
    pub fn new() -> Self {
        OutputDeviceState {
            channel: AlignedFrame::boxed(),
            mixing: AlignedFrame::boxed(),
            fetch: AlignedFrame::boxed(),
            left_mixing: AlignedFrame::boxed(),
            right_mixing: AlignedFrame::boxed(),
        }
    }

    /// Zero the three device buses at the start of a frame.
    pub fn clear_mixing_buses(&mut self) {
        self.mixing.clear();
        self.left_mixing.clear();
        self.right_mixing.clear();
    }
}

impl Default for OutputDeviceState {
    fn default() -> Self {
        Self::new()
    }
}
