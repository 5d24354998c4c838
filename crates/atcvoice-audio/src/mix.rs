//! Frame mixing primitives.
//!
//! [`mix_buffers`] is the hot inner loop of the output mixer: it runs once
//! per stream, per effect, and per radio, every 20 ms, on the audio output
//! thread. The explicit 4-sample blocking plus the alignment guarantees of
//! [`crate::buffers::AlignedFrame`] let the compiler lower it to 4-wide
//! SIMD loads without a runtime dispatch.

/// Mix `src` into `dst` in place: `dst[i] += gain * src[i]`.
///
/// Both slices must be the same length and a multiple of 4 samples (frame
/// buffers always are).
#[inline]
pub fn mix_buffers(dst: &mut [f32], src: &[f32], gain: f32) {
    debug_assert_eq!(dst.len(), src.len());
    debug_assert_eq!(dst.len() % 4, 0);
    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        d[0] += gain * s[0];
        d[1] += gain * s[1];
        d[2] += gain * s[2];
        d[3] += gain * s[3];
    }
}

/// Interleave two mono buffers into one stereo buffer.
///
/// `out` must be exactly twice as long as each input; samples land as
/// `[L0, R0, L1, R1, ...]`.
pub fn interleave(left: &[f32], right: &[f32], out: &mut [f32]) {
    debug_assert_eq!(left.len(), right.len());
    debug_assert_eq!(out.len(), left.len() * 2);
    for (i, pair) in out.chunks_exact_mut(2).enumerate() {
        pair[0] = left[i];
        pair[1] = right[i];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mix_adds_scaled() {
        let mut dst = vec![1.0_f32; 8];
        let src = vec![0.5_f32; 8];
        mix_buffers(&mut dst, &src, 2.0);
        for s in dst {
            assert!((s - 2.0).abs() < f32::EPSILON);
        }
    }

    #[test]
    fn mix_zero_gain_is_identity() {
        let mut dst: Vec<f32> = (0..8).map(|i| i as f32).collect();
        let before = dst.clone();
        let src = vec![0.7_f32; 8];
        mix_buffers(&mut dst, &src, 0.0);
        assert_eq!(dst, before);
    }

    #[test]
    fn mix_accumulates_across_calls() {
        let mut dst = vec![0.0_f32; 4];
        let src = vec![0.25_f32; 4];
        mix_buffers(&mut dst, &src, 1.0);
        mix_buffers(&mut dst, &src, 1.0);
        for s in dst {
            assert!((s - 0.5).abs() < f32::EPSILON);
        }
    }

    #[test]
    fn interleave_orders_channels() {
        let left = [1.0_f32, 2.0, 3.0];
        let right = [-1.0_f32, -2.0, -3.0];
        let mut out = [0.0_f32; 6];
        interleave(&left, &right, &mut out);
        assert_eq!(out, [1.0, -1.0, 2.0, -2.0, 3.0, -3.0]);
    }
}
