//! Test pattern generation for mock camera frames.

/// Simple LCG for reproducible per-pixel noise.
#[inline]
fn prng(seed: u64) -> u64 {
    seed.wrapping_mul(1103515245).wrapping_add(12345) & 0x7fffffff
}

/// Diagonal gradient with a frame-dependent offset and a little noise.
///
/// Consecutive frames differ, so tests can tell frames apart by their mean,
/// and the output is fully determined by `(width, height, frame_num)`.
pub fn generate_test_pattern(width: u32, height: u32, frame_num: u64) -> Vec<u16> {
    let w = width as usize;
    let h = height as usize;
    let span = (w + h).max(1);
    let offset = (frame_num % 64) as usize * 256;
    let mut seed = frame_num.wrapping_add(1);

    let mut buffer = Vec::with_capacity(w * h);
    for y in 0..h {
        for x in 0..w {
            seed = prng(seed);
            let base = (x + y) * 40_000 / span;
            let noise = (seed % 64) as usize;
            buffer.push((base + offset + noise).min(u16::MAX as usize) as u16);
        }
    }
    buffer
}

/// Interleaved RGB variant: red follows x, green the gradient, blue follows y.
pub fn generate_rgb_pattern(width: u32, height: u32, frame_num: u64) -> Vec<u16> {
    let mono = generate_test_pattern(width, height, frame_num);
    let w = width.max(1) as usize;
    let h = height.max(1) as usize;
    let mut rgb = Vec::with_capacity(mono.len() * 3);
    for (i, g) in mono.iter().enumerate() {
        let x = i % w;
        let y = i / w;
        rgb.push((x * 60_000 / w) as u16);
        rgb.push(*g);
        rgb.push((y * 60_000 / h) as u16);
    }
    rgb
}
