/*!
A streaming linear resampler for interleaved f32 audio.

Used by the output stream when the device runs at a different rate than the
decoded audio. It works in pull mode on caller-provided buffers, so it never
allocates once constructed and is safe to run inside an audio callback:

```ignore
let mut rs = LinearResampler::new(44_100, 48_000, 2);
let (consumed, produced) = rs.process(&input, &mut output);
```

`consumed` input frames were used up and must not be passed again; `produced`
output frames were written. Interpolation state carries across calls.
*/

#[derive(Debug, Clone)]
pub struct LinearResampler {
    src_rate: u32,
    dst_rate: u32,
    channels: usize,

    // Source frames advanced per output frame (src/dst)
    step: f64,

    // Read position relative to `prev_frame`, which sits at index 0 ahead of the next input
    pos: f64,
    prev_frame: Vec<f32>,
}

impl LinearResampler {
    /// Create a resampler from `src_rate` to `dst_rate` for `channels` interleaved channels
    pub fn new(src_rate: u32, dst_rate: u32, channels: usize) -> Self {
        let mut resampler = Self {
            src_rate,
            dst_rate,
            channels,
            step: 0.0,
            pos: 1.0,
            prev_frame: vec![0.0; channels],
        };
        resampler.set_rates(src_rate, dst_rate, true);
        resampler
    }

    /// Forget interpolation history, e.g. after a seek
    pub fn reset(&mut self) {
        self.pos = 1.0;
        self.prev_frame.fill(0.0);
    }

    pub fn set_rates(&mut self, src_rate: u32, dst_rate: u32, reset_state: bool) {
        self.src_rate = src_rate;
        self.dst_rate = dst_rate;
        self.step = if dst_rate == 0 { 0.0 } else { src_rate as f64 / dst_rate as f64 };
        if reset_state {
            self.reset();
        }
    }

    /// (source rate, destination rate, channels)
    pub fn config(&self) -> (u32, u32, usize) {
        (self.src_rate, self.dst_rate, self.channels)
    }

    pub fn is_passthrough(&self) -> bool {
        self.src_rate == self.dst_rate
    }

    /// Input frames needed to produce `output_frames` more frames
    pub fn input_frames_for(&self, output_frames: usize) -> usize {
        if output_frames == 0 {
            return 0;
        }
        let last = self.pos + self.step * (output_frames - 1) as f64;
        last.floor() as usize + 1
    }

    /// Resample as much of `input` as fits into `output`.
    ///
    /// Returns `(consumed, produced)` in frames.
    pub fn process(&mut self, input: &[f32], output: &mut [f32]) -> (usize, usize) {
        let ch = self.channels;
        if ch == 0 || self.step <= 0.0 {
            return (0, 0);
        }

        let in_frames = input.len() / ch;
        let out_capacity = output.len() / ch;
        let mut produced = 0;

        // Frame `i` of the working sequence: prev_frame for 0, input[i - 1] otherwise
        let frame = |i: usize, c: usize| -> f32 {
            if i == 0 {
                self.prev_frame[c]
            } else {
                input[(i - 1) * ch + c]
            }
        };

        let mut pos = self.pos;
        while produced < out_capacity {
            let i = pos.floor() as usize;
            if i + 1 > in_frames {
                break;
            }
            let frac = (pos - i as f64) as f32;
            let out = &mut output[produced * ch..(produced + 1) * ch];
            for (c, sample) in out.iter_mut().enumerate() {
                let s0 = frame(i, c);
                let s1 = frame(i + 1, c);
                *sample = s0 + (s1 - s0) * frac;
            }
            produced += 1;
            pos += self.step;
        }

        let consumed = (pos.floor() as usize).min(in_frames);
        if consumed > 0 {
            let base = (consumed - 1) * ch;
            self.prev_frame.copy_from_slice(&input[base..base + ch]);
            pos -= consumed as f64;
        }
        self.pos = pos;

        (consumed, produced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gen_sine(f_hz: f32, sr: u32, frames: usize, ch: usize) -> Vec<f32> {
        let mut out = Vec::with_capacity(frames * ch);
        for n in 0..frames {
            let t = n as f32 / sr as f32;
            let s = (2.0 * std::f32::consts::PI * f_hz * t).sin();
            for _ in 0..ch {
                out.push(s);
            }
        }
        out
    }

    /// Drive the resampler through `input` in `chunk` sized pulls
    fn run(rs: &mut LinearResampler, input: &[f32], chunk: usize) -> Vec<f32> {
        let ch = rs.config().2;
        let mut output = vec![0.0f32; chunk * ch];
        let mut result = Vec::new();
        let mut offset = 0;
        loop {
            let (consumed, produced) = rs.process(&input[offset * ch..], &mut output);
            result.extend_from_slice(&output[..produced * ch]);
            offset += consumed;
            if produced == 0 {
                break;
            }
        }
        result
    }

    #[test]
    fn resample_length_mono_44k1_to_48k() {
        let (src, dst) = (44_100, 48_000);
        let in_frames = 4410;
        let input = gen_sine(1000.0, src, in_frames, 1);

        let mut rs = LinearResampler::new(src, dst, 1);
        let out = run(&mut rs, &input, 4096);

        let expected = (in_frames as f64 * (dst as f64 / src as f64)).round() as isize;
        let actual = out.len() as isize;
        assert!((actual - expected).abs() <= 2, "expected ~{}, got {}", expected, actual);
    }

    #[test]
    fn streaming_consistency_split_buffers() {
        let (src, dst, ch) = (44_100, 48_000, 2);
        let input = gen_sine(440.0, src, 10_000, ch);

        let mut one = LinearResampler::new(src, dst, ch);
        let whole = run(&mut one, &input, 20_000);

        let mut two = LinearResampler::new(src, dst, ch);
        let pieces = run(&mut two, &input, 777);

        assert!((whole.len() as isize - pieces.len() as isize).abs() <= ch as isize);
        for (k, (a, b)) in whole.iter().zip(&pieces).enumerate() {
            assert!((a - b).abs() < 1e-6, "mismatch at {}, {} vs {}", k, a, b);
        }
    }

    #[test]
    fn passthrough_reproduces_input() {
        let input: Vec<f32> = (0..64).map(|i| i as f32).collect();
        let mut rs = LinearResampler::new(48_000, 48_000, 1);
        assert!(rs.is_passthrough());

        let out = run(&mut rs, &input, 16);
        assert_eq!(out, input[..63].to_vec());
    }

    #[test]
    fn consumed_frames_are_not_reread() {
        let input = [0.0f32, 1.0, 2.0, 3.0];
        let mut rs = LinearResampler::new(1, 2, 1);
        let mut output = [0.0f32; 3];

        let (consumed, produced) = rs.process(&input, &mut output);
        assert_eq!(produced, 3);
        assert_eq!(output, [0.0, 0.5, 1.0]);
        assert_eq!(consumed, 2);

        let (_, produced) = rs.process(&input[consumed..], &mut output);
        assert_eq!(produced, 3);
        assert_eq!(output, [1.5, 2.0, 2.5]);
    }

    #[test]
    fn reset_clears_history() {
        let mut rs = LinearResampler::new(48_000, 44_100, 1);
        let mut output = [0.0f32; 8];
        rs.process(&[1.0; 16], &mut output);

        rs.reset();
        let (_, produced) = rs.process(&[0.25, 0.25], &mut output);
        assert_eq!(produced, 1);
        assert_eq!(output[0], 0.25);
    }
}
