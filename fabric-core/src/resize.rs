// SPDX-License-Identifier: MPL-2.0

//! Bilinear BGRA→BGRA resize (`spec.md` §4.2, C3).

use crate::raw_image::RawImage;

/// Bilinear-resample `src` to `new_w` x `new_h`.
///
/// Destination pixel centers map back into source space via
/// `((x+0.5)*W/new_w - 0.5, (y+0.5)*H/new_h - 0.5)`, clamped to
/// `[0, W-1] x [0, H-1]`, then bilinearly mixed. Alpha is forced to 255.
/// Returns the empty image (`ok() == false`) on invalid input.
#[must_use]
pub fn bilinear_resize(src: &RawImage, new_w: u32, new_h: u32) -> RawImage {
    if !src.ok() || new_w == 0 || new_h == 0 {
        return RawImage::empty();
    }

    let (w, h) = (f64::from(src.width()), f64::from(src.height()));
    let mut out = vec![0u8; new_w as usize * new_h as usize * 4];

    for y in 0..new_h {
        let sy = ((f64::from(y) + 0.5) * h / f64::from(new_h) - 0.5).clamp(0.0, h - 1.0);
        let y0 = sy.floor() as u32;
        let y1 = (y0 + 1).min(src.height() - 1);
        let fy = sy - f64::from(y0);

        for x in 0..new_w {
            let sx = ((f64::from(x) + 0.5) * w / f64::from(new_w) - 0.5).clamp(0.0, w - 1.0);
            let x0 = sx.floor() as u32;
            let x1 = (x0 + 1).min(src.width() - 1);
            let fx = sx - f64::from(x0);

            let p00 = src.pixel(x0, y0).unwrap();
            let p10 = src.pixel(x1, y0).unwrap();
            let p01 = src.pixel(x0, y1).unwrap();
            let p11 = src.pixel(x1, y1).unwrap();

            let idx = (y as usize * new_w as usize + x as usize) * 4;
            for c in 0..3 {
                let top = f64::from(p00[c]) * (1.0 - fx) + f64::from(p10[c]) * fx;
                let bot = f64::from(p01[c]) * (1.0 - fx) + f64::from(p11[c]) * fx;
                let v = top * (1.0 - fy) + bot * fy;
                out[idx + c] = v.round().clamp(0.0, 255.0) as u8;
            }
            out[idx + 3] = 255;
        }
    }

    RawImage::new(new_w, new_h, out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_input_yields_empty() {
        let src = RawImage::solid(4, 4, 1, 2, 3);
        assert!(!bilinear_resize(&src, 0, 4).ok());
        assert!(!bilinear_resize(&RawImage::empty(), 4, 4).ok());
    }

    #[test]
    fn output_shape_matches_request() {
        let src = RawImage::solid(4, 4, 1, 2, 3);
        let out = bilinear_resize(&src, 10, 6);
        assert_eq!(out.width(), 10);
        assert_eq!(out.height(), 6);
        assert_eq!(out.byte_len(), 10 * 6 * 4);
    }

    #[test]
    fn alpha_is_forced_opaque() {
        let src = RawImage::solid(4, 4, 1, 2, 3);
        let out = bilinear_resize(&src, 7, 7);
        for y in 0..7 {
            for x in 0..7 {
                assert_eq!(out.pixel(x, y).unwrap()[3], 255);
            }
        }
    }

    #[test]
    fn solid_color_resize_preserves_color() {
        let src = RawImage::solid(4, 4, 40, 80, 120);
        let out = bilinear_resize(&src, 9, 9);
        for y in 0..9 {
            for x in 0..9 {
                let px = out.pixel(x, y).unwrap();
                assert_eq!(px, [40, 80, 120, 255]);
            }
        }
    }

    #[test]
    fn identity_resize_is_exact_up_to_rounding() {
        let mut bytes = Vec::new();
        for i in 0..16u32 {
            bytes.extend_from_slice(&[(i * 7) as u8, (i * 3) as u8, (i * 11) as u8, 255]);
        }
        let src = RawImage::new(4, 4, bytes);
        let out = bilinear_resize(&src, 4, 4);
        for y in 0..4 {
            for x in 0..4 {
                let a = src.pixel(x, y).unwrap();
                let b = out.pixel(x, y).unwrap();
                for c in 0..3 {
                    assert!(
                        (i32::from(a[c]) - i32::from(b[c])).abs() <= 1,
                        "channel {c} at ({x},{y}) differs by more than 1"
                    );
                }
            }
        }
    }
}
