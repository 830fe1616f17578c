// src/engine/yuv.rs
//
// RGB <-> planar YCbCr conversion (JFIF / BT.601 full range) behind
// encode_yuv and decode_yuv. The codec's own planes come from raw data.
//
// Downsampling averages each chroma block and replicates edge pixels into
// padding. Upsampling is nearest-neighbour.

use crate::error::SessionError;

use super::common::EngineResult;
use super::image::YuvImage;
use super::native::Raster;

// 16.16 fixed-point coefficients.
const FIX_0_299: i32 = 19595;
const FIX_0_587: i32 = 38470;
const FIX_0_114: i32 = 7471;
const FIX_0_16874: i32 = 11059;
const FIX_0_33126: i32 = 21709;
const FIX_0_5: i32 = 32768;
const FIX_0_41869: i32 = 27439;
const FIX_0_08131: i32 = 5329;
const FIX_1_402: i32 = 91881;
const FIX_0_34414: i32 = 22554;
const FIX_0_71414: i32 = 46802;
const FIX_1_772: i32 = 116130;
const ONE_HALF: i32 = 1 << 15;
const CENTER: i32 = 128 << 16;

#[inline]
fn clamp_u8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

#[inline]
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    let (r, g, b) = (r as i32, g as i32, b as i32);
    clamp_u8((FIX_0_299 * r + FIX_0_587 * g + FIX_0_114 * b + ONE_HALF) >> 16)
}

#[inline]
pub fn rgb_to_ycc(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let (ri, gi, bi) = (r as i32, g as i32, b as i32);
    let cb = (-FIX_0_16874 * ri - FIX_0_33126 * gi + FIX_0_5 * bi + CENTER + ONE_HALF) >> 16;
    let cr = (FIX_0_5 * ri - FIX_0_41869 * gi - FIX_0_08131 * bi + CENTER + ONE_HALF) >> 16;
    (luma(r, g, b), clamp_u8(cb), clamp_u8(cr))
}

#[inline]
pub fn ycc_to_rgb(y: u8, cb: u8, cr: u8) -> (u8, u8, u8) {
    let y = (y as i32) << 16;
    let cb = cb as i32 - 128;
    let cr = cr as i32 - 128;
    let r = (y + FIX_1_402 * cr + ONE_HALF) >> 16;
    let g = (y - FIX_0_34414 * cb - FIX_0_71414 * cr + ONE_HALF) >> 16;
    let b = (y + FIX_1_772 * cb + ONE_HALF) >> 16;
    (clamp_u8(r), clamp_u8(g), clamp_u8(b))
}

/// Fill every plane of `dst` from `src`. Dimensions must match.
pub fn raster_to_yuv(src: &Raster, dst: &mut YuvImage) -> EngineResult<()> {
    if src.width != dst.width() || src.height != dst.height() {
        return Err(SessionError::codec_failed(
            "encode_yuv",
            format!(
                "source is {}x{} but planar image is {}x{}",
                src.width,
                src.height,
                dst.width(),
                dst.height()
            ),
        ));
    }

    let layout = *dst.layout();
    let subsampling = layout.subsampling();
    let hsf = subsampling.h_factor();
    let vsf = subsampling.v_factor();
    let max_x = src.width - 1;
    let max_y = src.height - 1;

    let sample = |x: u32, y: u32| -> (u8, u8, u8) {
        let px = src.pixel(x.min(max_x), y.min(max_y));
        if src.is_gray() {
            (px[0], 128, 128)
        } else {
            rgb_to_ycc(px[0], px[1], px[2])
        }
    };

    // Y plane; padding columns and rows replicate the edge.
    if let (Some(plane), Some(bytes)) = (layout.plane(0), dst.plane_mut(0)) {
        for (y, row) in bytes.chunks_exact_mut(plane.pitch).enumerate() {
            for (x, out) in row.iter_mut().enumerate() {
                *out = sample(x as u32, y as u32).0;
            }
        }
    }

    if subsampling.is_gray() {
        return Ok(());
    }

    let block = hsf * vsf;
    for index in [1usize, 2] {
        let Some(plane) = layout.plane(index).copied() else {
            continue;
        };
        let Some(bytes) = dst.plane_mut(index) else {
            continue;
        };
        for (cy, row) in bytes.chunks_exact_mut(plane.pitch).enumerate() {
            for (cx, out) in row.iter_mut().enumerate() {
                let mut sum = 0u32;
                for j in 0..vsf {
                    for i in 0..hsf {
                        let (_, cb, cr) = sample(cx as u32 * hsf + i, cy as u32 * vsf + j);
                        let v = if index == 1 { cb } else { cr };
                        sum += v as u32;
                    }
                }
                *out = ((sum + block / 2) / block) as u8;
            }
        }
    }
    Ok(())
}

/// Convert a planar image to a raster, gray (Y only) or RGB.
pub fn yuv_to_raster(src: &YuvImage, gray: bool) -> Raster {
    let layout = *src.layout();
    let subsampling = layout.subsampling();
    let (w, h) = (src.width(), src.height());
    let channels = if gray { 1 } else { 3 };
    let mut out = Raster::new(w, h, channels);

    let (Some(y_plane), Some(y_bytes)) = (layout.plane(0).copied(), src.plane(0)) else {
        return out;
    };
    let chroma = match (
        layout.plane(1).copied(),
        src.plane(1),
        src.plane(2),
    ) {
        (Some(p), Some(u), Some(v)) if !gray => Some((p, u, v)),
        _ => None,
    };

    let hsf = subsampling.h_factor() as usize;
    let vsf = subsampling.v_factor() as usize;
    let stride = out.stride();

    for (y, row) in out.data.chunks_exact_mut(stride).enumerate() {
        for (x, px) in row.chunks_exact_mut(channels).enumerate() {
            let luma = y_bytes[y * y_plane.pitch + x];
            match &chroma {
                Some((p, u, v)) => {
                    let ci = (y / vsf) * p.pitch + x / hsf;
                    let (r, g, b) = ycc_to_rgb(luma, u[ci], v[ci]);
                    px.copy_from_slice(&[r, g, b]);
                }
                None if gray => px[0] = luma,
                None => px.copy_from_slice(&[luma, luma, luma]),
            }
        }
    }
    out
}
