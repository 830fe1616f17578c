// src/engine/transform.rs
//
// Transform planning and execution.
//
// Planning resolves each descriptor against the source header: trimmed
// source size, output size, crop rectangle, output subsampling and output
// capacity. All validation happens here, before the codec is called.

use crate::error::SessionError;
use crate::format::Subsampling;
use crate::ops::{MovedEdges, Region, TransformDescriptor, TransformOp, TransformOptions};

use super::common::EngineResult;
use super::layout::max_compressed_size;
use super::native::{JpegHeader, Raster};

/// A descriptor resolved against a concrete source image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransformPlan {
    /// Position of the descriptor in the batch.
    pub index: usize,
    pub op: TransformOp,
    pub gray: bool,
    /// Source area used, anchored at the top-left, after trimming.
    pub src_width: u32,
    pub src_height: u32,
    /// Leading source columns and rows that the operation mirrors. Anything
    /// past them is a partial iMCU and is left in place.
    pub flip_width: u32,
    pub flip_height: u32,
    /// Output area kept, in output coordinates.
    pub crop: Region,
    pub subsampling: Subsampling,
    /// Largest compressed size the output may have.
    pub capacity: usize,
}

impl TransformPlan {
    pub fn output_width(&self) -> u32 {
        self.crop.width
    }

    pub fn output_height(&self) -> u32 {
        self.crop.height
    }
}

/// Block size that partial-MCU and alignment rules apply to, in source
/// orientation.
fn imcu_size(header: &JpegHeader, gray: bool) -> (u32, u32) {
    if gray {
        (8, 8)
    } else {
        (
            header.subsampling.mcu_width(),
            header.subsampling.mcu_height(),
        )
    }
}

fn output_subsampling(source: Subsampling, op: TransformOp, gray: bool) -> Subsampling {
    if gray || source.is_gray() {
        return Subsampling::Gray;
    }
    if op.is_transposing() {
        Subsampling::from_luma_factors(source.v_factor(), source.h_factor()).unwrap_or(source)
    } else {
        source
    }
}

/// Resolve one descriptor. `index` is its position in the batch.
pub fn plan(
    header: &JpegHeader,
    descriptor: &TransformDescriptor,
    index: usize,
) -> EngineResult<TransformPlan> {
    let op = descriptor.op;
    let options = descriptor.options;
    let gray = options.contains(TransformOptions::GRAY) || header.subsampling.is_gray();
    let (mcu_w, mcu_h) = imcu_size(header, gray);

    let partial_right = header.width % mcu_w != 0;
    let partial_bottom = header.height % mcu_h != 0;
    let imperfect = match op.moved_edges() {
        MovedEdges::Neither => false,
        MovedEdges::Right => partial_right,
        MovedEdges::Bottom => partial_bottom,
        MovedEdges::Both => partial_right || partial_bottom,
    };

    // Checked on the untrimmed size, so TRIM never rescues PERFECT.
    if imperfect && options.contains(TransformOptions::PERFECT) {
        return Err(SessionError::transform_failed(
            index,
            format!(
                "{op:?} is not perfect: {}x{} is not a multiple of the {mcu_w}x{mcu_h} iMCU",
                header.width, header.height
            ),
        ));
    }

    let mut src_width = header.width;
    let mut src_height = header.height;
    if options.contains(TransformOptions::TRIM) {
        let moved = op.moved_edges();
        if matches!(moved, MovedEdges::Right | MovedEdges::Both) && src_width >= mcu_w {
            src_width -= src_width % mcu_w;
        }
        if matches!(moved, MovedEdges::Bottom | MovedEdges::Both) && src_height >= mcu_h {
            src_height -= src_height % mcu_h;
        }
    }

    let (full_w, full_h) = op.output_dimensions(src_width, src_height);
    let (out_mcu_w, out_mcu_h) = if op.is_transposing() {
        (mcu_h, mcu_w)
    } else {
        (mcu_w, mcu_h)
    };

    let crop = match descriptor.crop() {
        None => Region::new(0, 0, full_w, full_h),
        Some(region) => resolve_crop(region, full_w, full_h, out_mcu_w, out_mcu_h, index)?,
    };

    let capacity = max_compressed_size(crop.width, crop.height)?;

    Ok(TransformPlan {
        index,
        op,
        gray,
        src_width,
        src_height,
        flip_width: src_width - src_width % mcu_w,
        flip_height: src_height - src_height % mcu_h,
        crop,
        subsampling: output_subsampling(header.subsampling, op, gray),
        capacity,
    })
}

fn resolve_crop(
    region: Region,
    full_w: u32,
    full_h: u32,
    mcu_w: u32,
    mcu_h: u32,
    index: usize,
) -> EngineResult<Region> {
    if region.x % mcu_w != 0 || region.y % mcu_h != 0 {
        return Err(SessionError::invalid_crop_alignment(
            index, region.x, region.y, mcu_w, mcu_h,
        ));
    }
    if region.x >= full_w || region.y >= full_h {
        return Err(SessionError::invalid_argument(
            "crop origin",
            format!("({}, {})", region.x, region.y),
            format!("outside the {full_w}x{full_h} output"),
        ));
    }
    let width = if region.width == 0 {
        full_w - region.x
    } else {
        region.width
    };
    let height = if region.height == 0 {
        full_h - region.y
    } else {
        region.height
    };
    if region.x as u64 + width as u64 > full_w as u64
        || region.y as u64 + height as u64 > full_h as u64
    {
        return Err(SessionError::invalid_argument(
            "crop region",
            format!("{}x{}+{}+{}", width, height, region.x, region.y),
            format!("extends past the {full_w}x{full_h} output"),
        ));
    }
    Ok(Region::new(region.x, region.y, width, height))
}

/// Resolve a whole batch, stopping at the first invalid descriptor.
pub fn plan_all(
    header: &JpegHeader,
    descriptors: &[TransformDescriptor],
) -> EngineResult<Vec<TransformPlan>> {
    descriptors
        .iter()
        .enumerate()
        .map(|(index, d)| plan(header, d, index))
        .collect()
}

/// Produce the output raster of `plan` from the decoded source.
pub fn apply_plan(source: &Raster, plan: &TransformPlan) -> Raster {
    let gray = plan.gray;
    let channels = if gray { 1 } else { source.channels };
    let crop = plan.crop;
    let mut out = Raster::new(crop.width, crop.height, channels);
    let stride = out.stride();

    for (oy, row) in out.data.chunks_exact_mut(stride).enumerate() {
        for (ox, px) in row.chunks_exact_mut(channels).enumerate() {
            let (sx, sy) = plan.op.source_coord(
                crop.x + ox as u32,
                crop.y + oy as u32,
                plan.flip_width,
                plan.flip_height,
            );
            let sp = source.pixel(sx, sy);
            if gray && !source.is_gray() {
                px[0] = super::yuv::luma(sp[0], sp[1], sp[2]);
            } else {
                px.copy_from_slice(sp);
            }
        }
    }
    out
}
