#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tjsession::{
    CodecSession, Flags, Limits, Region, TransformDescriptor, TransformOp, TransformOptions,
};

#[derive(Arbitrary, Debug)]
struct DescriptorSeed {
    op: u8,
    options: u8,
    crop: Option<(u16, u16, u16, u16)>,
}

#[derive(Arbitrary, Debug)]
struct Input<'a> {
    seeds: Vec<DescriptorSeed>,
    jpeg: &'a [u8],
}

fn to_descriptor(seed: &DescriptorSeed) -> TransformDescriptor {
    let op = TransformOp::all()[seed.op as usize % TransformOp::all().len()];
    let mut descriptor = TransformDescriptor::new(op)
        .with_options(TransformOptions::from_bits_truncate(seed.options as u32));
    if let Some((x, y, w, h)) = seed.crop {
        descriptor = descriptor.with_crop(Region::new(x as u32, y as u32, w as u32, h as u32));
    }
    descriptor
}

fuzz_target!(|input: Input<'_>| {
    let Ok(mut session) = CodecSession::open_with(Limits::strict()) else {
        return;
    };
    let descriptors: Vec<TransformDescriptor> =
        input.seeds.iter().take(8).map(to_descriptor).collect();

    match session.transform(input.jpeg, &descriptors, Flags::empty()) {
        Ok(outputs) => {
            assert_eq!(outputs.len(), descriptors.len());
            assert_eq!(session.transformed_sizes().len(), outputs.len());
        }
        Err(err) => {
            if let Some(index) = err.transform_index() {
                assert!(index < descriptors.len());
            }
        }
    }
    session.close();
});
