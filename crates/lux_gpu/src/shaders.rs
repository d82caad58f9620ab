//! WGSL sources for the five stages.
//!
//! WGSL has no includes, so each stage is `common.wgsl` followed by the
//! stage file. The trace stage also gets its base-color texture bindings
//! generated for the device's slot count.

use std::fmt::Write;

const COMMON: &str = include_str!("shaders/common.wgsl");
const CLEAR: &str = include_str!("shaders/clear.wgsl");
const TRACE: &str = include_str!("shaders/trace.wgsl");
const ACCUMULATE: &str = include_str!("shaders/accumulate.wgsl");
const ATROUS: &str = include_str!("shaders/atrous.wgsl");
const TONEMAP: &str = include_str!("shaders/tonemap.wgsl");

/// First binding of the base-color textures in the trace stage's scene group.
pub const TEXTURE_BINDING_BASE: u32 = 5;

fn compose(stage: &str) -> String {
    format!("{COMMON}\n{stage}")
}

pub fn clear() -> String {
    compose(CLEAR)
}

pub fn accumulate() -> String {
    compose(ACCUMULATE)
}

pub fn atrous() -> String {
    compose(ATROUS)
}

pub fn tonemap() -> String {
    compose(TONEMAP)
}

pub fn trace(texture_slots: usize) -> String {
    let mut source = compose(TRACE);
    source.push_str(&base_color_bindings(texture_slots));
    source
}

fn base_color_bindings(slots: usize) -> String {
    let mut out = String::from("\n");

    for slot in 0..slots {
        let _ = writeln!(
            out,
            "@group(1) @binding({}) var base_color_{slot}: texture_2d<f32>;",
            TEXTURE_BINDING_BASE + slot as u32
        );
    }

    out.push_str("\nfn sample_base_color(slot: i32, uv: vec2<f32>) -> vec3<f32> {\n    switch slot {\n");
    for slot in 0..slots {
        let _ = writeln!(
            out,
            "        case {slot}: {{ return textureSampleLevel(base_color_{slot}, base_color_sampler, uv, 0.0).rgb; }}"
        );
    }
    out.push_str("        default: { return vec3<f32>(1.0); }\n    }\n}\n");

    out
}
