use std::borrow::Cow;
use std::fmt;

use wgpu::naga::ShaderStage;

/// Stage a diagnostic belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramStage {
    Vertex,
    Fragment,
    Link,
}

impl fmt::Display for ProgramStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProgramStage::Vertex => "vertex",
            ProgramStage::Fragment => "fragment",
            ProgramStage::Link => "pipeline",
        })
    }
}

/// Shader compile or pipeline creation failure with the driver diagnostics.
#[derive(Debug, thiserror::Error)]
#[error("{stage} stage failed: {message}")]
pub struct ProgramError {
    pub stage: ProgramStage,
    pub message: String,
}

/// Runs `create` inside a validation error scope and turns any captured
/// error into a [`ProgramError`].
pub(crate) fn with_validation<T>(
    device: &wgpu::Device,
    stage: ProgramStage,
    create: impl FnOnce() -> T,
) -> Result<T, ProgramError> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = create();
    match pollster::block_on(device.pop_error_scope()) {
        Some(err) => Err(ProgramError {
            stage,
            message: err.to_string(),
        }),
        None => Ok(value),
    }
}

/// Compiles the static full-screen triangle vertex shader.
pub(crate) fn compile_vertex_shader(
    device: &wgpu::Device,
) -> Result<wgpu::ShaderModule, ProgramError> {
    with_validation(device, ProgramStage::Vertex, || {
        device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("fullscreen triangle vertex"),
            source: wgpu::ShaderSource::Glsl {
                shader: Cow::Borrowed(VERTEX_SHADER_GLSL),
                stage: ShaderStage::Vertex,
                defines: &[],
            },
        })
    })
}

/// Compiles the glyph fragment shader.
pub(crate) fn compile_fragment_shader(
    device: &wgpu::Device,
) -> Result<wgpu::ShaderModule, ProgramError> {
    with_validation(device, ProgramStage::Fragment, || {
        device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("glyph fragment"),
            source: wgpu::ShaderSource::Glsl {
                shader: Cow::Borrowed(FRAGMENT_SHADER_GLSL),
                stage: ShaderStage::Fragment,
                defines: &[],
            },
        })
    })
}

/// Minimal full-screen triangle vertex shader. `v_uv` has a top-left origin.
const VERTEX_SHADER_GLSL: &str = r"#version 450
layout(location = 0) out vec2 v_uv;

const vec2 positions[3] = vec2[3](
    vec2(-1.0, -3.0),
    vec2(3.0, 1.0),
    vec2(-1.0, 1.0)
);

void main() {
    uint vertex_index = uint(gl_VertexIndex);
    vec2 pos = positions[vertex_index];
    v_uv = vec2(pos.x * 0.5 + 0.5, 0.5 - pos.y * 0.5);
    gl_Position = vec4(pos, 0.0, 1.0);
}
";

/// Glyph pass.
///
/// The uniform block layout must match `AsciiUniforms` in `uniforms.rs`.
/// Effect inputs at their neutral values reduce every effect branch to a
/// no-op, so unregistered effects cost nothing visible.
const FRAGMENT_SHADER_GLSL: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 out_color;

layout(std140, set = 0, binding = 0) uniform AsciiParams {
    vec4 surface;
    vec4 grid;
    vec4 tone;
    vec4 ink;
    vec4 pointer;
    vec4 ripple;
    vec4 audio;
    vec4 trail[24];
    vec4 ripples[8];
} params;

layout(set = 1, binding = 0) uniform texture2D frame_texture;
layout(set = 1, binding = 1) uniform sampler frame_sampler;
layout(set = 1, binding = 2) uniform texture2D atlas_texture;
layout(set = 1, binding = 3) uniform sampler atlas_sampler;

const int MAX_TRAIL = 24;
const int MAX_RIPPLES = 8;
const float GLOW_RADIUS_SQ = 18.0;

float luminance(vec3 color) {
    return dot(color, vec3(0.299, 0.587, 0.114));
}

float bayer2(vec2 a) {
    a = floor(a);
    return fract(a.x / 2.0 + a.y * a.y * 0.75);
}

float bayer4(vec2 a) {
    return bayer2(a * 0.5) * 0.25 + bayer2(a);
}

float hash12(vec2 p) {
    return fract(sin(dot(p, vec2(12.9898, 78.233))) * 43758.5453);
}

void main() {
    vec2 grid_size = max(params.grid.xy, vec2(1.0, 1.0));
    float glyph_count = max(params.grid.z, 1.0);
    float now = params.ripple.z;

    vec2 cell_space = v_uv * grid_size;
    vec2 cell = floor(cell_space);
    vec2 cell_uv = fract(cell_space);
    vec2 cell_pos = cell + vec2(0.5, 0.5);
    vec2 sample_uv = cell_pos / grid_size;

    float ripple_glow = 0.0;
    if (params.ripple.x > 0.5) {
        float speed = params.ripple.y;
        float lifetime = max(params.ripple.w, 0.001);
        for (int i = 0; i < MAX_RIPPLES; i++) {
            vec4 slot = params.ripples[i];
            if (slot.w < 0.5) {
                continue;
            }
            float age = now - slot.z;
            if (age < 0.0 || age >= lifetime) {
                continue;
            }
            vec2 delta = cell_pos - slot.xy * grid_size;
            float dist = length(delta);
            float ring = exp(-abs(dist - age * speed) * 0.6);
            float strength = ring * clamp(1.0 - age / lifetime, 0.0, 1.0);
            ripple_glow += strength;
            if (dist > 0.001) {
                vec2 push = delta * (strength * 0.6 / dist);
                sample_uv += push / grid_size;
            }
        }
    }
    sample_uv = clamp(sample_uv, vec2(0.0, 0.0), vec2(1.0, 1.0));

    vec2 source_size = max(params.surface.zw, vec2(1.0, 1.0));
    vec2 texels_per_cell = source_size / grid_size;
    float lod = max(log2(max(texels_per_cell.x, texels_per_cell.y)), 0.0);
    vec3 cell_color = textureLod(sampler2D(frame_texture, frame_sampler), sample_uv, lod).rgb;

    float lum = luminance(cell_color) * params.tone.x;

    float level = params.audio.x;
    float reactivity = params.audio.y;
    float sensitivity = params.audio.z;
    float gain = mix(1.0 - sensitivity, 1.0 + sensitivity, level);
    lum *= mix(1.0, gain, reactivity);

    float glow = 0.0;
    if (params.pointer.x >= 0.0) {
        vec2 aspect = vec2(1.0, 2.0);
        vec2 d = (cell_pos - params.pointer.xy * grid_size) * aspect;
        glow += exp(-dot(d, d) / GLOW_RADIUS_SQ);
        int count = int(params.pointer.z);
        for (int i = 0; i < MAX_TRAIL; i++) {
            if (i >= count) {
                break;
            }
            vec2 point = params.trail[i].xy;
            if (point.x < 0.0) {
                break;
            }
            vec2 td = (cell_pos - point * grid_size) * aspect;
            float falloff = 1.0 - float(i + 1) / float(count + 1);
            glow += exp(-dot(td, td) / GLOW_RADIUS_SQ) * falloff * 0.6;
        }
        glow = clamp(glow, 0.0, 1.0);
    }
    lum += glow * 0.5 + ripple_glow * 0.35;

    int dither_mode = int(params.ink.w + 0.5);
    if (dither_mode == 1) {
        lum += (bayer4(cell) - 0.5) / glyph_count;
    } else if (dither_mode == 2) {
        lum += (hash12(cell) - 0.5) / glyph_count;
    }
    lum = clamp(lum, 0.0, 1.0);

    float index = min(floor(lum * glyph_count), glyph_count - 1.0);
    vec2 atlas_uv = vec2((index + cell_uv.x) / glyph_count, cell_uv.y);
    float coverage = textureLod(sampler2D(atlas_texture, atlas_sampler), atlas_uv, 0.0).r;

    vec3 tint = mix(params.ink.rgb, cell_color, step(0.5, params.tone.w));
    vec3 glyph_color = tint * (1.0 + glow * 0.5 + ripple_glow * 0.5);
    vec3 background = cell_color * (params.tone.z * 0.35);
    vec3 ascii = mix(background, glyph_color, coverage);

    vec3 original = textureLod(sampler2D(frame_texture, frame_sampler), v_uv, 0.0).rgb;
    vec3 color = mix(ascii, original, params.tone.y);
    out_color = vec4(clamp(color, vec3(0.0), vec3(1.0)), 1.0);
}
";

#[cfg(test)]
mod tests {
    use wgpu::naga::front::glsl::{Frontend, Options};
    use wgpu::naga::valid::{Capabilities, ValidationFlags, Validator};

    use super::*;

    fn validate(source: &str, stage: ShaderStage) {
        let mut frontend = Frontend::default();
        let module = frontend
            .parse(&Options::from(stage), source)
            .unwrap_or_else(|err| panic!("{stage:?} shader failed to parse: {err:?}"));
        Validator::new(ValidationFlags::all(), Capabilities::default())
            .validate(&module)
            .unwrap_or_else(|err| panic!("{stage:?} shader failed validation: {err:?}"));
    }

    #[test]
    fn vertex_shader_is_valid() {
        validate(VERTEX_SHADER_GLSL, ShaderStage::Vertex);
    }

    #[test]
    fn fragment_shader_is_valid() {
        validate(FRAGMENT_SHADER_GLSL, ShaderStage::Fragment);
    }

    #[test]
    fn uniform_block_matches_struct_size() {
        let vec4_members = FRAGMENT_SHADER_GLSL
            .lines()
            .skip_while(|line| !line.contains("uniform AsciiParams"))
            .take_while(|line| !line.contains("} params;"))
            .filter(|line| line.trim_start().starts_with("vec4 "))
            .map(|line| {
                line.split_once('[')
                    .and_then(|(_, rest)| rest.split_once(']'))
                    .and_then(|(count, _)| count.parse::<usize>().ok())
                    .unwrap_or(1)
            })
            .sum::<usize>();
        assert_eq!(
            vec4_members * 16,
            std::mem::size_of::<crate::uniforms::AsciiUniforms>()
        );
    }
}
