//! Minimal OpenGL quad renderer for blitting the mpv frame texture.
//! mpv letterboxes into a window-sized FBO, so the quad always covers the
//! whole viewport.

use std::ffi::CString;
use std::ptr;

pub struct QuadRenderer {
    program: u32,
    vao: u32,
    vbo: u32,
    u_tex: i32,
    u_flip: i32,
}

const VERT_SRC: &str = r#"
#version 330 core
layout(location = 0) in vec2 aPos;
layout(location = 1) in vec2 aUV;
out vec2 vUV;
uniform int uFlipY;
void main() {
    gl_Position = vec4(aPos * 2.0 - 1.0, 0.0, 1.0);
    vec2 uv = aUV;
    if (uFlipY != 0) uv.y = 1.0 - uv.y;
    vUV = uv;
}
"#;

const FRAG_SRC: &str = r#"
#version 330 core
in vec2 vUV;
out vec4 fragColor;
uniform sampler2D uTex;
void main() {
    fragColor = texture(uTex, vUV);
}
"#;

impl QuadRenderer {
    pub fn new() -> Result<Self, String> {
        unsafe {
            let program = create_program(VERT_SRC, FRAG_SRC)?;

            #[rustfmt::skip]
            let vertices: [f32; 24] = [
                // pos      uv
                0.0, 0.0,   0.0, 1.0,
                1.0, 0.0,   1.0, 1.0,
                0.0, 1.0,   0.0, 0.0,
                1.0, 0.0,   1.0, 1.0,
                1.0, 1.0,   1.0, 0.0,
                0.0, 1.0,   0.0, 0.0,
            ];

            let mut vao = 0u32;
            let mut vbo = 0u32;
            gl::GenVertexArrays(1, &mut vao);
            gl::GenBuffers(1, &mut vbo);
            gl::BindVertexArray(vao);
            gl::BindBuffer(gl::ARRAY_BUFFER, vbo);
            gl::BufferData(
                gl::ARRAY_BUFFER,
                std::mem::size_of_val(&vertices) as isize,
                vertices.as_ptr() as *const _,
                gl::STATIC_DRAW,
            );
            gl::EnableVertexAttribArray(0);
            gl::VertexAttribPointer(0, 2, gl::FLOAT, gl::FALSE, 16, ptr::null());
            gl::EnableVertexAttribArray(1);
            gl::VertexAttribPointer(1, 2, gl::FLOAT, gl::FALSE, 16, 8 as *const _);
            gl::BindVertexArray(0);

            Ok(QuadRenderer {
                program,
                vao,
                vbo,
                u_tex: uniform(program, "uTex"),
                u_flip: uniform(program, "uFlipY"),
            })
        }
    }

    /// Draw an mpv frame texture over the whole viewport. mpv renders with
    /// GL's bottom-left origin, hence the flip.
    pub fn draw_video(&self, texture: u32) {
        unsafe {
            gl::UseProgram(self.program);
            gl::Uniform1i(self.u_flip, 1);
            gl::ActiveTexture(gl::TEXTURE0);
            gl::BindTexture(gl::TEXTURE_2D, texture);
            gl::Uniform1i(self.u_tex, 0);
            gl::BindVertexArray(self.vao);
            gl::DrawArrays(gl::TRIANGLES, 0, 6);
            gl::BindVertexArray(0);
            gl::UseProgram(0);
        }
    }
}

impl Drop for QuadRenderer {
    fn drop(&mut self) {
        unsafe {
            gl::DeleteProgram(self.program);
            gl::DeleteBuffers(1, &self.vbo);
            gl::DeleteVertexArrays(1, &self.vao);
        }
    }
}

unsafe fn uniform(program: u32, name: &str) -> i32 {
    match CString::new(name) {
        Ok(c) => gl::GetUniformLocation(program, c.as_ptr()),
        Err(_) => -1,
    }
}

unsafe fn create_program(vert_src: &str, frag_src: &str) -> Result<u32, String> {
    let vs = compile_shader(gl::VERTEX_SHADER, vert_src)?;
    let fs = compile_shader(gl::FRAGMENT_SHADER, frag_src)?;

    let program = gl::CreateProgram();
    gl::AttachShader(program, vs);
    gl::AttachShader(program, fs);
    gl::LinkProgram(program);
    gl::DeleteShader(vs);
    gl::DeleteShader(fs);

    let mut success = 0i32;
    gl::GetProgramiv(program, gl::LINK_STATUS, &mut success);
    if success == 0 {
        let mut len = 0i32;
        gl::GetProgramiv(program, gl::INFO_LOG_LENGTH, &mut len);
        let mut buf = vec![0u8; len.max(1) as usize];
        gl::GetProgramInfoLog(program, len, ptr::null_mut(), buf.as_mut_ptr() as *mut _);
        gl::DeleteProgram(program);
        return Err(format!("shader link error: {}", String::from_utf8_lossy(&buf)));
    }
    Ok(program)
}

unsafe fn compile_shader(kind: u32, src: &str) -> Result<u32, String> {
    let c_src = CString::new(src).map_err(|e| e.to_string())?;
    let shader = gl::CreateShader(kind);
    gl::ShaderSource(shader, 1, &c_src.as_ptr(), ptr::null());
    gl::CompileShader(shader);

    let mut success = 0i32;
    gl::GetShaderiv(shader, gl::COMPILE_STATUS, &mut success);
    if success == 0 {
        let mut len = 0i32;
        gl::GetShaderiv(shader, gl::INFO_LOG_LENGTH, &mut len);
        let mut buf = vec![0u8; len.max(1) as usize];
        gl::GetShaderInfoLog(shader, len, ptr::null_mut(), buf.as_mut_ptr() as *mut _);
        gl::DeleteShader(shader);
        let kind_str = if kind == gl::VERTEX_SHADER {
            "vertex"
        } else {
            "fragment"
        };
        return Err(format!(
            "{} shader compile error: {}",
            kind_str,
            String::from_utf8_lossy(&buf)
        ));
    }
    Ok(shader)
}
